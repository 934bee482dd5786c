//! Calling cataloged methods
//!
//! Two styles:
//! - direct: call the method's native entry point with native arguments
//!   ([`Catalog::call`]); the entry point is fetched lazily and memoized
//! - host-mediated: hand the host an array of argument addresses and let it
//!   dispatch ([`Catalog::runtime_invoke`] and friends)
//!
//! Use the direct style when the full native signature is known statically,
//! the host-mediated style when only object handles are at hand.

use crate::catalog::{Catalog, Method};
use crate::ffi::{self, Handle, HostArgs, HostReturn, InvokeError};
use std::any::Any;
use std::ffi::c_void;

impl Catalog {
    /// Native entry point of `method`, compiling it on first use if needed.
    ///
    /// Only a non-null result is remembered; a failed compile is retried on
    /// the next request.
    pub fn function_pointer(&self, method: &Method) -> Option<Handle> {
        if let Some(function) = method.function.get() {
            return Some(*function);
        }

        let function = self.backend.compile_method(method.handle)?;
        Some(*method.function.get_or_init(|| function))
    }

    /// Call the method's native entry point, reporting why no value came back.
    ///
    /// # Safety
    ///
    /// `A` and `R` must match the compiled signature exactly, including the
    /// leading instance argument for non-static methods.
    pub unsafe fn try_call<A, R>(&self, method: &Method, args: A) -> Result<R, InvokeError>
    where
        A: HostArgs,
        R: HostReturn,
    {
        let function = self
            .function_pointer(method)
            .ok_or(InvokeError::NullAddress)?;
        ffi::try_call_at(function, args).map_err(|e| match e {
            InvokeError::Faulted { .. } => InvokeError::Faulted {
                target: method.name.clone(),
            },
            other => other,
        })
    }

    /// Call the method's native entry point; any failure yields `R::fallback()`.
    ///
    /// # Safety
    ///
    /// See [`Catalog::try_call`].
    pub unsafe fn call<A, R>(&self, method: &Method, args: A) -> R
    where
        A: HostArgs,
        R: HostReturn,
    {
        self.try_call(method, args).unwrap_or_else(|e| {
            tracing::debug!(method = %method.name, error = %e, "direct call returned fallback");
            R::fallback()
        })
    }

    /// Host-mediated call discarding any result.
    ///
    /// # Safety
    ///
    /// `args` must hold one entry per declared parameter, each of the
    /// parameter's type; `instance` must be null for static methods.
    pub unsafe fn runtime_invoke_void(
        &self,
        method: &Method,
        instance: Handle,
        args: &mut RuntimeArgs,
    ) {
        self.runtime_invoke_object(method, instance, args);
    }

    /// Host-mediated call returning the result object as-is (boxed for value
    /// types, null for void).
    ///
    /// # Safety
    ///
    /// See [`Catalog::runtime_invoke_void`].
    pub unsafe fn runtime_invoke_object(
        &self,
        method: &Method,
        instance: Handle,
        args: &mut RuntimeArgs,
    ) -> Handle {
        self.backend
            .runtime_invoke(method.handle, instance, args.as_mut_ptr())
    }

    /// Host-mediated call with the boxed result unwrapped into `R`.
    ///
    /// A null box or payload yields `R::fallback()`.
    ///
    /// # Safety
    ///
    /// See [`Catalog::runtime_invoke_void`]. `R` must match the method's
    /// return type.
    pub unsafe fn runtime_invoke<R>(
        &self,
        method: &Method,
        instance: Handle,
        args: &mut RuntimeArgs,
    ) -> R
    where
        R: HostReturn + Copy,
    {
        let boxed = self.runtime_invoke_object(method, instance, args);
        self.unbox(boxed)
    }

    /// Copy the value out of a boxed object.
    ///
    /// # Safety
    ///
    /// `boxed` must be null or a boxed instance of a value type laid out as `R`.
    pub unsafe fn unbox<R>(&self, boxed: Handle) -> R
    where
        R: HostReturn + Copy,
    {
        if boxed.is_null() {
            return R::fallback();
        }
        let payload = self.backend.unbox(boxed);
        if payload.is_null() {
            return R::fallback();
        }
        std::ptr::read_unaligned(payload.as_ptr() as *const R)
    }
}

/// Argument array for host-mediated calls.
///
/// The host expects one address per parameter: value arguments are copied
/// into storage owned here and passed by address, object arguments are
/// passed as their handle.
#[derive(Default)]
pub struct RuntimeArgs {
    storage: Vec<Box<dyn Any>>,
    slots: Vec<*mut c_void>,
}

impl RuntimeArgs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value-type argument
    pub fn value<T: Copy + 'static>(mut self, value: T) -> Self {
        let mut boxed = Box::new(value);
        self.slots.push(&mut *boxed as *mut T as *mut c_void);
        self.storage.push(boxed);
        self
    }

    /// Append a reference-type argument
    pub fn object(mut self, object: Handle) -> Self {
        self.slots.push(object.as_ptr());
        self
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Pointer to the address array, or null when there are no arguments
    pub fn as_mut_ptr(&mut self) -> *mut *mut c_void {
        if self.slots.is_empty() {
            std::ptr::null_mut()
        } else {
            self.slots.as_mut_ptr()
        }
    }
}

impl std::fmt::Debug for RuntimeArgs {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.slots.iter()).finish()
    }
}
