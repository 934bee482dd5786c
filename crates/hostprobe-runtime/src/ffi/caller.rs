//! Host function calling using direct function pointers
//!
//! Every host export has a signature fixed by the export contract, so calls
//! go through a function pointer cast of the right shape rather than a
//! dynamic call interface. Argument lists are tuples of [`HostArg`] values.
//!
//! Calls use the `"C-unwind"` ABI: the platform C convention (SysV on Unix,
//! the Microsoft x64 convention on Win64, cdecl on Win32) with unwinding
//! permitted, so a fault that unwinds out of the callee is caught here and
//! turned into the return type's fallback value.

use crate::ffi::types::{Handle, HostArg, HostReturn};
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// Why a host call did not produce a value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InvokeError {
    /// Export not found in the host module
    #[error("entry point '{0}' is not exported by the host")]
    Unresolved(String),

    /// Call target address is null
    #[error("call target is null")]
    NullAddress,

    /// The callee unwound instead of returning
    #[error("host call to {target} faulted")]
    Faulted { target: String },
}

/// An argument list that can be passed to a host function.
///
/// Implemented for tuples of up to six [`HostArg`] values.
///
/// # Safety
///
/// Implementors must call `address` with exactly their own elements, in
/// order, using the host calling convention.
pub unsafe trait HostArgs: Sized {
    /// Number of arguments
    const ARITY: usize;

    /// Call `address` with these arguments.
    ///
    /// # Safety
    ///
    /// `address` must point to a function whose real signature is
    /// `extern "C" fn(Self...) -> R`. A mismatch is undefined behaviour.
    unsafe fn call_at<R: HostReturn>(self, address: Handle) -> R;
}

macro_rules! impl_host_args {
    ($arity:expr; $($name:ident),*) => {
        unsafe impl<$($name: HostArg),*> HostArgs for ($($name,)*) {
            const ARITY: usize = $arity;

            #[allow(non_snake_case)]
            unsafe fn call_at<R: HostReturn>(self, address: Handle) -> R {
                let function: extern "C-unwind" fn($($name),*) -> R =
                    std::mem::transmute_copy(&address.as_ptr());
                let ($($name,)*) = self;
                function($($name),*)
            }
        }
    };
}

impl_host_args!(0;);
impl_host_args!(1; A);
impl_host_args!(2; A, B);
impl_host_args!(3; A, B, C);
impl_host_args!(4; A, B, C, D);
impl_host_args!(5; A, B, C, D, E);
impl_host_args!(6; A, B, C, D, E, F);

/// Call a known address, reporting why the call produced no value.
///
/// # Safety
///
/// See [`HostArgs::call_at`].
pub unsafe fn try_call_at<A, R>(address: Handle, args: A) -> Result<R, InvokeError>
where
    A: HostArgs,
    R: HostReturn,
{
    if address.is_null() {
        return Err(InvokeError::NullAddress);
    }

    panic::catch_unwind(AssertUnwindSafe(|| args.call_at::<R>(address))).map_err(|_| {
        InvokeError::Faulted {
            target: address.to_string(),
        }
    })
}

/// Call a known address; a null address or a fault yields `R::fallback()`.
///
/// # Safety
///
/// See [`HostArgs::call_at`].
pub unsafe fn call_at<A, R>(address: Handle, args: A) -> R
where
    A: HostArgs,
    R: HostReturn,
{
    try_call_at(address, args).unwrap_or_else(|e| {
        tracing::debug!(error = %e, "host call returned fallback");
        R::fallback()
    })
}
