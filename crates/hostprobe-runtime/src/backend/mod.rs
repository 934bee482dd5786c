//! Metadata backends
//!
//! The two host flavors expose the same information through different
//! enumeration protocols. A [`MetadataBackend`] hides the protocol and hands
//! the catalog builder raw descriptors in one schema:
//!
//! - [`Il2CppBackend`]: index-counted enumeration, statics inferred from the
//!   field offset, methods compiled ahead of time
//! - [`MonoBackend`]: host-driven callback and cursor enumeration, statics
//!   read from the field attribute flags, methods compiled on request
//!
//! Every export signature is encoded exactly once, in the backend that calls
//! it.

pub mod il2cpp;
pub mod mono;

pub use il2cpp::Il2CppBackend;
pub use mono::MonoBackend;

use crate::catalog::model::{RawAssembly, RawClass, RawField, RawMethod};
use crate::error::{AssemblyLoadError, WalkError, WalkResult};
use crate::ffi::{Handle, HostArgs, HostReturn, Resolver};
use crate::loading::{EntryPoint, LoadedAssembly};
use hostprobe_config::Mode;
use std::ffi::{c_void, CStr};

/// One host flavor's view of the metadata graph
pub trait MetadataBackend: Send + Sync {
    fn mode(&self) -> Mode;

    fn resolver(&self) -> &Resolver;

    /// Root domain handle, fetched when the backend was created
    fn domain(&self) -> Handle;

    /// Attach the calling thread to the host domain
    fn attach_thread(&self);

    /// Detach the calling thread from the host domain
    fn detach_thread(&self);

    /// Every loaded assembly, in host order
    fn assemblies(&self) -> Vec<Handle>;

    fn assembly_info(&self, assembly: Handle) -> WalkResult<RawAssembly>;

    /// Class handles of an image; null entries are already dropped
    fn classes(&self, image: Handle) -> Vec<Handle>;

    fn class_info(&self, class: Handle) -> WalkResult<RawClass>;

    fn fields(&self, class: Handle) -> Vec<Handle>;

    fn methods(&self, class: Handle) -> Vec<Handle>;

    fn interfaces(&self, class: Handle) -> Vec<Handle>;

    fn field_info(&self, field: Handle) -> WalkResult<RawField>;

    fn method_info(&self, method: Handle) -> WalkResult<RawMethod>;

    /// Ask the host for a native entry point; `None` where methods are
    /// compiled ahead of time
    fn compile_method(&self, method: Handle) -> Option<Handle>;

    /// Host-mediated call. Returns the boxed result, or null for void.
    ///
    /// # Safety
    ///
    /// `args` must be null or point to one address per declared parameter,
    /// each valid for the parameter's type.
    unsafe fn runtime_invoke(
        &self,
        method: Handle,
        instance: Handle,
        args: *mut *mut c_void,
    ) -> Handle;

    /// Address of the value inside a boxed object
    fn unbox(&self, object: Handle) -> Handle;

    fn object_new(&self, class: Handle) -> Handle;

    fn string_new(&self, text: &CStr) -> Handle;

    fn class_type(&self, class: Handle) -> Handle;

    fn type_object(&self, ty: Handle) -> Handle;

    /// Per-class table required for static field access, if the flavor has one
    fn static_field_table(&self, class: Handle) -> Option<Handle>;

    /// Copy a static field's value into `out`.
    ///
    /// # Safety
    ///
    /// `out` must be valid for writes of the field's full size.
    unsafe fn static_field_get(&self, field: Handle, table: Option<Handle>, out: *mut c_void);

    /// Copy `value` into a static field.
    ///
    /// # Safety
    ///
    /// `value` must be valid for reads of the field's full size.
    unsafe fn static_field_set(&self, field: Handle, table: Option<Handle>, value: *mut c_void);

    /// Open an assembly from disk in the host domain, then run `entry` if given
    fn load_assembly(
        &self,
        path: &CStr,
        entry: Option<&EntryPoint>,
    ) -> Result<LoadedAssembly, AssemblyLoadError> {
        let _ = (path, entry);
        Err(AssemblyLoadError::Unsupported(self.mode()))
    }
}

/// Build the backend for `mode` over an already-configured resolver
pub fn for_mode(mode: Mode, resolver: Resolver) -> Box<dyn MetadataBackend> {
    match mode {
        Mode::Il2Cpp => Box::new(Il2CppBackend::new(resolver)),
        Mode::Mono => Box::new(MonoBackend::new(resolver)),
    }
}

/// Call an export, converting any failure into a walk error.
///
/// # Safety
///
/// The export's real signature must be `extern "C" fn(A...) -> R`.
pub(crate) unsafe fn call<A, R>(resolver: &Resolver, export: &str, args: A) -> WalkResult<R>
where
    A: HostArgs,
    R: HostReturn,
{
    Ok(resolver.try_invoke(export, args)?)
}

/// Call a `fn(handle) -> const char*` export and copy out the string.
///
/// # Safety
///
/// The export's real signature must be `extern "C" fn(void*) -> const char*`.
pub(crate) unsafe fn name_of(
    resolver: &Resolver,
    export: &str,
    handle: Handle,
    what: &'static str,
) -> WalkResult<String> {
    let text: Handle = call(resolver, export, (handle,))?;
    text.read_c_str().ok_or(WalkError::NullName { what, handle })
}

/// Drain a `fn(owner, void** iter) -> void*` cursor enumerator.
///
/// Stops at the null sentinel. A failed call also ends the enumeration,
/// since the cursor cannot advance past it.
///
/// # Safety
///
/// The export's real signature must be `extern "C" fn(void*, void**) -> void*`.
pub(crate) unsafe fn drain_cursor(
    resolver: &Resolver,
    export: &str,
    owner: Handle,
) -> Vec<Handle> {
    let mut items = Vec::new();
    let mut cursor: *mut c_void = std::ptr::null_mut();

    loop {
        let item: Result<Handle, _> =
            resolver.try_invoke(export, (owner, &mut cursor as *mut *mut c_void));
        match item {
            Ok(item) if !item.is_null() => items.push(item),
            Ok(_) => break,
            Err(e) => {
                tracing::warn!(export, %owner, error = %e, "enumeration ended early");
                break;
            }
        }
    }

    items
}
