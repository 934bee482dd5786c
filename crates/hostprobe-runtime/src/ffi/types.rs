//! FFI type system - values that cross the host boundary
//!
//! Defines:
//! - `Handle`: an opaque host address (assembly, class, method, object, ...)
//! - `HostArg`: types that may be passed to a host export by value
//! - `HostReturn`: types that may come back from a host export, with the
//!   fallback value used when a call cannot complete
//!
//! Type mapping follows the platform C ABI: integers and floats map to
//! themselves, `bool` to a one-byte C `bool`, `Handle` to `void*`.

use std::ffi::{c_char, c_void, CStr};
use std::fmt;

/// Opaque address owned by the host.
///
/// `#[repr(transparent)]` over `*mut c_void`, so it is passed and returned
/// exactly like a C `void*`.
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Handle(*mut c_void);

// Safety: a Handle is an address value; dereferencing it always goes through
// unsafe host calls whose threading rules are the host's, not Rust's.
unsafe impl Send for Handle {}
unsafe impl Sync for Handle {}

impl Handle {
    /// The null handle
    pub const NULL: Handle = Handle(std::ptr::null_mut());

    /// Wrap a raw pointer
    pub fn from_ptr<T>(ptr: *const T) -> Self {
        Handle(ptr as *mut c_void)
    }

    /// Wrap an integer address
    pub fn from_addr(addr: usize) -> Self {
        Handle(addr as *mut c_void)
    }

    pub fn is_null(self) -> bool {
        self.0.is_null()
    }

    pub fn as_ptr(self) -> *mut c_void {
        self.0
    }

    pub fn addr(self) -> usize {
        self.0 as usize
    }

    /// `None` for null, otherwise `Some(self)`
    pub fn non_null(self) -> Option<Handle> {
        if self.is_null() {
            None
        } else {
            Some(self)
        }
    }

    /// Offset the address by `bytes`
    pub fn offset(self, bytes: isize) -> Handle {
        Handle((self.0 as *mut u8).wrapping_offset(bytes) as *mut c_void)
    }

    /// Read a NUL-terminated UTF-8 string at this address.
    ///
    /// Returns `None` for a null handle. Invalid UTF-8 is replaced lossily.
    ///
    /// # Safety
    ///
    /// A non-null handle must point to a NUL-terminated string that stays
    /// alive for the duration of the call.
    pub unsafe fn read_c_str(self) -> Option<String> {
        if self.is_null() {
            return None;
        }
        Some(
            CStr::from_ptr(self.0 as *const c_char)
                .to_string_lossy()
                .into_owned(),
        )
    }
}

impl Default for Handle {
    fn default() -> Self {
        Handle::NULL
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle({:#x})", self.addr())
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.addr())
    }
}

impl<T> From<*mut T> for Handle {
    fn from(ptr: *mut T) -> Self {
        Handle(ptr as *mut c_void)
    }
}

impl<T> From<*const T> for Handle {
    fn from(ptr: *const T) -> Self {
        Handle(ptr as *mut c_void)
    }
}

/// Callback signature handed to `mono_assembly_foreach`
pub type AssemblyVisitor = extern "C" fn(assembly: Handle, user_data: *mut c_void);

/// A value that can be passed by value to a host export.
///
/// # Safety
///
/// Implementors must have a C-compatible by-value representation.
pub unsafe trait HostArg: Copy {}

/// A value that can be returned from a host export.
///
/// # Safety
///
/// Implementors must have a C-compatible by-value representation.
pub unsafe trait HostReturn: Sized {
    /// Value produced when the call is skipped or faults
    fn fallback() -> Self;
}

macro_rules! host_scalar {
    ($($ty:ty => $zero:expr),* $(,)?) => {
        $(
            unsafe impl HostArg for $ty {}
            unsafe impl HostReturn for $ty {
                fn fallback() -> Self {
                    $zero
                }
            }
        )*
    };
}

host_scalar! {
    i8 => 0,
    u8 => 0,
    i16 => 0,
    u16 => 0,
    i32 => 0,
    u32 => 0,
    i64 => 0,
    u64 => 0,
    isize => 0,
    usize => 0,
    f32 => 0.0,
    f64 => 0.0,
    bool => false,
    Handle => Handle::NULL,
}

unsafe impl<T> HostArg for *mut T {}
unsafe impl<T> HostArg for *const T {}
unsafe impl HostArg for AssemblyVisitor {}

unsafe impl<T> HostReturn for *mut T {
    fn fallback() -> Self {
        std::ptr::null_mut()
    }
}

unsafe impl<T> HostReturn for *const T {
    fn fallback() -> Self {
        std::ptr::null()
    }
}

unsafe impl HostReturn for () {
    fn fallback() -> Self {}
}
