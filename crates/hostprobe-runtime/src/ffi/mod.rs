//! Foreign Function Interface (FFI) infrastructure
//!
//! Everything that touches host exports directly:
//! - Module loading and raw symbol lookup (`loader`)
//! - Memoized name → address resolution (`resolver`)
//! - Typed calls through resolved addresses (`caller`)
//! - Boundary value types (`types`)
//!
//! # Safety
//!
//! Calling a host export with the wrong signature is undefined behaviour and
//! cannot be detected at runtime. Safe wrappers for each export live in the
//! metadata backends, which encode every signature once.

pub mod caller;
pub mod loader;
pub mod resolver;
pub mod types;

pub use caller::{call_at, try_call_at, HostArgs, InvokeError};
pub use loader::{HostModule, LoadError, SymbolSource};
pub use resolver::Resolver;
pub use types::{AssemblyVisitor, Handle, HostArg, HostReturn};
