//! hostprobe runtime - metadata introspection for Il2Cpp and Mono hosts
//!
//! This library provides:
//! - Entry-point resolution against a host module, memoized per name
//! - A typed invocation adapter that degrades to fallback values
//! - A one-shot walk of the host's assemblies, classes, fields and methods
//!   into an in-process catalog with name/wildcard lookup
//! - Direct and host-mediated calls of cataloged methods
//! - Opening further assemblies in a Mono host and running their entry point
//!
//! # Example
//!
//! ```no_run
//! use hostprobe_runtime::{Catalog, HostModule, Mode};
//!
//! let module = HostModule::open("GameAssembly", &[]).unwrap();
//! let catalog = Catalog::init(module, Mode::Il2Cpp);
//!
//! let player = catalog
//!     .get_assembly("Assembly-CSharp")
//!     .and_then(|a| a.class("Player"));
//! println!("{:?}", player.and_then(|c| c.field_offset("health")));
//! ```

/// hostprobe runtime version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod backend;
pub mod catalog;
pub mod error;
pub mod ffi;
pub mod invoke;
pub mod loading;
pub mod objects;

pub use backend::{Il2CppBackend, MetadataBackend, MonoBackend};
pub use catalog::{
    Arg, Assembly, Catalog, Class, Field, InitOptions, Method, Type, WalkStats, WILDCARD,
};
pub use error::{AssemblyLoadError, ProbeError, ProbeResult, WalkError, WalkResult};
pub use ffi::{Handle, HostModule, InvokeError, LoadError, Resolver, SymbolSource};
pub use hostprobe_config::{Mode, ProbeConfig};
pub use invoke::RuntimeArgs;
pub use loading::{EntryPoint, LoadedAssembly};
