//! The in-process metadata catalog
//!
//! A [`Catalog`] is built once by walking the host through a
//! [`MetadataBackend`] and is read-only afterwards, apart from per-entity
//! memoization cells. Several independent catalogs may coexist.

pub mod builder;
pub mod model;
pub mod query;

pub use builder::WalkStats;
pub use model::{Arg, Assembly, Class, Field, Method, Type};
pub use query::WILDCARD;

use crate::backend::{self, MetadataBackend};
use crate::error::ProbeResult;
use crate::ffi::{Handle, HostModule, Resolver, SymbolSource};
use builder::CatalogBuilder;
use hostprobe_config::{Mode, ProbeConfig};
use std::fmt;
use std::sync::Arc;

/// Options for [`Catalog::init_with`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitOptions {
    /// Attach the initializing thread to the host domain before walking
    pub attach_thread: bool,
}

impl Default for InitOptions {
    fn default() -> Self {
        Self {
            attach_thread: true,
        }
    }
}

pub struct Catalog {
    pub(crate) backend: Box<dyn MetadataBackend>,
    pub(crate) assemblies: Vec<Arc<Assembly>>,
    stats: WalkStats,
}

impl Catalog {
    /// Walk the host behind `source` with default options
    pub fn init(source: impl SymbolSource + 'static, mode: Mode) -> Self {
        Self::init_with(source, mode, InitOptions::default())
    }

    pub fn init_with(
        source: impl SymbolSource + 'static,
        mode: Mode,
        options: InitOptions,
    ) -> Self {
        let resolver = Resolver::new(source);
        Self::from_backend(backend::for_mode(mode, resolver), options)
    }

    /// Walk the host through an already-constructed backend
    pub fn from_backend(backend: Box<dyn MetadataBackend>, options: InitOptions) -> Self {
        if options.attach_thread {
            backend.attach_thread();
        }

        let (assemblies, stats) = CatalogBuilder::new(backend.as_ref()).build();
        Self {
            backend,
            assemblies,
            stats,
        }
    }

    /// Open the configured host module and walk it.
    ///
    /// Module loading is the only failure surfaced to the caller.
    pub fn from_config(config: &ProbeConfig) -> ProbeResult<Self> {
        config.validate()?;
        let host = &config.host;

        let module = match &host.module {
            Some(name) => HostModule::open(name, &host.search_paths)?,
            None => HostModule::current_process()?,
        };
        tracing::info!(module = module.name(), mode = %host.mode, "opened host module");

        Ok(Self::init_with(
            module,
            host.mode,
            InitOptions {
                attach_thread: host.attach_thread,
            },
        ))
    }

    pub fn mode(&self) -> Mode {
        self.backend.mode()
    }

    pub fn backend(&self) -> &dyn MetadataBackend {
        self.backend.as_ref()
    }

    pub fn resolver(&self) -> &Resolver {
        self.backend.resolver()
    }

    pub fn domain(&self) -> Handle {
        self.backend.domain()
    }

    /// Assemblies in walk order
    pub fn assemblies(&self) -> &[Arc<Assembly>] {
        &self.assemblies
    }

    pub fn stats(&self) -> WalkStats {
        self.stats
    }

    /// Attach the calling thread to the host domain.
    ///
    /// Required before any thread other than the initializing one calls
    /// into the host.
    pub fn attach_current_thread(&self) {
        self.backend.attach_thread();
    }

    pub fn detach_current_thread(&self) {
        self.backend.detach_thread();
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("mode", &self.mode())
            .field("domain", &self.domain())
            .field("stats", &self.stats)
            .finish()
    }
}
