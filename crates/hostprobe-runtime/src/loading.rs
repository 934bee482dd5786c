//! Loading assemblies into a running host
//!
//! Only Mono hosts can open an assembly from disk after startup. The loaded
//! assembly is not added to an existing [`Catalog`]; walk the host again to
//! see its classes.

use crate::catalog::Catalog;
use crate::error::AssemblyLoadError;
use crate::ffi::Handle;
use std::ffi::CString;

/// Static method to run once the assembly is open
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub namespace: CString,
    pub class: CString,
    /// Method description in the host's `Class:Method` syntax
    pub method: CString,
}

/// Handles produced by [`Catalog::load_assembly`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadedAssembly {
    pub assembly: Handle,
    pub image: Handle,
    /// Entry class and method, when one was requested and run
    pub class: Option<Handle>,
    pub method: Option<Handle>,
}

fn c_text(text: &str, what: &'static str) -> Result<CString, AssemblyLoadError> {
    CString::new(text).map_err(|_| AssemblyLoadError::InvalidText(what))
}

impl Catalog {
    /// Open the assembly at `path` in the host domain and run a static
    /// entry point in it.
    ///
    /// `method_desc` uses the host's description syntax, e.g.
    /// `Loader.Entry:Main`. With an empty `class` or `method_desc` the
    /// assembly is only opened. An empty `namespace` names the global
    /// namespace.
    pub fn load_assembly(
        &self,
        path: &str,
        namespace: &str,
        class: &str,
        method_desc: &str,
    ) -> Result<LoadedAssembly, AssemblyLoadError> {
        let path = c_text(path, "assembly path")?;
        let entry = if class.is_empty() || method_desc.is_empty() {
            None
        } else {
            Some(EntryPoint {
                namespace: c_text(namespace, "namespace")?,
                class: c_text(class, "class name")?,
                method: c_text(method_desc, "method description")?,
            })
        };

        let span = tracing::info_span!("load_assembly", path = %path.to_string_lossy());
        let _enter = span.enter();

        let loaded = self.backend.load_assembly(&path, entry.as_ref());
        match &loaded {
            Ok(loaded) => tracing::info!(assembly = %loaded.assembly, "assembly loaded"),
            Err(e) => tracing::warn!(error = %e, "assembly load failed"),
        }
        loaded
    }
}
