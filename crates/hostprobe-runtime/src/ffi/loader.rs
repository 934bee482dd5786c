//! Host module loading and raw symbol lookup
//!
//! Provides cross-platform access to the host module's exports using
//! `libloading`. Handles platform-specific library naming conventions and
//! search paths when a module is opened by short name.

use crate::ffi::types::Handle;
use libloading::Library;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Module loading errors
#[derive(Debug, Error)]
pub enum LoadError {
    /// Library file not found in search paths
    #[error("Host module not found: {0}")]
    ModuleNotFound(String),

    /// Failed to load library
    #[error("Failed to load host module '{module}': {reason}")]
    LoadFailed { module: String, reason: String },
}

/// The dynamic-symbol-lookup primitive.
///
/// Anything that can turn an export name into an address. Real hosts go
/// through [`HostModule`]; tests plug in their own tables.
pub trait SymbolSource: Send + Sync {
    /// Look up `name`, returning `None` when the export is absent
    fn lookup(&self, name: &str) -> Option<Handle>;

    /// Human-readable description for logs
    fn describe(&self) -> String {
        "<symbol source>".to_string()
    }
}

/// A loaded host module (the runtime's shared library or the current process)
///
/// # Safety
///
/// Opening a module executes its initialization code. Exports looked up from
/// it are only valid while the module stays loaded; `HostModule` keeps its
/// `Library` alive for as long as it exists.
pub struct HostModule {
    library: Library,
    name: String,
}

impl HostModule {
    /// Open a module by short name or path
    ///
    /// Short names follow platform conventions (`lib{name}.so`,
    /// `lib{name}.dylib`, `{name}.dll`) and are searched in `extra_paths`
    /// first, then in the platform defaults. A name that resolves to no file
    /// is still handed to the system loader, so modules already mapped into
    /// the process by their loader name are found too.
    pub fn open(name: &str, extra_paths: &[PathBuf]) -> Result<Self, LoadError> {
        if Path::new(name).is_absolute() && !Path::new(name).exists() {
            return Err(LoadError::ModuleNotFound(name.to_string()));
        }

        let mut search_paths = extra_paths.to_vec();
        search_paths.extend(default_search_paths());

        let target = resolve_module_path(name, &search_paths)
            .map(|p| p.into_os_string())
            .unwrap_or_else(|| platform_file_name(name).into());

        let library = unsafe {
            Library::new(&target).map_err(|e| LoadError::LoadFailed {
                module: name.to_string(),
                reason: e.to_string(),
            })?
        };

        tracing::debug!(module = name, path = ?target, "opened host module");
        Ok(Self {
            library,
            name: name.to_string(),
        })
    }

    /// Use the exports of the running executable and everything it has loaded
    pub fn current_process() -> Result<Self, LoadError> {
        #[cfg(unix)]
        let library: Library = libloading::os::unix::Library::this().into();

        #[cfg(windows)]
        let library: Library = libloading::os::windows::Library::this()
            .map_err(|e| LoadError::LoadFailed {
                module: "<current process>".to_string(),
                reason: e.to_string(),
            })?
            .into();

        Ok(Self {
            library,
            name: "<current process>".to_string(),
        })
    }

    /// Name the module was opened with
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl SymbolSource for HostModule {
    fn lookup(&self, name: &str) -> Option<Handle> {
        // The export is read as a data symbol: its value is the address itself.
        let symbol = unsafe { self.library.get::<*mut c_void>(name.as_bytes()) }.ok()?;
        Handle::from_ptr(*symbol).non_null()
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

impl fmt::Debug for HostModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostModule").field("name", &self.name).finish()
    }
}

/// Platform-specific default library search paths, current directory first
fn default_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    if let Ok(cwd) = std::env::current_dir() {
        paths.push(cwd);
    }

    #[cfg(target_os = "linux")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
        paths.push(PathBuf::from("/lib"));
    }

    #[cfg(target_os = "macos")]
    {
        paths.push(PathBuf::from("/usr/lib"));
        paths.push(PathBuf::from("/usr/local/lib"));
    }

    paths
}

/// Platform file name for a short module name
fn platform_file_name(name: &str) -> String {
    if Path::new(name).extension().is_some() {
        return name.to_string();
    }

    if cfg!(target_os = "windows") {
        format!("{}.dll", name)
    } else if cfg!(target_os = "macos") {
        format!("lib{}.dylib", name)
    } else {
        format!("lib{}.so", name)
    }
}

/// Resolve a module name to an existing file
fn resolve_module_path(name: &str, search_paths: &[PathBuf]) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.is_absolute() {
        return path.exists().then(|| path.to_path_buf());
    }

    let candidates = [name.to_string(), platform_file_name(name)];
    search_paths
        .iter()
        .flat_map(|dir| candidates.iter().map(move |file| dir.join(file)))
        .find(|candidate| candidate.is_file())
}
