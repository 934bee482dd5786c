//! Configuration Loader
//!
//! Finds `hostprobe.toml` and applies environment overrides on top of it.

use crate::mode::Mode;
use crate::settings::ProbeConfig;
use crate::ConfigResult;
use std::env;
use std::path::{Path, PathBuf};

/// File name searched for when walking up from a directory
pub const CONFIG_FILE_NAME: &str = "hostprobe.toml";

/// Configuration loader
///
/// Precedence, lowest first:
/// 1. Defaults
/// 2. hostprobe.toml
/// 3. Environment variables (HOSTPROBE_*)
#[derive(Debug, Default)]
pub struct ConfigLoader {
    /// Skip environment overrides (used when the caller wants the file verbatim)
    ignore_env: bool,
}

/// Loaded configuration plus where it came from
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    /// Merged configuration
    pub config: ProbeConfig,

    /// Config file that was read, if any
    pub source: Option<PathBuf>,
}

impl std::ops::Deref for LoadedConfig {
    type Target = ProbeConfig;

    fn deref(&self) -> &ProbeConfig {
        &self.config
    }
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self { ignore_env: false }
    }

    /// Create a loader that does not consult environment variables
    pub fn without_env() -> Self {
        Self { ignore_env: true }
    }

    /// Load configuration starting from the given directory
    ///
    /// Walks up the directory tree to find hostprobe.toml. A missing file is
    /// not an error; defaults are used instead.
    pub fn load_from_directory(&self, start_dir: &Path) -> ConfigResult<LoadedConfig> {
        let (source, config) = match Self::find_config_file(start_dir) {
            Some(path) => {
                let config = ProbeConfig::load_from_file(&path)?;
                (Some(path), config)
            }
            None => (None, ProbeConfig::default()),
        };

        let config = self.apply_env_overrides(config)?;
        Ok(LoadedConfig { config, source })
    }

    /// Load configuration from a specific file
    pub fn load_from_file(&self, config_path: &Path) -> ConfigResult<LoadedConfig> {
        let config = ProbeConfig::load_from_file(config_path)?;
        let config = self.apply_env_overrides(config)?;

        Ok(LoadedConfig {
            config,
            source: Some(config_path.to_path_buf()),
        })
    }

    fn find_config_file(start_dir: &Path) -> Option<PathBuf> {
        let mut current = start_dir.to_path_buf();

        loop {
            let candidate = current.join(CONFIG_FILE_NAME);
            if candidate.is_file() {
                return Some(candidate);
            }

            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => return None,
            }
        }
    }

    /// Apply environment variable overrides
    ///
    /// - HOSTPROBE_MODE=il2cpp|mono
    /// - HOSTPROBE_MODULE=<name or path>
    /// - HOSTPROBE_ATTACH_THREAD=true|false
    fn apply_env_overrides(&self, mut config: ProbeConfig) -> ConfigResult<ProbeConfig> {
        if self.ignore_env {
            return Ok(config);
        }

        if let Ok(mode) = env::var("HOSTPROBE_MODE") {
            config.host.mode = mode.parse::<Mode>()?;
        }

        if let Ok(module) = env::var("HOSTPROBE_MODULE") {
            config.host.module = if module.trim().is_empty() {
                None
            } else {
                Some(module)
            };
        }

        if let Ok(attach) = env::var("HOSTPROBE_ATTACH_THREAD") {
            config.host.attach_thread =
                matches!(attach.to_lowercase().as_str(), "true" | "1" | "yes");
        }

        config.validate()?;
        Ok(config)
    }
}
