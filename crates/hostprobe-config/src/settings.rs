//! Probe configuration (hostprobe.toml)

use crate::mode::Mode;
use crate::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration from hostprobe.toml
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub struct ProbeConfig {
    /// Host module and runtime flavor
    #[serde(default)]
    pub host: HostConfig,
}

/// `[host]` section
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Runtime flavor (default: mono)
    #[serde(default)]
    pub mode: Mode,

    /// Module short name or path. `None` resolves exports from the current process.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,

    /// Attach the initializing thread to the host domain before walking
    #[serde(default = "default_attach_thread")]
    pub attach_thread: bool,

    /// Extra directories searched before the platform defaults
    #[serde(default)]
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,
}

fn default_attach_thread() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mode: Mode::default(),
            module: None,
            attach_thread: default_attach_thread(),
            search_paths: Vec::new(),
        }
    }
}

impl ProbeConfig {
    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound(path.to_path_buf())
            } else {
                ConfigError::IoError(e)
            }
        })?;

        Self::parse(&content, path)
    }

    /// Parse configuration text; `origin` is only used in error messages
    pub fn parse(content: &str, origin: &Path) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::TomlParseError {
            file: origin.to_path_buf(),
            error: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> ConfigResult<()> {
        if let Some(module) = &self.host.module {
            if module.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "host.module".to_string(),
                    reason: "module name cannot be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::InvalidValue {
            field: "<root>".to_string(),
            reason: e.to_string(),
        })
    }
}
