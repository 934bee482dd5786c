//! hostprobe configuration
//!
//! Loads the settings that select and open a host module:
//! - Project configuration (`hostprobe.toml`, found by walking up from a directory)
//! - Environment variables (`HOSTPROBE_*`)
//!
//! # Configuration Hierarchy
//!
//! Later sources override earlier ones:
//! 1. Built-in defaults
//! 2. `hostprobe.toml`
//! 3. Environment variables (`HOSTPROBE_MODE`, `HOSTPROBE_MODULE`, `HOSTPROBE_ATTACH_THREAD`)
//!
//! # Example
//!
//! ```no_run
//! use hostprobe_config::ConfigLoader;
//! use std::path::Path;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.load_from_directory(Path::new(".")).unwrap();
//! println!("mode = {}", config.host.mode);
//! ```

pub mod loader;
pub mod mode;
pub mod settings;

use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid TOML syntax in {file}: {error}")]
    TomlParseError {
        file: PathBuf,
        error: toml::de::Error,
    },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

pub use loader::{ConfigLoader, LoadedConfig, CONFIG_FILE_NAME};
pub use mode::Mode;
pub use settings::{HostConfig, ProbeConfig};
