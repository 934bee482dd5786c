//! Host runtime flavor selection

use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which family of host exports to use.
///
/// The two flavors expose the same kind of metadata through different
/// enumeration protocols, so the mode decides which backend walks the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Ahead-of-time compiled runtime (`il2cpp_*` exports)
    Il2Cpp,
    /// JIT runtime (`mono_*` exports)
    #[default]
    Mono,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Il2Cpp => write!(f, "il2cpp"),
            Mode::Mono => write!(f, "mono"),
        }
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "il2cpp" => Ok(Mode::Il2Cpp),
            "mono" => Ok(Mode::Mono),
            other => Err(ConfigError::InvalidValue {
                field: "host.mode".to_string(),
                reason: format!("expected 'il2cpp' or 'mono', got '{}'", other),
            }),
        }
    }
}
