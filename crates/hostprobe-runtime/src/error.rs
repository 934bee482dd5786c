//! Error types
//!
//! Host-facing operations never fail outward: they return fallback values
//! or `None`. The enums here carry the internal reason so the walk and the
//! adapter can log it, and so tests can observe it. Opening a module,
//! reading configuration and loading an assembly from disk surface an error
//! to the caller.

use crate::ffi::{Handle, InvokeError, LoadError};
use hostprobe_config::{ConfigError, Mode};
use thiserror::Error;

/// Why one metadata entity could not be materialized
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalkError {
    /// A host call failed or faulted
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// The host returned a null string for a required name
    #[error("{what} of {handle} is null")]
    NullName { what: &'static str, handle: Handle },

    /// The host returned no signature for a method
    #[error("method {0} has no signature")]
    MissingSignature(Handle),
}

/// Result of materializing one entity during the walk
pub type WalkResult<T> = Result<T, WalkError>;

/// Why an assembly could not be loaded or its entry point run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssemblyLoadError {
    #[error("assembly loading is not available under {0}")]
    Unsupported(Mode),

    #[error("{0} contains a NUL byte")]
    InvalidText(&'static str),

    #[error("host could not open assembly '{0}'")]
    Open(String),

    #[error("class '{namespace}.{class}' not found in loaded assembly")]
    ClassNotFound { namespace: String, class: String },

    #[error("no method matches '{0}'")]
    MethodNotFound(String),

    #[error(transparent)]
    Invoke(#[from] InvokeError),
}

/// Errors surfaced while setting up a catalog
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for catalog setup
pub type ProbeResult<T> = Result<T, ProbeError>;
