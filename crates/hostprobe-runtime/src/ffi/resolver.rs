//! Entry-point resolution
//!
//! Maps host export names to addresses, memoizing every successful lookup.
//! Misses are never remembered: a name that is absent now is probed again on
//! the next request, because some hosts register exports only after their
//! own initialization has run.

use crate::ffi::caller::{self, HostArgs, InvokeError};
use crate::ffi::loader::SymbolSource;
use crate::ffi::types::{Handle, HostReturn};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Name → address cache in front of a [`SymbolSource`]
pub struct Resolver {
    source: Box<dyn SymbolSource>,
    resolved: RwLock<HashMap<String, Handle>>,
}

impl Resolver {
    pub fn new(source: impl SymbolSource + 'static) -> Self {
        Self::from_boxed(Box::new(source))
    }

    pub fn from_boxed(source: Box<dyn SymbolSource>) -> Self {
        Self {
            source,
            resolved: RwLock::new(HashMap::new()),
        }
    }

    /// Resolve an export name to its address
    pub fn resolve(&self, name: &str) -> Option<Handle> {
        if let Some(address) = self.resolved.read().get(name) {
            return Some(*address);
        }

        match self.source.lookup(name).and_then(Handle::non_null) {
            Some(address) => {
                self.resolved.write().insert(name.to_string(), address);
                tracing::trace!(export = name, %address, "resolved entry point");
                Some(address)
            }
            None => {
                tracing::trace!(export = name, "entry point not exported");
                None
            }
        }
    }

    /// Whether `name` has already been resolved
    pub fn is_resolved(&self, name: &str) -> bool {
        self.resolved.read().contains_key(name)
    }

    /// Number of memoized exports
    pub fn resolved_count(&self) -> usize {
        self.resolved.read().len()
    }

    /// Resolve `name` and call it, reporting why no value was produced.
    ///
    /// # Safety
    ///
    /// The export's real signature must be `extern "C" fn(A...) -> R`.
    pub unsafe fn try_invoke<A, R>(&self, name: &str, args: A) -> Result<R, InvokeError>
    where
        A: HostArgs,
        R: HostReturn,
    {
        let address = self
            .resolve(name)
            .ok_or_else(|| InvokeError::Unresolved(name.to_string()))?;

        caller::try_call_at(address, args).map_err(|e| match e {
            InvokeError::Faulted { .. } => InvokeError::Faulted {
                target: name.to_string(),
            },
            other => other,
        })
    }

    /// Resolve `name` and call it; any failure yields `R::fallback()`.
    ///
    /// # Safety
    ///
    /// See [`Resolver::try_invoke`].
    pub unsafe fn invoke<A, R>(&self, name: &str, args: A) -> R
    where
        A: HostArgs,
        R: HostReturn,
    {
        self.try_invoke(name, args).unwrap_or_else(|e| {
            tracing::debug!(export = name, error = %e, "host export returned fallback");
            R::fallback()
        })
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("source", &self.source.describe())
            .field("resolved", &self.resolved_count())
            .finish()
    }
}
