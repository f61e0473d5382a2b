//! Ordered composition of cache backends.

use async_trait::async_trait;
use scanner_core::{
    CacheStore, Fundamentals, Result, ScanError, SeriesEntry, SeriesKey, Symbol,
};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

/// Ordered composition of several backends behind the single-store interface.
///
/// Reads probe the backends in order and return the first fresh hit; a
/// backend error is logged and treated as a miss for that backend, so a
/// single outage never fails a read. Writes go through to every backend and
/// succeed as long as at least one backend accepts them.
///
/// The federation implements [`CacheStore`] itself, so callers are
/// backend-agnostic.
pub struct CacheFederation {
    backends: Vec<Arc<dyn CacheStore>>,
}

impl fmt::Debug for CacheFederation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheFederation")
            .field(
                "backends",
                &self.backends.iter().map(|b| b.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl CacheFederation {
    /// Creates a federation over the given backends, in read-priority order.
    #[must_use]
    pub fn new(backends: Vec<Arc<dyn CacheStore>>) -> Self {
        Self { backends }
    }

    /// Appends a backend at the lowest priority, builder-style.
    #[must_use]
    pub fn with_backend(mut self, backend: Arc<dyn CacheStore>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Returns the number of composed backends.
    #[must_use]
    pub fn len(&self) -> usize {
        self.backends.len()
    }

    /// Returns true if no backends are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl Default for CacheFederation {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

#[async_trait]
impl CacheStore for CacheFederation {
    fn name(&self) -> &str {
        "federation"
    }

    async fn get_series(&self, key: &SeriesKey) -> Result<Option<SeriesEntry>> {
        for backend in &self.backends {
            match backend.get_series(key).await {
                Ok(Some(entry)) => {
                    debug!(backend = backend.name(), key = %key, "Federation series hit");
                    return Ok(Some(entry));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend failed during series read, trying next");
                }
            }
        }
        Ok(None)
    }

    async fn put_series(&self, entry: &SeriesEntry) -> Result<()> {
        let mut succeeded = 0usize;
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.put_series(entry).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend rejected series write");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        if succeeded == 0 {
            let message = if failures.is_empty() {
                "no backends configured".to_string()
            } else {
                failures.join("; ")
            };
            return Err(ScanError::CacheWrite(message));
        }
        Ok(())
    }

    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>> {
        for backend in &self.backends {
            match backend.get_fundamentals(symbol).await {
                Ok(Some(entry)) => {
                    debug!(backend = backend.name(), %symbol, "Federation fundamentals hit");
                    return Ok(Some(entry));
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend failed during fundamentals read, trying next");
                }
            }
        }
        Ok(None)
    }

    async fn put_fundamentals(&self, entry: &Fundamentals) -> Result<()> {
        let mut succeeded = 0usize;
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.put_fundamentals(entry).await {
                Ok(()) => succeeded += 1,
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend rejected fundamentals write");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        if succeeded == 0 {
            let message = if failures.is_empty() {
                "no backends configured".to_string()
            } else {
                failures.join("; ")
            };
            return Err(ScanError::CacheWrite(message));
        }
        Ok(())
    }

    async fn known_symbols(&self) -> Result<HashSet<Symbol>> {
        let mut union = HashSet::new();
        let mut any_ok = false;
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.known_symbols().await {
                Ok(symbols) => {
                    any_ok = true;
                    union.extend(symbols);
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend failed listing symbols");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        if !any_ok && !self.backends.is_empty() {
            return Err(ScanError::Backend {
                backend: "federation".to_string(),
                message: failures.join("; "),
            });
        }
        Ok(union)
    }

    async fn all_fundamentals(&self) -> Result<Vec<Fundamentals>> {
        // Higher-priority backends win symbol collisions.
        let mut merged: HashMap<Symbol, Fundamentals> = HashMap::new();
        let mut any_ok = false;
        let mut failures = Vec::new();

        for backend in &self.backends {
            match backend.all_fundamentals().await {
                Ok(entries) => {
                    any_ok = true;
                    for entry in entries {
                        merged.entry(entry.symbol.clone()).or_insert(entry);
                    }
                }
                Err(e) => {
                    warn!(backend = backend.name(), error = %e, "Backend failed listing fundamentals");
                    failures.push(format!("{}: {e}", backend.name()));
                }
            }
        }

        if !any_ok && !self.backends.is_empty() {
            return Err(ScanError::Backend {
                backend: "federation".to_string(),
                message: failures.join("; "),
            });
        }
        Ok(merged.into_values().collect())
    }
}
