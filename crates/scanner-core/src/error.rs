//! Error types for scanner operations.
//!
//! This module defines [`ScanError`], the taxonomy shared by cache backends,
//! provider adapters and the pipeline. A key-not-found or stale entry is
//! *not* an error: `get`-shaped operations return `Ok(None)` for both, so the
//! federation can distinguish "no data" from "backend down" by the error
//! channel alone.

use thiserror::Error;

/// Errors that can occur while reading caches or fetching from providers.
#[derive(Error, Debug)]
pub enum ScanError {
    /// A cache backend is unavailable (connection refused, server error).
    ///
    /// The federation routes around this; it never means "key absent".
    #[error("Backend {backend} unavailable: {message}")]
    Backend {
        /// Name of the failing backend.
        backend: String,
        /// Underlying failure description.
        message: String,
    },

    /// Every backend rejected a write; the fetched data was not persisted.
    #[error("Cache write failed on all backends: {0}")]
    CacheWrite(String),

    /// A provider call exceeded its per-job or per-batch deadline.
    #[error("Provider timed out fetching {symbol}")]
    Timeout {
        /// The symbol whose fetch was abandoned.
        symbol: String,
    },

    /// A provider call failed non-transiently for one symbol.
    #[error("Provider error for {symbol}: {message}")]
    Provider {
        /// The symbol that was requested.
        symbol: String,
        /// Underlying failure description.
        message: String,
    },

    /// Rate limit exceeded by a provider.
    #[error("Rate limited by {provider}: retry after {retry_after:?}")]
    RateLimited {
        /// The provider that rate limited the request.
        provider: String,
        /// Suggested time to wait before retrying.
        retry_after: Option<std::time::Duration>,
    },

    /// Network-level failure (connection failures, malformed responses).
    #[error("Network error: {0}")]
    Network(String),

    /// Error parsing data from a provider or a cache payload.
    #[error("Parse error: {0}")]
    Parse(String),

    /// An invalid parameter was provided by the caller.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),
}

/// Result type alias using [`ScanError`].
pub type Result<T> = std::result::Result<T, ScanError>;
