//! Cache backend trait.
//!
//! This module defines the [`CacheStore`] trait implemented once per physical
//! backend (embedded SQLite, hosted REST store, in-memory). The federation in
//! `scanner-cache` composes several of these behind the same interface.

use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;

use crate::{
    error::Result,
    types::{Fundamentals, SeriesEntry, SeriesKey, Symbol},
};

/// Contract for one physical cache backend.
///
/// Freshness is enforced on read: a `get_*` that finds an entry past its TTL
/// returns `Ok(None)`, never the stale value. An unavailable backend returns
/// `Err(ScanError::Backend { .. })`, which callers must treat differently
/// from `Ok(None)`.
///
/// `put_*` is append-or-replace: last write wins per key, and duplicate
/// writes must not fail. Stores must tolerate concurrent calls; entries are
/// always written by value and never mutated in place.
#[async_trait]
pub trait CacheStore: Send + Sync + Debug {
    /// Returns the backend's name, used in logs and error messages.
    fn name(&self) -> &str;

    /// Retrieves a fresh cached series, or `None` when absent or stale.
    async fn get_series(&self, key: &SeriesKey) -> Result<Option<SeriesEntry>>;

    /// Stores a series, replacing any previous entry for its key.
    async fn put_series(&self, entry: &SeriesEntry) -> Result<()>;

    /// Retrieves fresh cached fundamentals, or `None` when absent or stale.
    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>>;

    /// Stores fundamentals, replacing any previous entry for the symbol.
    async fn put_fundamentals(&self, entry: &Fundamentals) -> Result<()>;

    /// Returns every symbol this backend has any series data for.
    ///
    /// One bulk call; callers use it instead of per-symbol existence checks.
    async fn known_symbols(&self) -> Result<HashSet<Symbol>>;

    /// Returns every fresh fundamentals entry in one bulk call.
    async fn all_fundamentals(&self) -> Result<Vec<Fundamentals>>;
}
