//! Time-to-live policy for cached entries.
//!
//! Staleness is evaluated only at read time; stores never proactively evict.
//! A stale entry is indistinguishable from an absent one above the store
//! layer.

use chrono::{DateTime, TimeDelta, Utc};
use std::time::Duration;

/// Default TTL for price series: one trading day.
const DEFAULT_PRICE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Default TTL for fundamentals: one week.
const DEFAULT_FUNDAMENTALS_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Per-entry-kind time-to-live.
///
/// An entry is fresh iff `now - fetched_at < ttl` for its kind. Price and
/// fundamentals TTLs are independently configurable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FreshnessPolicy {
    price_ttl: Duration,
    fundamentals_ttl: Duration,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            price_ttl: DEFAULT_PRICE_TTL,
            fundamentals_ttl: DEFAULT_FUNDAMENTALS_TTL,
        }
    }
}

impl FreshnessPolicy {
    /// Creates a policy with the default TTLs.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the price-series TTL.
    #[must_use]
    pub const fn with_price_ttl(mut self, ttl: Duration) -> Self {
        self.price_ttl = ttl;
        self
    }

    /// Sets the fundamentals TTL.
    #[must_use]
    pub const fn with_fundamentals_ttl(mut self, ttl: Duration) -> Self {
        self.fundamentals_ttl = ttl;
        self
    }

    /// Returns the price-series TTL.
    #[must_use]
    pub const fn price_ttl(&self) -> Duration {
        self.price_ttl
    }

    /// Returns the fundamentals TTL.
    #[must_use]
    pub const fn fundamentals_ttl(&self) -> Duration {
        self.fundamentals_ttl
    }

    /// Returns true if a price series fetched at `fetched_at` is still fresh.
    #[must_use]
    pub fn price_fresh(&self, fetched_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        within_ttl(fetched_at, now, self.price_ttl)
    }

    /// Returns true if fundamentals updated at `last_updated` are still fresh.
    #[must_use]
    pub fn fundamentals_fresh(&self, last_updated: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        within_ttl(last_updated, now, self.fundamentals_ttl)
    }
}

fn within_ttl(stamped: DateTime<Utc>, now: DateTime<Utc>, ttl: Duration) -> bool {
    let age = now.signed_duration_since(stamped);
    age < TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}
