//! In-memory cache backend.

use async_trait::async_trait;
use chrono::Utc;
use scanner_core::{
    CacheStore, FreshnessPolicy, Fundamentals, Result, SeriesEntry, SeriesKey, Symbol,
};
use std::collections::{HashMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, instrument};

/// In-memory backend for tests and development.
///
/// Data is stored in `RwLock`-protected `HashMap`s and is lost when the store
/// is dropped. Entries are cloned on get/put; nothing is mutated in place.
#[derive(Debug, Default)]
pub struct MemoryStore {
    policy: FreshnessPolicy,
    series: RwLock<HashMap<SeriesKey, SeriesEntry>>,
    fundamentals: RwLock<HashMap<Symbol, Fundamentals>>,
}

impl MemoryStore {
    /// Creates an empty store with the default freshness policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given freshness policy.
    #[must_use]
    pub fn with_policy(policy: FreshnessPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_series(&self, key: &SeriesKey) -> Result<Option<SeriesEntry>> {
        let series = self.series.read().await;
        match series.get(key) {
            Some(entry) if self.policy.price_fresh(entry.fetched_at, Utc::now()) => {
                debug!("Cache hit for series");
                Ok(Some(entry.clone()))
            }
            Some(_) => {
                debug!("Cached series is stale");
                Ok(None)
            }
            None => {
                debug!("Cache miss for series");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, entry), fields(key = %entry.key))]
    async fn put_series(&self, entry: &SeriesEntry) -> Result<()> {
        let mut series = self.series.write().await;
        series.insert(entry.key.clone(), entry.clone());
        debug!(rows = entry.len(), "Cached series");
        Ok(())
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>> {
        let fundamentals = self.fundamentals.read().await;
        match fundamentals.get(symbol) {
            Some(entry) if self.policy.fundamentals_fresh(entry.last_updated, Utc::now()) => {
                debug!("Cache hit for fundamentals");
                Ok(Some(entry.clone()))
            }
            Some(_) => {
                debug!("Cached fundamentals are stale");
                Ok(None)
            }
            None => {
                debug!("Cache miss for fundamentals");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, entry), fields(symbol = %entry.symbol))]
    async fn put_fundamentals(&self, entry: &Fundamentals) -> Result<()> {
        let mut fundamentals = self.fundamentals.write().await;
        fundamentals.insert(entry.symbol.clone(), entry.clone());
        debug!(metrics = entry.len(), "Cached fundamentals");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn known_symbols(&self) -> Result<HashSet<Symbol>> {
        let series = self.series.read().await;
        Ok(series.keys().map(|k| k.symbol.clone()).collect())
    }

    #[instrument(skip(self))]
    async fn all_fundamentals(&self) -> Result<Vec<Fundamentals>> {
        let now = Utc::now();
        let fundamentals = self.fundamentals.read().await;
        Ok(fundamentals
            .values()
            .filter(|f| self.policy.fundamentals_fresh(f.last_updated, now))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use scanner_core::{OhlcvRow, Timeframe};
    use std::time::Duration;

    fn sample_entry(symbol: &str) -> SeriesEntry {
        let key = SeriesKey::new(Symbol::new(symbol), Timeframe::Daily, "1y", "yahoo");
        SeriesEntry::new(
            key,
            vec![OhlcvRow::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                150.0,
                152.0,
                149.0,
                151.0,
                1_000_000.0,
            )],
        )
    }

    #[tokio::test]
    async fn test_series_round_trip() {
        let store = MemoryStore::new();
        let entry = sample_entry("AAPL");

        assert!(store.get_series(&entry.key).await.unwrap().is_none());

        store.put_series(&entry).await.unwrap();
        let cached = store.get_series(&entry.key).await.unwrap().unwrap();
        assert_eq!(cached, entry);
    }

    #[tokio::test]
    async fn test_stale_series_reads_as_absent() {
        let store =
            MemoryStore::with_policy(FreshnessPolicy::new().with_price_ttl(Duration::from_secs(60)));
        let mut entry = sample_entry("AAPL");
        entry.fetched_at = Utc::now() - TimeDelta::seconds(120);

        store.put_series(&entry).await.unwrap();
        assert!(store.get_series(&entry.key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_put_replaces() {
        let store = MemoryStore::new();
        let entry = sample_entry("AAPL");
        store.put_series(&entry).await.unwrap();

        let replacement = SeriesEntry::new(
            entry.key.clone(),
            vec![OhlcvRow::new(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                160.0,
                161.0,
                159.0,
                160.5,
                2_000_000.0,
            )],
        );
        store.put_series(&replacement).await.unwrap();

        let cached = store.get_series(&entry.key).await.unwrap().unwrap();
        assert_eq!(cached.latest_close(), Some(160.5));
        assert_eq!(cached.len(), 1);
    }

    #[tokio::test]
    async fn test_known_symbols_and_fundamentals() {
        let store = MemoryStore::new();
        store.put_series(&sample_entry("AAPL")).await.unwrap();
        store.put_series(&sample_entry("MSFT")).await.unwrap();

        let known = store.known_symbols().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains(&Symbol::new("AAPL")));

        let f = Fundamentals::new(Symbol::new("AAPL")).with_metric("pe_ratio", Some(28.5));
        store.put_fundamentals(&f).await.unwrap();

        let all = store.all_fundamentals().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].metric("pe_ratio"), Some(28.5));
    }

    #[tokio::test]
    async fn test_stale_fundamentals_filtered_from_bulk_read() {
        let store = MemoryStore::with_policy(
            FreshnessPolicy::new().with_fundamentals_ttl(Duration::from_secs(60)),
        );

        let fresh = Fundamentals::new(Symbol::new("AAPL"));
        let stale = Fundamentals::with_last_updated(
            Symbol::new("MSFT"),
            Utc::now() - TimeDelta::seconds(120),
        );
        store.put_fundamentals(&fresh).await.unwrap();
        store.put_fundamentals(&stale).await.unwrap();

        let all = store.all_fundamentals().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].symbol, Symbol::new("AAPL"));
        assert!(
            store
                .get_fundamentals(&Symbol::new("MSFT"))
                .await
                .unwrap()
                .is_none()
        );
    }
}
