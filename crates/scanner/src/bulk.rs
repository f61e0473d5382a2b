//! Bulk cache read and gap detection.

use scanner_core::{
    CacheStore, Fundamentals, Result, SeriesEntry, SeriesKey, Symbol, Timeframe,
};
use scanner_cache::CacheFederation;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of one bulk cache pass.
///
/// `satisfied` and `missing` partition the requested set: every requested
/// symbol appears in exactly one of them. Fundamentals are best-effort and
/// independent of the partition.
#[derive(Debug)]
pub struct BulkLoad {
    /// Symbols with a fresh cached series, with the entry that satisfied them.
    pub satisfied: HashMap<Symbol, SeriesEntry>,
    /// Fresh cached fundamentals for requested symbols.
    pub fundamentals: HashMap<Symbol, Fundamentals>,
    /// Symbols with no fresh cached series, in request order.
    pub missing: Vec<Symbol>,
    /// The requested symbols, deduplicated, in request order.
    pub requested: Vec<Symbol>,
}

/// Gap detector: one bulk pass over the federation.
///
/// Two bulk calls (`known_symbols`, `all_fundamentals`) replace what would
/// otherwise be per-symbol existence checks; only symbols the federation
/// knows at all are probed individually.
#[derive(Debug)]
pub struct BulkLoader {
    federation: Arc<CacheFederation>,
}

impl BulkLoader {
    /// Creates a loader over the given federation.
    #[must_use]
    pub fn new(federation: Arc<CacheFederation>) -> Self {
        Self { federation }
    }

    /// Runs the bulk pass.
    ///
    /// `requested = None` means "all symbols known to the federation".
    /// Sources are probed in order per symbol; the first fresh hit wins.
    ///
    /// # Errors
    /// Fails only when the initial bulk read cannot complete at all (every
    /// backend unavailable); this is the run-aborting error.
    pub async fn load(
        &self,
        requested: Option<&[Symbol]>,
        timeframe: Timeframe,
        period: &str,
        sources: &[String],
    ) -> Result<BulkLoad> {
        let known = self.federation.known_symbols().await?;

        let requested: Vec<Symbol> = match requested {
            Some(symbols) => dedup_preserving_order(symbols),
            None => {
                let mut all: Vec<Symbol> = known.iter().cloned().collect();
                all.sort();
                all
            }
        };

        // Best-effort: a fundamentals outage must not abort the run.
        let fundamentals = match self.federation.all_fundamentals().await {
            Ok(entries) => {
                let wanted: HashSet<&Symbol> = requested.iter().collect();
                entries
                    .into_iter()
                    .filter(|f| wanted.contains(&f.symbol))
                    .map(|f| (f.symbol.clone(), f))
                    .collect()
            }
            Err(e) => {
                warn!(error = %e, "Bulk fundamentals read failed; continuing without");
                HashMap::new()
            }
        };

        let mut satisfied = HashMap::new();
        let mut missing = Vec::new();

        for symbol in &requested {
            if !known.contains(symbol) {
                missing.push(symbol.clone());
                continue;
            }

            let mut hit = None;
            for source in sources {
                let key = SeriesKey::new(symbol.clone(), timeframe, period, source.clone());
                if let Some(entry) = self.federation.get_series(&key).await? {
                    hit = Some(entry);
                    break;
                }
            }

            match hit {
                Some(entry) => {
                    satisfied.insert(symbol.clone(), entry);
                }
                None => missing.push(symbol.clone()),
            }
        }

        debug!(
            requested = requested.len(),
            satisfied = satisfied.len(),
            missing = missing.len(),
            fundamentals = fundamentals.len(),
            "Bulk cache pass complete"
        );

        Ok(BulkLoad {
            satisfied,
            fundamentals,
            missing,
            requested,
        })
    }
}

fn dedup_preserving_order(symbols: &[Symbol]) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    symbols
        .iter()
        .filter(|s| seen.insert((*s).clone()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use scanner_cache::MemoryStore;
    use scanner_core::OhlcvRow;

    fn entry_for(symbol: &str, source: &str) -> SeriesEntry {
        SeriesEntry::new(
            SeriesKey::new(Symbol::new(symbol), Timeframe::Daily, "1y", source),
            vec![OhlcvRow::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                100.0,
                101.0,
                99.0,
                100.5,
                1_000.0,
            )],
        )
    }

    fn sources(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_partition_covers_every_requested_symbol() {
        let store = Arc::new(MemoryStore::new());
        store.put_series(&entry_for("AAPL", "yahoo")).await.unwrap();

        let loader = BulkLoader::new(Arc::new(CacheFederation::new(vec![store])));
        let requested = vec![Symbol::new("AAPL"), Symbol::new("MSFT")];
        let load = loader
            .load(Some(&requested), Timeframe::Daily, "1y", &sources(&["yahoo"]))
            .await
            .unwrap();

        assert_eq!(load.satisfied.len(), 1);
        assert!(load.satisfied.contains_key(&Symbol::new("AAPL")));
        assert_eq!(load.missing, vec![Symbol::new("MSFT")]);
        assert_eq!(load.requested.len(), 2);
    }

    #[tokio::test]
    async fn test_fallback_source_probed_in_order() {
        let store = Arc::new(MemoryStore::new());
        store.put_series(&entry_for("AAPL", "backup")).await.unwrap();

        let loader = BulkLoader::new(Arc::new(CacheFederation::new(vec![store])));
        let requested = vec![Symbol::new("AAPL")];
        let load = loader
            .load(
                Some(&requested),
                Timeframe::Daily,
                "1y",
                &sources(&["yahoo", "backup"]),
            )
            .await
            .unwrap();

        assert_eq!(load.satisfied[&Symbol::new("AAPL")].key.source, "backup");
        assert!(load.missing.is_empty());
    }

    #[tokio::test]
    async fn test_none_means_all_known_symbols() {
        let store = Arc::new(MemoryStore::new());
        store.put_series(&entry_for("MSFT", "yahoo")).await.unwrap();
        store.put_series(&entry_for("AAPL", "yahoo")).await.unwrap();

        let loader = BulkLoader::new(Arc::new(CacheFederation::new(vec![store])));
        let load = loader
            .load(None, Timeframe::Daily, "1y", &sources(&["yahoo"]))
            .await
            .unwrap();

        assert_eq!(load.requested, vec![Symbol::new("AAPL"), Symbol::new("MSFT")]);
        assert_eq!(load.satisfied.len(), 2);
    }

    #[tokio::test]
    async fn test_duplicates_deduplicated() {
        let loader = BulkLoader::new(Arc::new(CacheFederation::new(vec![Arc::new(
            MemoryStore::new(),
        )])));
        let requested = vec![Symbol::new("AAPL"), Symbol::new("AAPL"), Symbol::new("MSFT")];
        let load = loader
            .load(Some(&requested), Timeframe::Daily, "1y", &sources(&["yahoo"]))
            .await
            .unwrap();

        assert_eq!(load.requested.len(), 2);
        assert_eq!(load.missing.len(), 2);
    }

    #[tokio::test]
    async fn test_fundamentals_are_best_effort_and_filtered() {
        let store = Arc::new(MemoryStore::new());
        store
            .put_fundamentals(&Fundamentals::new(Symbol::new("AAPL")))
            .await
            .unwrap();
        store
            .put_fundamentals(&Fundamentals::new(Symbol::new("OTHER")))
            .await
            .unwrap();

        let loader = BulkLoader::new(Arc::new(CacheFederation::new(vec![store])));
        let requested = vec![Symbol::new("AAPL")];
        let load = loader
            .load(Some(&requested), Timeframe::Daily, "1y", &sources(&["yahoo"]))
            .await
            .unwrap();

        // AAPL has fundamentals but no series: fundamentals are independent
        // of the satisfied/missing split.
        assert_eq!(load.fundamentals.len(), 1);
        assert!(load.fundamentals.contains_key(&Symbol::new("AAPL")));
        assert_eq!(load.missing, vec![Symbol::new("AAPL")]);
    }
}
