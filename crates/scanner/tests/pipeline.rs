//! End-to-end pipeline tests: bulk cache read, provider fetch, merge.

use async_trait::async_trait;
use chrono::NaiveDate;
use scanner::{
    CacheFederation, CacheStore, FetchConfig, MemoryStore, OhlcvRow, Origin, Progress, ProgressFn,
    QuoteProvider, Result, ScanError, ScanOutcome, ScanRequest, Scanner, SeriesEntry, SeriesKey,
    Symbol, Timeframe,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Provider scripted per symbol: succeed, fail, or stall.
#[derive(Debug, Default)]
struct ScriptedProvider {
    fail: HashSet<Symbol>,
    slow: HashMap<Symbol, Duration>,
    calls: AtomicUsize,
}

impl ScriptedProvider {
    fn failing(symbols: &[&str]) -> Self {
        Self {
            fail: symbols.iter().map(|s| Symbol::new(*s)).collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl QuoteProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        period: &str,
    ) -> Result<SeriesEntry> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.slow.get(symbol) {
            tokio::time::sleep(*delay).await;
        }
        if self.fail.contains(symbol) {
            return Err(ScanError::Provider {
                symbol: symbol.to_string(),
                message: "no data".to_string(),
            });
        }
        Ok(entry_for(symbol.as_str(), "scripted", timeframe, period))
    }
}

fn entry_for(symbol: &str, source: &str, timeframe: Timeframe, period: &str) -> SeriesEntry {
    SeriesEntry::new(
        SeriesKey::new(Symbol::new(symbol), timeframe, period, source),
        vec![
            OhlcvRow::new(
                NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
                100.0,
                101.0,
                99.0,
                100.5,
                1_000.0,
            ),
            OhlcvRow::new(
                NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(),
                100.5,
                102.0,
                100.0,
                101.5,
                1_200.0,
            ),
        ],
    )
}

fn daily_entry(symbol: &str) -> SeriesEntry {
    entry_for(symbol, "scripted", Timeframe::Daily, "1y")
}

fn scanner_over(
    store: Arc<MemoryStore>,
    provider: Arc<ScriptedProvider>,
) -> Scanner {
    let federation = Arc::new(CacheFederation::new(vec![store]));
    Scanner::new(federation, provider)
}

#[tokio::test]
async fn test_every_requested_symbol_appears_exactly_once() {
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("AAPL")).await.unwrap();

    let provider = Arc::new(ScriptedProvider::failing(&["NVDA"]));
    let scanner = scanner_over(store, provider);

    let request = ScanRequest::new()
        .with_symbols(["AAPL", "MSFT", "NVDA"])
        .with_fetch_missing(true);
    let results = scanner.scan(&request, None).await.unwrap();

    assert_eq!(results.len(), 3);
    let symbols: Vec<&str> = results.iter().map(|r| r.symbol.as_str()).collect();
    assert_eq!(symbols, vec!["AAPL", "MSFT", "NVDA"]);
}

#[tokio::test]
async fn test_cache_first_makes_no_provider_calls() {
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("AAPL")).await.unwrap();
    store.put_series(&daily_entry("MSFT")).await.unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider.clone());

    for fetch_missing in [false, true] {
        let request = ScanRequest::new()
            .with_symbols(["AAPL", "MSFT"])
            .with_fetch_missing(fetch_missing);
        let results = scanner.scan(&request, None).await.unwrap();

        assert!(results.iter().all(scanner::ScanResult::is_data));
        assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
    }
}

#[tokio::test]
async fn test_second_scan_reads_from_cache() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider.clone());

    let request = ScanRequest::new()
        .with_symbols(["AAPL"])
        .with_fetch_missing(true);

    let first = scanner.scan(&request, None).await.unwrap();
    assert!(matches!(
        first[0].outcome,
        ScanOutcome::Data {
            origin: Origin::Provider,
            ..
        }
    ));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);

    let second = scanner.scan(&request, None).await.unwrap();
    assert!(matches!(
        second[0].outcome,
        ScanOutcome::Data {
            origin: Origin::Cache,
            ..
        }
    ));
    // The first fetch is still fresh; no new provider call.
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_empty_request_returns_empty_without_calls() {
    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(Arc::new(MemoryStore::new()), provider.clone());

    let request = ScanRequest::new()
        .with_symbols(Vec::<String>::new())
        .with_fetch_missing(true);
    let results = scanner.scan(&request, None).await.unwrap();

    assert!(results.is_empty());
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_fetch_disabled_reports_missing_as_failures() {
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("AAPL")).await.unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider.clone());

    let request = ScanRequest::new().with_symbols(["AAPL", "MSFT"]);
    let results = scanner.scan(&request, None).await.unwrap();

    assert!(results[0].is_data());
    assert!(results[1].failure_reason().unwrap().contains("disabled"));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cache_provider_and_timeout_mix() {
    // A is cached; B fetches fine; C times out.
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("A")).await.unwrap();

    let provider = Arc::new(ScriptedProvider {
        slow: HashMap::from([(Symbol::new("C"), Duration::from_secs(600))]),
        ..Default::default()
    });
    let federation = Arc::new(CacheFederation::new(vec![store.clone()]));
    let scanner = Scanner::new(federation.clone(), provider).with_fetch_config(
        FetchConfig::default()
            .with_per_job_timeout(Duration::from_secs(5))
            .with_per_batch_timeout(Duration::from_secs(3600)),
    );

    let request = ScanRequest::new()
        .with_symbols(["A", "B", "C"])
        .with_fetch_missing(true);
    let results = scanner.scan(&request, None).await.unwrap();

    assert!(matches!(
        results[0].outcome,
        ScanOutcome::Data {
            origin: Origin::Cache,
            ..
        }
    ));
    assert!(matches!(
        results[1].outcome,
        ScanOutcome::Data {
            origin: Origin::Provider,
            ..
        }
    ));
    assert!(results[2].failure_reason().unwrap().contains("timed out"));

    // B's fetch was written through; the federation can now serve it.
    let key = SeriesKey::new(Symbol::new("B"), Timeframe::Daily, "1y", "scripted");
    assert!(federation.get_series(&key).await.unwrap().is_some());
}

#[tokio::test]
async fn test_scan_all_known_when_no_symbols_given() {
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("MSFT")).await.unwrap();
    store.put_series(&daily_entry("AAPL")).await.unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider);

    let results = scanner
        .scan_sorted(&ScanRequest::default(), None)
        .await
        .unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].symbol.as_str(), "AAPL");
    assert_eq!(results[1].symbol.as_str(), "MSFT");
}

#[tokio::test]
async fn test_progress_is_monotonic_and_ends_at_one() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider).with_fetch_config(
        FetchConfig::default()
            .with_batch_size(1)
            .with_inter_batch_delay(Duration::ZERO),
    );

    let seen: Arc<Mutex<Vec<f64>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback: Arc<ProgressFn> = Arc::new(move |fraction, _message| {
        sink.lock().unwrap().push(fraction);
    });

    let request = ScanRequest::new()
        .with_symbols(["A", "B", "C"])
        .with_fetch_missing(true);
    scanner.scan(&request, Some(callback)).await.unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.len() >= 4, "expected several checkpoints, got {seen:?}");
    assert!(seen.windows(2).all(|w| w[0] <= w[1]), "not monotonic: {seen:?}");
    assert_eq!(*seen.last().unwrap(), 1.0);
}

#[tokio::test]
async fn test_ignoring_progress_still_yields_correct_results() {
    let store = Arc::new(MemoryStore::new());
    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider);

    let request = ScanRequest::new()
        .with_symbols(["AAPL"])
        .with_fetch_missing(true);
    let results = scanner.scan(&request, None).await.unwrap();
    assert!(results[0].is_data());

    // Same call again via the Progress helper API used internally.
    Progress::none().report(0.3, "unused");
}

#[tokio::test]
async fn test_fundamentals_joined_from_cache() {
    let store = Arc::new(MemoryStore::new());
    store.put_series(&daily_entry("AAPL")).await.unwrap();
    store
        .put_fundamentals(
            &scanner::Fundamentals::new(Symbol::new("AAPL")).with_metric("pe_ratio", Some(28.5)),
        )
        .await
        .unwrap();

    let provider = Arc::new(ScriptedProvider::default());
    let scanner = scanner_over(store, provider);

    let request = ScanRequest::new().with_symbols(["AAPL"]);
    let results = scanner.scan(&request, None).await.unwrap();

    match &results[0].outcome {
        ScanOutcome::Data { fundamentals, .. } => {
            assert_eq!(fundamentals.as_ref().unwrap().metric("pe_ratio"), Some(28.5));
        }
        ScanOutcome::Failed { reason } => panic!("unexpected failure: {reason}"),
    }
}
