//! Scan orchestration.

use scanner_cache::CacheFederation;
use scanner_core::{
    Origin, QuoteProvider, Result, ScanResult, Symbol, Timeframe,
};
use std::sync::Arc;
use tracing::{debug, info};

use crate::bulk::{BulkLoad, BulkLoader};
use crate::fetch::{BatchFetcher, FetchConfig, FetchOutcome};
use crate::progress::{Progress, ProgressFn};

/// Progress checkpoint after the bulk cache read.
const CACHE_READ_DONE: f64 = 0.25;

/// Progress checkpoint when provider fetching ends and merging starts.
const MERGE_START: f64 = 0.95;

/// One scan's inputs.
#[derive(Clone, Debug)]
pub struct ScanRequest {
    /// Symbols to scan; `None` means every symbol known to the federation.
    pub symbols: Option<Vec<Symbol>>,
    /// Sampling granularity to read and fetch.
    pub timeframe: Timeframe,
    /// Lookback period to read and fetch (e.g. "1y").
    pub period: String,
    /// Cache sources to probe, preferred first. Empty means the provider's
    /// own source name.
    pub sources: Vec<String>,
    /// Whether to fetch missing symbols live from the provider.
    pub fetch_missing: bool,
}

impl Default for ScanRequest {
    fn default() -> Self {
        Self {
            symbols: None,
            timeframe: Timeframe::Daily,
            period: "1y".to_string(),
            sources: Vec::new(),
            fetch_missing: false,
        }
    }
}

impl ScanRequest {
    /// Creates a request with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the symbols to scan.
    #[must_use]
    pub fn with_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Symbol>,
    {
        self.symbols = Some(symbols.into_iter().map(Into::into).collect());
        self
    }

    /// Sets the timeframe.
    #[must_use]
    pub fn with_timeframe(mut self, timeframe: Timeframe) -> Self {
        self.timeframe = timeframe;
        self
    }

    /// Sets the lookback period.
    #[must_use]
    pub fn with_period(mut self, period: impl Into<String>) -> Self {
        self.period = period.into();
        self
    }

    /// Sets the cache sources to probe, preferred first.
    #[must_use]
    pub fn with_sources<I, S>(mut self, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sources = sources.into_iter().map(Into::into).collect();
        self
    }

    /// Enables or disables live fetching of missing symbols.
    #[must_use]
    pub fn with_fetch_missing(mut self, fetch_missing: bool) -> Self {
        self.fetch_missing = fetch_missing;
        self
    }
}

/// Orchestrates one scan: bulk cache read, provider fetch, merge.
///
/// The phases are strictly linear. Per-symbol failures are recorded in the
/// results and never abort the run; only a failure of the initial bulk cache
/// read surfaces as an error.
#[derive(Debug)]
pub struct Scanner {
    federation: Arc<CacheFederation>,
    provider: Arc<dyn QuoteProvider>,
    fetch_config: FetchConfig,
}

impl Scanner {
    /// Creates a scanner with the default fetch tuning.
    #[must_use]
    pub fn new(federation: Arc<CacheFederation>, provider: Arc<dyn QuoteProvider>) -> Self {
        Self {
            federation,
            provider,
            fetch_config: FetchConfig::default(),
        }
    }

    /// Overrides the fetch tuning.
    #[must_use]
    pub fn with_fetch_config(mut self, fetch_config: FetchConfig) -> Self {
        self.fetch_config = fetch_config;
        self
    }

    /// Runs one scan.
    ///
    /// Returns exactly one [`ScanResult`] per requested symbol, in request
    /// order; symbols with no data anywhere carry an explicit failure reason
    /// rather than being omitted.
    ///
    /// # Errors
    /// Fails only when the initial bulk cache read cannot complete at all.
    pub async fn scan(
        &self,
        request: &ScanRequest,
        on_progress: Option<Arc<ProgressFn>>,
    ) -> Result<Vec<ScanResult>> {
        // An explicitly empty request touches neither caches nor provider.
        if let Some(symbols) = &request.symbols {
            if symbols.is_empty() {
                return Ok(Vec::new());
            }
        }

        let progress = Progress::new(on_progress);
        progress.report(0.0, "Reading caches");

        let sources = if request.sources.is_empty() {
            vec![self.provider.name().to_string()]
        } else {
            request.sources.clone()
        };

        let loader = BulkLoader::new(Arc::clone(&self.federation));
        let load = loader
            .load(
                request.symbols.as_deref(),
                request.timeframe,
                &request.period,
                &sources,
            )
            .await?;

        progress.report(
            CACHE_READ_DONE,
            &format!(
                "Cache read complete: {} cached, {} missing",
                load.satisfied.len(),
                load.missing.len()
            ),
        );

        let outcome = if request.fetch_missing && !load.missing.is_empty() {
            debug!(missing = load.missing.len(), "Fetching missing symbols");
            let fetcher = BatchFetcher::new(
                Arc::clone(&self.provider),
                Arc::clone(&self.federation),
                self.fetch_config,
            );
            fetcher
                .fetch_all(
                    &load.missing,
                    request.timeframe,
                    &request.period,
                    &progress.span(CACHE_READ_DONE, MERGE_START),
                )
                .await
        } else {
            FetchOutcome::default()
        };

        let results = merge(load, outcome, request.fetch_missing);
        info!(
            total = results.len(),
            failed = results.iter().filter(|r| !r.is_data()).count(),
            "Scan complete"
        );
        progress.report(1.0, "Scan complete");
        Ok(results)
    }

    /// Runs one scan and sorts the results by symbol.
    ///
    /// Convenience for callers that need a stable order; [`Self::scan`]
    /// returns request order.
    pub async fn scan_sorted(
        &self,
        request: &ScanRequest,
        on_progress: Option<Arc<ProgressFn>>,
    ) -> Result<Vec<ScanResult>> {
        let mut results = self.scan(request, on_progress).await?;
        results.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(results)
    }
}

/// Combines cached and fetched data into one result per requested symbol.
fn merge(load: BulkLoad, mut outcome: FetchOutcome, fetch_missing: bool) -> Vec<ScanResult> {
    let BulkLoad {
        mut satisfied,
        fundamentals: mut cached_fundamentals,
        requested,
        ..
    } = load;

    let mut results = Vec::with_capacity(requested.len());
    for symbol in requested {
        // A freshly fetched fundamentals record wins over the bulk read.
        let fundamentals = outcome
            .fundamentals
            .remove(&symbol)
            .or_else(|| cached_fundamentals.remove(&symbol));

        let result = if let Some(series) = satisfied.remove(&symbol) {
            ScanResult::data(symbol, series, fundamentals, Origin::Cache)
        } else if let Some(series) = outcome.series.remove(&symbol) {
            ScanResult::data(symbol, series, fundamentals, Origin::Provider)
        } else if let Some(reason) = outcome.failures.remove(&symbol) {
            ScanResult::failed(symbol, reason)
        } else if fetch_missing {
            ScanResult::failed(symbol, "no data from cache or provider")
        } else {
            ScanResult::failed(symbol, "not cached; live fetch disabled")
        };
        results.push(result);
    }
    results
}
