//! Bounded, rate-limited provider fetching.

use scanner_cache::CacheFederation;
use scanner_core::{
    CacheStore, Fundamentals, QuoteProvider, Result, ScanError, SeriesEntry, Symbol, Timeframe,
};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{Instant, sleep, timeout, timeout_at};
use tracing::{debug, warn};

use crate::progress::Progress;

/// Tuning parameters for provider fetching.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FetchConfig {
    /// Maximum symbols per batch.
    pub batch_size: usize,
    /// Concurrent jobs within a batch.
    pub max_workers: usize,
    /// Deadline for one symbol's fetch.
    pub per_job_timeout: Duration,
    /// Deadline for a whole batch; still-running jobs are abandoned.
    pub per_batch_timeout: Duration,
    /// Provider-politeness pause between batches (not after the last).
    pub inter_batch_delay: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            max_workers: 4,
            per_job_timeout: Duration::from_secs(30),
            per_batch_timeout: Duration::from_secs(120),
            inter_batch_delay: Duration::from_secs(1),
        }
    }
}

impl FetchConfig {
    /// Creates a config with the defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the batch size.
    #[must_use]
    pub const fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the worker-pool size.
    #[must_use]
    pub const fn with_max_workers(mut self, max_workers: usize) -> Self {
        self.max_workers = max_workers;
        self
    }

    /// Sets the per-job timeout.
    #[must_use]
    pub const fn with_per_job_timeout(mut self, timeout: Duration) -> Self {
        self.per_job_timeout = timeout;
        self
    }

    /// Sets the per-batch timeout.
    #[must_use]
    pub const fn with_per_batch_timeout(mut self, timeout: Duration) -> Self {
        self.per_batch_timeout = timeout;
        self
    }

    /// Sets the inter-batch delay.
    #[must_use]
    pub const fn with_inter_batch_delay(mut self, delay: Duration) -> Self {
        self.inter_batch_delay = delay;
        self
    }
}

/// Everything one fetch pass produced.
///
/// Symbols that failed are absent from `series` and present in `failures`
/// with a human-readable reason for the orchestrator's per-symbol results.
#[derive(Debug, Default)]
pub struct FetchOutcome {
    /// Successfully fetched series, already written through the federation.
    pub series: HashMap<Symbol, SeriesEntry>,
    /// Fundamentals fetched alongside the series, best-effort.
    pub fundamentals: HashMap<Symbol, Fundamentals>,
    /// Failure reason per symbol that produced no data.
    pub failures: HashMap<Symbol, String>,
}

/// Fetches missing symbols from the provider in bounded batches.
///
/// Batches run strictly one after another; only jobs within a batch run
/// concurrently. Every success is written through the federation the moment
/// it completes, so partial progress survives later failures in the run.
#[derive(Debug)]
pub struct BatchFetcher {
    provider: Arc<dyn QuoteProvider>,
    federation: Arc<CacheFederation>,
    config: FetchConfig,
}

impl BatchFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(
        provider: Arc<dyn QuoteProvider>,
        federation: Arc<CacheFederation>,
        config: FetchConfig,
    ) -> Self {
        Self {
            provider,
            federation,
            config,
        }
    }

    /// Fetches every symbol in `missing`, batch by batch.
    pub async fn fetch_all(
        &self,
        missing: &[Symbol],
        timeframe: Timeframe,
        period: &str,
        progress: &Progress,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome::default();
        if missing.is_empty() {
            return outcome;
        }

        let batches: Vec<&[Symbol]> = missing.chunks(self.config.batch_size.max(1)).collect();
        let total = batches.len();

        for (index, batch) in batches.into_iter().enumerate() {
            progress.report(
                index as f64 / total as f64,
                &format!(
                    "Fetching batch {}/{} ({} symbols)",
                    index + 1,
                    total,
                    batch.len()
                ),
            );

            self.run_batch(batch, timeframe, period, &mut outcome).await;

            progress.report(
                (index + 1) as f64 / total as f64,
                &format!("Batch {}/{} complete", index + 1, total),
            );

            if index + 1 < total && !self.config.inter_batch_delay.is_zero() {
                sleep(self.config.inter_batch_delay).await;
            }
        }

        debug!(
            fetched = outcome.series.len(),
            failed = outcome.failures.len(),
            "Provider fetch complete"
        );
        outcome
    }

    /// Runs one batch, preferring a true multi-symbol provider call.
    async fn run_batch(
        &self,
        batch: &[Symbol],
        timeframe: Timeframe,
        period: &str,
        outcome: &mut FetchOutcome,
    ) {
        if self.provider.supports_batch() {
            let call = self.provider.fetch_batch(batch, timeframe, period);
            match timeout(self.config.per_batch_timeout, call).await {
                Ok(Ok(mut series)) => {
                    for symbol in batch {
                        match series.remove(symbol) {
                            Some(entry) => self.record_success(symbol, entry, None, outcome).await,
                            None => {
                                outcome
                                    .failures
                                    .insert(symbol.clone(), "no data returned".to_string());
                            }
                        }
                    }
                    return;
                }
                Ok(Err(e)) => {
                    warn!(error = %e, "Batch provider call failed; falling back to per-job fetches");
                }
                Err(_) => {
                    warn!("Batch provider call timed out; falling back to per-job fetches");
                }
            }
        }

        self.run_jobs(batch, timeframe, period, outcome).await;
    }

    /// Runs one batch as individual jobs through the worker pool.
    async fn run_jobs(
        &self,
        batch: &[Symbol],
        timeframe: Timeframe,
        period: &str,
        outcome: &mut FetchOutcome,
    ) {
        let deadline = Instant::now() + self.config.per_batch_timeout;
        let mut pending: HashSet<Symbol> = batch.iter().cloned().collect();

        let mut jobs = stream::iter(batch.iter().cloned())
            .map(|symbol| self.run_job(symbol, timeframe, period))
            .buffer_unordered(self.config.max_workers.max(1));

        loop {
            match timeout_at(deadline, jobs.next()).await {
                Ok(Some((symbol, Ok((series, fundamentals))))) => {
                    pending.remove(&symbol);
                    self.record_success(&symbol, series, fundamentals, outcome)
                        .await;
                }
                Ok(Some((symbol, Err(e)))) => {
                    pending.remove(&symbol);
                    debug!(%symbol, error = %e, "Fetch job failed");
                    outcome.failures.insert(symbol, e.to_string());
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        abandoned = pending.len(),
                        "Batch deadline reached; abandoning still-running jobs"
                    );
                    for symbol in pending.drain() {
                        outcome
                            .failures
                            .insert(symbol, "batch timed out".to_string());
                    }
                    break;
                }
            }
        }
    }

    /// Fetches one symbol's series (and, best-effort, its fundamentals).
    async fn run_job(
        &self,
        symbol: Symbol,
        timeframe: Timeframe,
        period: &str,
    ) -> (Symbol, Result<(SeriesEntry, Option<Fundamentals>)>) {
        let fetch = self.provider.fetch_series(&symbol, timeframe, period);
        let series = match timeout(self.config.per_job_timeout, fetch).await {
            Ok(Ok(entry)) => entry,
            Ok(Err(e)) => return (symbol, Err(e)),
            Err(_) => {
                let reason = ScanError::Timeout {
                    symbol: symbol.to_string(),
                };
                return (symbol, Err(reason));
            }
        };

        let fundamentals = match timeout(
            self.config.per_job_timeout,
            self.provider.fetch_fundamentals(&symbol),
        )
        .await
        {
            Ok(Ok(f)) => f,
            Ok(Err(e)) => {
                warn!(%symbol, error = %e, "Fundamentals fetch failed; keeping series");
                None
            }
            Err(_) => {
                warn!(%symbol, "Fundamentals fetch timed out; keeping series");
                None
            }
        };

        (symbol, Ok((series, fundamentals)))
    }

    /// Writes a success through the federation and records it.
    ///
    /// A failed cache write is logged but never discards fetched data.
    async fn record_success(
        &self,
        symbol: &Symbol,
        series: SeriesEntry,
        fundamentals: Option<Fundamentals>,
        outcome: &mut FetchOutcome,
    ) {
        if let Err(e) = self.federation.put_series(&series).await {
            warn!(%symbol, error = %e, "Cache write failed; returning unpersisted result");
        }
        if let Some(f) = &fundamentals {
            if let Err(e) = self.federation.put_fundamentals(f).await {
                warn!(%symbol, error = %e, "Fundamentals cache write failed");
            }
        }

        outcome.series.insert(symbol.clone(), series);
        if let Some(f) = fundamentals {
            outcome.fundamentals.insert(symbol.clone(), f);
        }
    }
}
