//! Provider adapter trait for fetching market data.
//!
//! External providers are injected behind [`QuoteProvider`]; the pipeline
//! never talks HTTP itself. A provider that can serve true multi-symbol
//! requests advertises it via [`QuoteProvider::supports_batch`].

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;

use tracing::warn;

use crate::{
    error::{Result, ScanError},
    timeframe::Timeframe,
    types::{Fundamentals, SeriesEntry, Symbol},
};

/// Adapter over one external market-data provider.
#[async_trait]
pub trait QuoteProvider: Send + Sync + Debug {
    /// Returns the provider's name (e.g. "yahoo"), used as the cache source.
    fn name(&self) -> &str;

    /// Fetches a full time-series for a single symbol.
    async fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        period: &str,
    ) -> Result<SeriesEntry>;

    /// Fetches fundamentals for a single symbol.
    ///
    /// Providers without fundamental data keep the default, which reports
    /// none.
    async fn fetch_fundamentals(&self, _symbol: &Symbol) -> Result<Option<Fundamentals>> {
        Ok(None)
    }

    /// Returns true if [`fetch_batch`](Self::fetch_batch) issues one real
    /// multi-symbol provider call rather than the sequential default.
    fn supports_batch(&self) -> bool {
        false
    }

    /// Fetches several symbols in one logical call.
    ///
    /// Partial success is allowed: symbols with no data are simply absent
    /// from the returned map, not an error for the whole call. The default
    /// implementation loops [`fetch_series`](Self::fetch_series), skipping
    /// per-symbol provider errors; transport-level failures abort the call.
    async fn fetch_batch(
        &self,
        symbols: &[Symbol],
        timeframe: Timeframe,
        period: &str,
    ) -> Result<HashMap<Symbol, SeriesEntry>> {
        let mut out = HashMap::with_capacity(symbols.len());
        for symbol in symbols {
            match self.fetch_series(symbol, timeframe, period).await {
                Ok(entry) => {
                    out.insert(symbol.clone(), entry);
                }
                Err(ScanError::Provider { message, .. }) => {
                    warn!(symbol = %symbol, message, "Skipping symbol in batch");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(out)
    }
}
