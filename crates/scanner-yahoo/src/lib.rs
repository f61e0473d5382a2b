#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantscan/scanner/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Yahoo Finance provider adapter.
//!
//! Implements the [`QuoteProvider`] trait from `scanner-core` against the
//! Yahoo Finance chart API (time-series) and quote-summary API
//! (fundamentals).
//!
//! # Example
//!
//! ```no_run
//! use scanner_yahoo::YahooProvider;
//! use scanner_core::{QuoteProvider, Symbol, Timeframe};
//!
//! # async fn example() -> scanner_core::Result<()> {
//! let provider = YahooProvider::new();
//! let entry = provider
//!     .fetch_series(&Symbol::new("AAPL"), Timeframe::Daily, "1y")
//!     .await?;
//! println!("Fetched {} rows", entry.len());
//! # Ok(())
//! # }
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use scanner_core::{
    Fundamentals, OhlcvRow, QuoteProvider, Result, ScanError, SeriesEntry, SeriesKey, Symbol,
    Timeframe,
};
use serde::Deserialize;
use tokio::time::sleep;
use tracing::debug;

/// Yahoo Finance chart API base URL.
const CHART_API_URL: &str = "https://query1.finance.yahoo.com/v8/finance/chart";

/// Yahoo Finance quote summary API base URL.
const QUOTE_SUMMARY_URL: &str = "https://query2.finance.yahoo.com/v10/finance/quoteSummary";

/// Default rate limit delay in milliseconds.
const DEFAULT_RATE_LIMIT_MS: u64 = 1000;

/// User agent for HTTP requests.
const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";

/// Yahoo Finance provider adapter.
///
/// Serves one symbol per provider call; [`QuoteProvider::supports_batch`]
/// stays false and multi-symbol fetches fall back to the sequential default.
#[derive(Debug)]
pub struct YahooProvider {
    client: reqwest::Client,
    rate_limit_ms: u64,
    last_request_time: AtomicU64,
}

impl YahooProvider {
    /// Creates a provider with default settings.
    ///
    /// Uses built-in rate limiting of 1 request per second.
    #[must_use]
    pub fn new() -> Self {
        Self::with_rate_limit(Duration::from_millis(DEFAULT_RATE_LIMIT_MS))
    }

    /// Creates a provider with a custom HTTP client.
    ///
    /// Rate limiting is still applied.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            rate_limit_ms: DEFAULT_RATE_LIMIT_MS,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Creates a provider with custom rate limiting.
    #[must_use]
    pub fn with_rate_limit(rate_limit: Duration) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        Self {
            client,
            rate_limit_ms: rate_limit.as_millis() as u64,
            last_request_time: AtomicU64::new(0),
        }
    }

    /// Applies rate limiting before making a request.
    async fn apply_rate_limit(&self) {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        let last = self.last_request_time.load(Ordering::Relaxed);
        let elapsed = now.saturating_sub(last);

        if elapsed < self.rate_limit_ms {
            let wait_time = self.rate_limit_ms - elapsed;
            debug!("Rate limiting: waiting {}ms", wait_time);
            sleep(Duration::from_millis(wait_time)).await;
        }

        self.last_request_time.store(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis() as u64,
            Ordering::Relaxed,
        );
    }

    /// Builds the chart API URL for a symbol, timeframe and lookback period.
    fn build_chart_url(&self, symbol: &Symbol, timeframe: Timeframe, period: &str) -> String {
        format!(
            "{}/{}?range={}&interval={}&includeAdjustedClose=true",
            CHART_API_URL,
            symbol.as_str(),
            period,
            chart_interval(timeframe)
        )
    }

    /// Parses a chart response into a series entry.
    fn parse_chart_response(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        period: &str,
        response: ChartResponse,
    ) -> Result<SeriesEntry> {
        if let Some(error) = response.chart.error {
            if error.code == "Not Found" {
                return Err(ScanError::Provider {
                    symbol: symbol.to_string(),
                    message: "symbol not found".to_string(),
                });
            }
            return Err(ScanError::Provider {
                symbol: symbol.to_string(),
                message: format!("{}: {}", error.code, error.description),
            });
        }

        let result = response
            .chart
            .result
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::Provider {
                symbol: symbol.to_string(),
                message: "symbol not found".to_string(),
            })?;

        let timestamps = result.timestamp.unwrap_or_default();
        if timestamps.is_empty() {
            return Err(ScanError::Provider {
                symbol: symbol.to_string(),
                message: format!("no data available for period {period}"),
            });
        }

        let quote = result
            .indicators
            .quote
            .into_iter()
            .next()
            .ok_or_else(|| ScanError::Parse("Missing quote data".to_string()))?;

        // Null rows mark holidays/halts; skip them rather than inventing values.
        let mut rows = Vec::with_capacity(timestamps.len());
        for (i, &ts) in timestamps.iter().enumerate() {
            let Some(date) = Utc.timestamp_opt(ts, 0).single().map(|dt| dt.date_naive()) else {
                continue;
            };
            let (Some(open), Some(high), Some(low), Some(close)) = (
                value_at(&quote.open, i),
                value_at(&quote.high, i),
                value_at(&quote.low, i),
                value_at(&quote.close, i),
            ) else {
                continue;
            };
            let volume = value_at(&quote.volume, i).unwrap_or(0.0);
            rows.push(OhlcvRow::new(date, open, high, low, close, volume));
        }

        if rows.is_empty() {
            return Err(ScanError::Provider {
                symbol: symbol.to_string(),
                message: format!("no complete rows for period {period}"),
            });
        }

        let key = SeriesKey::new(symbol.clone(), timeframe, period, self.name());
        Ok(SeriesEntry::new(key, rows))
    }
}

impl Default for YahooProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Maps a timeframe to a chart API interval token.
fn chart_interval(timeframe: Timeframe) -> &'static str {
    match timeframe {
        Timeframe::Daily => "1d",
        Timeframe::Weekly => "1wk",
        Timeframe::Monthly => "1mo",
    }
}

fn value_at(values: &[Option<f64>], index: usize) -> Option<f64> {
    values.get(index).copied().flatten()
}

fn check_status(symbol: &Symbol, status: reqwest::StatusCode) -> Result<()> {
    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(ScanError::RateLimited {
            provider: "yahoo".to_string(),
            retry_after: Some(Duration::from_secs(60)),
        });
    }
    if status == reqwest::StatusCode::NOT_FOUND {
        return Err(ScanError::Provider {
            symbol: symbol.to_string(),
            message: "symbol not found".to_string(),
        });
    }
    if !status.is_success() {
        return Err(ScanError::Network(format!("HTTP {status} for {symbol}")));
    }
    Ok(())
}

#[async_trait]
impl QuoteProvider for YahooProvider {
    fn name(&self) -> &str {
        "yahoo"
    }

    async fn fetch_series(
        &self,
        symbol: &Symbol,
        timeframe: Timeframe,
        period: &str,
    ) -> Result<SeriesEntry> {
        if period.is_empty() {
            return Err(ScanError::InvalidParameter(
                "period must not be empty".to_string(),
            ));
        }

        self.apply_rate_limit().await;

        let url = self.build_chart_url(symbol, timeframe, period);
        debug!("Fetching series: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        check_status(symbol, response.status())?;

        let chart_response: ChartResponse = response
            .json()
            .await
            .map_err(|e| ScanError::Parse(e.to_string()))?;

        self.parse_chart_response(symbol, timeframe, period, chart_response)
    }

    async fn fetch_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>> {
        self.apply_rate_limit().await;

        let url = format!(
            "{}/{}?modules=summaryDetail,defaultKeyStatistics,financialData",
            QUOTE_SUMMARY_URL,
            symbol.as_str()
        );
        debug!("Fetching fundamentals: {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| ScanError::Network(e.to_string()))?;

        check_status(symbol, response.status())?;

        let summary: QuoteSummaryResponse = response
            .json()
            .await
            .map_err(|e| ScanError::Parse(e.to_string()))?;

        let Some(data) = summary.quote_summary.result.into_iter().next() else {
            return Ok(None);
        };

        Ok(Some(map_fundamentals(symbol, data)))
    }
}

/// Flattens the quote-summary modules into named metrics.
fn map_fundamentals(symbol: &Symbol, data: QuoteSummaryData) -> Fundamentals {
    let detail = data.summary_detail.unwrap_or_default();
    let stats = data.default_key_statistics.unwrap_or_default();
    let financial = data.financial_data.unwrap_or_default();

    Fundamentals::new(symbol.clone())
        .with_metric("pe_ratio", detail.trailing_pe.and_then(|v| v.raw))
        .with_metric("forward_pe", detail.forward_pe.and_then(|v| v.raw))
        .with_metric("market_cap", detail.market_cap.and_then(|v| v.raw))
        .with_metric("dividend_yield", detail.dividend_yield.and_then(|v| v.raw))
        .with_metric("beta", detail.beta.and_then(|v| v.raw))
        .with_metric("pb_ratio", stats.price_to_book.and_then(|v| v.raw))
        .with_metric("eps", stats.trailing_eps.and_then(|v| v.raw))
        .with_metric("profit_margin", financial.profit_margins.and_then(|v| v.raw))
        .with_metric(
            "revenue_growth",
            financial.revenue_growth.and_then(|v| v.raw),
        )
        .with_metric(
            "return_on_equity",
            financial.return_on_equity.and_then(|v| v.raw),
        )
}

// ============================================================================
// Yahoo Finance API Response Types
// ============================================================================

/// Chart API response.
#[derive(Debug, Deserialize)]
struct ChartResponse {
    chart: ChartResult,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    result: Vec<ChartData>,
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ChartData {
    timestamp: Option<Vec<i64>>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    quote: Vec<QuoteData>,
}

#[derive(Debug, Deserialize)]
struct QuoteData {
    open: Vec<Option<f64>>,
    high: Vec<Option<f64>>,
    low: Vec<Option<f64>>,
    close: Vec<Option<f64>>,
    volume: Vec<Option<f64>>,
}

/// Quote Summary API response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryResponse {
    quote_summary: QuoteSummaryResult,
}

#[derive(Debug, Deserialize)]
struct QuoteSummaryResult {
    result: Vec<QuoteSummaryData>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteSummaryData {
    summary_detail: Option<SummaryDetail>,
    default_key_statistics: Option<DefaultKeyStatistics>,
    financial_data: Option<FinancialData>,
}

/// Yahoo wraps every numeric field in a `{raw, fmt}` object.
#[derive(Debug, Default, Deserialize)]
struct RawNum {
    raw: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SummaryDetail {
    trailing_pe: Option<RawNum>,
    forward_pe: Option<RawNum>,
    market_cap: Option<RawNum>,
    dividend_yield: Option<RawNum>,
    beta: Option<RawNum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DefaultKeyStatistics {
    price_to_book: Option<RawNum>,
    trailing_eps: Option<RawNum>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FinancialData {
    profit_margins: Option<RawNum>,
    revenue_growth: Option<RawNum>,
    return_on_equity: Option<RawNum>,
}
