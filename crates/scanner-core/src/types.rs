//! Core data types for cached market data.
//!
//! This module defines the fundamental data structures:
//!
//! - [`Symbol`] - Trading symbol/ticker
//! - [`SeriesKey`] - Identity of one cached time-series entry
//! - [`OhlcvRow`] - One OHLCV price row
//! - [`SeriesEntry`] - A whole cached time-series, replaced by value
//! - [`Fundamentals`] - Fundamental metrics for one symbol
//! - [`ScanResult`] - Per-symbol outcome of a pipeline run

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::timeframe::Timeframe;

/// A trading symbol/ticker.
///
/// Symbols are automatically uppercased on creation.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Symbol(String);

impl Symbol {
    /// Creates a new symbol from a string, converting to uppercase.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into().to_uppercase())
    }

    /// Returns the symbol as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Symbol {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::new(s))
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// Identity of one cached time-series entry.
///
/// A key is immutable once created; two fetches of the same symbol,
/// timeframe, period and source address the same cache slot.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SeriesKey {
    /// The symbol the series belongs to.
    pub symbol: Symbol,
    /// Sampling granularity.
    pub timeframe: Timeframe,
    /// Requested lookback period (e.g. "1y", "6mo").
    pub period: String,
    /// Originating data source (provider name).
    pub source: String,
}

impl SeriesKey {
    /// Creates a new series key.
    #[must_use]
    pub fn new(
        symbol: Symbol,
        timeframe: Timeframe,
        period: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            symbol,
            timeframe,
            period: period.into(),
            source: source.into(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.symbol, self.timeframe, self.period, self.source
        )
    }
}

/// One OHLCV (Open, High, Low, Close, Volume) row.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct OhlcvRow {
    /// Trading date of the row.
    pub date: NaiveDate,
    /// Opening price.
    pub open: f64,
    /// Highest price during the period.
    pub high: f64,
    /// Lowest price during the period.
    pub low: f64,
    /// Closing price.
    pub close: f64,
    /// Trading volume.
    pub volume: f64,
}

impl OhlcvRow {
    /// Creates a new OHLCV row.
    #[must_use]
    pub const fn new(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

/// A whole cached time-series for one [`SeriesKey`].
///
/// Rows are chronological with no duplicate dates; the constructor enforces
/// both. Entries are never mutated in place: a refresh always writes a full
/// new series, never a partial patch.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeriesEntry {
    /// Identity of this series.
    pub key: SeriesKey,
    /// OHLCV rows, chronological, unique per date.
    rows: Vec<OhlcvRow>,
    /// When this series was fetched from its source.
    pub fetched_at: DateTime<Utc>,
}

impl SeriesEntry {
    /// Creates a new entry fetched now, normalizing the rows.
    ///
    /// Rows are sorted by date; when two rows share a date the later one in
    /// the input wins.
    #[must_use]
    pub fn new(key: SeriesKey, rows: Vec<OhlcvRow>) -> Self {
        Self::with_fetched_at(key, rows, Utc::now())
    }

    /// Creates a new entry with an explicit fetch timestamp.
    #[must_use]
    pub fn with_fetched_at(key: SeriesKey, rows: Vec<OhlcvRow>, fetched_at: DateTime<Utc>) -> Self {
        let mut deduped: BTreeMap<NaiveDate, OhlcvRow> = BTreeMap::new();
        for row in rows {
            deduped.insert(row.date, row);
        }
        Self {
            key,
            rows: deduped.into_values().collect(),
            fetched_at,
        }
    }

    /// Returns the rows, chronological.
    #[must_use]
    pub fn rows(&self) -> &[OhlcvRow] {
        &self.rows
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the series has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns the earliest date in the series.
    #[must_use]
    pub fn first_date(&self) -> Option<NaiveDate> {
        self.rows.first().map(|r| r.date)
    }

    /// Returns the latest date in the series.
    #[must_use]
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.rows.last().map(|r| r.date)
    }

    /// Returns the most recent closing price.
    #[must_use]
    pub fn latest_close(&self) -> Option<f64> {
        self.rows.last().map(|r| r.close)
    }
}

/// Fundamental metrics for one symbol.
///
/// The metric set is open and provider-dependent (pe_ratio, profit_margin,
/// revenue_growth, market_cap, ...). Entries are replaced wholesale on each
/// successful fetch; callers never merge field-by-field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Fundamentals {
    /// The symbol these metrics belong to.
    pub symbol: Symbol,
    /// Named metrics; a present key with `None` means the provider reported
    /// the field but had no value for it.
    pub metrics: BTreeMap<String, Option<f64>>,
    /// When these metrics were last fetched.
    pub last_updated: DateTime<Utc>,
}

impl Fundamentals {
    /// Creates an empty fundamentals record updated now.
    #[must_use]
    pub fn new(symbol: Symbol) -> Self {
        Self::with_last_updated(symbol, Utc::now())
    }

    /// Creates an empty fundamentals record with an explicit timestamp.
    #[must_use]
    pub fn with_last_updated(symbol: Symbol, last_updated: DateTime<Utc>) -> Self {
        Self {
            symbol,
            metrics: BTreeMap::new(),
            last_updated,
        }
    }

    /// Sets a metric, builder-style.
    #[must_use]
    pub fn with_metric(mut self, name: impl Into<String>, value: Option<f64>) -> Self {
        self.metrics.insert(name.into(), value);
        self
    }

    /// Returns a metric value if the provider reported it.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied().flatten()
    }

    /// Returns the number of named metrics (with or without values).
    #[must_use]
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns true if no metrics are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

/// Which layer produced a result during this run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    /// The entry was already cached and fresh.
    Cache,
    /// The entry was fetched from the provider during this run.
    Provider,
}

/// Per-symbol outcome of a pipeline run.
#[derive(Clone, Debug, PartialEq)]
pub enum ScanOutcome {
    /// Data was found or fetched for the symbol.
    Data {
        /// The time-series for the symbol.
        series: SeriesEntry,
        /// Fundamentals, when any were available; best-effort.
        fundamentals: Option<Fundamentals>,
        /// Whether the series came from cache or provider.
        origin: Origin,
    },
    /// No data could be produced for the symbol.
    Failed {
        /// Human-readable failure reason.
        reason: String,
    },
}

/// One requested symbol's result.
///
/// Every symbol in a requested set appears exactly once in a run's output;
/// the pipeline never silently drops a symbol.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanResult {
    /// The requested symbol.
    pub symbol: Symbol,
    /// What happened for it.
    pub outcome: ScanOutcome,
}

impl ScanResult {
    /// Creates a successful result.
    #[must_use]
    pub fn data(
        symbol: Symbol,
        series: SeriesEntry,
        fundamentals: Option<Fundamentals>,
        origin: Origin,
    ) -> Self {
        Self {
            symbol,
            outcome: ScanOutcome::Data {
                series,
                fundamentals,
                origin,
            },
        }
    }

    /// Creates a failure result.
    #[must_use]
    pub fn failed(symbol: Symbol, reason: impl Into<String>) -> Self {
        Self {
            symbol,
            outcome: ScanOutcome::Failed {
                reason: reason.into(),
            },
        }
    }

    /// Returns true if the result carries data.
    #[must_use]
    pub fn is_data(&self) -> bool {
        matches!(self.outcome, ScanOutcome::Data { .. })
    }

    /// Returns the failure reason, if any.
    #[must_use]
    pub fn failure_reason(&self) -> Option<&str> {
        match &self.outcome {
            ScanOutcome::Failed { reason } => Some(reason),
            ScanOutcome::Data { .. } => None,
        }
    }
}
