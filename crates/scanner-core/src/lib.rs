#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantscan/scanner/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Core traits and types for the market scanner pipeline.
//!
//! Everything the backend, provider and pipeline crates share lives here:
//! the data model ([`SeriesEntry`], [`Fundamentals`]), the freshness policy,
//! the [`CacheStore`] backend contract, the [`QuoteProvider`] adapter
//! contract, and the [`ScanError`] taxonomy.

mod error;
mod freshness;
mod provider;
mod store;
mod timeframe;
mod types;

pub use error::{Result, ScanError};
pub use freshness::FreshnessPolicy;
pub use provider::QuoteProvider;
pub use store::CacheStore;
pub use timeframe::Timeframe;
pub use types::{
    Fundamentals, OhlcvRow, Origin, ScanOutcome, ScanResult, SeriesEntry, SeriesKey, Symbol,
};
