#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantscan/scanner/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Bulk market-data acquisition pipeline with federated caching.
//!
//! The pipeline runs in three linear phases:
//!
//! 1. [`BulkLoader`] reads every available cache in one pass and partitions
//!    the requested symbols into satisfied and missing.
//! 2. [`BatchFetcher`] fetches the missing symbols from the provider in
//!    bounded, rate-limited batches, writing each success through the
//!    [`CacheFederation`] immediately.
//! 3. [`Scanner`] merges both sides into one [`ScanResult`] per requested
//!    symbol; no symbol is ever silently dropped.
//!
//! # Features
//!
//! - `yahoo` - Yahoo Finance provider adapter
//! - `cache-sqlite` - embedded SQLite cache backend

// Core types and traits
pub use scanner_core::*;

// Cache backends and federation
pub use scanner_cache::{CacheFederation, MemoryStore, RestStore};

#[cfg(feature = "cache-sqlite")]
pub use scanner_cache::SqliteStore;

// Providers
#[cfg(feature = "yahoo")]
pub use scanner_yahoo::YahooProvider;

mod bulk;
mod fetch;
mod progress;
mod scan;

pub use bulk::{BulkLoad, BulkLoader};
pub use fetch::{BatchFetcher, FetchConfig, FetchOutcome};
pub use progress::{Progress, ProgressFn};
pub use scan::{ScanRequest, Scanner};
