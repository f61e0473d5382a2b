#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/quantscan/scanner/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

//! Cache backends and federation for the market scanner pipeline.
//!
//! This crate provides implementations of the [`CacheStore`] trait from
//! `scanner-core`:
//!
//! - [`SqliteStore`] - embedded local backend (default, requires the `sqlite` feature)
//! - [`RestStore`] - hosted key-addressed HTTP backend
//! - [`MemoryStore`] - in-memory backend for tests and development
//! - [`CacheFederation`] - ordered composition of backends behind one interface

/// Ordered multi-backend composition.
pub mod federation;
/// In-memory backend.
pub mod memory;
/// Hosted HTTP backend.
pub mod rest;

/// Embedded SQLite backend.
#[cfg(feature = "sqlite")]
pub mod sqlite;

// Re-export the trait for convenience
pub use scanner_core::CacheStore;

// Re-export implementations
pub use federation::CacheFederation;
pub use memory::MemoryStore;
pub use rest::RestStore;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
