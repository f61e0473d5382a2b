//! SQLite-based cache backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use scanner_core::{
    CacheStore, FreshnessPolicy, Fundamentals, OhlcvRow, Result, ScanError, SeriesEntry, SeriesKey,
    Symbol,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, instrument};

/// Embedded local cache backend.
///
/// Stores each series and each fundamentals record as one JSON document,
/// keyed by its cache key. Entries are replaced wholesale with
/// `INSERT OR REPLACE`; staleness is filtered on read, never by eviction.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    policy: FreshnessPolicy,
}

impl SqliteStore {
    /// Opens (or creates) a SQLite-backed store at the given path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or schema creation
    /// fails.
    pub fn new(path: impl AsRef<Path>, policy: FreshnessPolicy) -> Result<Self> {
        let conn = Connection::open(path).map_err(backend_err)?;
        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Creates an in-memory SQLite store.
    ///
    /// Useful for testing; data is lost when the store is dropped.
    ///
    /// # Errors
    /// Returns an error if schema creation fails.
    pub fn in_memory(policy: FreshnessPolicy) -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(backend_err)?;
        let store = Self {
            conn: Mutex::new(conn),
            policy,
        };
        store.initialize_schema()?;
        Ok(store)
    }

    fn initialize_schema(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS series_cache (
                symbol TEXT NOT NULL,
                timeframe TEXT NOT NULL,
                period TEXT NOT NULL,
                source TEXT NOT NULL,
                rows_json TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                PRIMARY KEY (symbol, timeframe, period, source)
            )",
            [],
        )
        .map_err(backend_err)?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_series_symbol ON series_cache(symbol)",
            [],
        )
        .map_err(backend_err)?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS fundamentals_cache (
                symbol TEXT NOT NULL PRIMARY KEY,
                data_json TEXT NOT NULL,
                last_updated TEXT NOT NULL
            )",
            [],
        )
        .map_err(backend_err)?;

        debug!("SQLite store schema initialized");
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| ScanError::Backend {
            backend: "sqlite".to_string(),
            message: e.to_string(),
        })
    }
}

fn backend_err(e: rusqlite::Error) -> ScanError {
    ScanError::Backend {
        backend: "sqlite".to_string(),
        message: e.to_string(),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScanError::Parse(format!("Invalid timestamp {s}: {e}")))
}

#[async_trait]
impl CacheStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_series(&self, key: &SeriesKey) -> Result<Option<SeriesEntry>> {
        let conn = self.lock()?;

        let row = conn
            .query_row(
                "SELECT rows_json, fetched_at FROM series_cache
                 WHERE symbol = ?1 AND timeframe = ?2 AND period = ?3 AND source = ?4",
                params![
                    key.symbol.as_str(),
                    key.timeframe.as_str(),
                    key.period,
                    key.source
                ],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()
            .map_err(backend_err)?;

        let Some((rows_json, fetched_at)) = row else {
            debug!("Cache miss for series");
            return Ok(None);
        };

        let fetched_at = parse_timestamp(&fetched_at)?;
        if !self.policy.price_fresh(fetched_at, Utc::now()) {
            debug!("Cached series is stale");
            return Ok(None);
        }

        let rows: Vec<OhlcvRow> =
            serde_json::from_str(&rows_json).map_err(|e| ScanError::Parse(e.to_string()))?;
        debug!(rows = rows.len(), "Cache hit for series");
        Ok(Some(SeriesEntry::with_fetched_at(
            key.clone(),
            rows,
            fetched_at,
        )))
    }

    #[instrument(skip(self, entry), fields(key = %entry.key, rows = entry.len()))]
    async fn put_series(&self, entry: &SeriesEntry) -> Result<()> {
        let rows_json =
            serde_json::to_string(entry.rows()).map_err(|e| ScanError::Parse(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO series_cache
             (symbol, timeframe, period, source, rows_json, fetched_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                entry.key.symbol.as_str(),
                entry.key.timeframe.as_str(),
                entry.key.period,
                entry.key.source,
                rows_json,
                entry.fetched_at.to_rfc3339()
            ],
        )
        .map_err(backend_err)?;

        debug!("Cached series");
        Ok(())
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>> {
        let conn = self.lock()?;

        let data_json = conn
            .query_row(
                "SELECT data_json FROM fundamentals_cache WHERE symbol = ?1",
                params![symbol.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .map_err(backend_err)?;

        let Some(data_json) = data_json else {
            debug!("Cache miss for fundamentals");
            return Ok(None);
        };

        let entry: Fundamentals =
            serde_json::from_str(&data_json).map_err(|e| ScanError::Parse(e.to_string()))?;
        if !self.policy.fundamentals_fresh(entry.last_updated, Utc::now()) {
            debug!("Cached fundamentals are stale");
            return Ok(None);
        }

        debug!("Cache hit for fundamentals");
        Ok(Some(entry))
    }

    #[instrument(skip(self, entry), fields(symbol = %entry.symbol, metrics = entry.len()))]
    async fn put_fundamentals(&self, entry: &Fundamentals) -> Result<()> {
        let data_json =
            serde_json::to_string(entry).map_err(|e| ScanError::Parse(e.to_string()))?;

        let conn = self.lock()?;
        conn.execute(
            "INSERT OR REPLACE INTO fundamentals_cache (symbol, data_json, last_updated)
             VALUES (?1, ?2, ?3)",
            params![
                entry.symbol.as_str(),
                data_json,
                entry.last_updated.to_rfc3339()
            ],
        )
        .map_err(backend_err)?;

        debug!("Cached fundamentals");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn known_symbols(&self) -> Result<HashSet<Symbol>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT DISTINCT symbol FROM series_cache")
            .map_err(backend_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(backend_err)?;

        let mut symbols = HashSet::new();
        for row in rows {
            symbols.insert(Symbol::new(row.map_err(backend_err)?));
        }
        debug!(count = symbols.len(), "Listed known symbols");
        Ok(symbols)
    }

    #[instrument(skip(self))]
    async fn all_fundamentals(&self) -> Result<Vec<Fundamentals>> {
        let conn = self.lock()?;

        let mut stmt = conn
            .prepare("SELECT data_json FROM fundamentals_cache")
            .map_err(backend_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(backend_err)?;

        let now = Utc::now();
        let mut out = Vec::new();
        for row in rows {
            let data_json = row.map_err(backend_err)?;
            let entry: Fundamentals =
                serde_json::from_str(&data_json).map_err(|e| ScanError::Parse(e.to_string()))?;
            if self.policy.fundamentals_fresh(entry.last_updated, now) {
                out.push(entry);
            }
        }
        debug!(count = out.len(), "Listed fundamentals");
        Ok(out)
    }
}
