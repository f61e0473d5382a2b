//! Hosted HTTP cache backend.
//!
//! Talks to a key-addressed REST store (one JSON document per cache key):
//!
//! - `GET/PUT {base}/series/{symbol}/{timeframe}/{period}/{source}`
//! - `GET/PUT {base}/fundamentals/{symbol}`
//! - `GET {base}/fundamentals` - bulk fundamentals
//! - `GET {base}/symbols` - bulk known symbols
//!
//! A 404 means "key absent" and maps to `Ok(None)`; connection failures and
//! server errors map to [`ScanError::Backend`] so the federation can route
//! around an outage.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::{Client, StatusCode};
use scanner_core::{
    CacheStore, FreshnessPolicy, Fundamentals, Result, ScanError, SeriesEntry, SeriesKey, Symbol,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument};

/// Default per-request timeout for the hosted store.
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// API key header sent with every request, when configured.
const API_KEY_HEADER: &str = "apikey";

/// Hosted cache backend over HTTP.
pub struct RestStore {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    policy: FreshnessPolicy,
}

impl fmt::Debug for RestStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestStore")
            .field("base_url", &self.base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RestStore {
    /// Creates a store for the given base URL with a default client.
    #[must_use]
    pub fn new(base_url: impl Into<String>, policy: FreshnessPolicy) -> Self {
        let client = Client::builder()
            .timeout(DEFAULT_REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self::with_client(client, base_url, policy)
    }

    /// Creates a store with a custom HTTP client.
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, policy: FreshnessPolicy) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            policy,
        }
    }

    /// Sets the API key sent with every request.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn series_path(key: &SeriesKey) -> String {
        format!(
            "series/{}/{}/{}/{}",
            key.symbol,
            key.timeframe.as_str(),
            key.period,
            key.source
        )
    }

    fn backend_err(&self, message: impl Into<String>) -> ScanError {
        ScanError::Backend {
            backend: "rest".to_string(),
            message: message.into(),
        }
    }

    /// GET a JSON document; `Ok(None)` on 404.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        let url = self.url(path);
        debug!(%url, "REST store GET");

        let mut request = self.client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.backend_err(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(self.backend_err(format!("HTTP {} for {url}", response.status())));
        }

        let value = response
            .json::<T>()
            .await
            .map_err(|e| ScanError::Parse(e.to_string()))?;
        Ok(Some(value))
    }

    /// PUT a JSON document.
    async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = self.url(path);
        debug!(%url, "REST store PUT");

        let mut request = self.client.put(&url).json(body);
        if let Some(key) = &self.api_key {
            request = request.header(API_KEY_HEADER, key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.backend_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(self.backend_err(format!("HTTP {} for {url}", response.status())));
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for RestStore {
    fn name(&self) -> &str {
        "rest"
    }

    #[instrument(skip(self), fields(key = %key))]
    async fn get_series(&self, key: &SeriesKey) -> Result<Option<SeriesEntry>> {
        let Some(entry) = self.get_json::<SeriesEntry>(&Self::series_path(key)).await? else {
            debug!("Cache miss for series");
            return Ok(None);
        };

        if !self.policy.price_fresh(entry.fetched_at, Utc::now()) {
            debug!("Cached series is stale");
            return Ok(None);
        }
        debug!(rows = entry.len(), "Cache hit for series");
        Ok(Some(entry))
    }

    #[instrument(skip(self, entry), fields(key = %entry.key, rows = entry.len()))]
    async fn put_series(&self, entry: &SeriesEntry) -> Result<()> {
        self.put_json(&Self::series_path(&entry.key), entry).await
    }

    #[instrument(skip(self), fields(symbol = %symbol))]
    async fn get_fundamentals(&self, symbol: &Symbol) -> Result<Option<Fundamentals>> {
        let path = format!("fundamentals/{symbol}");
        let Some(entry) = self.get_json::<Fundamentals>(&path).await? else {
            debug!("Cache miss for fundamentals");
            return Ok(None);
        };

        if !self.policy.fundamentals_fresh(entry.last_updated, Utc::now()) {
            debug!("Cached fundamentals are stale");
            return Ok(None);
        }
        debug!(metrics = entry.len(), "Cache hit for fundamentals");
        Ok(Some(entry))
    }

    #[instrument(skip(self, entry), fields(symbol = %entry.symbol))]
    async fn put_fundamentals(&self, entry: &Fundamentals) -> Result<()> {
        self.put_json(&format!("fundamentals/{}", entry.symbol), entry)
            .await
    }

    #[instrument(skip(self))]
    async fn known_symbols(&self) -> Result<HashSet<Symbol>> {
        let symbols = self
            .get_json::<Vec<String>>("symbols")
            .await?
            .unwrap_or_default();
        Ok(symbols.into_iter().map(Symbol::new).collect())
    }

    #[instrument(skip(self))]
    async fn all_fundamentals(&self) -> Result<Vec<Fundamentals>> {
        let now = Utc::now();
        let all = self
            .get_json::<Vec<Fundamentals>>("fundamentals")
            .await?
            .unwrap_or_default();
        Ok(all
            .into_iter()
            .filter(|f| self.policy.fundamentals_fresh(f.last_updated, now))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scanner_core::Timeframe;

    #[test]
    fn test_series_path() {
        let key = SeriesKey::new(Symbol::new("aapl"), Timeframe::Weekly, "6mo", "yahoo");
        assert_eq!(RestStore::series_path(&key), "series/AAPL/weekly/6mo/yahoo");
    }

    #[test]
    fn test_base_url_trimmed() {
        let store = RestStore::new("https://cache.example.com/v1/", FreshnessPolicy::default());
        assert_eq!(store.url("symbols"), "https://cache.example.com/v1/symbols");
    }

    #[test]
    fn test_debug_redacts_api_key() {
        let store = RestStore::new("https://cache.example.com", FreshnessPolicy::default())
            .with_api_key("secret");
        let debug = format!("{store:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("REDACTED"));
    }
}
