// src/db/stores.rs

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::models::{BenchmarkPayload, BenchmarkStateRow, Candle, ScannerPayload, ScannerRow};
use crate::utils::errors::ScanError;
use crate::utils::types::Timeframe;

/// OHLCV persistence keyed by (symbol, timeframe, ts).
#[async_trait]
pub trait CandleStore: Send + Sync {
    /// Insert-or-overwrite on value columns; applying the same batch twice
    /// equals applying it once.
    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), ScanError>;

    /// The most recent ≤ `limit` bars, ascending by ts.
    async fn latest_window(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ScanError>;

    /// Single-query variant of `latest_window` for many symbols, grouped per
    /// symbol; symbols with no candles are absent from the map.
    async fn latest_batch(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<HashMap<String, Vec<Candle>>, ScanError>;
}

/// Scanner snapshot rows keyed by (ts, timeframe, symbol).
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    async fn save_snapshot(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        rows: &[ScannerRow],
    ) -> Result<(), ScanError>;

    /// All rows at max(ts) for the timeframe, read as one consistent view.
    async fn latest_snapshot(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<ScannerPayload>, ScanError>;
}

/// Benchmark regime rows keyed by (ts, timeframe, benchmark).
#[async_trait]
pub trait BenchmarkStore: Send + Sync {
    async fn save_states(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        states: &[BenchmarkStateRow],
    ) -> Result<(), ScanError>;

    async fn latest_states(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<BenchmarkPayload>, ScanError>;
}

/// Read side of the watchlist tables. Admin CRUD lives in an external
/// adapter; the pipeline only resolves symbol sets and mappings, and seeds
/// the default benchmark at startup.
#[async_trait]
pub trait WatchlistStore: Send + Sync {
    async fn active_stock_symbols(&self) -> Result<Vec<String>, ScanError>;

    /// Active index symbol → provider data symbol (falls back to the symbol).
    async fn active_index_map(&self) -> Result<HashMap<String, String>, ScanError>;

    async fn active_index_data_symbols(&self) -> Result<Vec<String>, ScanError>;

    /// Distinct index symbols referenced by any stock mapping.
    async fn mapped_index_symbols(&self) -> Result<Vec<String>, ScanError>;

    /// Stock symbol → mapped index symbols, each list sorted.
    async fn stock_index_mapping(&self) -> Result<HashMap<String, Vec<String>>, ScanError>;

    async fn indices_for_stock(&self, stock_symbol: &str) -> Result<Vec<String>, ScanError>;

    /// Idempotently registers the default market index as an active index.
    async fn ensure_default_index(&self, symbol: &str) -> Result<(), ScanError>;
}

/// TTL key-value cache. Absence and decode failure both read as a miss; the
/// caller degrades to the persistent store.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Option<String>;
    async fn set_raw(&self, key: &str, value: String, ttl_secs: Option<u64>);
    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>>;
    async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl_secs: Option<u64>);
}

pub async fn cache_get_json<T: serde::de::DeserializeOwned>(
    cache: &dyn Cache,
    key: &str,
) -> Option<T> {
    let raw = cache.get_raw(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(key, error = %e, "cache payload failed to decode, treating as miss");
            None
        }
    }
}

pub async fn cache_set_json<T: serde::Serialize>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl_secs: Option<u64>,
) {
    match serde_json::to_string(value) {
        Ok(raw) => cache.set_raw(key, raw, ttl_secs).await,
        Err(e) => tracing::warn!(key, error = %e, "cache payload failed to encode"),
    }
}
