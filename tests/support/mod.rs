// tests/support/mod.rs
//
// In-memory stand-ins for the Postgres stores, the Redis cache, and the
// upstream provider, so pipeline behavior is testable without services.
#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use relscan_backend::db::models::{
    BenchmarkPayload, BenchmarkStateRow, Candle, ScannerPayload, ScannerRow,
};
use relscan_backend::db::stores::{
    BenchmarkStore, Cache, CandleStore, SnapshotStore, WatchlistStore,
};
use relscan_backend::services::groww::MarketDataClient;
use relscan_backend::utils::errors::ScanError;
use relscan_backend::utils::types::Timeframe;

#[derive(Default)]
pub struct MemoryCache {
    strings: Mutex<HashMap<String, String>>,
    bytes: Mutex<HashMap<String, Vec<u8>>>,
}

#[async_trait]
impl Cache for MemoryCache {
    async fn get_raw(&self, key: &str) -> Option<String> {
        self.strings.lock().unwrap().get(key).cloned()
    }

    async fn set_raw(&self, key: &str, value: String, _ttl_secs: Option<u64>) {
        self.strings.lock().unwrap().insert(key.to_string(), value);
    }

    async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.bytes.lock().unwrap().get(key).cloned()
    }

    async fn set_bytes(&self, key: &str, value: Vec<u8>, _ttl_secs: Option<u64>) {
        self.bytes.lock().unwrap().insert(key.to_string(), value);
    }
}

#[derive(Default)]
pub struct MemoryCandleStore {
    rows: Mutex<HashMap<(String, Timeframe), BTreeMap<i64, Candle>>>,
}

#[async_trait]
impl CandleStore for MemoryCandleStore {
    async fn upsert_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        candles: &[Candle],
    ) -> Result<(), ScanError> {
        let mut rows = self.rows.lock().unwrap();
        let entry = rows.entry((symbol.to_string(), timeframe)).or_default();
        for candle in candles {
            entry.insert(candle.ts.timestamp(), candle.clone());
        }
        Ok(())
    }

    async fn latest_window(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<Vec<Candle>, ScanError> {
        let rows = self.rows.lock().unwrap();
        let Some(entry) = rows.get(&(symbol.to_string(), timeframe)) else {
            return Ok(Vec::new());
        };
        let all: Vec<Candle> = entry.values().cloned().collect();
        let start = all.len().saturating_sub(limit as usize);
        Ok(all[start..].to_vec())
    }

    async fn latest_batch(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<HashMap<String, Vec<Candle>>, ScanError> {
        let mut out = HashMap::new();
        for symbol in symbols {
            let window = self.latest_window(symbol, timeframe, limit).await?;
            if !window.is_empty() {
                out.insert(symbol.clone(), window);
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
pub struct MemorySnapshotStore {
    snaps: Mutex<HashMap<Timeframe, BTreeMap<DateTime<Utc>, HashMap<String, ScannerRow>>>>,
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save_snapshot(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        rows: &[ScannerRow],
    ) -> Result<(), ScanError> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut snaps = self.snaps.lock().unwrap();
        let at_ts = snaps.entry(timeframe).or_default().entry(ts).or_default();
        for row in rows {
            at_ts.insert(row.symbol.clone(), row.clone());
        }
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<ScannerPayload>, ScanError> {
        let snaps = self.snaps.lock().unwrap();
        let Some(by_ts) = snaps.get(&timeframe) else {
            return Ok(None);
        };
        let Some((ts, rows)) = by_ts.iter().last() else {
            return Ok(None);
        };
        let mut rows: Vec<ScannerRow> = rows.values().cloned().collect();
        rows.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        Ok(Some(ScannerPayload {
            timeframe,
            ts: *ts,
            rows,
        }))
    }
}

#[derive(Default)]
pub struct MemoryBenchmarkStore {
    states: Mutex<HashMap<Timeframe, BTreeMap<DateTime<Utc>, HashMap<String, BenchmarkStateRow>>>>,
}

#[async_trait]
impl BenchmarkStore for MemoryBenchmarkStore {
    async fn save_states(
        &self,
        timeframe: Timeframe,
        ts: DateTime<Utc>,
        states: &[BenchmarkStateRow],
    ) -> Result<(), ScanError> {
        if states.is_empty() {
            return Ok(());
        }
        let mut all = self.states.lock().unwrap();
        let at_ts = all.entry(timeframe).or_default().entry(ts).or_default();
        for state in states {
            at_ts.insert(state.benchmark.clone(), state.clone());
        }
        Ok(())
    }

    async fn latest_states(
        &self,
        timeframe: Timeframe,
    ) -> Result<Option<BenchmarkPayload>, ScanError> {
        let all = self.states.lock().unwrap();
        let Some(by_ts) = all.get(&timeframe) else {
            return Ok(None);
        };
        let Some((ts, states)) = by_ts.iter().last() else {
            return Ok(None);
        };
        let mut states: Vec<BenchmarkStateRow> = states.values().cloned().collect();
        states.sort_by(|a, b| a.benchmark.cmp(&b.benchmark));
        Ok(Some(BenchmarkPayload {
            timeframe,
            ts: *ts,
            states,
        }))
    }
}

pub struct MemoryWatchlists {
    stocks: Vec<String>,
    indices: Mutex<HashMap<String, String>>,
    mapping: HashMap<String, Vec<String>>,
}

impl MemoryWatchlists {
    pub fn new(stocks: &[&str]) -> Self {
        Self {
            stocks: stocks.iter().map(|s| s.to_string()).collect(),
            indices: Mutex::new(HashMap::new()),
            mapping: HashMap::new(),
        }
    }
}

#[async_trait]
impl WatchlistStore for MemoryWatchlists {
    async fn active_stock_symbols(&self) -> Result<Vec<String>, ScanError> {
        let mut stocks = self.stocks.clone();
        stocks.sort();
        Ok(stocks)
    }

    async fn active_index_map(&self) -> Result<HashMap<String, String>, ScanError> {
        Ok(self.indices.lock().unwrap().clone())
    }

    async fn active_index_data_symbols(&self) -> Result<Vec<String>, ScanError> {
        Ok(self.indices.lock().unwrap().values().cloned().collect())
    }

    async fn mapped_index_symbols(&self) -> Result<Vec<String>, ScanError> {
        let mut symbols: Vec<String> = self.mapping.values().flatten().cloned().collect();
        symbols.sort();
        symbols.dedup();
        Ok(symbols)
    }

    async fn stock_index_mapping(&self) -> Result<HashMap<String, Vec<String>>, ScanError> {
        Ok(self.mapping.clone())
    }

    async fn indices_for_stock(&self, stock_symbol: &str) -> Result<Vec<String>, ScanError> {
        Ok(self.mapping.get(stock_symbol).cloned().unwrap_or_default())
    }

    async fn ensure_default_index(&self, symbol: &str) -> Result<(), ScanError> {
        self.indices
            .lock()
            .unwrap()
            .entry(symbol.to_string())
            .or_insert_with(|| symbol.to_string());
        Ok(())
    }
}

/// Provider returning a monotone ramp over the requested window, one bar per
/// timeframe step, identical for every symbol.
pub struct FakeProvider;

#[async_trait]
impl MarketDataClient for FakeProvider {
    async fn fetch_candles(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ScanError> {
        let minutes = timeframe.minutes() as i64;
        let total = ((end - start).num_seconds() / (minutes * 60)).max(0) as usize;

        let mut candles = Vec::with_capacity(total);
        for i in 0..total {
            let base = 100.0 + i as f64;
            let spread = 1.0 + 0.05 * i as f64;
            candles.push(Candle {
                ts: start + Duration::minutes(i as i64 * minutes),
                open: base,
                high: base + spread,
                low: base - spread,
                close: base + 0.5,
                volume: 1000.0 + i as f64,
                source: "fake".to_string(),
            });
        }
        Ok(candles)
    }
}
