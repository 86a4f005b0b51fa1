// src/db/models.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::utils::types::{Regime, Signal, Timeframe};

/// One OHLCV bar. Stored keyed by (symbol, timeframe, ts); value columns are
/// overwritten on conflict, the key never changes.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Candle {
    pub ts: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub source: String,
}

/// Columnar candle window, the shape cached under `candles:*` keys and fed
/// to the indicator kernel. Timestamps are epoch seconds, ascending.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandleSeries {
    pub ts: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl CandleSeries {
    pub fn from_candles(candles: &[Candle]) -> Self {
        let mut series = Self::with_capacity(candles.len());
        for c in candles {
            series.ts.push(c.ts.timestamp());
            series.open.push(c.open);
            series.high.push(c.high);
            series.low.push(c.low);
            series.close.push(c.close);
            series.volume.push(c.volume);
        }
        series
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            ts: Vec::with_capacity(n),
            open: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
        }
    }

    pub fn len(&self) -> usize {
        self.ts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ts.is_empty()
    }
}

/// One symbol's indicator state inside a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerRow {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub benchmark_symbol: String,
    pub rrs: f64,
    pub rrv: f64,
    pub rve: f64,
    pub signal: Signal,
}

/// The full scanner snapshot for one (timeframe, ts): the wire shape cached
/// under `scanner:{tf}` and pushed to streaming clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScannerPayload {
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub rows: Vec<ScannerRow>,
}

/// Aggregate regime descriptors for one benchmark at a scan instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkStateRow {
    pub benchmark: String,
    pub regime: Regime,
    pub trend: f64,
    pub vol_expansion: f64,
    pub participation: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkPayload {
    pub timeframe: Timeframe,
    pub ts: DateTime<Utc>,
    pub states: Vec<BenchmarkStateRow>,
}

/// Watch-index row; mutated only by the external admin surface, read here.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct WatchIndex {
    pub id: i32,
    pub symbol: String,
    pub data_symbol: Option<String>,
    pub name: Option<String>,
    pub active: bool,
}
