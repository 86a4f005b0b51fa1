// src/services/groww.rs
//
// Upstream market-data client. The scanner only needs one call shape:
// historical OHLCV candles for a symbol over a window, which the provider
// serves in bounded chunks per timeframe tier.

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::settings::Settings;
use crate::db::models::Candle;
use crate::utils::errors::ScanError;
use crate::utils::types::Timeframe;

pub const SOURCE_TAG: &str = "groww";

#[async_trait]
pub trait MarketDataClient: Send + Sync {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ScanError>;
}

pub struct GrowwClient {
    http: reqwest::Client,
    base_url: String,
    access_token: String,
    exchange: String,
    segment: String,
}

impl GrowwClient {
    pub fn new(settings: &Settings) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: settings.groww_base_url.trim_end_matches('/').to_string(),
            access_token: settings.groww_access_token.clone(),
            exchange: settings.groww_exchange.clone(),
            segment: settings.groww_segment.clone(),
        }
    }

    async fn fetch_chunk(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ScanError> {
        let url = format!("{}/v1/historical/candle/range", self.base_url);
        let start_ms = start.timestamp_millis().to_string();
        let end_ms = end.timestamp_millis().to_string();
        let interval = timeframe.minutes().to_string();

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.access_token)
            .query(&[
                ("trading_symbol", symbol),
                ("exchange", self.exchange.as_str()),
                ("segment", self.segment.as_str()),
                ("start_time", start_ms.as_str()),
                ("end_time", end_ms.as_str()),
                ("interval_in_minutes", interval.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScanError::Upstream(format!(
                "candle fetch for {symbol} returned {status}"
            )));
        }

        let body: Value = response.json().await?;
        Ok(normalize_candles(&body))
    }
}

#[async_trait]
impl MarketDataClient for GrowwClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>, ScanError> {
        let chunk = Duration::days(timeframe.max_days() as i64);

        let mut candles = Vec::new();
        let mut cursor = start;
        while cursor < end {
            let chunk_end = (cursor + chunk).min(end);
            let mut batch = self.fetch_chunk(symbol, timeframe, cursor, chunk_end).await?;
            candles.append(&mut batch);
            cursor = chunk_end;
        }

        candles.sort_by_key(|c| c.ts);
        tracing::debug!(symbol, timeframe = %timeframe, candles = candles.len(), "fetch complete");
        Ok(candles)
    }
}

/// Turns the provider's row-array payload into candles: epoch seconds become
/// UTC instants, rows missing any OHLC value are dropped, volume defaults
/// to 0. The candle array lives under `payload.candles` or at the root.
pub fn normalize_candles(body: &Value) -> Vec<Candle> {
    let payload = body.get("payload").unwrap_or(body);
    let Some(rows) = payload.get("candles").and_then(Value::as_array) else {
        return Vec::new();
    };

    let mut candles = Vec::with_capacity(rows.len());
    for row in rows {
        let Some(fields) = row.as_array() else {
            continue;
        };
        if fields.len() < 6 {
            continue;
        }
        let Some(ts_epoch) = coerce_i64(&fields[0]) else {
            continue;
        };
        let Some(ts) = Utc.timestamp_opt(ts_epoch, 0).single() else {
            continue;
        };
        let (open, high, low, close) = match (
            coerce_f64(&fields[1]),
            coerce_f64(&fields[2]),
            coerce_f64(&fields[3]),
            coerce_f64(&fields[4]),
        ) {
            (Some(o), Some(h), Some(l), Some(c)) => (o, h, l, c),
            _ => continue,
        };
        let volume = coerce_f64(&fields[5]).unwrap_or(0.0);

        candles.push(Candle {
            ts,
            open,
            high,
            low,
            close,
            volume,
            source: SOURCE_TAG.to_string(),
        });
    }
    candles
}

fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
