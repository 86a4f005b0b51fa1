// src/services/candles.rs

use std::collections::HashMap;
use std::sync::Arc;

use crate::db::models::CandleSeries;
use crate::db::stores::{cache_get_json, cache_set_json, Cache, CandleStore};
use crate::utils::errors::ScanError;
use crate::utils::types::Timeframe;

const WINDOW_TTL_SECS: u64 = 30;

/// Cache-first batch loader for fixed-lookback candle windows, used by the
/// derived read path. Windows are cached per (symbol, timeframe, limit) with
/// a short TTL; misses fall through to one grouped store query.
pub struct CandlesLoader {
    store: Arc<dyn CandleStore>,
    cache: Arc<dyn Cache>,
}

impl CandlesLoader {
    pub fn new(store: Arc<dyn CandleStore>, cache: Arc<dyn Cache>) -> Self {
        Self { store, cache }
    }

    pub async fn get_candles(
        &self,
        symbols: &[String],
        timeframe: Timeframe,
        limit: u32,
    ) -> Result<HashMap<String, CandleSeries>, ScanError> {
        let mut results = HashMap::new();
        let mut missing = Vec::new();

        for symbol in symbols {
            let key = format!("candles:{symbol}:{timeframe}:{limit}");
            match cache_get_json::<CandleSeries>(self.cache.as_ref(), &key).await {
                Some(series) if !series.is_empty() => {
                    results.insert(symbol.clone(), series);
                }
                _ => missing.push(symbol.clone()),
            }
        }

        if !missing.is_empty() {
            let batch = self.store.latest_batch(&missing, timeframe, limit).await?;
            for (symbol, candles) in batch {
                let series = CandleSeries::from_candles(&candles);
                if series.is_empty() {
                    continue;
                }
                let key = format!("candles:{symbol}:{timeframe}:{limit}");
                cache_set_json(self.cache.as_ref(), &key, &series, Some(WINDOW_TTL_SECS)).await;
                results.insert(symbol, series);
            }
        }

        Ok(results)
    }
}
