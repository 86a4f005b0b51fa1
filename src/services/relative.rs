// src/services/relative.rs

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::settings::Settings;
use crate::db::models::CandleSeries;
use crate::db::stores::{cache_get_json, cache_set_json, Cache, WatchlistStore};
use crate::services::alignment::{align, MIN_ALIGNED_BARS};
use crate::services::candles::CandlesLoader;
use crate::services::indicators::{classify, rrs, rrv, rve, IndicatorParams, Ohlc};
use crate::utils::errors::ScanError;
use crate::utils::types::{Signal, Timeframe};

const RESPONSE_TTL_SECS: u64 = 20;

/// One symbol measured against one of its associated indices. Value fields
/// are absent (with an error note) when the pair lacks usable candles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativeRow {
    pub index: String,
    pub rrs: Option<f64>,
    pub rrv: Option<f64>,
    pub rve: Option<f64>,
    pub signal: Signal,
    pub timeframe: Timeframe,
    pub updated_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelativePayload {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub rows: Vec<RelativeRow>,
}

/// On-demand relative metrics for one symbol against every index it is
/// mapped to (the default market index always first).
pub struct RelativeMetricsService {
    settings: Settings,
    watchlists: Arc<dyn WatchlistStore>,
    cache: Arc<dyn Cache>,
    loader: CandlesLoader,
}

impl RelativeMetricsService {
    pub fn new(
        settings: Settings,
        watchlists: Arc<dyn WatchlistStore>,
        cache: Arc<dyn Cache>,
        loader: CandlesLoader,
    ) -> Self {
        Self {
            settings,
            watchlists,
            cache,
            loader,
        }
    }

    pub async fn get_metrics(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        lookback: u32,
    ) -> Result<RelativePayload, ScanError> {
        let stock_symbol = symbol.trim().to_uppercase();
        let cache_key = format!("relative:{stock_symbol}:{timeframe}:{lookback}");
        if let Some(payload) =
            cache_get_json::<RelativePayload>(self.cache.as_ref(), &cache_key).await
        {
            return Ok(payload);
        }

        let indices = self.associated_indices(&stock_symbol).await?;
        let index_map = self.watchlists.active_index_map().await?;

        let mut data_symbols = BTreeSet::new();
        data_symbols.insert(stock_symbol.clone());
        for index in &indices {
            data_symbols.insert(index_map.get(index).cloned().unwrap_or_else(|| index.clone()));
        }
        let data_symbols: Vec<String> = data_symbols.into_iter().collect();

        let candles = self
            .loader
            .get_candles(&data_symbols, timeframe, lookback)
            .await?;
        let stock_data = candles.get(&stock_symbol);

        let mut rows = Vec::with_capacity(indices.len());
        for index in indices {
            let data_symbol = index_map.get(&index).cloned().unwrap_or_else(|| index.clone());
            let bench_data = candles.get(&data_symbol);

            let row = match (stock_data, bench_data) {
                (Some(stock), Some(bench)) => match compute_relative(stock, bench, timeframe) {
                    Some(mut row) => {
                        row.index = index;
                        row
                    }
                    None => no_data_row(index, timeframe, "Insufficient aligned candles"),
                },
                _ => no_data_row(index, timeframe, "Missing candles"),
            };
            rows.push(row);
        }

        let payload = RelativePayload {
            symbol: stock_symbol,
            timeframe,
            rows,
        };
        cache_set_json(
            self.cache.as_ref(),
            &cache_key,
            &payload,
            Some(RESPONSE_TTL_SECS),
        )
        .await;
        Ok(payload)
    }

    /// Default market index first, then the stock's mapped indices sorted.
    async fn associated_indices(&self, stock_symbol: &str) -> Result<Vec<String>, ScanError> {
        let default = self.settings.nifty_symbol.clone();
        let mapped = self.watchlists.indices_for_stock(stock_symbol).await?;

        let mut out = vec![default.clone()];
        for index in mapped {
            let cleaned = index.trim().to_uppercase();
            if !cleaned.is_empty() && cleaned != default && !out.contains(&cleaned) {
                out.push(cleaned);
            }
        }
        Ok(out)
    }
}

fn no_data_row(index: String, timeframe: Timeframe, error: &str) -> RelativeRow {
    RelativeRow {
        index,
        rrs: None,
        rrv: None,
        rve: None,
        signal: Signal::NoData,
        timeframe,
        updated_at: None,
        error: Some(error.to_string()),
    }
}

fn compute_relative(
    stock: &CandleSeries,
    bench: &CandleSeries,
    timeframe: Timeframe,
) -> Option<RelativeRow> {
    let (sym_a, ben_a, common) = align(stock, bench);
    if common.len() < MIN_ALIGNED_BARS {
        return None;
    }

    let params = IndicatorParams::default();
    let sym_ohlc = Ohlc {
        high: &sym_a.high,
        low: &sym_a.low,
        close: &sym_a.close,
    };
    let ben_ohlc = Ohlc {
        high: &ben_a.high,
        low: &ben_a.low,
        close: &ben_a.close,
    };

    let rrs_series = rrs(&sym_ohlc, &ben_ohlc, &params);
    let rrv_series = rrv(&sym_a.volume, &ben_a.volume, &params);
    let rve_series = rve(&sym_ohlc, &ben_ohlc, &params);

    let rrs_val = *rrs_series.last()?;
    let rrv_val = *rrv_series.last()?;
    let rve_val = *rve_series.last()?;
    if !rrs_val.is_finite() || !rrv_val.is_finite() || !rve_val.is_finite() {
        return None;
    }

    let updated_at = Utc.timestamp_opt(*common.last()?, 0).single();

    Some(RelativeRow {
        index: String::new(),
        rrs: Some(rrs_val),
        rrv: Some(rrv_val),
        rve: Some(rve_val),
        signal: classify(rrs_val, rrv_val, rve_val, &rrs_series),
        timeframe,
        updated_at,
        error: None,
    })
}
