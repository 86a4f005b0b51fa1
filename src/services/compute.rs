// src/services/compute.rs

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use metrics::histogram;
use tracing::{info, warn};

use crate::config::settings::Settings;
use crate::db::models::{
    BenchmarkPayload, BenchmarkStateRow, CandleSeries, ScannerPayload, ScannerRow,
};
use crate::db::stores::{
    cache_get_json, cache_set_json, BenchmarkStore, Cache, CandleStore, SnapshotStore,
    WatchlistStore,
};
use crate::services::alignment::{align, MIN_ALIGNED_BARS};
use crate::services::benchmarks::compute_benchmark_state;
use crate::services::broadcaster::Broadcaster;
use crate::services::indicators::{classify, rrs, rrv, rve, IndicatorParams, Ohlc};
use crate::utils::errors::ScanError;
use crate::utils::types::{Regime, Timeframe};

/// Builds one scanner snapshot per tick: benchmark regimes, per-stock
/// indicator rows against each stock's resolved benchmark, ranked and
/// persisted, then pushed to streaming clients.
pub struct ComputeService {
    settings: Settings,
    candles: Arc<dyn CandleStore>,
    snapshots: Arc<dyn SnapshotStore>,
    benchmarks: Arc<dyn BenchmarkStore>,
    cache: Arc<dyn Cache>,
    watchlists: Arc<dyn WatchlistStore>,
    broadcaster: Arc<Broadcaster>,
}

impl ComputeService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        settings: Settings,
        candles: Arc<dyn CandleStore>,
        snapshots: Arc<dyn SnapshotStore>,
        benchmarks: Arc<dyn BenchmarkStore>,
        cache: Arc<dyn Cache>,
        watchlists: Arc<dyn WatchlistStore>,
        broadcaster: Arc<Broadcaster>,
    ) -> Self {
        Self {
            settings,
            candles,
            snapshots,
            benchmarks,
            cache,
            watchlists,
            broadcaster,
        }
    }

    pub async fn compute_timeframe(&self, timeframe: Timeframe) -> Result<(), ScanError> {
        let started = Instant::now();
        let ts = Utc::now();

        let index_map = self.watchlists.active_index_map().await?;
        let mapping = self.watchlists.stock_index_mapping().await?;
        let default_index = self.settings.nifty_symbol.clone();

        let mut benchmark_indices: BTreeSet<String> = index_map.keys().cloned().collect();
        benchmark_indices.insert(default_index.clone());

        // Benchmark candles are keyed by the provider data symbol; state rows
        // keep the index symbol, which is the external contract.
        let mut benchmark_data: HashMap<String, CandleSeries> = HashMap::new();
        let mut benchmark_states = Vec::new();

        for index in &benchmark_indices {
            let data_symbol = index_map.get(index).cloned().unwrap_or_else(|| index.clone());
            if !benchmark_data.contains_key(&data_symbol) {
                if let Some(series) = self.load_candles(&data_symbol, timeframe).await {
                    benchmark_data.insert(data_symbol.clone(), series);
                }
            }
            match benchmark_data.get(&data_symbol) {
                Some(series) => benchmark_states.push(compute_benchmark_state(index, series)),
                None => {
                    warn!(timeframe = %timeframe, benchmark = %index, "missing benchmark candles");
                    benchmark_states.push(BenchmarkStateRow {
                        benchmark: index.clone(),
                        regime: Regime::NoData,
                        trend: 0.0,
                        vol_expansion: 0.0,
                        participation: 0.0,
                    });
                }
            }
        }

        let stocks = self.watchlists.active_stock_symbols().await?;
        let mut rows = Vec::new();

        for symbol in &stocks {
            let Some(sym_series) = self.load_candles(symbol, timeframe).await else {
                warn!(symbol = %symbol, timeframe = %timeframe, "missing symbol candles");
                continue;
            };

            let benchmark_index = mapping
                .get(symbol)
                .and_then(|indices| indices.iter().find(|i| **i != default_index))
                .cloned()
                .unwrap_or_else(|| default_index.clone());
            let data_symbol = index_map
                .get(&benchmark_index)
                .cloned()
                .unwrap_or_else(|| benchmark_index.clone());

            if !benchmark_data.contains_key(&data_symbol) {
                if let Some(series) = self.load_candles(&data_symbol, timeframe).await {
                    benchmark_data.insert(data_symbol.clone(), series);
                }
            }
            let Some(ben_series) = benchmark_data.get(&data_symbol) else {
                warn!(
                    symbol = %symbol,
                    benchmark = %benchmark_index,
                    timeframe = %timeframe,
                    "missing benchmark for symbol"
                );
                continue;
            };

            if let Some(row) =
                compute_symbol_row(symbol, timeframe, &benchmark_index, &sym_series, ben_series)
            {
                rows.push(row);
            }
        }

        rank_rows(&mut rows);

        let payload = ScannerPayload {
            timeframe,
            ts,
            rows,
        };
        cache_set_json(
            self.cache.as_ref(),
            &format!("scanner:{timeframe}"),
            &payload,
            None,
        )
        .await;
        self.snapshots
            .save_snapshot(timeframe, ts, &payload.rows)
            .await?;

        let bench_payload = BenchmarkPayload {
            timeframe,
            ts,
            states: benchmark_states,
        };
        cache_set_json(
            self.cache.as_ref(),
            &format!("benchmarks:{timeframe}"),
            &bench_payload,
            None,
        )
        .await;
        self.benchmarks
            .save_states(timeframe, ts, &bench_payload.states)
            .await?;

        self.broadcaster.publish_from_worker(timeframe, &payload);

        histogram!("relscan_compute_seconds", started.elapsed().as_secs_f64());
        info!(
            timeframe = %timeframe,
            rows = payload.rows.len(),
            benchmarks = bench_payload.states.len(),
            "compute complete"
        );
        Ok(())
    }

    /// Hot-cache window written by the ingestor, falling back to the store.
    async fn load_candles(&self, symbol: &str, timeframe: Timeframe) -> Option<CandleSeries> {
        let key = format!("candles:{symbol}:{timeframe}");
        if let Some(series) = cache_get_json::<CandleSeries>(self.cache.as_ref(), &key).await {
            if !series.is_empty() {
                return Some(series);
            }
        }

        match self
            .candles
            .latest_window(symbol, timeframe, self.settings.compute_bars)
            .await
        {
            Ok(candles) if !candles.is_empty() => Some(CandleSeries::from_candles(&candles)),
            Ok(_) => None,
            Err(e) => {
                warn!(symbol, timeframe = %timeframe, error = %e, "candle load failed");
                None
            }
        }
    }
}

/// Runs the kernel for one symbol/benchmark pair. Insufficient alignment or
/// a non-finite last value omits the row instead of failing the sweep.
pub fn compute_symbol_row(
    symbol: &str,
    timeframe: Timeframe,
    benchmark_symbol: &str,
    sym: &CandleSeries,
    ben: &CandleSeries,
) -> Option<ScannerRow> {
    let (sym_a, ben_a, common) = align(sym, ben);
    if common.len() < MIN_ALIGNED_BARS {
        warn!(
            symbol,
            timeframe = %timeframe,
            aligned = common.len(),
            "insufficient aligned candles"
        );
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
        warn!(symbol, timeframe = %timeframe, "non-finite indicator values, omitting row");
        return None;
    }

    let signal = classify(rrs_val, rrv_val, rve_val, &rrs_series);

    Some(ScannerRow {
        symbol: symbol.to_string(),
        timeframe,
        benchmark_symbol: benchmark_symbol.to_string(),
        rrs: rrs_val,
        rrv: rrv_val,
        rve: rve_val,
        signal,
    })
}

/// Snapshot order: signal rank, then strength of |rrs| and |rve| descending,
/// with lexicographic symbol as the final tie-breaker.
pub fn rank_rows(rows: &mut [ScannerRow]) {
    rows.sort_by(|a, b| {
        a.signal
            .rank()
            .cmp(&b.signal.rank())
            .then_with(|| b.rrs.abs().total_cmp(&a.rrs.abs()))
            .then_with(|| b.rve.abs().total_cmp(&a.rve.abs()))
            .then_with(|| a.symbol.cmp(&b.symbol))
    });
}
