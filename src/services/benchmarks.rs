// src/services/benchmarks.rs

use crate::db::models::{BenchmarkStateRow, CandleSeries};
use crate::services::indicators::{rolling_move, true_range, wilders_rma};
use crate::utils::types::Regime;

const LENGTH: usize = 12;

/// Aggregate regime descriptors for one benchmark: trend from close moves,
/// volatility expansion from ATR moves, participation from volume moves.
/// Values that cannot be computed yet fall back to 0.0 and the regime
/// resolves to NEUTRAL; NO_DATA is reserved for benchmarks with no candles
/// at all (handled by the caller).
pub fn compute_benchmark_state(benchmark: &str, data: &CandleSeries) -> BenchmarkStateRow {
    let trend = last_or_zero(&rolling_move(&data.close, LENGTH));

    let atr = wilders_rma(&true_range(&data.high, &data.low, &data.close), LENGTH);
    let vol_expansion = last_or_zero(&rolling_move(&atr, LENGTH));
    let participation = last_or_zero(&rolling_move(&data.volume, LENGTH));

    let regime = if trend > 0.0 && vol_expansion > 0.0 {
        Regime::Bullish
    } else if trend < 0.0 && vol_expansion > 0.0 {
        Regime::Bearish
    } else {
        Regime::Neutral
    };

    BenchmarkStateRow {
        benchmark: benchmark.to_string(),
        regime,
        trend,
        vol_expansion,
        participation,
    }
}

fn last_or_zero(series: &[f64]) -> f64 {
    match series.last() {
        Some(v) if v.is_finite() => *v,
        _ => 0.0,
    }
}
