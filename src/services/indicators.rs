// src/services/indicators.rs
//
// Pure, side-effect-free kernel for the relative-strength indicators
// (RRS / RRV / RVE). All functions operate on `&[f64]` slices of equal,
// already-aligned length and use `f64::NAN` for entries that cannot be
// computed yet (warmup) or at all (bad input). Callers decide what to do
// with unknowns; nothing in here logs or allocates global state.

use statrs::statistics::{Data, OrderStatistics};

use crate::utils::types::Signal;

/// Lower bound applied to every denominator floor.
pub const EPS: f64 = 1e-12;

/// How the variance proxy smooths the first-difference series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarMode {
    /// RMA of |d|.
    Abs,
    /// sqrt(RMA(d^2)).
    Rms,
}

/// Knobs shared by the three indicators. `Default` matches the scanner's
/// production parameters.
#[derive(Debug, Clone)]
pub struct IndicatorParams {
    pub length: usize,
    pub atr_period: usize,
    /// SMA window applied to volume before RRV.
    pub smooth: usize,
    /// SMA window applied to the ATR series before RVE (1 = off).
    pub smooth_atr: usize,
    /// Log-compress volume after smoothing.
    pub use_log_volume: bool,
    /// RRS moves as log returns instead of point differences.
    pub pct_atr: bool,
    pub var_mode: VarMode,
    /// Quantile clamp (q_low, q_high) on first differences, None = off.
    pub winsorize: Option<(f64, f64)>,
    /// Clamp on the benchmark power term.
    pub pmax: f64,
    pub floor_window: usize,
    pub floor_quantile: f64,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            length: 12,
            atr_period: 14,
            smooth: 3,
            smooth_atr: 1,
            use_log_volume: true,
            pct_atr: false,
            var_mode: VarMode::Abs,
            winsorize: Some((0.01, 0.99)),
            pmax: 10.0,
            floor_window: 252,
            floor_quantile: 0.05,
        }
    }
}

/// Borrowed view of an aligned OHLC triple.
#[derive(Debug, Clone, Copy)]
pub struct Ohlc<'a> {
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
}

/* ------------------------------------------------------------------ */
/* Smoothing and rolling primitives                                   */
/* ------------------------------------------------------------------ */

/// Wilder's RMA: y[0] = x[0], y[i] = y[i-1] + (x[i] - y[i-1]) / length.
pub fn wilders_rma(x: &[f64], length: usize) -> Vec<f64> {
    if x.is_empty() || length == 0 {
        return x.to_vec();
    }
    let alpha = 1.0 / length as f64;
    let mut out = Vec::with_capacity(x.len());
    out.push(x[0]);
    for i in 1..x.len() {
        let prev = out[i - 1];
        out.push(prev + alpha * (x[i] - prev));
    }
    out
}

/// True range with the prev_close[0] := close[0] convention, so
/// TR[0] = high[0] - low[0].
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    debug_assert_eq!(high.len(), low.len());
    debug_assert_eq!(high.len(), close.len());
    let mut out = Vec::with_capacity(high.len());
    for i in 0..high.len() {
        let prev_close = if i == 0 { close[0] } else { close[i - 1] };
        let hl = high[i] - low[i];
        let hc = (high[i] - prev_close).abs();
        let lc = (low[i] - prev_close).abs();
        out.push(hl.max(hc).max(lc));
    }
    out
}

/// Point move over `length` bars; the first `length` entries are unknown.
pub fn rolling_move(x: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for i in length..x.len() {
        out[i] = x[i] - x[i - length];
    }
    out
}

/// Log-return variant of `rolling_move`, used in percent-ATR mode.
pub fn rolling_log_move(x: &[f64], length: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; x.len()];
    for i in length..x.len() {
        out[i] = (x[i] / x[i - length]).ln();
    }
    out
}

/// Centered moving average with zero padding at the edges; n <= 1 is the
/// identity. Matches a same-length convolution against a box kernel.
pub fn sma(x: &[f64], n: usize) -> Vec<f64> {
    if n <= 1 || x.is_empty() {
        return x.to_vec();
    }
    let shift = (n - 1) / 2;
    let len = x.len();
    (0..len)
        .map(|i| {
            let hi = i + shift;
            let lo = (hi + 1).saturating_sub(n);
            let mut sum = 0.0;
            for item in x.iter().take(len.min(hi + 1)).skip(lo) {
                sum += *item;
            }
            sum / n as f64
        })
        .collect()
}

/* ------------------------------------------------------------------ */
/* Numerical-stability primitives                                     */
/* ------------------------------------------------------------------ */

fn quantile_of(values: &[f64], tau: f64) -> f64 {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.is_empty() {
        return f64::NAN;
    }
    let mut data = Data::new(finite);
    data.quantile(tau)
}

/// Per-index lower bound for a denominator: a trailing rolling quantile of
/// |x| over `window` bars. Series shorter than the window degrade to a
/// single median-based scalar floor.
pub fn rolling_floor(x: &[f64], window: usize, q: f64) -> Vec<f64> {
    let n = x.len();
    if n == 0 {
        return Vec::new();
    }
    let abs: Vec<f64> = x
        .iter()
        .map(|v| if v.is_finite() { v.abs() } else { f64::NAN })
        .collect();
    let finite_count = abs.iter().filter(|v| v.is_finite()).count();

    if n < window || finite_count < window {
        let scalar = {
            let med = quantile_of(&abs, 0.5);
            if med.is_finite() {
                (q * med).max(EPS)
            } else {
                EPS
            }
        };
        return vec![scalar; n];
    }

    (0..n)
        .map(|i| {
            let lo = (i + 1).saturating_sub(window);
            let value = quantile_of(&abs[lo..=i], q);
            if value.is_finite() {
                value.max(EPS)
            } else {
                EPS
            }
        })
        .collect()
}

/// num / max(den, floor), elementwise. Non-finite numerator or denominator
/// propagates as unknown; a positive floor keeps the result finite.
pub fn safe_div(num: &[f64], den: &[f64], floor: &[f64]) -> Vec<f64> {
    debug_assert_eq!(num.len(), den.len());
    debug_assert_eq!(num.len(), floor.len());
    num.iter()
        .zip(den)
        .zip(floor)
        .map(|((&n, &d), &f)| {
            if !n.is_finite() || !d.is_finite() {
                f64::NAN
            } else {
                n / d.max(f)
            }
        })
        .collect()
}

/// Clamp the benchmark power term to [-pmax, pmax]; NaN passes through.
pub fn clip_power(power: &[f64], pmax: f64) -> Vec<f64> {
    power
        .iter()
        .map(|&p| if p.is_finite() { p.clamp(-pmax, pmax) } else { f64::NAN })
        .collect()
}

/// Smoothed magnitude of the first-difference series, the scale term for
/// RRV/RVE. d[0] is pinned to 0; winsorization clamps finite differences to
/// the configured quantiles before smoothing.
pub fn variance_proxy(
    x: &[f64],
    length: usize,
    mode: VarMode,
    winsorize: Option<(f64, f64)>,
) -> Vec<f64> {
    if x.is_empty() {
        return Vec::new();
    }
    let mut d = Vec::with_capacity(x.len());
    d.push(0.0);
    for i in 1..x.len() {
        d.push(x[i] - x[i - 1]);
    }

    if let Some((q_low, q_high)) = winsorize {
        let lo = quantile_of(&d, q_low);
        let hi = quantile_of(&d, q_high);
        if lo.is_finite() && hi.is_finite() && lo <= hi {
            for v in d.iter_mut() {
                if v.is_finite() {
                    *v = v.clamp(lo, hi);
                }
            }
        }
    }

    match mode {
        VarMode::Abs => {
            let abs: Vec<f64> = d.iter().map(|v| v.abs()).collect();
            wilders_rma(&abs, length)
        }
        VarMode::Rms => {
            let squared: Vec<f64> = d.iter().map(|v| v * v).collect();
            wilders_rma(&squared, length)
                .into_iter()
                .map(f64::sqrt)
                .collect()
        }
    }
}

/* ------------------------------------------------------------------ */
/* Indicators                                                         */
/* ------------------------------------------------------------------ */

/// Shared relative core:
///   power    = clip(safe_div(ben_move, ben_scale, floor_b))
///   expected = power * sym_scale
///   value    = safe_div(sym_move - expected, sym_scale, floor_s)
fn relative_series(
    sym_move: &[f64],
    sym_scale: &[f64],
    ben_move: &[f64],
    ben_scale: &[f64],
    params: &IndicatorParams,
) -> Vec<f64> {
    let ben_floor = rolling_floor(ben_scale, params.floor_window, params.floor_quantile);
    let sym_floor = rolling_floor(sym_scale, params.floor_window, params.floor_quantile);

    let power = clip_power(
        &safe_div(ben_move, ben_scale, &ben_floor),
        params.pmax,
    );

    let raw: Vec<f64> = sym_move
        .iter()
        .zip(&power)
        .zip(sym_scale)
        .map(|((&m, &p), &s)| m - p * s)
        .collect();

    safe_div(&raw, sym_scale, &sym_floor)
}

/// Relative return strength: moves of close scaled by ATR.
pub fn rrs(sym: &Ohlc<'_>, ben: &Ohlc<'_>, params: &IndicatorParams) -> Vec<f64> {
    let sym_scale = wilders_rma(&true_range(sym.high, sym.low, sym.close), params.length);
    let ben_scale = wilders_rma(&true_range(ben.high, ben.low, ben.close), params.length);

    let (sym_move, ben_move) = if params.pct_atr {
        (
            rolling_log_move(sym.close, params.length),
            rolling_log_move(ben.close, params.length),
        )
    } else {
        (
            rolling_move(sym.close, params.length),
            rolling_move(ben.close, params.length),
        )
    };

    relative_series(&sym_move, &sym_scale, &ben_move, &ben_scale, params)
}

/// Relative volume: smoothed (optionally log-compressed) volume moves
/// scaled by the variance proxy.
pub fn rrv(sym_volume: &[f64], ben_volume: &[f64], params: &IndicatorParams) -> Vec<f64> {
    let mut v_sym = sma(sym_volume, params.smooth);
    let mut v_ben = sma(ben_volume, params.smooth);

    if params.use_log_volume {
        for v in v_sym.iter_mut() {
            *v = v.max(1.0).ln();
        }
        for v in v_ben.iter_mut() {
            *v = v.max(1.0).ln();
        }
    }

    let sym_move = rolling_move(&v_sym, params.length);
    let ben_move = rolling_move(&v_ben, params.length);
    let sym_scale = variance_proxy(&v_sym, params.length, params.var_mode, params.winsorize);
    let ben_scale = variance_proxy(&v_ben, params.length, params.var_mode, params.winsorize);

    relative_series(&sym_move, &sym_scale, &ben_move, &ben_scale, params)
}

/// Relative volatility expansion: moves of the ATR itself scaled by its
/// variance proxy.
pub fn rve(sym: &Ohlc<'_>, ben: &Ohlc<'_>, params: &IndicatorParams) -> Vec<f64> {
    let mut sym_atr = wilders_rma(&true_range(sym.high, sym.low, sym.close), params.atr_period);
    let mut ben_atr = wilders_rma(&true_range(ben.high, ben.low, ben.close), params.atr_period);

    if params.smooth_atr > 1 {
        sym_atr = sma(&sym_atr, params.smooth_atr);
        ben_atr = sma(&ben_atr, params.smooth_atr);
    }

    let sym_move = rolling_move(&sym_atr, params.length);
    let ben_move = rolling_move(&ben_atr, params.length);
    let sym_scale = variance_proxy(&sym_atr, params.length, params.var_mode, params.winsorize);
    let ben_scale = variance_proxy(&ben_atr, params.length, params.var_mode, params.winsorize);

    relative_series(&sym_move, &sym_scale, &ben_move, &ben_scale, params)
}

/* ------------------------------------------------------------------ */
/* Classification                                                     */
/* ------------------------------------------------------------------ */

/// Strict upward transition over `level` between the last two samples.
pub fn crosses_up(series: &[f64], level: f64) -> bool {
    if series.len() < 2 {
        return false;
    }
    let prev = series[series.len() - 2];
    let last = series[series.len() - 1];
    prev <= level && last > level
}

/// Strict downward transition over `level` between the last two samples.
pub fn crosses_down(series: &[f64], level: f64) -> bool {
    if series.len() < 2 {
        return false;
    }
    let prev = series[series.len() - 2];
    let last = series[series.len() - 1];
    prev >= level && last < level
}

/// Maps the last indicator values (plus the RRS history needed for
/// zero-cross detection) into a discrete signal. Rules are ordered.
pub fn classify(rrs_val: f64, rrv_val: f64, rve_val: f64, rrs_series: &[f64]) -> Signal {
    if crosses_up(rrs_series, 0.0) && rrv_val > 0.0 && rve_val > 0.0 {
        return Signal::TriggerLong;
    }
    if crosses_down(rrs_series, 0.0) && rrv_val < 0.0 && rve_val < 0.0 {
        return Signal::TriggerShort;
    }
    let rising = rrs_series.len() > 1
        && rrs_series[rrs_series.len() - 1] > rrs_series[rrs_series.len() - 2];
    if rve_val > 0.0 && rrv_val > 0.0 && rrs_val < 0.0 && rising {
        return Signal::Watch;
    }
    if crosses_down(rrs_series, 0.0) || rve_val < 0.0 || rrv_val < 0.0 {
        return Signal::ExitAvoid;
    }
    Signal::Neutral
}

/* ------------------------------------------------------------------ */
/* Unit Tests                                                         */
/* ------------------------------------------------------------------ */
#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f64], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            assert!(
                (a - e).abs() < 1e-9,
                "expected {e}, got {a} (series {actual:?})"
            );
        }
    }

    fn ramp(start: f64, end: f64, n: usize) -> Vec<f64> {
        let step = (end - start) / (n as f64 - 1.0);
        (0..n).map(|i| start + step * i as f64).collect()
    }

    #[test]
    fn wilders_rma_basic() {
        let out = wilders_rma(&[1.0, 2.0, 3.0], 2);
        assert_close(&out, &[1.0, 1.5, 2.25]);
    }

    #[test]
    fn wilders_rma_constant_is_idempotent() {
        let out = wilders_rma(&[2.0; 6], 3);
        assert_close(&out, &[2.0; 6]);
    }

    #[test]
    fn true_range_basic() {
        let tr = true_range(
            &[10.0, 12.0, 11.0],
            &[8.0, 9.0, 9.5],
            &[9.0, 10.0, 10.5],
        );
        // i=0: prev_close = close[0], so TR[0] = high - low.
        assert_close(&tr, &[2.0, 3.0, 1.5]);
    }

    #[test]
    fn true_range_gap_uses_prev_close() {
        let tr = true_range(&[115.0], &[108.0], &[112.0]);
        assert_close(&tr, &[7.0]);
        let tr = true_range(&[105.0, 115.0], &[95.0, 108.0], &[95.0, 112.0]);
        // gap up: |115 - 95| = 20 dominates the 7-point bar range
        assert_close(&tr, &[10.0, 20.0]);
    }

    #[test]
    fn rolling_move_warmup_and_values() {
        let out = rolling_move(&[1.0, 2.0, 4.0, 7.0], 2);
        assert_eq!(out.len(), 4);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
        assert_close(&out[2..], &[3.0, 5.0]);
    }

    #[test]
    fn rolling_move_length_matches_input() {
        for n in [1usize, 5, 13, 40] {
            let x: Vec<f64> = (0..n).map(|i| i as f64).collect();
            assert_eq!(rolling_move(&x, 12).len(), n);
        }
    }

    #[test]
    fn safe_div_scalar_floor() {
        let out = safe_div(&[1.0, 2.0, 3.0], &[0.0, 0.5, 2.0], &[1.0, 1.0, 1.0]);
        assert_close(&out, &[1.0, 2.0, 1.5]);
    }

    #[test]
    fn safe_div_per_index_floor() {
        let out = safe_div(&[1.0, 2.0, 3.0], &[0.0, 0.5, 2.0], &[0.2, 0.6, 0.1]);
        assert_close(&out, &[5.0, 2.0 / 0.6, 1.5]);
    }

    #[test]
    fn safe_div_never_infinite_with_positive_floor() {
        let out = safe_div(&[1.0, -1.0, 1e300], &[0.0, 0.0, 0.0], &[1e-6; 3]);
        assert!(out.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn safe_div_propagates_unknown() {
        let out = safe_div(&[f64::NAN, 1.0], &[1.0, f64::INFINITY], &[1.0, 1.0]);
        assert!(out[0].is_nan());
        assert!(out[1].is_nan());
    }

    #[test]
    fn clip_power_range() {
        let out = clip_power(&[-100.0, -5.0, 0.0, 5.0, 100.0], 10.0);
        assert_close(&out, &[-10.0, -5.0, 0.0, 5.0, 10.0]);
        assert!(clip_power(&[f64::NAN], 10.0)[0].is_nan());
    }

    #[test]
    fn rolling_floor_shape_and_positivity() {
        let series = ramp(1.0, 10.0, 100);
        let floor = rolling_floor(&series, 20, 0.05);
        assert_eq!(floor.len(), series.len());
        assert!(floor.iter().all(|v| *v > 0.0));
    }

    #[test]
    fn rolling_floor_short_series_scalar_fallback() {
        let series = ramp(1.0, 10.0, 50);
        let floor = rolling_floor(&series, 252, 0.05);
        assert!(floor.windows(2).all(|w| w[0] == w[1]));
        assert!(floor[0] > 0.0);
    }

    #[test]
    fn variance_proxy_modes_differ() {
        let mut vol = vec![1000.0; 40];
        vol.extend(vec![5000.0; 40]);
        let abs = variance_proxy(&vol, 12, VarMode::Abs, None);
        let rms = variance_proxy(&vol, 12, VarMode::Rms, None);
        let diverges = abs
            .iter()
            .zip(&rms)
            .any(|(a, r)| a.is_finite() && r.is_finite() && (a - r).abs() > 1e-9);
        assert!(diverges);
    }

    #[test]
    fn variance_proxy_winsorize_tames_spike() {
        let mut x = vec![100.0; 60];
        x[30] = 10_000.0;
        let plain = variance_proxy(&x, 12, VarMode::Abs, None);
        let clamped = variance_proxy(&x, 12, VarMode::Abs, Some((0.05, 0.95)));
        assert!(clamped[35] < plain[35]);
    }

    fn ramp_ohlc(base: f64, n: usize) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
        let close = ramp(base, base + n as f64 - 1.0, n);
        let high: Vec<f64> = close.iter().map(|c| c + 1.0).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 1.0).collect();
        (high, low, close)
    }

    #[test]
    fn indicators_warmup_is_unknown() {
        let n = 40;
        let (sh, sl, sc) = ramp_ohlc(100.0, n);
        let (bh, bl, bc) = ramp_ohlc(200.0, n);
        let sym = Ohlc { high: &sh, low: &sl, close: &sc };
        let ben = Ohlc { high: &bh, low: &bl, close: &bc };
        let params = IndicatorParams::default();

        let rrs_series = rrs(&sym, &ben, &params);
        let rrv_series = rrv(&ramp(1000.0, 2000.0, n), &ramp(1500.0, 2500.0, n), &params);
        let rve_series = rve(&sym, &ben, &params);

        for series in [&rrs_series, &rrv_series, &rve_series] {
            assert_eq!(series.len(), n);
            assert!(series[..params.length].iter().any(|v| v.is_nan()));
        }
    }

    #[test]
    fn indicators_finite_after_warmup() {
        let n = 60;
        let (sh, sl, sc) = ramp_ohlc(100.0, n);
        let (bh, bl, bc) = ramp_ohlc(200.0, n);
        let sym = Ohlc { high: &sh, low: &sl, close: &sc };
        let ben = Ohlc { high: &bh, low: &bl, close: &bc };
        let params = IndicatorParams::default();

        assert!(rrs(&sym, &ben, &params).last().unwrap().is_finite());
        assert!(rve(&sym, &ben, &params).last().unwrap().is_finite());
        let rrv_series = rrv(&ramp(1000.0, 2000.0, n), &ramp(1500.0, 2500.0, n), &params);
        assert!(rrv_series.last().unwrap().is_finite());
    }

    #[test]
    fn crosses_detection() {
        assert!(crosses_up(&[-0.5, -0.1, 0.2], 0.0));
        assert!(!crosses_down(&[-0.5, -0.1, 0.2], 0.0));
        assert!(crosses_down(&[0.5, 0.1, -0.2], 0.0));
        assert!(!crosses_up(&[0.5, 0.1, -0.2], 0.0));
        assert!(!crosses_up(&[0.2], 0.0));
    }

    #[test]
    fn classify_trigger_long() {
        assert_eq!(classify(0.2, 1.0, 1.0, &[-0.1, 0.2]), Signal::TriggerLong);
    }

    #[test]
    fn classify_trigger_short() {
        assert_eq!(
            classify(-0.2, -1.0, -1.0, &[0.2, -0.2]),
            Signal::TriggerShort
        );
    }

    #[test]
    fn classify_watch() {
        assert_eq!(classify(-0.2, 1.0, 1.0, &[-0.5, -0.2]), Signal::Watch);
    }

    #[test]
    fn classify_exit_avoid() {
        assert_eq!(classify(-0.1, -0.1, 0.1, &[0.1, -0.1]), Signal::ExitAvoid);
    }

    #[test]
    fn classify_neutral() {
        assert_eq!(classify(0.1, 0.0, 0.0, &[0.1, 0.1]), Signal::Neutral);
    }
}
