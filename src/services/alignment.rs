// src/services/alignment.rs

use crate::db::models::CandleSeries;

/// Minimum common history required before a symbol/benchmark pair is worth
/// running through the kernel.
pub const MIN_ALIGNED_BARS: usize = 30;

/// Intersects two candle series on their timestamps and gathers both onto
/// the common key sequence. Inputs are expected ascending by ts (the store
/// and cache both guarantee it); duplicate timestamps collapse to their
/// first occurrence.
pub fn align(
    sym: &CandleSeries,
    ben: &CandleSeries,
) -> (CandleSeries, CandleSeries, Vec<i64>) {
    let mut sym_out = CandleSeries::default();
    let mut ben_out = CandleSeries::default();
    let mut common = Vec::new();

    let (mut i, mut j) = (0usize, 0usize);
    while i < sym.len() && j < ben.len() {
        let (a, b) = (sym.ts[i], ben.ts[j]);
        if a < b {
            i += 1;
        } else if b < a {
            j += 1;
        } else {
            push_row(&mut sym_out, sym, i);
            push_row(&mut ben_out, ben, j);
            common.push(a);
            let ts = a;
            while i < sym.len() && sym.ts[i] == ts {
                i += 1;
            }
            while j < ben.len() && ben.ts[j] == ts {
                j += 1;
            }
        }
    }

    (sym_out, ben_out, common)
}

fn push_row(out: &mut CandleSeries, src: &CandleSeries, idx: usize) {
    out.ts.push(src.ts[idx]);
    out.open.push(src.open[idx]);
    out.high.push(src.high[idx]);
    out.low.push(src.low[idx]);
    out.close.push(src.close[idx]);
    out.volume.push(src.volume[idx]);
}
