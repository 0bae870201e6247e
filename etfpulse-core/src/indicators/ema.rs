//! Exponential Moving Average (EMA).
//!
//! Recursive: EMA[t] = EMA[t-1] + alpha * (close[t] - EMA[t-1]), alpha = 2 / (period + 1).
//! Seed: EMA[0] = close[0]. No simple-average warm-up, so every index
//! carries a value.

/// Full EMA series of `values`, same length as the input.
pub fn ema_of_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    smooth(values, alpha)
}

/// Final EMA value, or `None` for an empty series.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    ema_of_series(values, period).last().copied()
}

/// Exponential smoothing with an explicit factor, seeded by the first value.
///
/// Shared by EMA (alpha = 2/(n+1)) and Wilder smoothing (alpha = 1/n).
pub(crate) fn smooth(values: &[f64], alpha: f64) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    let mut iter = values.iter();
    let Some(&first) = iter.next() else {
        return result;
    };

    let mut prev = first;
    result.push(prev);
    for &v in iter {
        prev += alpha * (v - prev);
        result.push(prev);
    }
    result
}
