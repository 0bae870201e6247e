//! Simple Moving Average (SMA).
//!
//! Arithmetic mean of the last `period` closes. Undefined when the series
//! is shorter than the window.

/// SMA over the final window of `values`, or `None` if fewer than `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if period == 0 || values.len() < period {
        return None;
    }
    let window = &values[values.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}
