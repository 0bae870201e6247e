//! Moving Average Convergence Divergence (MACD).
//!
//! line = EMA(fast) - EMA(slow), computed per index
//! signal = EMA(signal_period) of the line series
//! histogram = line - signal
//! Only the final values are reported.

use super::ema::ema_of_series;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Final MACD values, or `None` for an empty series.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal_period: usize) -> Option<Macd> {
    let fast_ema = ema_of_series(values, fast);
    let slow_ema = ema_of_series(values, slow);
    let line: Vec<f64> = fast_ema.iter().zip(&slow_ema).map(|(f, s)| f - s).collect();
    let signal_series = ema_of_series(&line, signal_period);

    let line = *line.last()?;
    let signal = *signal_series.last()?;
    Some(Macd {
        line,
        signal,
        histogram: line - signal,
    })
}
