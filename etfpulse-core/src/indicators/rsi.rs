//! Relative Strength Index (RSI).
//!
//! Per-period gains max(delta, 0) and losses max(-delta, 0) are smoothed
//! separately with Wilder smoothing (alpha = 1/period, center of mass
//! period - 1), each seeded by its first value.
//! RSI = 100 - 100 / (1 + avg_gain / avg_loss)
//! Edge case: avg_loss == 0 → RSI = 100, including a flat series.

use super::ema::smooth;

/// Final RSI value, or `None` when there are fewer than two closes.
pub fn rsi(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < 2 || period == 0 {
        return None;
    }

    let (gains, losses): (Vec<f64>, Vec<f64>) = values
        .windows(2)
        .map(|w| {
            let delta = w[1] - w[0];
            (delta.max(0.0), (-delta).max(0.0))
        })
        .unzip();

    let alpha = 1.0 / period as f64;
    let avg_gain = *smooth(&gains, alpha).last()?;
    let avg_loss = *smooth(&losses, alpha).last()?;
    Some(compute_rsi(avg_gain, avg_loss))
}

fn compute_rsi(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        100.0
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::{assert_approx, DEFAULT_EPSILON};

    #[test]
    fn rsi_all_gains() {
        let v = rsi(&[100.0, 101.0, 102.0, 103.0, 104.0, 105.0], 3).unwrap();
        assert_approx(v, 100.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_all_losses() {
        let v = rsi(&[105.0, 104.0, 103.0, 102.0, 101.0, 100.0], 3).unwrap();
        assert_approx(v, 0.0, DEFAULT_EPSILON);
    }

    #[test]
    fn rsi_flat_series_saturates() {
        let closes = vec![100.0; 60];
        assert_eq!(rsi(&closes, 14), Some(100.0));
    }

    #[test]
    fn rsi_mixed_known_value() {
        // Closes: 44, 44.34, 44.09, 43.61, 44.33, period 3 → alpha = 1/3
        // gains:  0.34, 0, 0, 0.72
        // losses: 0, 0.25, 0.48, 0
        // avg_gain: 0.34 → 0.226667 → 0.151111 → 0.340741
        // avg_loss: 0    → 0.083333 → 0.215556 → 0.143704
        // RSI = 100 - 100 / (1 + 0.340741/0.143704) = 70.3364...
        let v = rsi(&[44.0, 44.34, 44.09, 43.61, 44.33], 3).unwrap();
        assert_approx(v, 70.336_391, 1e-4);
    }

    #[test]
    fn rsi_needs_two_closes() {
        assert_eq!(rsi(&[100.0], 14), None);
        assert_eq!(rsi(&[], 14), None);
    }

    #[test]
    fn rsi_bounds() {
        let v = rsi(&[100.0, 105.0, 98.0, 110.0, 95.0, 115.0, 90.0, 120.0], 3).unwrap();
        assert!((0.0..=100.0).contains(&v), "RSI out of bounds: {v}");
    }
}
