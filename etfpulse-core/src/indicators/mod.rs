//! Technical indicator calculator.
//!
//! `compute` turns a chronologically ordered close series (oldest first)
//! into a fixed `IndicatorSet`: SMA(20), SMA(50), EMA(20), EMA(50), RSI(14)
//! and MACD(12, 26, 9). Every value is a single scalar over the full
//! available window. The calculator is pure and deterministic.
//!
//! `IndicatorStep` wires the calculator into the engine as the post-process
//! for the technical category, and is where too-short histories are
//! rejected as a fetch failure.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;

pub use ema::{ema, ema_of_series};
pub use macd::{macd, Macd};
pub use rsi::rsi;
pub use sma::sma;

use crate::data::provider::{FetchError, Payload, PostProcess, TechnicalSnapshot};
use serde::{Deserialize, Serialize};

/// Fewer closes than this is treated as a failed fetch, not computed.
pub const MIN_CLOSES: usize = 14;

/// Scalar indicator values for one instrument.
///
/// SMA windows longer than the series are undefined and serialize as `null`.
/// EMA and MACD are defined for any non-empty series (seeded by the first
/// close). Values are NaN only if `compute` is called with fewer than two
/// closes, which `IndicatorStep` never does.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IndicatorSet {
    #[serde(rename = "SMA_20")]
    pub sma_20: Option<f64>,
    #[serde(rename = "SMA_50")]
    pub sma_50: Option<f64>,
    #[serde(rename = "EMA_20")]
    pub ema_20: f64,
    #[serde(rename = "EMA_50")]
    pub ema_50: f64,
    #[serde(rename = "RSI_14")]
    pub rsi_14: f64,
    #[serde(rename = "MACD")]
    pub macd: f64,
    #[serde(rename = "MACD_Signal")]
    pub macd_signal: f64,
    #[serde(rename = "MACD_Hist")]
    pub macd_hist: f64,
}

/// Compute the full indicator set over `closes`.
pub fn compute(closes: &[f64]) -> IndicatorSet {
    let m = macd(closes, 12, 26, 9);
    IndicatorSet {
        sma_20: sma(closes, 20),
        sma_50: sma(closes, 50),
        ema_20: ema(closes, 20).unwrap_or(f64::NAN),
        ema_50: ema(closes, 50).unwrap_or(f64::NAN),
        rsi_14: rsi(closes, 14).unwrap_or(f64::NAN),
        macd: m.map_or(f64::NAN, |m| m.line),
        macd_signal: m.map_or(f64::NAN, |m| m.signal),
        macd_hist: m.map_or(f64::NAN, |m| m.histogram),
    }
}

/// Post-process turning a `PriceHistory` payload into a `TechnicalSnapshot`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IndicatorStep;

impl PostProcess for IndicatorStep {
    fn name(&self) -> &str {
        "technical_indicators"
    }

    fn apply(&self, symbol: &str, payload: Payload) -> Result<Payload, FetchError> {
        let history = match payload {
            Payload::History(history) => history,
            other => {
                return Err(FetchError::UnexpectedPayload {
                    step: self.name().to_string(),
                    got: other.kind(),
                })
            }
        };

        if history.closes.len() < MIN_CLOSES {
            return Err(FetchError::InsufficientHistory {
                symbol: symbol.to_string(),
                have: history.closes.len(),
                need: MIN_CLOSES,
            });
        }

        Ok(Payload::Technical(TechnicalSnapshot {
            technical_indicators: compute(&history.closes),
            observations: history.closes.len(),
        }))
    }
}

/// Assert two f64 values are approximately equal (within epsilon).
#[cfg(test)]
pub fn assert_approx(actual: f64, expected: f64, epsilon: f64) {
    assert!(
        (actual - expected).abs() < epsilon,
        "assert_approx failed: actual={actual}, expected={expected}, diff={}, epsilon={epsilon}",
        (actual - expected).abs()
    );
}

/// Default epsilon for indicator tests.
#[cfg(test)]
pub const DEFAULT_EPSILON: f64 = 1e-10;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::provider::PriceHistory;

    #[test]
    fn constant_series_indicator_values() {
        let set = compute(&vec![100.0; 60]);
        assert_eq!(set.sma_20, Some(100.0));
        assert_eq!(set.sma_50, Some(100.0));
        assert_eq!(set.ema_20, 100.0);
        assert_eq!(set.ema_50, 100.0);
        assert_eq!(set.rsi_14, 100.0);
        assert_eq!(set.macd, 0.0);
        assert_eq!(set.macd_signal, 0.0);
        assert_eq!(set.macd_hist, 0.0);
    }

    #[test]
    fn short_series_leaves_long_sma_undefined() {
        let closes: Vec<f64> = (0..30).map(|i| 50.0 + i as f64).collect();
        let set = compute(&closes);
        assert!(set.sma_20.is_some());
        assert_eq!(set.sma_50, None);
        assert!(set.ema_50.is_finite());
        assert!(set.rsi_14.is_finite());
    }

    #[test]
    fn compute_is_deterministic() {
        let closes: Vec<f64> = (0..250).map(|i| 100.0 + (i as f64 * 0.37).sin() * 7.0).collect();
        let a = compute(&closes);
        let b = compute(&closes);
        assert_eq!(a.ema_50.to_bits(), b.ema_50.to_bits());
        assert_eq!(a.rsi_14.to_bits(), b.rsi_14.to_bits());
        assert_eq!(a.macd_hist.to_bits(), b.macd_hist.to_bits());
    }

    #[test]
    fn indicator_keys_match_wire_format() {
        let v = serde_json::to_value(compute(&[1.0, 2.0, 3.0])).unwrap();
        for key in ["SMA_20", "SMA_50", "EMA_20", "EMA_50", "RSI_14", "MACD", "MACD_Signal", "MACD_Hist"] {
            assert!(v.get(key).is_some(), "missing key {key}");
        }
        assert!(v["SMA_20"].is_null());
    }

    #[test]
    fn step_rejects_short_history() {
        let payload = Payload::History(PriceHistory {
            closes: vec![1.0; MIN_CLOSES - 1],
        });
        assert_eq!(
            IndicatorStep.apply("SPY", payload).unwrap_err(),
            FetchError::InsufficientHistory {
                symbol: "SPY".into(),
                have: MIN_CLOSES - 1,
                need: MIN_CLOSES,
            }
        );
    }

    #[test]
    fn step_rejects_wrong_payload() {
        let payload = Payload::Metadata(crate::data::provider::ExtendedMetadata {
            recommendations: vec![],
            calendar: serde_json::Value::Null,
        });
        assert!(matches!(
            IndicatorStep.apply("SPY", payload),
            Err(FetchError::UnexpectedPayload { got: "metadata", .. })
        ));
    }

    #[test]
    fn step_produces_technical_snapshot() {
        let payload = Payload::History(PriceHistory {
            closes: vec![100.0; 60],
        });
        match IndicatorStep.apply("SPY", payload).unwrap() {
            Payload::Technical(snap) => {
                assert_eq!(snap.observations, 60);
                assert_eq!(snap.technical_indicators.rsi_14, 100.0);
            }
            other => panic!("expected technical payload, got {}", other.kind()),
        }
    }
}
