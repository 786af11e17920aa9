// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators the service
// exposes.  Every function works on a borrowed slice of closes, allocates only
// its output, and reports insufficient history or bad windows through
// `IndicatorError` so callers can surface a precise client error.
//
// Output of a trailing-window indicator starts at the first bar whose window
// is complete; `IndicatorOutput::offset` records that index so the caller can
// line values up with dates.

pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod rsi;
pub mod sma;
pub mod spec;

pub use spec::{IndicatorOutput, IndicatorSpec, IndicatorValues};

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum IndicatorError {
    #[error("{name} must be positive, got {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("needs {required} bars, only {available} available")]
    InsufficientData { required: usize, available: usize },
}

pub(crate) fn ensure_positive(name: &'static str, window: usize) -> Result<(), IndicatorError> {
    if window == 0 {
        return Err(IndicatorError::InvalidParameter { name, value: 0.0 });
    }
    Ok(())
}

pub(crate) fn ensure_len(available: usize, required: usize) -> Result<(), IndicatorError> {
    if available < required {
        return Err(IndicatorError::InsufficientData {
            required,
            available,
        });
    }
    Ok(())
}

/// Neumaier-compensated running sum.  Keeps rolling windows exact to within
/// one rounding step no matter how many values have been added and removed.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct CompensatedSum {
    sum: f64,
    compensation: f64,
}

impl CompensatedSum {
    pub(crate) fn add(&mut self, x: f64) {
        let t = self.sum + x;
        if self.sum.abs() >= x.abs() {
            self.compensation += (self.sum - t) + x;
        } else {
            self.compensation += (x - t) + self.sum;
        }
        self.sum = t;
    }

    pub(crate) fn value(&self) -> f64 {
        self.sum + self.compensation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compensated_sum_survives_cancellation() {
        let mut acc = CompensatedSum::default();
        for x in [1e16, 1.0, -1e16, 1.0] {
            acc.add(x);
        }
        assert_eq!(acc.value(), 2.0);
    }

    #[test]
    fn compensated_sum_rolling_window_matches_fresh_sum() {
        let closes: Vec<f64> = (0..10_000).map(|i| 100.0 + (i as f64 * 0.37).sin()).collect();
        let window = 50;
        let mut acc = CompensatedSum::default();
        for &c in &closes[..window] {
            acc.add(c);
        }
        for i in window..closes.len() {
            acc.add(closes[i]);
            acc.add(-closes[i - window]);
        }
        let fresh: f64 = closes[closes.len() - window..].iter().sum();
        assert!((acc.value() - fresh).abs() < 1e-9);
    }
}
