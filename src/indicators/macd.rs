// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   macd      = EMA(fast) - EMA(slow)    on the dates both EMAs cover
//   signal    = EMA(signal) of macd
//   histogram = macd - signal
//
// The three returned series are aligned on the signal line: element 0 covers
// input index `max(fast, slow) + signal - 2`.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::ema::calculate_ema;
use super::{ensure_len, ensure_positive, IndicatorError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacdSeries {
    pub macd: Vec<f64>,
    pub signal: Vec<f64>,
    pub histogram: Vec<f64>,
}

impl MacdSeries {
    pub fn len(&self) -> usize {
        self.signal.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signal.is_empty()
    }
}

/// Index of the first input bar covered by the output of [`calculate_macd`].
pub fn macd_offset(fast: usize, slow: usize, signal: usize) -> usize {
    fast.max(slow) + signal - 2
}

pub fn calculate_macd(
    closes: &[f64],
    fast: usize,
    slow: usize,
    signal: usize,
) -> Result<MacdSeries, IndicatorError> {
    ensure_positive("fast_period", fast)?;
    ensure_positive("slow_period", slow)?;
    ensure_positive("signal_period", signal)?;

    let lead = fast.max(slow);
    ensure_len(closes.len(), lead + signal)?;

    let fast_ema = calculate_ema(closes, fast)?;
    let slow_ema = calculate_ema(closes, slow)?;

    // fast_ema[j] covers close index j + fast - 1; same for slow.
    let line: Vec<f64> = (lead - 1..closes.len())
        .map(|i| fast_ema[i + 1 - fast] - slow_ema[i + 1 - slow])
        .collect();

    let signal_line = calculate_ema(&line, signal)?;
    let macd = line[signal - 1..].to_vec();
    let histogram = macd
        .iter()
        .zip(signal_line.iter())
        .map(|(m, s)| m - s)
        .collect();

    Ok(MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    })
}
