// =============================================================================
// Simple Moving Average (SMA)
// =============================================================================
//
// SMA_t = (close_{t-window+1} + ... + close_t) / window
//
// Computed as a rolling compensated sum: O(n) regardless of the window.
// =============================================================================

use super::{ensure_len, ensure_positive, CompensatedSum, IndicatorError};

/// Compute the SMA series of `values` over `window`.
///
/// Output element `i` covers `values[i..i + window]`, so the series has
/// `values.len() - window + 1` elements.
pub fn calculate_sma(values: &[f64], window: usize) -> Result<Vec<f64>, IndicatorError> {
    ensure_positive("window", window)?;
    ensure_len(values.len(), window)?;

    let n = window as f64;
    let mut acc = CompensatedSum::default();
    for &v in &values[..window] {
        acc.add(v);
    }

    let mut result = Vec::with_capacity(values.len() - window + 1);
    result.push(acc.value() / n);

    for i in window..values.len() {
        acc.add(values[i]);
        acc.add(-values[i - window]);
        result.push(acc.value() / n);
    }

    Ok(result)
}
