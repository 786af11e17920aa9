// =============================================================================
// Bollinger Bands
// =============================================================================
//
// Bollinger Bands consist of a middle band (SMA), an upper band (SMA + k*σ),
// and a lower band (SMA - k*σ), where σ is the population standard deviation
// of the same window.  σ is computed two-pass per window around the
// compensated mean, so the bands stay accurate on large, nearly flat prices.

use serde::{Deserialize, Serialize};

use super::sma::calculate_sma;
use super::{ensure_len, ensure_positive, IndicatorError};

/// Band series; element `i` covers `closes[i..i + period]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BollingerSeries {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Calculate rolling Bollinger Bands for the given closing prices.
pub fn calculate_bollinger(
    closes: &[f64],
    period: usize,
    num_std: f64,
) -> Result<BollingerSeries, IndicatorError> {
    ensure_positive("period", period)?;
    if !(num_std.is_finite() && num_std > 0.0) {
        return Err(IndicatorError::InvalidParameter {
            name: "std_dev",
            value: num_std,
        });
    }
    ensure_len(closes.len(), period)?;

    let middle = calculate_sma(closes, period)?;
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for (i, &mid) in middle.iter().enumerate() {
        let window = &closes[i..i + period];
        let variance = window.iter().map(|x| (x - mid).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.max(0.0).sqrt();
        upper.push(mid + num_std * std_dev);
        lower.push(mid - num_std * std_dev);
    }

    Ok(BollingerSeries {
        upper,
        middle,
        lower,
    })
}
