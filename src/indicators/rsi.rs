// =============================================================================
// Relative Strength Index (RSI) — Wilder's Smoothing
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes.
//
// Step 1: Compute price changes (deltas) from consecutive closes.
// Step 2: Seed average gain / average loss with the SMA of the first `period`
//          gains / losses.
// Step 3: Apply Wilder's exponential smoothing:
//            avg_gain = (prev_avg_gain * (period - 1) + current_gain) / period
//            avg_loss = (prev_avg_loss * (period - 1) + current_loss) / period
// Step 4: RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
// =============================================================================

use super::{ensure_len, ensure_positive, IndicatorError};

/// Compute the full RSI series for the given `closes` and `period`.
///
/// The returned vector has one RSI value for each close starting at index
/// `period` (the first `period` deltas seed the averages), so it has
/// `closes.len() - period` elements.
///
/// # Edge cases
/// - `period == 0` => `InvalidParameter`
/// - `closes.len() < period + 1` => `InsufficientData`
/// - If average loss is zero (no down moves), RSI is 100.0.
/// - If there is no movement at all, RSI is 50.0.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Result<Vec<f64>, IndicatorError> {
    ensure_positive("period", period)?;
    ensure_len(closes.len(), period + 1)?;

    // --- Compute price deltas ------------------------------------------------
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();

    // --- Seed averages with SMA of first `period` deltas ---------------------
    let (sum_gain, sum_loss) = deltas[..period].iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
        if d > 0.0 {
            (g + d, l)
        } else {
            (g, l + d.abs())
        }
    });

    let period_f = period as f64;
    let mut avg_gain = sum_gain / period_f;
    let mut avg_loss = sum_loss / period_f;

    let mut result = Vec::with_capacity(deltas.len() - period + 1);
    result.push(rsi_from_averages(avg_gain, avg_loss));

    // --- Wilder's smoothing for subsequent values ----------------------------
    for &delta in &deltas[period..] {
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { delta.abs() } else { 0.0 };

        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;

        result.push(rsi_from_averages(avg_gain, avg_loss));
    }

    Ok(result)
}

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    let rsi = if avg_loss == 0.0 && avg_gain == 0.0 {
        50.0 // No movement at all: neutral.
    } else if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.clamp(0.0, 100.0)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_err());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(matches!(
            calculate_rsi(&[1.0, 2.0, 3.0], 0),
            Err(IndicatorError::InvalidParameter { name: "period", .. })
        ));
    }

    #[test]
    fn rsi_insufficient_data() {
        // Need period+1 closes (period deltas). 14 closes => 13 deltas < 14.
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        assert_eq!(
            calculate_rsi(&closes, 14),
            Err(IndicatorError::InsufficientData {
                required: 15,
                available: 14
            })
        );
    }

    #[test]
    fn rsi_boundary_on_five_closes() {
        let closes = [10.0, 12.0, 11.0, 13.0, 15.0];
        assert_eq!(calculate_rsi(&closes, 4).unwrap().len(), 1);
        assert!(matches!(
            calculate_rsi(&closes, 5),
            Err(IndicatorError::InsufficientData {
                required: 6,
                available: 5
            })
        ));
    }

    #[test]
    fn rsi_known_values() {
        // deltas +2, -1, +2, +2; seed gain 1.0, loss 0.5.
        let rsi = calculate_rsi(&[10.0, 12.0, 11.0, 13.0, 15.0], 2).unwrap();
        let expected = [200.0 / 3.0, 600.0 / 7.0, 1400.0 / 15.0];
        assert_eq!(rsi.len(), expected.len());
        for (a, b) in rsi.iter().zip(expected.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14).unwrap();
        assert_eq!(series.len(), 16);
        for &v in &series {
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn rsi_all_losses() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14).unwrap();
        for &v in &series {
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn rsi_flat_market() {
        let closes = vec![100.0; 30];
        let series = calculate_rsi(&closes, 14).unwrap();
        for &v in &series {
            assert!((v - 50.0).abs() < 1e-10, "expected 50.0, got {v}");
        }
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        for period in 1..closes.len() {
            for &v in &calculate_rsi(&closes, period).unwrap() {
                assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
            }
        }
    }

    #[test]
    fn rsi_range_check_on_extreme_moves() {
        let closes: Vec<f64> = (0..500)
            .map(|i| {
                let scale = if i % 2 == 0 { 1e-9 } else { 1e9 };
                scale * (1.0 + i as f64)
            })
            .collect();
        for &v in &calculate_rsi(&closes, 3).unwrap() {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }
}
