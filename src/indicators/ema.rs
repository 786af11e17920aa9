// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (window + 1)
//   EMA_t      = close_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The very first EMA value is seeded with the SMA of the first `window` values.
// =============================================================================

use super::sma::calculate_sma;
use super::{ensure_len, ensure_positive, IndicatorError};

/// Compute the EMA series for `values` and look-back `window`.
///
/// Each output element corresponds to an input starting at index
/// `window - 1`, so the series has `values.len() - window + 1` elements.
pub fn calculate_ema(values: &[f64], window: usize) -> Result<Vec<f64>, IndicatorError> {
    ensure_positive("window", window)?;
    ensure_len(values.len(), window)?;

    let multiplier = 2.0 / (window + 1) as f64;

    // Seed: SMA of the first `window` values.
    let seed = calculate_sma(&values[..window], window)?[0];

    let mut result = Vec::with_capacity(values.len() - window + 1);
    result.push(seed);

    let mut prev_ema = seed;
    for &value in &values[window..] {
        let ema = value * multiplier + prev_ema * (1.0 - multiplier);
        result.push(ema);
        prev_ema = ema;
    }

    Ok(result)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_empty_input() {
        assert!(matches!(
            calculate_ema(&[], 5),
            Err(IndicatorError::InsufficientData { .. })
        ));
    }

    #[test]
    fn ema_window_zero() {
        assert!(matches!(
            calculate_ema(&[1.0, 2.0, 3.0], 0),
            Err(IndicatorError::InvalidParameter { .. })
        ));
    }

    #[test]
    fn ema_insufficient_data() {
        assert_eq!(
            calculate_ema(&[1.0, 2.0], 5),
            Err(IndicatorError::InsufficientData {
                required: 5,
                available: 2
            })
        );
    }

    #[test]
    fn ema_window_equals_length_is_the_mean() {
        let closes = vec![2.0, 4.0, 6.0, 9.0];
        let ema = calculate_ema(&closes, 4).unwrap();
        assert_eq!(ema.len(), 1);
        assert!((ema[0] - 5.25).abs() < 1e-10);
    }

    #[test]
    fn ema_first_value_is_seed_sma() {
        let closes: Vec<f64> = (0..40).map(|i| 20.0 + (i as f64 * 0.3).sin()).collect();
        let ema = calculate_ema(&closes, 10).unwrap();
        let seed = closes[..10].iter().sum::<f64>() / 10.0;
        assert!((ema[0] - seed).abs() < 1e-10);
        assert_eq!(ema.len(), 31);
    }

    #[test]
    fn ema_known_values() {
        // 5-window EMA of [1,2,3,4,5,6,7,8,9,10]
        // SMA of first 5 = 3.0, multiplier = 2/6 = 1/3
        let closes: Vec<f64> = (1..=10).map(|x| x as f64).collect();
        let ema = calculate_ema(&closes, 5).unwrap();
        assert_eq!(ema.len(), 6); // indices 4..9

        let mult = 2.0 / 6.0;
        let mut expected = 3.0; // SMA seed
        let mut expected_vec = vec![expected];
        for &c in &closes[5..] {
            expected = c * mult + expected * (1.0 - mult);
            expected_vec.push(expected);
        }
        for (a, b) in ema.iter().zip(expected_vec.iter()) {
            assert!((a - b).abs() < 1e-10, "got {a}, expected {b}");
        }
    }

    #[test]
    fn ema_approaches_mean_as_window_grows() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + ((i * 7) % 11) as f64).collect();
        let mean = closes.iter().sum::<f64>() / closes.len() as f64;
        let gap = |w: usize| (calculate_ema(&closes, w).unwrap().last().unwrap() - mean).abs();
        assert!(gap(60) < 1e-10);
        assert!(gap(55) < gap(5));
    }
}
