// =============================================================================
// Indicator specs — typed, default-filled parameter sets and dispatch
// =============================================================================
//
// Callers send a loose name → number map.  `IndicatorSpec::parse` turns it
// into one typed variant per indicator, filling defaults and enforcing
// bounds, so every later stage (cache key, computation, response) works from
// the same canonical parameters.
// =============================================================================

use serde::{Deserialize, Serialize};

use super::bollinger::calculate_bollinger;
use super::ema::calculate_ema;
use super::macd::{calculate_macd, macd_offset};
use super::rsi::calculate_rsi;
use super::sma::calculate_sma;
use super::IndicatorError;
use crate::error::PipelineError;
use crate::market_data::SeriesSlice;
use crate::types::{IndicatorId, Parameters};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum IndicatorSpec {
    Sma { window: usize },
    Ema { window: usize },
    Rsi { period: usize },
    Macd { fast: usize, slow: usize, signal: usize },
    Bollinger { period: usize, std_dev: f64 },
}

/// Integer parameter: name, default, inclusive upper bound.
struct IntParam(&'static str, usize, usize);

const SMA_WINDOW: IntParam = IntParam("window", 20, 200);
const EMA_WINDOW: IntParam = IntParam("window", 20, 200);
const RSI_PERIOD: IntParam = IntParam("period", 14, 100);
const MACD_FAST: IntParam = IntParam("fast_period", 12, 100);
const MACD_SLOW: IntParam = IntParam("slow_period", 26, 200);
const MACD_SIGNAL: IntParam = IntParam("signal_period", 9, 100);
const BB_PERIOD: IntParam = IntParam("period", 20, 200);

const BB_STD_DEV: &str = "std_dev";
const BB_STD_DEV_DEFAULT: f64 = 2.0;
const BB_STD_DEV_RANGE: (f64, f64) = (0.1, 5.0);

fn reject_unknown(id: IndicatorId, params: &Parameters, known: &[&str]) -> Result<(), PipelineError> {
    match params.keys().find(|k| !known.contains(&k.as_str())) {
        Some(name) => Err(PipelineError::invalid(
            name.clone(),
            format!("not a parameter of {id} (expected one of: {})", known.join(", ")),
        )),
        None => Ok(()),
    }
}

fn int_param(params: &Parameters, spec: IntParam) -> Result<usize, PipelineError> {
    let IntParam(name, default, max) = spec;
    let Some(&raw) = params.get(name) else {
        return Ok(default);
    };
    if !raw.is_finite() || raw.fract() != 0.0 {
        return Err(PipelineError::invalid(name, format!("must be a whole number, got {raw}")));
    }
    if raw < 1.0 || raw > max as f64 {
        return Err(PipelineError::invalid(name, format!("must be between 1 and {max}, got {raw}")));
    }
    Ok(raw as usize)
}

impl IndicatorSpec {
    /// Build a spec from caller-supplied parameters.
    pub fn parse(id: IndicatorId, params: &Parameters) -> Result<Self, PipelineError> {
        match id {
            IndicatorId::Sma => {
                reject_unknown(id, params, &[SMA_WINDOW.0])?;
                Ok(Self::Sma {
                    window: int_param(params, SMA_WINDOW)?,
                })
            }
            IndicatorId::Ema => {
                reject_unknown(id, params, &[EMA_WINDOW.0])?;
                Ok(Self::Ema {
                    window: int_param(params, EMA_WINDOW)?,
                })
            }
            IndicatorId::Rsi => {
                reject_unknown(id, params, &[RSI_PERIOD.0])?;
                Ok(Self::Rsi {
                    period: int_param(params, RSI_PERIOD)?,
                })
            }
            IndicatorId::Macd => {
                reject_unknown(id, params, &[MACD_FAST.0, MACD_SLOW.0, MACD_SIGNAL.0])?;
                let fast = int_param(params, MACD_FAST)?;
                let slow = int_param(params, MACD_SLOW)?;
                let signal = int_param(params, MACD_SIGNAL)?;
                if fast >= slow {
                    return Err(PipelineError::invalid(
                        MACD_FAST.0,
                        format!("must be below slow_period ({fast} >= {slow})"),
                    ));
                }
                Ok(Self::Macd { fast, slow, signal })
            }
            IndicatorId::Bollinger => {
                reject_unknown(id, params, &[BB_PERIOD.0, BB_STD_DEV])?;
                let period = int_param(params, BB_PERIOD)?;
                let std_dev = params.get(BB_STD_DEV).copied().unwrap_or(BB_STD_DEV_DEFAULT);
                let (lo, hi) = BB_STD_DEV_RANGE;
                if !(std_dev.is_finite() && (lo..=hi).contains(&std_dev)) {
                    return Err(PipelineError::invalid(
                        BB_STD_DEV,
                        format!("must be between {lo} and {hi}, got {std_dev}"),
                    ));
                }
                Ok(Self::Bollinger { period, std_dev })
            }
        }
    }

    pub fn id(&self) -> IndicatorId {
        match self {
            Self::Sma { .. } => IndicatorId::Sma,
            Self::Ema { .. } => IndicatorId::Ema,
            Self::Rsi { .. } => IndicatorId::Rsi,
            Self::Macd { .. } => IndicatorId::Macd,
            Self::Bollinger { .. } => IndicatorId::Bollinger,
        }
    }

    /// Complete parameter set, defaults included.
    pub fn canonical_parameters(&self) -> Parameters {
        let pairs: Vec<(&str, f64)> = match *self {
            Self::Sma { window } | Self::Ema { window } => vec![("window", window as f64)],
            Self::Rsi { period } => vec![("period", period as f64)],
            Self::Macd { fast, slow, signal } => vec![
                (MACD_FAST.0, fast as f64),
                (MACD_SLOW.0, slow as f64),
                (MACD_SIGNAL.0, signal as f64),
            ],
            Self::Bollinger { period, std_dev } => {
                vec![(BB_PERIOD.0, period as f64), (BB_STD_DEV, std_dev)]
            }
        };
        pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Run the indicator over the closes of `slice`.
    pub fn compute(&self, slice: &SeriesSlice<'_>) -> Result<IndicatorOutput, IndicatorError> {
        let closes = slice.close;
        let (offset, values) = match *self {
            Self::Sma { window } => (window - 1, IndicatorValues::Line(calculate_sma(closes, window)?)),
            Self::Ema { window } => (window - 1, IndicatorValues::Line(calculate_ema(closes, window)?)),
            Self::Rsi { period } => (period, IndicatorValues::Line(calculate_rsi(closes, period)?)),
            Self::Macd { fast, slow, signal } => {
                let out = calculate_macd(closes, fast, slow, signal)?;
                (
                    macd_offset(fast, slow, signal),
                    IndicatorValues::Macd {
                        macd: out.macd,
                        signal: out.signal,
                        histogram: out.histogram,
                    },
                )
            }
            Self::Bollinger { period, std_dev } => {
                let out = calculate_bollinger(closes, period, std_dev)?;
                (
                    period - 1,
                    IndicatorValues::Bands {
                        upper: out.upper,
                        middle: out.middle,
                        lower: out.lower,
                    },
                )
            }
        };
        Ok(IndicatorOutput { offset, values })
    }
}

/// Computed values plus the index of the first bar they cover.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorOutput {
    pub offset: usize,
    pub values: IndicatorValues,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorValues {
    Line(Vec<f64>),
    Macd {
        macd: Vec<f64>,
        signal: Vec<f64>,
        histogram: Vec<f64>,
    },
    Bands {
        upper: Vec<f64>,
        middle: Vec<f64>,
        lower: Vec<f64>,
    },
}

impl IndicatorValues {
    pub fn len(&self) -> usize {
        match self {
            Self::Line(v) => v.len(),
            Self::Macd { signal, .. } => signal.len(),
            Self::Bands { middle, .. } => middle.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl IndicatorError {
    /// Attach the indicator name and lift into the pipeline taxonomy.
    pub fn into_pipeline(self, indicator: IndicatorId) -> PipelineError {
        match self {
            Self::InsufficientData {
                required,
                available,
            } => PipelineError::InsufficientData {
                indicator,
                required,
                available,
            },
            Self::InvalidParameter { name, value } => {
                PipelineError::invalid(name, format!("must be positive, got {value}"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn params(pairs: &[(&str, f64)]) -> Parameters {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn defaults_are_filled_in() {
        assert_eq!(
            IndicatorSpec::parse(IndicatorId::Macd, &Parameters::new()).unwrap(),
            IndicatorSpec::Macd {
                fast: 12,
                slow: 26,
                signal: 9
            }
        );
        assert_eq!(
            IndicatorSpec::parse(IndicatorId::Bollinger, &Parameters::new()).unwrap(),
            IndicatorSpec::Bollinger {
                period: 20,
                std_dev: 2.0
            }
        );
    }

    #[test]
    fn explicit_default_equals_implicit_default() {
        let a = IndicatorSpec::parse(IndicatorId::Sma, &Parameters::new()).unwrap();
        let b = IndicatorSpec::parse(IndicatorId::Sma, &params(&[("window", 20.0)])).unwrap();
        assert_eq!(a.canonical_parameters(), b.canonical_parameters());
    }

    #[test]
    fn rejects_unknown_names() {
        let err = IndicatorSpec::parse(IndicatorId::Sma, &params(&[("period", 5.0)])).unwrap_err();
        assert!(matches!(err, PipelineError::InvalidParameter { ref name, .. } if name == "period"));
    }

    #[test]
    fn rejects_non_positive_and_fractional_windows() {
        for bad in [0.0, -3.0, 2.5, f64::INFINITY, 201.0] {
            let err = IndicatorSpec::parse(IndicatorId::Ema, &params(&[("window", bad)]));
            assert!(
                matches!(err, Err(PipelineError::InvalidParameter { .. })),
                "window {bad} accepted"
            );
        }
    }

    #[test]
    fn rejects_inverted_macd_periods() {
        let err = IndicatorSpec::parse(
            IndicatorId::Macd,
            &params(&[("fast_period", 26.0), ("slow_period", 12.0)]),
        );
        assert!(matches!(err, Err(PipelineError::InvalidParameter { .. })));
    }

    #[test]
    fn rejects_out_of_range_std_dev() {
        let err = IndicatorSpec::parse(IndicatorId::Bollinger, &params(&[("std_dev", 0.0)]));
        assert!(matches!(err, Err(PipelineError::InvalidParameter { .. })));
    }

    #[test]
    fn compute_reports_offsets() {
        let dates: Vec<NaiveDate> = (1..=5)
            .map(|d| NaiveDate::from_ymd_opt(2024, 1, d).unwrap())
            .collect();
        let close = [10.0, 12.0, 11.0, 13.0, 15.0];
        let slice = SeriesSlice {
            symbol: "TEST",
            dates: &dates,
            open: &close,
            high: &close,
            low: &close,
            close: &close,
            volume: &close,
        };

        let sma = IndicatorSpec::Sma { window: 3 }.compute(&slice).unwrap();
        assert_eq!(sma.offset, 2);
        assert_eq!(sma.offset + sma.values.len(), slice.len());

        let rsi = IndicatorSpec::Rsi { period: 2 }.compute(&slice).unwrap();
        assert_eq!(rsi.offset, 2);
        assert_eq!(rsi.values.len(), 3);

        let err = IndicatorSpec::Rsi { period: 5 }.compute(&slice).unwrap_err();
        assert!(matches!(
            err.into_pipeline(IndicatorId::Rsi),
            PipelineError::InsufficientData {
                indicator: IndicatorId::Rsi,
                required: 6,
                available: 5
            }
        ));
    }

    #[test]
    fn values_serialise_by_shape() {
        let line = serde_json::to_value(IndicatorValues::Line(vec![1.0])).unwrap();
        assert_eq!(line, serde_json::json!([1.0]));
        let bands = IndicatorValues::Bands {
            upper: vec![2.0],
            middle: vec![1.0],
            lower: vec![0.0],
        };
        let back: IndicatorValues =
            serde_json::from_value(serde_json::to_value(&bands).unwrap()).unwrap();
        assert_eq!(back, bands);
    }
}
