// =============================================================================
// Shared types used across the indicator service
// =============================================================================

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Raw indicator parameters as supplied by the caller. A `BTreeMap` so that
/// iteration order never depends on insertion order.
pub type Parameters = BTreeMap<String, f64>;

/// Subscription level controlling quota, allowed indicators and depth.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Free,
    Pro,
    Premium,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Pro, Tier::Premium];

    /// Position of the tier in fixed-size lookup tables.
    pub fn index(self) -> usize {
        match self {
            Self::Free => 0,
            Self::Pro => 1,
            Self::Premium => 2,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Free => write!(f, "free"),
            Self::Pro => write!(f, "pro"),
            Self::Premium => write!(f, "premium"),
        }
    }
}

impl FromStr for Tier {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "free" => Ok(Self::Free),
            "pro" => Ok(Self::Pro),
            "premium" => Ok(Self::Premium),
            _ => Err(()),
        }
    }
}

/// The closed set of indicators the service can compute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorId {
    Sma,
    Ema,
    Rsi,
    Macd,
    Bollinger,
}

impl IndicatorId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sma => "sma",
            Self::Ema => "ema",
            Self::Rsi => "rsi",
            Self::Macd => "macd",
            Self::Bollinger => "bollinger",
        }
    }
}

impl std::fmt::Display for IndicatorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IndicatorId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sma" => Ok(Self::Sma),
            "ema" => Ok(Self::Ema),
            "rsi" => Ok(Self::Rsi),
            "macd" => Ok(Self::Macd),
            "bollinger" => Ok(Self::Bollinger),
            _ => Err(()),
        }
    }
}

/// Inclusive calendar date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Default depth used when the caller gives no start date.
pub const DEFAULT_RANGE_DAYS: i64 = 90;

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Fill in missing bounds: `end` defaults to `today`, `start` to
    /// [`DEFAULT_RANGE_DAYS`] before `end`.  `None` when that default start
    /// falls before the earliest representable date.
    pub fn resolve(start: Option<NaiveDate>, end: Option<NaiveDate>, today: NaiveDate) -> Option<Self> {
        let end = end.unwrap_or(today);
        let start = match start {
            Some(start) => start,
            None => end.checked_sub_signed(chrono::Duration::days(DEFAULT_RANGE_DAYS))?,
        };
        Some(Self { start, end })
    }

    /// Number of days between the bounds (0 for a single-day range).
    pub fn span_days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Normalise a ticker as supplied by the caller.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn tier_parses_case_insensitively() {
        assert_eq!("PREMIUM".parse::<Tier>(), Ok(Tier::Premium));
        assert_eq!(" pro ".parse::<Tier>(), Ok(Tier::Pro));
        assert!("gold".parse::<Tier>().is_err());
    }

    #[test]
    fn indicator_round_trips_through_display() {
        for id in [
            IndicatorId::Sma,
            IndicatorId::Ema,
            IndicatorId::Rsi,
            IndicatorId::Macd,
            IndicatorId::Bollinger,
        ] {
            assert_eq!(id.to_string().parse::<IndicatorId>(), Ok(id));
        }
    }

    #[test]
    fn range_defaults_to_ninety_days_ending_today() {
        let today = d(2024, 6, 30);
        let range = DateRange::resolve(None, None, today).unwrap();
        assert_eq!(range.end, today);
        assert_eq!(range.span_days(), 90);
    }

    #[test]
    fn range_keeps_explicit_bounds() {
        let range = DateRange::resolve(Some(d(2024, 1, 1)), Some(d(2024, 1, 31)), d(2024, 6, 30)).unwrap();
        assert_eq!(range, DateRange::new(d(2024, 1, 1), d(2024, 1, 31)));
        assert_eq!(range.span_days(), 30);
    }

    #[test]
    fn default_start_before_earliest_date_is_rejected() {
        let earliest = NaiveDate::MIN + chrono::Duration::days(10);
        assert_eq!(DateRange::resolve(None, Some(earliest), d(2024, 6, 30)), None);
        let range = DateRange::resolve(Some(NaiveDate::MIN), Some(earliest), d(2024, 6, 30));
        assert_eq!(range.map(|r| r.span_days()), Some(10));
    }

    #[test]
    fn symbols_are_trimmed_and_uppercased() {
        assert_eq!(normalize_symbol("  aapl "), "AAPL");
    }
}
