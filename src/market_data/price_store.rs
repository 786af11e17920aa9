// =============================================================================
// Price Store — immutable columnar OHLCV series per symbol
// =============================================================================
//
// Loaded once at startup and never mutated afterwards.  Each symbol owns one
// `Series` whose columns are parallel vectors sorted by strictly increasing
// date.  Readers borrow `SeriesSlice` views; a range lookup is two binary
// searches over the date column and never copies bar data.
//
// The store is shared behind `Arc` and needs no locking.
// =============================================================================

use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::PipelineError;
use crate::types::{normalize_symbol, DateRange};

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// One OHLCV observation, also the row format of the price file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// A row of the price file: a bar tagged with its symbol.
#[derive(Debug, Clone, Deserialize)]
pub struct PriceRow {
    pub symbol: String,
    #[serde(flatten)]
    pub bar: Bar,
}

/// Columnar series for one symbol.
#[derive(Debug)]
pub struct Series {
    symbol: String,
    dates: Vec<NaiveDate>,
    open: Vec<f64>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
}

impl Series {
    /// Build a series from bars in any order.  Fails on duplicate dates.
    pub fn from_bars(symbol: impl Into<String>, mut bars: Vec<Bar>) -> Result<Self> {
        let symbol = symbol.into();
        bars.sort_by_key(|b| b.date);

        if let Some(w) = bars.windows(2).find(|w| w[0].date == w[1].date) {
            bail!("duplicate bar for {} on {}", symbol, w[0].date);
        }

        let mut series = Self {
            symbol,
            dates: Vec::with_capacity(bars.len()),
            open: Vec::with_capacity(bars.len()),
            high: Vec::with_capacity(bars.len()),
            low: Vec::with_capacity(bars.len()),
            close: Vec::with_capacity(bars.len()),
            volume: Vec::with_capacity(bars.len()),
        };
        for bar in bars {
            series.dates.push(bar.date);
            series.open.push(bar.open);
            series.high.push(bar.high);
            series.low.push(bar.low);
            series.close.push(bar.close);
            series.volume.push(bar.volume);
        }
        Ok(series)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// First and last available dates.
    pub fn coverage(&self) -> Option<(NaiveDate, NaiveDate)> {
        Some((*self.dates.first()?, *self.dates.last()?))
    }

    /// Borrow the bars whose dates fall within `range` (inclusive).
    pub fn range_slice(&self, range: DateRange) -> Result<SeriesSlice<'_>, PipelineError> {
        let empty = || PipelineError::EmptyRange {
            symbol: self.symbol.clone(),
            requested: range,
            available: self.coverage(),
        };

        if range.start > range.end {
            return Err(empty());
        }

        let lo = self.dates.partition_point(|d| *d < range.start);
        let hi = self.dates.partition_point(|d| *d <= range.end);
        if lo >= hi {
            return Err(empty());
        }

        Ok(SeriesSlice {
            symbol: &self.symbol,
            dates: &self.dates[lo..hi],
            open: &self.open[lo..hi],
            high: &self.high[lo..hi],
            low: &self.low[lo..hi],
            close: &self.close[lo..hi],
            volume: &self.volume[lo..hi],
        })
    }
}

/// Borrowed, contiguous window of a [`Series`].
#[derive(Debug, Clone, Copy)]
pub struct SeriesSlice<'a> {
    pub symbol: &'a str,
    pub dates: &'a [NaiveDate],
    pub open: &'a [f64],
    pub high: &'a [f64],
    pub low: &'a [f64],
    pub close: &'a [f64],
    pub volume: &'a [f64],
}

impl<'a> SeriesSlice<'a> {
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    /// Reassemble the bar at `index` (used for diagnostics and tests).
    pub fn bar(&self, index: usize) -> Option<Bar> {
        Some(Bar {
            date: *self.dates.get(index)?,
            open: self.open[index],
            high: self.high[index],
            low: self.low[index],
            close: self.close[index],
            volume: self.volume[index],
        })
    }
}

// ---------------------------------------------------------------------------
// PriceStore
// ---------------------------------------------------------------------------

/// Read-only map of symbol to series.
#[derive(Debug, Default)]
pub struct PriceStore {
    series: HashMap<String, Series>,
}

impl PriceStore {
    /// Group rows by symbol and build one series per symbol.
    pub fn from_rows(rows: impl IntoIterator<Item = PriceRow>) -> Result<Self> {
        let mut grouped: HashMap<String, Vec<Bar>> = HashMap::new();
        for row in rows {
            grouped
                .entry(normalize_symbol(&row.symbol))
                .or_default()
                .push(row.bar);
        }

        let mut series = HashMap::with_capacity(grouped.len());
        for (symbol, bars) in grouped {
            let s = Series::from_bars(symbol.clone(), bars)?;
            series.insert(symbol, s);
        }
        Ok(Self { series })
    }

    /// Load a JSON array of `{symbol, date, open, high, low, close, volume}`.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading price file {}", path.display()))?;
        let rows: Vec<PriceRow> = serde_json::from_str(&raw)
            .with_context(|| format!("parsing price file {}", path.display()))?;
        let store = Self::from_rows(rows)?;

        info!(
            path = %path.display(),
            symbols = store.series.len(),
            bars = store.bar_count(),
            "price store loaded"
        );
        Ok(store)
    }

    pub fn get(&self, symbol: &str) -> Option<&Series> {
        self.series.get(symbol)
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.series.contains_key(symbol)
    }

    /// Sorted list of available symbols.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.series.keys().cloned().collect();
        symbols.sort();
        symbols
    }

    pub fn bar_count(&self) -> usize {
        self.series.values().map(Series::len).sum()
    }

    pub fn coverage(&self, symbol: &str) -> Option<(NaiveDate, NaiveDate)> {
        self.series.get(symbol)?.coverage()
    }

    /// Borrow the bars of `symbol` within `range`.
    pub fn range_slice(
        &self,
        symbol: &str,
        range: DateRange,
    ) -> Result<SeriesSlice<'_>, PipelineError> {
        self.series
            .get(symbol)
            .ok_or_else(|| PipelineError::UnknownSymbol {
                symbol: symbol.to_string(),
            })?
            .range_slice(range)
    }
}
