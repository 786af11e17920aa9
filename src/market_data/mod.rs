pub mod price_store;

// Re-export the store types for convenient access (e.g. `use crate::market_data::Bar`).
pub use price_store::{Bar, PriceRow, PriceStore, Series, SeriesSlice};
