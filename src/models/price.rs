//! # models::price
//!
//! Daily closing prices. [`PriceBar`] is what a market data provider hands
//! back (untrusted); [`PriceObservation`] is the append-only stored row.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One daily close as returned by a provider, before validation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceBar {
    pub date:  NaiveDate,
    pub close: f64,
}

impl PriceBar {
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self { date, close }
    }

    /// A close is usable only if it is a finite, strictly positive price.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.close.is_finite() && self.close > 0.0
    }
}

/// A stored daily close. Unique per `(instrument_id, trading_date)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub instrument_id: i64,
    pub trading_date:  NaiveDate,
    pub close:         f64,
}
