//! # models::forecast
//!
//! Forecast rows produced by the nightly job.
//!
//! A *run* is every row sharing one `run_date` for one instrument. The
//! publisher always replaces the whole run, so at most one run per instrument
//! is stored at any time.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Forecast horizon in steps. Every successful run produces this many point
/// rows.
pub const FORECAST_DAYS: usize = 10;

/// Predicted closing price for `target_date`, computed on `run_date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointForecast {
    pub run_date:        NaiveDate,
    pub target_date:     NaiveDate,
    pub predicted_price: f64,
}

/// Predicted return volatility (same units as the close, not annualised)
/// for `target_date`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolatilityForecast {
    pub run_date:             NaiveDate,
    pub target_date:          NaiveDate,
    pub predicted_volatility: f64,
}

/// The unit of work the publisher writes for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastBatch {
    pub run_date:   NaiveDate,
    pub points:     Vec<PointForecast>,
    pub volatility: Vec<VolatilityForecast>,
}

/// Serving view: the rows with the latest `run_date` for one instrument,
/// ordered by `target_date`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentForecast {
    pub last_update: NaiveDate,
    pub points:      Vec<PointForecast>,
    pub volatility:  Vec<VolatilityForecast>,
}
