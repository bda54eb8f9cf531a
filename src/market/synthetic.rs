//! # market::synthetic
//!
//! Mock provider สำหรับ development (ไม่ต้องต่อ Yahoo).
//!
//! Produces a deterministic geometric random walk per symbol on weekdays. The
//! walk always starts from the same anchor date, so fetching overlapping
//! ranges returns identical closes for identical dates.

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, Weekday};

use super::MarketDataProvider;
use crate::models::PriceBar;

#[derive(Debug, Clone, Default)]
pub struct SyntheticProvider;

impl SyntheticProvider {
    pub fn new() -> Self {
        Self
    }

    fn anchor() -> NaiveDate {
        NaiveDate::from_ymd_opt(2010, 1, 4).unwrap_or_default()
    }
}

/// splitmix64 step
fn next_u64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Uniform in [-1, 1).
fn next_unit(state: &mut u64) -> f64 {
    (next_u64(state) >> 11) as f64 / (1u64 << 52) as f64 - 1.0
}

fn symbol_seed(symbol: &str) -> u64 {
    // FNV-1a
    symbol
        .bytes()
        .fold(0xcbf2_9ce4_8422_2325u64, |h, b| (h ^ b as u64).wrapping_mul(0x0100_0000_01b3))
}

/// Deterministic weekday closes for `symbol` in `[start, end)`.
pub fn synthetic_closes(symbol: &str, start: NaiveDate, end: NaiveDate) -> Vec<PriceBar> {
    let mut state = symbol_seed(symbol);
    let mut price = 20.0 + (next_u64(&mut state) % 180) as f64;
    let mut bars = Vec::new();

    let mut date = SyntheticProvider::anchor();
    while date < end {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            price *= (0.012 * next_unit(&mut state)).exp();
            if date >= start {
                bars.push(PriceBar::new(date, (price * 100.0).round() / 100.0));
            }
        }
        date += Duration::days(1);
    }
    bars
}

#[async_trait]
impl MarketDataProvider for SyntheticProvider {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PriceBar>> {
        Ok(synthetic_closes(symbol, start, end))
    }
}
