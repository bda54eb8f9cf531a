//! # market — Market Data Provider Boundary
//!
//! ดึงราคาปิดรายวันจากแหล่งข้อมูลภายนอก
//!
//! ## Data Sources (เลือกได้ผ่าน `MARKET_DATA_URL`)
//! 1. Yahoo Finance chart API — default
//! 2. `mock` — deterministic synthetic closes สำหรับ dev/test โดยไม่ต้องต่อเน็ต
//!
//! Provider output is untrusted. The synchronizer validates every bar and
//! treats any error from [`MarketDataProvider::fetch_daily_closes`] as
//! "no new data".

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::PriceBar;

pub mod synthetic;
pub mod yahoo;

pub use synthetic::SyntheticProvider;
pub use yahoo::YahooChartProvider;

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Daily closes for `symbol` with `start <= date < end`, ordered by date.
    async fn fetch_daily_closes(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> anyhow::Result<Vec<PriceBar>>;
}

/// Build the provider selected by `MARKET_DATA_URL`.
pub fn provider_from_url(base_url: &str, client: reqwest::Client) -> Arc<dyn MarketDataProvider> {
    if base_url == "mock" {
        tracing::warn!("MARKET_DATA_URL=mock — using SYNTHETIC market data");
        Arc::new(SyntheticProvider::new())
    } else {
        Arc::new(YahooChartProvider::new(client, base_url))
    }
}
