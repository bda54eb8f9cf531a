//! # pipeline::sync — Market Data Synchronizer
//!
//! ดึงราคาปิดที่ยังไม่มีใน store แล้ว append ต่อท้าย price history
//!
//! Provider faults never escape this module: an error, a timeout or an empty
//! answer all end up as a [`SyncOutcome`] and the instrument moves on with
//! whatever history is already stored.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{Days, NaiveDate};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::market::MarketDataProvider;
use crate::models::{PriceBar, TrackedInstrument};
use crate::store::ForecastStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Latest stored date is already yesterday or later; nothing fetched.
    UpToDate,
    /// Fetch succeeded; `rows` new observations committed (possibly 0).
    Appended { rows: usize },
    ProviderUnavailable { reason: String },
    StoreUnavailable { reason: String },
}

impl SyncOutcome {
    pub fn is_fault(&self) -> bool {
        matches!(self, SyncOutcome::ProviderUnavailable { .. } | SyncOutcome::StoreUnavailable { .. })
    }
}

pub struct Synchronizer {
    provider:      Arc<dyn MarketDataProvider>,
    history_start: NaiveDate,
    fetch_timeout: Duration,
}

impl Synchronizer {
    pub fn new(provider: Arc<dyn MarketDataProvider>, history_start: NaiveDate, fetch_timeout: Duration) -> Self {
        Self { provider, history_start, fetch_timeout }
    }

    /// Brings the instrument's history up to (but excluding) `today`.
    pub async fn sync(&self, store: &dyn ForecastStore, instrument: &TrackedInstrument, today: NaiveDate) -> SyncOutcome {
        let latest = match store.latest_price_date(instrument.id).await {
            Ok(latest) => latest,
            Err(e) => {
                warn!(symbol = %instrument.symbol, error = %format!("{e:#}"), "⚠️ could not read latest price date");
                return SyncOutcome::StoreUnavailable { reason: format!("{e:#}") };
            }
        };

        let start = match latest {
            Some(date) => date.checked_add_days(Days::new(1)).unwrap_or(date),
            None => self.history_start,
        };
        if start >= today {
            debug!(symbol = %instrument.symbol, %start, "history already current");
            return SyncOutcome::UpToDate;
        }

        let bars = match self.fetch(&instrument.symbol, start, today).await {
            Ok(bars) => bars,
            Err(reason) => {
                warn!(symbol = %instrument.symbol, provider = self.provider.name(), %reason, "⚠️ provider unavailable, continuing with stored history");
                return SyncOutcome::ProviderUnavailable { reason };
            }
        };

        let fresh = new_bars(bars, latest);
        if fresh.is_empty() {
            debug!(symbol = %instrument.symbol, %start, "provider returned no new closes");
            return SyncOutcome::Appended { rows: 0 };
        }

        match store.append_prices(instrument.id, &fresh).await {
            Ok(rows) => {
                info!(symbol = %instrument.symbol, rows, "📥 price history appended");
                SyncOutcome::Appended { rows }
            }
            Err(e) => {
                warn!(symbol = %instrument.symbol, error = %format!("{e:#}"), "⚠️ failed to append price history");
                SyncOutcome::StoreUnavailable { reason: format!("{e:#}") }
            }
        }
    }

    /// Provider call on its own task, bounded by the fetch timeout.
    async fn fetch(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> Result<Vec<PriceBar>, String> {
        let provider = Arc::clone(&self.provider);
        let symbol = symbol.to_string();
        let handle = tokio::spawn(async move { provider.fetch_daily_closes(&symbol, start, end).await });
        let abort = handle.abort_handle();

        match tokio::time::timeout(self.fetch_timeout, handle).await {
            Ok(Ok(Ok(bars))) => Ok(bars),
            Ok(Ok(Err(e))) => Err(format!("{e:#}")),
            Ok(Err(join)) => Err(format!("fetch task failed: {join}")),
            Err(_) => {
                abort.abort();
                Err(format!("timed out after {}s", self.fetch_timeout.as_secs()))
            }
        }
    }
}

/// Drops unusable closes and anything not strictly after `latest`.
/// Duplicate dates keep the last value the provider sent.
fn new_bars(bars: Vec<PriceBar>, latest: Option<NaiveDate>) -> Vec<PriceBar> {
    let mut by_date = BTreeMap::new();
    for bar in bars {
        if !bar.is_valid() || latest.is_some_and(|l| bar.date <= l) {
            continue;
        }
        by_date.insert(bar.date, bar.close);
    }
    by_date.into_iter().map(|(date, close)| PriceBar::new(date, close)).collect()
}
