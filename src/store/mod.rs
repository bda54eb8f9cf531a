//! # store — Relational Store Boundary
//!
//! Everything the pipeline persists goes through [`ForecastStore`]. The trait
//! mirrors the handful of queries the nightly job and the serving API need;
//! each write method is its own transaction so one instrument's failure can
//! never roll back another instrument's committed work.
//!
//! ## Backends
//! - [`MemoryStore`] — in-process tables, used in dev mode and in tests
//! - `PgStore` — PostgreSQL through `sqlx` (feature `postgres`)

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::models::{
    CurrentForecast, ForecastBatch, InstrumentSeed, PriceBar, PriceObservation, TrackedInstrument,
};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::MemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

#[async_trait]
pub trait ForecastStore: Send + Sync {
    /// Insert missing instruments and refresh display names of existing ones.
    /// Returns every tracked instrument ordered by symbol.
    async fn upsert_instruments(&self, seeds: &[InstrumentSeed]) -> anyhow::Result<Vec<TrackedInstrument>>;

    /// All tracked instruments ordered by symbol.
    async fn list_instruments(&self) -> anyhow::Result<Vec<TrackedInstrument>>;

    /// Case-insensitive lookup by symbol.
    async fn find_instrument(&self, symbol: &str) -> anyhow::Result<Option<TrackedInstrument>>;

    /// Latest stored trading date for the instrument, `None` without history.
    async fn latest_price_date(&self, instrument_id: i64) -> anyhow::Result<Option<NaiveDate>>;

    /// Append closes in one transaction. Dates already stored are ignored,
    /// so the call is idempotent. Returns the number of rows inserted.
    async fn append_prices(&self, instrument_id: i64, bars: &[PriceBar]) -> anyhow::Result<usize>;

    /// Full price history ordered by trading date.
    async fn price_history(&self, instrument_id: i64) -> anyhow::Result<Vec<PriceObservation>>;

    /// Delete every forecast row (both kinds) of the instrument and insert
    /// `batch`, committed as a single unit.
    async fn replace_forecasts(&self, instrument_id: i64, batch: &ForecastBatch) -> anyhow::Result<()>;

    /// Rows of the latest run ordered by target date, at most `limit` per
    /// kind. `None` when the instrument has no point forecast rows.
    async fn current_forecast(&self, instrument_id: i64, limit: usize) -> anyhow::Result<Option<CurrentForecast>>;
}
