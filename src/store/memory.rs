//! # store::memory
//!
//! In-process implementation of [`ForecastStore`].
//!
//! All tables sit behind a single `RwLock`, so every trait method observes and
//! publishes a consistent snapshot: a write either fully lands or does not
//! land at all, which is the same guarantee the PostgreSQL backend gets from
//! its transactions.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::RwLock;

use super::ForecastStore;
use crate::models::{
    instrument::normalize_symbol, CurrentForecast, ForecastBatch, InstrumentSeed, PointForecast,
    PriceBar, PriceObservation, TrackedInstrument, VolatilityForecast,
};

#[derive(Debug, Default)]
struct Tables {
    next_id:     i64,
    instruments: BTreeMap<String, TrackedInstrument>,
    /// instrument_id → trading_date → close
    prices:      HashMap<i64, BTreeMap<NaiveDate, f64>>,
    points:      HashMap<i64, Vec<PointForecast>>,
    volatility:  HashMap<i64, Vec<VolatilityForecast>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ForecastStore for MemoryStore {
    async fn upsert_instruments(&self, seeds: &[InstrumentSeed]) -> anyhow::Result<Vec<TrackedInstrument>> {
        let mut tables = self.tables.write().await;
        for seed in seeds {
            let symbol = normalize_symbol(&seed.symbol);
            if let Some(existing) = tables.instruments.get_mut(&symbol) {
                existing.name = seed.name.clone();
                continue;
            }
            tables.next_id += 1;
            let id = tables.next_id;
            tables.instruments.insert(
                symbol.clone(),
                TrackedInstrument { id, symbol, name: seed.name.clone() },
            );
        }
        Ok(tables.instruments.values().cloned().collect())
    }

    async fn list_instruments(&self) -> anyhow::Result<Vec<TrackedInstrument>> {
        let tables = self.tables.read().await;
        Ok(tables.instruments.values().cloned().collect())
    }

    async fn find_instrument(&self, symbol: &str) -> anyhow::Result<Option<TrackedInstrument>> {
        let tables = self.tables.read().await;
        Ok(tables.instruments.get(&normalize_symbol(symbol)).cloned())
    }

    async fn latest_price_date(&self, instrument_id: i64) -> anyhow::Result<Option<NaiveDate>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prices
            .get(&instrument_id)
            .and_then(|history| history.keys().next_back().copied()))
    }

    async fn append_prices(&self, instrument_id: i64, bars: &[PriceBar]) -> anyhow::Result<usize> {
        let mut tables = self.tables.write().await;
        let history = tables.prices.entry(instrument_id).or_default();
        let mut inserted = 0;
        for bar in bars {
            if let std::collections::btree_map::Entry::Vacant(slot) = history.entry(bar.date) {
                slot.insert(bar.close);
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn price_history(&self, instrument_id: i64) -> anyhow::Result<Vec<PriceObservation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .prices
            .get(&instrument_id)
            .map(|history| {
                history
                    .iter()
                    .map(|(&trading_date, &close)| PriceObservation { instrument_id, trading_date, close })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn replace_forecasts(&self, instrument_id: i64, batch: &ForecastBatch) -> anyhow::Result<()> {
        let mut tables = self.tables.write().await;
        tables.points.insert(instrument_id, batch.points.clone());
        tables.volatility.insert(instrument_id, batch.volatility.clone());
        Ok(())
    }

    async fn current_forecast(&self, instrument_id: i64, limit: usize) -> anyhow::Result<Option<CurrentForecast>> {
        let tables = self.tables.read().await;
        let points = tables.points.get(&instrument_id).cloned().unwrap_or_default();
        let Some(last_update) = points.iter().map(|p| p.run_date).max() else {
            return Ok(None);
        };

        let mut points: Vec<_> = points.into_iter().filter(|p| p.run_date == last_update).collect();
        points.sort_by_key(|p| p.target_date);
        points.truncate(limit);

        let mut volatility: Vec<_> = tables
            .volatility
            .get(&instrument_id)
            .into_iter()
            .flatten()
            .filter(|v| v.run_date == last_update)
            .copied()
            .collect();
        volatility.sort_by_key(|v| v.target_date);
        volatility.truncate(limit);

        Ok(Some(CurrentForecast { last_update, points, volatility }))
    }
}
