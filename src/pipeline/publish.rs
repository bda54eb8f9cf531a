//! # pipeline::publish — Forecast Publisher
//!
//! Turns a model forecast into dated rows and swaps them in for the
//! instrument's previous run.

use chrono::{Days, NaiveDate};
use tracing::info;

use crate::engine::ModelForecast;
use crate::error::PipelineError;
use crate::models::{ForecastBatch, PointForecast, TrackedInstrument, VolatilityForecast};
use crate::store::ForecastStore;

/// `run_date + step` calendar days (step is 1-based).
///
/// Known inconsistency: the model steps over business days but the target
/// dates advance by calendar days, so some of them fall on weekends.
fn target_date(run_date: NaiveDate, step: usize) -> Option<NaiveDate> {
    run_date.checked_add_days(Days::new(step as u64))
}

/// Dated rows for one instrument. Volatility rows are omitted when the
/// volatility model was unavailable.
pub fn build_batch(run_date: NaiveDate, forecast: &ModelForecast) -> Result<ForecastBatch, PipelineError> {
    let out_of_range = || PipelineError::Persistence(format!("target date out of range after {run_date}"));

    let points = forecast
        .points
        .iter()
        .enumerate()
        .map(|(i, &predicted_price)| {
            let target_date = target_date(run_date, i + 1).ok_or_else(out_of_range)?;
            Ok(PointForecast { run_date, target_date, predicted_price })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let volatility = forecast
        .volatility
        .values()
        .unwrap_or_default()
        .iter()
        .enumerate()
        .map(|(i, &v)| {
            let target_date = target_date(run_date, i + 1).ok_or_else(out_of_range)?;
            Ok(VolatilityForecast { run_date, target_date, predicted_volatility: v.max(0.0) })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    Ok(ForecastBatch { run_date, points, volatility })
}

/// Replaces every stored forecast row of the instrument with `batch` in one
/// unit. On error the previous rows are still in place.
pub async fn publish(
    store: &dyn ForecastStore,
    instrument: &TrackedInstrument,
    batch: &ForecastBatch,
) -> Result<(), PipelineError> {
    store
        .replace_forecasts(instrument.id, batch)
        .await
        .map_err(|e| PipelineError::persistence(&e))?;

    info!(
        symbol = %instrument.symbol,
        run_date = %batch.run_date,
        points = batch.points.len(),
        volatility = batch.volatility.len(),
        "💾 forecast published"
    );
    Ok(())
}
