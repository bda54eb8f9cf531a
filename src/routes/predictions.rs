//! # routes::predictions
//!
//! GET /api/predictions/:symbol — forecast set ล่าสุดของ instrument

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::AppError;
use crate::models::{instrument::normalize_symbol, FORECAST_DAYS};
use crate::state::SharedState;

#[derive(Debug, Serialize)]
pub struct PricePoint {
    pub target_date:     NaiveDate,
    pub predicted_price: f64,
}

#[derive(Debug, Serialize)]
pub struct VolatilityPoint {
    pub target_date:          NaiveDate,
    pub predicted_volatility: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictionsResponse {
    pub ok:          bool,
    pub symbol:      String,
    pub name:        String,
    pub last_update: NaiveDate,
    pub price:       Vec<PricePoint>,
    pub volatility:  Vec<VolatilityPoint>,
}

pub async fn get_predictions(
    State(state): State<SharedState>,
    Path(symbol): Path<String>,
) -> Result<Json<PredictionsResponse>, AppError> {
    let symbol = normalize_symbol(&symbol);

    let instrument = state
        .store
        .find_instrument(&symbol)
        .await?
        .ok_or_else(|| AppError::NotFound("Instrument not found".into()))?;

    let current = state
        .store
        .current_forecast(instrument.id, FORECAST_DAYS)
        .await?
        .filter(|c| !c.points.is_empty())
        .ok_or_else(|| AppError::NotFound("No forecast available for this instrument yet".into()))?;

    Ok(Json(PredictionsResponse {
        ok:          true,
        symbol:      instrument.symbol,
        name:        instrument.name,
        last_update: current.last_update,
        price: current
            .points
            .into_iter()
            .map(|p| PricePoint { target_date: p.target_date, predicted_price: p.predicted_price })
            .collect(),
        volatility: current
            .volatility
            .into_iter()
            .map(|v| VolatilityPoint { target_date: v.target_date, predicted_volatility: v.predicted_volatility })
            .collect(),
    }))
}
