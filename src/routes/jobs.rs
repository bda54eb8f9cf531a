//! # routes::jobs
//!
//! | Method | Path                    | Description                       |
//! |--------|-------------------------|-----------------------------------|
//! | POST   | `/api/jobs/forecast`    | เริ่ม forecast run (ทั้งหมด หรือบาง symbol) |
//! | GET    | `/api/jobs/last-report` | ผลของ run ล่าสุด                   |
//!
//! Body (optional): `{"symbols": ["PKO.WA"], "wait": true}`. Without `wait`
//! the run is started in the background and the call returns 202 at once.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info, warn};

use crate::error::AppError;
use crate::state::SharedState;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ForecastJobRequest {
    #[serde(default)]
    pub symbols: Option<Vec<String>>,
    #[serde(default)]
    pub wait:    bool,
}

/// An empty body means "full run, don't wait". Anything else must be a valid
/// request; a malformed targeted rerun is rejected instead of widening to
/// the full set.
fn parse_request(body: &Bytes) -> Result<ForecastJobRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(ForecastJobRequest::default());
    }
    Json::<ForecastJobRequest>::from_bytes(body)
        .map(|Json(request)| request)
        .map_err(|rejection| {
            warn!(error = %rejection.body_text(), "❌ malformed forecast job request");
            AppError::BadRequest(rejection.body_text())
        })
}

/// POST /api/jobs/forecast
pub async fn trigger_forecast(
    State(state): State<SharedState>,
    body: Bytes,
) -> Result<impl IntoResponse, AppError> {
    let request = parse_request(&body)?;
    let symbols = request.symbols.filter(|s| !s.is_empty());

    // 409 is decided here, before anything is spawned
    let permit = state.orchestrator.try_reserve()?;
    let run_date = Utc::now().date_naive();

    if request.wait {
        let report = state.orchestrator.run_reserved(permit, run_date, symbols.as_deref()).await?;
        return Ok((StatusCode::OK, Json(json!({ "ok": true, "report": report }))));
    }

    let orchestrator = Arc::clone(&state.orchestrator);
    info!(symbols = ?symbols, "▶️ on-demand forecast run requested");
    tokio::spawn(async move {
        if let Err(e) = orchestrator.run_reserved(permit, run_date, symbols.as_deref()).await {
            error!(error = %e, "❌ on-demand forecast run failed to start");
        }
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "ok": true, "message": "forecast run started" })),
    ))
}

/// GET /api/jobs/last-report
pub async fn last_report(State(state): State<SharedState>) -> Result<impl IntoResponse, AppError> {
    let report = state
        .orchestrator
        .last_report()
        .await
        .ok_or_else(|| AppError::NotFound("No forecast run has finished yet".into()))?;

    Ok(Json(json!({ "ok": true, "report": report })))
}
