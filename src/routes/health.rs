//! # routes::health

use axum::{extract::State, response::IntoResponse, Json};
use chrono::Utc;
use serde_json::json;

use crate::state::SharedState;

/// GET /health — ไม่ต้องใช้ API key
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let last_run = state.orchestrator.last_report().await.map(|r| {
        json!({
            "run_id":      r.run_id,
            "run_date":    r.run_date,
            "finished_at": r.finished_at,
            "summary":     r.summary(),
        })
    });

    Json(json!({
        "ok":          true,
        "service":     "pricecast",
        "uptime_secs": (Utc::now() - state.started_at).num_seconds(),
        "running":     state.orchestrator.is_running(),
        "last_run":    last_run,
    }))
}
