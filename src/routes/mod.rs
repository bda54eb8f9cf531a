//! # routes
//!
//! | Method | Path                          | Description                         |
//! |--------|-------------------------------|-------------------------------------|
//! | GET    | `/health`                     | liveness + run status (no auth)     |
//! | GET    | `/api/predictions/:symbol`    | current forecast set                |
//! | POST   | `/api/jobs/forecast`          | on-demand run, optional symbol list |
//! | GET    | `/api/jobs/last-report`       | report of the most recent run       |

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::require_api_key;
use crate::state::SharedState;

pub mod health;
pub mod jobs;
pub mod predictions;

pub fn router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health",                  get(health::health_check))
        .route("/api/predictions/:symbol", get(predictions::get_predictions))
        .route("/api/jobs/forecast",       post(jobs::trigger_forecast))
        .route("/api/jobs/last-report",    get(jobs::last_report))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
