//! # error
//!
//! Centralised error types.
//!
//! - [`AppError`] — every HTTP handler returns `Result<_, AppError>`; Axum's
//!   `IntoResponse` impl turns it into a structured JSON error body.
//! - [`PipelineError`] — the per-instrument failure taxonomy of the nightly
//!   job. None of these ever escape the orchestrator; they end up in the
//!   run report instead.
//! - [`RunError`] — reasons a whole run could not start.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::engine::FitError;

#[derive(Debug, Error)]
pub enum AppError {
    /// The request payload was syntactically correct but semantically invalid.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The requested resource (instrument, forecast, report) does not exist yet.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The request clashes with work already in progress.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}

/// Per-instrument failure taxonomy.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Provider returned nothing usable, or the store holds no history yet.
    #[error("data unavailable: {0}")]
    DataUnavailable(String),

    /// Level or volatility model failed to converge or rejected its input.
    #[error("model fit failed: {0}")]
    ModelFit(#[from] FitError),

    /// A storage write/delete failed; the instrument's transaction was rolled back.
    #[error("persistence failed: {0}")]
    Persistence(String),
}

impl PipelineError {
    pub fn persistence(err: &anyhow::Error) -> Self {
        // `{:#}` keeps the whole context chain on one line
        PipelineError::Persistence(format!("{err:#}"))
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    /// A previous run (scheduled or on-demand) has not finished yet.
    #[error("a forecast run is already in progress")]
    AlreadyRunning,

    /// The tracked-instrument list could not be read.
    #[error("failed to load tracked instruments: {0}")]
    Instruments(String),
}

impl From<RunError> for AppError {
    fn from(err: RunError) -> Self {
        match err {
            RunError::AlreadyRunning => AppError::Conflict(err.to_string()),
            RunError::Instruments(_) => AppError::Internal(anyhow::anyhow!(err.to_string())),
        }
    }
}
