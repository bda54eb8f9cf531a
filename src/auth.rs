//! # auth — API Key Middleware
//!
//! ป้องกัน Endpoint ด้วย `X-API-Key` header
//!
//! ## Mode
//! - `API_KEY` ไม่ได้ตั้ง (หรือ empty) → **Allow All** (Dev Mode)
//! - `API_KEY` ตั้งค่า → ต้องส่ง `X-API-Key: <key>` ทุก Request
//!
//! ## ยกเว้น
//! `/health`
//!
//! ```bash
//! curl -H "X-API-Key: $API_KEY" http://localhost:3000/api/predictions/PKO.WA
//! ```

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

pub const API_KEY_HEADER: &str = "X-API-Key";

pub async fn require_api_key(State(state): State<SharedState>, request: Request, next: Next) -> Response {
    // ── Dev Mode ──────────────────────────────────────────────────────────────
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path();
    if path == "/health" {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        next.run(request).await
    } else {
        warn!(path, "❌ Unauthorized request — invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
