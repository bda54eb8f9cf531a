//! # state
//!
//! Shared handles injected into every Axum handler. The orchestrator owns the
//! run guard and the last run report; handlers only read through it.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::pipeline::NightlyOrchestrator;
use crate::store::ForecastStore;

// ─── AppState ─────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub store:        Arc<dyn ForecastStore>,
    pub orchestrator: Arc<NightlyOrchestrator>,
    /// `None` = dev mode, every request passes the API-key guard.
    pub api_key:      Option<String>,
    pub started_at:   DateTime<Utc>,
}

pub type SharedState = Arc<AppState>;

pub fn build_state(orchestrator: Arc<NightlyOrchestrator>, api_key: Option<String>) -> SharedState {
    Arc::new(AppState {
        store: orchestrator.store(),
        orchestrator,
        api_key: api_key.filter(|k| !k.is_empty()),
        started_at: Utc::now(),
    })
}
