//! # pipeline::report
//!
//! Typed per-instrument results of one nightly run. The orchestrator never
//! swallows a failure silently: every instrument ends with exactly one
//! [`OutcomeStatus`] in the [`RunReport`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use super::sync::SyncOutcome;

/// Per-instrument state machine.
///
/// ```text
/// Pending → Syncing → Preparing → Fitting → Publishing → Done
///              └──────────┴──────────┴──────────┴──────→ Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Pending,
    Syncing,
    Preparing,
    Fitting,
    Publishing,
    Done,
    Failed,
}

impl Stage {
    pub fn can_advance_to(self, next: Stage) -> bool {
        use Stage::*;
        matches!(
            (self, next),
            (Pending, Syncing)
                | (Syncing, Preparing)
                | (Preparing, Fitting)
                | (Fitting, Publishing)
                | (Publishing, Done)
                | (Syncing | Preparing | Fitting | Publishing, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Stage::Done | Stage::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// No stored price history, so nothing to fit.
    NoHistory,
    /// Requested symbol is not a tracked instrument.
    UnknownSymbol,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Published {
        model:           String,
        aic:             f64,
        point_rows:      usize,
        volatility_rows: usize,
        /// Set when the volatility model failed and only points were published.
        #[serde(skip_serializing_if = "Option::is_none")]
        volatility_error: Option<String>,
    },
    Skipped { reason: SkipReason },
    Failed { stage: Stage, error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct InstrumentReport {
    pub symbol:        String,
    pub instrument_id: Option<i64>,
    /// Last stage reached.
    pub stage:         Stage,
    pub sync:          Option<SyncOutcome>,
    pub status:        OutcomeStatus,
}

impl InstrumentReport {
    pub fn unknown_symbol(symbol: impl Into<String>) -> Self {
        Self {
            symbol:        symbol.into(),
            instrument_id: None,
            stage:         Stage::Pending,
            sync:          None,
            status:        OutcomeStatus::Skipped { reason: SkipReason::UnknownSymbol },
        }
    }

    pub fn is_published(&self) -> bool {
        matches!(self.status, OutcomeStatus::Published { .. })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub published:   usize,
    pub skipped:     usize,
    pub failed:      usize,
    /// Instruments whose sync hit a provider or store fault (any status).
    pub sync_faults: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id:      Uuid,
    pub run_date:    NaiveDate,
    pub started_at:  DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub instruments: Vec<InstrumentReport>,
}

impl RunReport {
    pub fn summary(&self) -> RunSummary {
        let mut s = RunSummary::default();
        for r in &self.instruments {
            if r.sync.as_ref().is_some_and(SyncOutcome::is_fault) {
                s.sync_faults += 1;
            }
            match r.status {
                OutcomeStatus::Published { .. } => s.published += 1,
                OutcomeStatus::Skipped { .. } => s.skipped += 1,
                OutcomeStatus::Failed { .. } => s.failed += 1,
            }
        }
        s
    }

    pub fn instrument(&self, symbol: &str) -> Option<&InstrumentReport> {
        self.instruments.iter().find(|r| r.symbol.eq_ignore_ascii_case(symbol))
    }

    pub fn log_summary(&self) {
        let s = self.summary();
        let elapsed_ms = (self.finished_at - self.started_at).num_milliseconds();
        if s.failed == 0 {
            info!(run_id = %self.run_id, run_date = %self.run_date, published = s.published, skipped = s.skipped, sync_faults = s.sync_faults, elapsed_ms, "✅ forecast run finished");
        } else {
            warn!(run_id = %self.run_id, run_date = %self.run_date, published = s.published, skipped = s.skipped, failed = s.failed, sync_faults = s.sync_faults, elapsed_ms, "⚠️ forecast run finished with failures");
        }
    }
}
