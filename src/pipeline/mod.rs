//! # pipeline — Nightly Forecast Pipeline
//!
//! Async glue around the statistical engine: sync closes, prepare the
//! business-day series, fit, publish. See [`NightlyOrchestrator`].

pub mod orchestrator;
pub mod publish;
pub mod report;
pub mod series;
pub mod sync;

pub use orchestrator::{NightlyOrchestrator, RunPermit};
pub use report::{InstrumentReport, OutcomeStatus, RunReport, RunSummary, SkipReason, Stage};
pub use series::{prepare_series, BusinessDaySeries};
pub use sync::{SyncOutcome, Synchronizer};
