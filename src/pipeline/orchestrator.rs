//! # pipeline::orchestrator — Nightly Orchestrator
//!
//! ```text
//! for each instrument (sequential):
//!   Syncing    → fetch + append new closes     (provider fault = no new data)
//!   Preparing  → business-day series           (no history = skip)
//!   Fitting    → SARIMA + GARCH on blocking pool, bounded by timeout
//!   Publishing → delete + insert forecast rows as one unit
//!   Done
//! ```
//!
//! One instrument's failure is recorded in the [`RunReport`] and never
//! touches the next instrument. Only one run may be active at a time.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::publish::{build_batch, publish};
use super::report::{InstrumentReport, OutcomeStatus, RunReport, SkipReason, Stage};
use super::series::prepare_series;
use super::sync::Synchronizer;
use crate::config::PipelineConfig;
use crate::engine::{fit_forecast, FitError, ModelForecast, ModelSpec, ModelTable, VolatilityOutcome};
use crate::error::{PipelineError, RunError};
use crate::market::MarketDataProvider;
use crate::models::{instrument::normalize_symbol, TrackedInstrument};
use crate::store::ForecastStore;

pub struct NightlyOrchestrator {
    store:        Arc<dyn ForecastStore>,
    synchronizer: Synchronizer,
    models:       ModelTable,
    fit_timeout:  Duration,
    horizon:      usize,
    /// Held for the whole run; `try_lock` failing means a run is active.
    run_guard:    Arc<Mutex<()>>,
    last_report:  RwLock<Option<RunReport>>,
}

/// Exclusive right to start a run. Dropping it without running frees the
/// slot again.
pub struct RunPermit {
    _guard: OwnedMutexGuard<()>,
}

/// Tracks one instrument through the stage machine.
struct Progress {
    report: InstrumentReport,
}

impl Progress {
    fn new(instrument: &TrackedInstrument) -> Self {
        Self {
            report: InstrumentReport {
                symbol:        instrument.symbol.clone(),
                instrument_id: Some(instrument.id),
                stage:         Stage::Pending,
                sync:          None,
                status:        OutcomeStatus::Skipped { reason: SkipReason::NoHistory },
            },
        }
    }

    fn enter(&mut self, next: Stage) {
        debug_assert!(self.report.stage.can_advance_to(next), "{:?} → {:?}", self.report.stage, next);
        debug!(symbol = %self.report.symbol, from = ?self.report.stage, to = ?next, "stage");
        self.report.stage = next;
    }

    fn skip(mut self, reason: SkipReason) -> InstrumentReport {
        self.enter(Stage::Failed);
        self.report.status = OutcomeStatus::Skipped { reason };
        self.report
    }

    fn fail(mut self, err: PipelineError) -> InstrumentReport {
        let stage = self.report.stage;
        error!(symbol = %self.report.symbol, ?stage, error = %err, "❌ instrument failed");
        self.enter(Stage::Failed);
        self.report.status = OutcomeStatus::Failed { stage, error: err.to_string() };
        self.report
    }
}

impl NightlyOrchestrator {
    pub fn new(store: Arc<dyn ForecastStore>, provider: Arc<dyn MarketDataProvider>, config: PipelineConfig) -> Self {
        Self {
            store,
            synchronizer: Synchronizer::new(provider, config.history_start, config.fetch_timeout),
            models:       config.models,
            fit_timeout:  config.fit_timeout,
            horizon:      config.horizon,
            run_guard:    Arc::new(Mutex::new(())),
            last_report:  RwLock::new(None),
        }
    }

    pub fn store(&self) -> Arc<dyn ForecastStore> {
        Arc::clone(&self.store)
    }

    pub fn is_running(&self) -> bool {
        self.run_guard.try_lock().is_err()
    }

    pub async fn last_report(&self) -> Option<RunReport> {
        self.last_report.read().await.clone()
    }

    // ─── Entry points ─────────────────────────────────────────────────────────

    /// Full tracked set, dated today (UTC).
    pub async fn run(&self) -> Result<RunReport, RunError> {
        self.run_at(Utc::now().date_naive(), None).await
    }

    /// Targeted rerun for the given symbols (case-insensitive).
    pub async fn run_symbols(&self, symbols: &[String]) -> Result<RunReport, RunError> {
        self.run_at(Utc::now().date_naive(), Some(symbols)).await
    }

    /// Claims the run slot without starting anything yet.
    pub fn try_reserve(&self) -> Result<RunPermit, RunError> {
        match Arc::clone(&self.run_guard).try_lock_owned() {
            Ok(guard) => Ok(RunPermit { _guard: guard }),
            Err(_) => {
                warn!("⏳ forecast run requested while another is in progress, rejected");
                Err(RunError::AlreadyRunning)
            }
        }
    }

    /// `run` / `run_symbols` with an explicit run date.
    pub async fn run_at(&self, run_date: NaiveDate, symbols: Option<&[String]>) -> Result<RunReport, RunError> {
        let permit = self.try_reserve()?;
        self.run_reserved(permit, run_date, symbols).await
    }

    /// Runs under a permit taken earlier with [`Self::try_reserve`]; the slot
    /// is released when the run ends.
    pub async fn run_reserved(
        &self,
        _permit: RunPermit,
        run_date: NaiveDate,
        symbols: Option<&[String]>,
    ) -> Result<RunReport, RunError> {
        let tracked = self
            .store
            .list_instruments()
            .await
            .map_err(|e| RunError::Instruments(format!("{e:#}")))?;

        let (instruments, unknown) = match symbols {
            None => (tracked, Vec::new()),
            Some(requested) => select(tracked, requested),
        };

        let mut report = self.run_for_instruments(self.store.as_ref(), run_date, &instruments).await;
        report.instruments.extend(unknown.into_iter().map(|s| {
            warn!(symbol = %s, "unknown symbol requested, skipped");
            InstrumentReport::unknown_symbol(s)
        }));

        report.log_summary();
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Processes `instruments` in order against `store`. Never fails as a whole.
    pub async fn run_for_instruments(
        &self,
        store: &dyn ForecastStore,
        run_date: NaiveDate,
        instruments: &[TrackedInstrument],
    ) -> RunReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        info!(%run_id, %run_date, instruments = instruments.len(), "🌙 forecast run started");

        let mut reports = Vec::with_capacity(instruments.len());
        for instrument in instruments {
            let report = self.process(store, run_date, instrument).await;
            debug_assert!(report.stage.is_terminal(), "{} left at {:?}", report.symbol, report.stage);
            reports.push(report);
        }

        RunReport {
            run_id,
            run_date,
            started_at,
            finished_at: Utc::now(),
            instruments: reports,
        }
    }

    // ─── Per-instrument pipeline ──────────────────────────────────────────────

    async fn process(&self, store: &dyn ForecastStore, run_date: NaiveDate, instrument: &TrackedInstrument) -> InstrumentReport {
        let mut progress = Progress::new(instrument);

        // ── Syncing: faults fall through to existing history ─────────────────
        progress.enter(Stage::Syncing);
        let outcome = self.synchronizer.sync(store, instrument, run_date).await;
        progress.report.sync = Some(outcome);

        // ── Preparing ─────────────────────────────────────────────────────────
        progress.enter(Stage::Preparing);
        let history = match store.price_history(instrument.id).await {
            Ok(history) => history,
            Err(e) => return progress.fail(PipelineError::DataUnavailable(format!("{e:#}"))),
        };
        let Some(series) = prepare_series(&history) else {
            info!(symbol = %instrument.symbol, "no price history, skipped");
            return progress.skip(SkipReason::NoHistory);
        };
        debug!(symbol = %instrument.symbol, points = series.values.len(), last = ?series.last_date(), "series prepared");

        // ── Fitting ───────────────────────────────────────────────────────────
        progress.enter(Stage::Fitting);
        let spec = self.models.resolve(&instrument.symbol);
        let forecast = match self.fit(series.values, spec).await {
            Ok(forecast) => forecast,
            Err(e) => return progress.fail(e.into()),
        };

        // ── Publishing ────────────────────────────────────────────────────────
        progress.enter(Stage::Publishing);
        let batch = match build_batch(run_date, &forecast) {
            Ok(batch) => batch,
            Err(e) => return progress.fail(e),
        };
        if let Err(e) = publish(store, instrument, &batch).await {
            return progress.fail(e);
        }

        progress.enter(Stage::Done);
        progress.report.status = OutcomeStatus::Published {
            model:            forecast.order.to_string(),
            aic:              forecast.aic,
            point_rows:       batch.points.len(),
            volatility_rows:  batch.volatility.len(),
            volatility_error: match &forecast.volatility {
                VolatilityOutcome::Unavailable(e) => Some(e.to_string()),
                _ => None,
            },
        };
        progress.report
    }

    /// Runs the CPU-bound fit on the blocking pool. A panic or an overrun is
    /// reported as [`FitError::Aborted`]; an overrunning fit keeps its thread
    /// until it returns but its result is discarded.
    async fn fit(&self, values: Vec<f64>, spec: ModelSpec) -> Result<ModelForecast, FitError> {
        let horizon = self.horizon;
        let handle = tokio::task::spawn_blocking(move || fit_forecast(&values, &spec, horizon));

        match tokio::time::timeout(self.fit_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(FitError::Aborted(format!("fit task failed: {join}"))),
            Err(_) => Err(FitError::Aborted(format!("timed out after {}s", self.fit_timeout.as_secs()))),
        }
    }
}

/// Splits requested symbols into tracked instruments (request order, no
/// duplicates) and unknown symbols.
fn select(tracked: Vec<TrackedInstrument>, requested: &[String]) -> (Vec<TrackedInstrument>, Vec<String>) {
    let mut found: Vec<TrackedInstrument> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();
    for raw in requested {
        let symbol = normalize_symbol(raw);
        if found.iter().any(|i| i.symbol == symbol) || unknown.contains(&symbol) {
            continue;
        }
        match tracked.iter().find(|i| i.symbol == symbol) {
            Some(inst) => found.push(inst.clone()),
            None => unknown.push(symbol),
        }
    }
    (found, unknown)
}
