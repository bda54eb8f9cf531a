//! End-to-end runs of the nightly orchestrator against the in-memory store.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use tokio::sync::Notify;

use pricecast::config::PipelineConfig;
use pricecast::engine::{ModelTable, SarimaOrder, SearchBounds};
use pricecast::error::RunError;
use pricecast::market::{synthetic::synthetic_closes, MarketDataProvider};
use pricecast::models::{
    CurrentForecast, ForecastBatch, InstrumentSeed, PointForecast, PriceBar, PriceObservation, TrackedInstrument,
};
use pricecast::pipeline::{NightlyOrchestrator, OutcomeStatus, SkipReason, Stage, SyncOutcome};
use pricecast::store::{ForecastStore, MemoryStore};

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).unwrap()
}

/// Monday
fn run_date() -> NaiveDate {
    d(2024, 6, 3)
}

/// The last `n` weekday closes strictly before `run_date()`.
fn business_day_closes(symbol: &str, n: usize) -> Vec<PriceBar> {
    let all = synthetic_closes(symbol, d(2020, 1, 1), run_date());
    all[all.len() - n..].to_vec()
}

fn flat_closes(n: usize, value: f64) -> Vec<PriceBar> {
    business_day_closes("FLAT", n).into_iter().map(|b| PriceBar::new(b.date, value)).collect()
}

fn symbols(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

// ─── Test doubles ─────────────────────────────────────────────────────────────

/// Serves canned bars per symbol; unknown symbols get an empty answer,
/// `DOWN` always errors.
#[derive(Default)]
struct CannedProvider {
    bars: HashMap<String, Vec<PriceBar>>,
}

impl CannedProvider {
    fn with(mut self, symbol: &str, bars: Vec<PriceBar>) -> Self {
        self.bars.insert(symbol.to_string(), bars);
        self
    }
}

#[async_trait]
impl MarketDataProvider for CannedProvider {
    fn name(&self) -> &str {
        "canned"
    }

    async fn fetch_daily_closes(&self, symbol: &str, start: NaiveDate, end: NaiveDate) -> anyhow::Result<Vec<PriceBar>> {
        if symbol == "DOWN" {
            anyhow::bail!("provider offline");
        }
        Ok(self
            .bars
            .get(symbol)
            .map(|bars| bars.iter().copied().filter(|b| b.date >= start && b.date < end).collect())
            .unwrap_or_default())
    }
}

/// Blocks every fetch until released.
struct GatedProvider {
    gate: Arc<Notify>,
}

#[async_trait]
impl MarketDataProvider for GatedProvider {
    fn name(&self) -> &str {
        "gated"
    }

    async fn fetch_daily_closes(&self, _: &str, _: NaiveDate, _: NaiveDate) -> anyhow::Result<Vec<PriceBar>> {
        self.gate.notified().await;
        Ok(Vec::new())
    }
}

/// In-memory store whose forecast writes fail for one instrument.
struct FailingPublishStore {
    inner:       MemoryStore,
    fail_symbol: String,
}

#[async_trait]
impl ForecastStore for FailingPublishStore {
    async fn upsert_instruments(&self, seeds: &[InstrumentSeed]) -> anyhow::Result<Vec<TrackedInstrument>> {
        self.inner.upsert_instruments(seeds).await
    }
    async fn list_instruments(&self) -> anyhow::Result<Vec<TrackedInstrument>> {
        self.inner.list_instruments().await
    }
    async fn find_instrument(&self, symbol: &str) -> anyhow::Result<Option<TrackedInstrument>> {
        self.inner.find_instrument(symbol).await
    }
    async fn latest_price_date(&self, id: i64) -> anyhow::Result<Option<NaiveDate>> {
        self.inner.latest_price_date(id).await
    }
    async fn append_prices(&self, id: i64, bars: &[PriceBar]) -> anyhow::Result<usize> {
        self.inner.append_prices(id, bars).await
    }
    async fn price_history(&self, id: i64) -> anyhow::Result<Vec<PriceObservation>> {
        self.inner.price_history(id).await
    }
    async fn replace_forecasts(&self, id: i64, batch: &ForecastBatch) -> anyhow::Result<()> {
        let target = self.inner.find_instrument(&self.fail_symbol).await?;
        if target.is_some_and(|t| t.id == id) {
            anyhow::bail!("disk full");
        }
        self.inner.replace_forecasts(id, batch).await
    }
    async fn current_forecast(&self, id: i64, limit: usize) -> anyhow::Result<Option<CurrentForecast>> {
        self.inner.current_forecast(id, limit).await
    }
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

async fn seed(store: &dyn ForecastStore, histories: &[(&str, Vec<PriceBar>)]) -> Vec<TrackedInstrument> {
    let seeds: Vec<_> = histories.iter().map(|(s, _)| InstrumentSeed::new(*s, *s)).collect();
    store.upsert_instruments(&seeds).await.unwrap();
    let mut out = Vec::new();
    for (symbol, bars) in histories {
        let inst = store.find_instrument(symbol).await.unwrap().unwrap();
        store.append_prices(inst.id, bars).await.unwrap();
        out.push(inst);
    }
    out
}

fn orchestrator(store: Arc<dyn ForecastStore>, provider: impl MarketDataProvider + 'static) -> NightlyOrchestrator {
    NightlyOrchestrator::new(store, Arc::new(provider), PipelineConfig::default())
}

async fn current(store: &dyn ForecastStore, symbol: &str) -> Option<CurrentForecast> {
    let inst = store.find_instrument(symbol).await.unwrap().unwrap();
    store.current_forecast(inst.id, 100).await.unwrap()
}

fn prior_batch(run: NaiveDate) -> ForecastBatch {
    ForecastBatch {
        run_date:   run,
        points:     (1..=10)
            .map(|i| PointForecast {
                run_date:        run,
                target_date:     run.checked_add_days(Days::new(i)).unwrap(),
                predicted_price: 42.0,
            })
            .collect(),
        volatility: Vec::new(),
    }
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn three_hundred_business_days_produce_ten_rows_of_each_kind() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("X", business_day_closes("X", 300))]).await;

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();

    let x = report.instrument("X").unwrap();
    assert_eq!(x.stage, Stage::Done);
    assert_eq!(x.sync, Some(SyncOutcome::Appended { rows: 0 }));
    assert!(x.is_published(), "{:?}", x.status);

    let fc = current(store.as_ref(), "X").await.unwrap();
    assert_eq!(fc.last_update, run_date());
    assert_eq!(fc.points.len(), 10);
    assert_eq!(fc.volatility.len(), 10);
    for (i, (p, v)) in fc.points.iter().zip(&fc.volatility).enumerate() {
        let expected = run_date().checked_add_days(Days::new(i as u64 + 1)).unwrap();
        assert_eq!(p.target_date, expected);
        assert_eq!(v.target_date, expected);
        assert!(p.predicted_price.is_finite());
        assert!(v.predicted_volatility >= 0.0 && v.predicted_volatility.is_finite());
    }
}

#[tokio::test]
async fn instrument_without_history_is_skipped_quietly() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("Y", Vec::new())]).await;

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();

    let y = report.instrument("Y").unwrap();
    assert_eq!(y.status, OutcomeStatus::Skipped { reason: SkipReason::NoHistory });
    assert_eq!(y.stage, Stage::Failed);
    assert!(current(store.as_ref(), "Y").await.is_none());
}

#[tokio::test]
async fn rerun_on_same_day_keeps_row_counts() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("X", business_day_closes("X", 200))]).await;
    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());

    orch.run_at(run_date(), None).await.unwrap();
    let first = current(store.as_ref(), "X").await.unwrap();
    orch.run_at(run_date(), None).await.unwrap();
    let second = current(store.as_ref(), "X").await.unwrap();

    assert_eq!(first.points.len(), 10);
    assert_eq!(second.points.len(), 10);
    assert_eq!(second.volatility.len(), first.volatility.len());
}

#[tokio::test]
async fn next_day_run_supersedes_previous_rows() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("X", business_day_closes("X", 200))]).await;
    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());

    orch.run_at(run_date(), None).await.unwrap();
    let next = run_date().succ_opt().unwrap();
    orch.run_at(next, None).await.unwrap();

    let fc = current(store.as_ref(), "X").await.unwrap();
    assert_eq!(fc.last_update, next);
    assert_eq!(fc.points.len(), 10);
    assert!(fc.points.iter().all(|p| p.run_date == next));
}

#[tokio::test]
async fn flat_prices_publish_zero_volatility() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("FLAT", flat_closes(120, 25.0))]).await;

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();
    assert!(report.instrument("FLAT").unwrap().is_published());

    let fc = current(store.as_ref(), "FLAT").await.unwrap();
    assert_eq!(fc.volatility.len(), 10);
    assert!(fc.volatility.iter().all(|v| v.predicted_volatility == 0.0));
    assert!(fc.points.iter().all(|p| (p.predicted_price - 25.0).abs() < 1e-9));
}

#[tokio::test]
async fn fit_failure_leaves_prior_rows_and_other_instruments_alone() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    let insts = seed(
        store.as_ref(),
        &[("A", business_day_closes("A", 5)), ("B", business_day_closes("B", 250))],
    )
    .await;
    let yesterday = run_date().pred_opt().unwrap();
    store.replace_forecasts(insts[0].id, &prior_batch(yesterday)).await.unwrap();

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();

    let a = report.instrument("A").unwrap();
    assert!(matches!(a.status, OutcomeStatus::Failed { stage: Stage::Fitting, .. }), "{:?}", a.status);
    assert!(report.instrument("B").unwrap().is_published());

    let a_rows = current(store.as_ref(), "A").await.unwrap();
    assert_eq!(a_rows.last_update, yesterday);
    assert!(a_rows.points.iter().all(|p| p.predicted_price == 42.0));
    assert_eq!(current(store.as_ref(), "B").await.unwrap().points.len(), 10);
    assert_eq!(report.summary().failed, 1);
}

#[tokio::test]
async fn publish_failure_keeps_prior_rows() {
    let inner = MemoryStore::new();
    let insts = seed(
        &inner,
        &[("P", business_day_closes("P", 200)), ("Q", business_day_closes("Q", 200))],
    )
    .await;
    let yesterday = run_date().pred_opt().unwrap();
    inner.replace_forecasts(insts[0].id, &prior_batch(yesterday)).await.unwrap();

    let store: Arc<dyn ForecastStore> = Arc::new(FailingPublishStore { inner, fail_symbol: "P".into() });
    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();

    match &report.instrument("P").unwrap().status {
        OutcomeStatus::Failed { stage, error } => {
            assert_eq!(*stage, Stage::Publishing);
            assert!(error.contains("disk full"), "{error}");
        }
        other => panic!("expected publishing failure, got {other:?}"),
    }
    assert!(report.instrument("Q").unwrap().is_published());

    let p_rows = current(store.as_ref(), "P").await.unwrap();
    assert_eq!(p_rows.last_update, yesterday);
    assert_eq!(p_rows.points.len(), 10);
    assert!(p_rows.points.iter().all(|p| p.predicted_price == 42.0));
}

#[tokio::test]
async fn provider_outage_falls_back_to_stored_history() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("DOWN", business_day_closes("DOWN", 150))]).await;

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), None).await.unwrap();

    let down = report.instrument("DOWN").unwrap();
    assert!(matches!(down.sync, Some(SyncOutcome::ProviderUnavailable { .. })));
    assert!(down.is_published());
}

#[tokio::test]
async fn repeated_syncs_never_duplicate_observations() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    let bars = business_day_closes("S", 120);
    let insts = seed(store.as_ref(), &[("S", bars[..60].to_vec())]).await;

    let provider = CannedProvider::default().with("S", bars.clone());
    let config = PipelineConfig { history_start: d(2020, 1, 1), ..PipelineConfig::default() };
    let orch = NightlyOrchestrator::new(Arc::clone(&store), Arc::new(provider), config);

    let first = orch.run_at(run_date(), None).await.unwrap();
    assert_eq!(first.instrument("S").unwrap().sync, Some(SyncOutcome::Appended { rows: 60 }));
    let again = orch.run_at(run_date(), None).await.unwrap();
    assert_eq!(again.instrument("S").unwrap().sync, Some(SyncOutcome::Appended { rows: 0 }));
    // history ends Friday 2024-05-31, so a Saturday run has nothing to fetch
    let saturday = orch.run_at(d(2024, 6, 1), None).await.unwrap();
    assert_eq!(saturday.instrument("S").unwrap().sync, Some(SyncOutcome::UpToDate));

    let history = store.price_history(insts[0].id).await.unwrap();
    assert_eq!(history.len(), 120);
    assert!(history.windows(2).all(|w| w[0].trading_date < w[1].trading_date));
}

#[tokio::test]
async fn targeted_run_reports_unknown_symbols() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(
        store.as_ref(),
        &[("X", business_day_closes("X", 150)), ("Z", business_day_closes("Z", 150))],
    )
    .await;

    let orch = orchestrator(Arc::clone(&store), CannedProvider::default());
    let report = orch.run_at(run_date(), Some(&symbols(&["x", "NOPE"]))).await.unwrap();

    assert_eq!(report.instruments.len(), 2);
    assert!(report.instrument("X").unwrap().is_published());
    assert_eq!(
        report.instrument("NOPE").unwrap().status,
        OutcomeStatus::Skipped { reason: SkipReason::UnknownSymbol }
    );
    assert!(report.instrument("Z").is_none());
    assert!(current(store.as_ref(), "Z").await.is_none());
    assert!(orch.last_report().await.is_some());

    let ghost_only = orch.run_symbols(&symbols(&["ghost"])).await.unwrap();
    assert_eq!(ghost_only.instruments.len(), 1);
    assert_eq!(ghost_only.summary().skipped, 1);
}

#[tokio::test]
async fn fixed_order_is_used_for_configured_symbol() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("X", business_day_closes("X", 150))]).await;

    let order = SarimaOrder::new(1, 1, 0, (0, 0, 0), 5);
    let config = PipelineConfig {
        models: ModelTable::new(HashMap::from([("x".to_string(), order)]), SearchBounds::default()),
        ..PipelineConfig::default()
    };
    let orch = NightlyOrchestrator::new(Arc::clone(&store), Arc::new(CannedProvider::default()), config);
    let report = orch.run_at(run_date(), None).await.unwrap();

    match &report.instrument("X").unwrap().status {
        OutcomeStatus::Published { model, point_rows, .. } => {
            assert_eq!(model, "(1,1,0)(0,0,0)[5]");
            assert_eq!(*point_rows, 10);
        }
        other => panic!("expected published, got {other:?}"),
    }
}

#[tokio::test]
async fn overlapping_run_is_rejected() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    seed(store.as_ref(), &[("G", Vec::new())]).await;

    let gate = Arc::new(Notify::new());
    let orch = Arc::new(orchestrator(Arc::clone(&store), GatedProvider { gate: Arc::clone(&gate) }));

    let first = {
        let orch = Arc::clone(&orch);
        tokio::spawn(async move { orch.run_at(run_date(), None).await })
    };
    while !orch.is_running() {
        tokio::task::yield_now().await;
    }

    let second = orch.run_at(run_date(), None).await;
    assert!(matches!(second, Err(RunError::AlreadyRunning)));

    gate.notify_one();
    let report = first.await.unwrap().unwrap();
    assert_eq!(report.instruments.len(), 1);
    assert!(!orch.is_running());
}

#[tokio::test]
async fn fit_past_its_time_budget_fails_the_instrument() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    let insts = seed(store.as_ref(), &[("SLOW", business_day_closes("SLOW", 300))]).await;
    let yesterday = run_date().pred_opt().unwrap();
    store.replace_forecasts(insts[0].id, &prior_batch(yesterday)).await.unwrap();

    let config = PipelineConfig { fit_timeout: Duration::ZERO, ..PipelineConfig::default() };
    let orch = NightlyOrchestrator::new(Arc::clone(&store), Arc::new(CannedProvider::default()), config);
    let report = orch.run_at(run_date(), None).await.unwrap();

    let slow = report.instrument("SLOW").unwrap();
    assert_eq!(slow.stage, Stage::Failed);
    match &slow.status {
        OutcomeStatus::Failed { stage, error } => {
            assert_eq!(*stage, Stage::Fitting);
            assert!(error.contains("aborted"), "{error}");
        }
        other => panic!("expected fitting failure, got {other:?}"),
    }

    let rows = current(store.as_ref(), "SLOW").await.unwrap();
    assert_eq!(rows.last_update, yesterday);
    assert!(rows.points.iter().all(|p| p.predicted_price == 42.0));
}

#[tokio::test]
async fn volatility_failure_still_publishes_price_points() {
    let store: Arc<dyn ForecastStore> = Arc::new(MemoryStore::new());
    // 16 closes leave 15 residuals, too few for GARCH
    seed(store.as_ref(), &[("SHORT", business_day_closes("SHORT", 16))]).await;

    let order = SarimaOrder::new(0, 1, 0, (0, 0, 0), 5);
    let config = PipelineConfig {
        models: ModelTable::new(HashMap::from([("SHORT".to_string(), order)]), SearchBounds::default()),
        ..PipelineConfig::default()
    };
    let orch = NightlyOrchestrator::new(Arc::clone(&store), Arc::new(CannedProvider::default()), config);
    let report = orch.run_at(run_date(), None).await.unwrap();

    let short = report.instrument("SHORT").unwrap();
    assert_eq!(short.stage, Stage::Done);
    match &short.status {
        OutcomeStatus::Published { point_rows, volatility_rows, volatility_error, .. } => {
            assert_eq!(*point_rows, 10);
            assert_eq!(*volatility_rows, 0);
            let err = volatility_error.as_deref().unwrap();
            assert!(err.contains("insufficient data"), "{err}");
        }
        other => panic!("expected published, got {other:?}"),
    }

    let fc = current(store.as_ref(), "SHORT").await.unwrap();
    assert_eq!(fc.last_update, run_date());
    assert_eq!(fc.points.len(), 10);
    assert!(fc.volatility.is_empty());
}
