use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pricecast::{
    config::Config,
    market::provider_from_url,
    pipeline::NightlyOrchestrator,
    routes,
    scheduler::DailyTrigger,
    state::build_state,
    store::{ForecastStore, MemoryStore},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("pricecast=debug".parse()?)
                .add_directive("tower_http=info".parse()?)
                .add_directive("sqlx=warn".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║              PRICECAST — Forecast Service             ║
  ║     Sync · SARIMA · GARCH · Publish · Serve           ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config ─────────────────────────────────────────────────────────────
    let config = Config::from_env()?;

    // ── 4. Store + seed ───────────────────────────────────────────────────────
    let store = open_store(&config).await?;
    let tracked = store
        .upsert_instruments(&config.instruments)
        .await
        .context("failed to seed tracked instruments")?;
    info!(count = tracked.len(), fixed_orders = config.pipeline.models.fixed_len(), "📋 tracked instruments ready");

    // ── 5. Market data + orchestrator ─────────────────────────────────────────
    let client = reqwest::Client::builder()
        .timeout(config.pipeline.fetch_timeout)
        .build()
        .context("failed to build HTTP client")?;
    let provider = provider_from_url(&config.market_data_url, client);
    let orchestrator = Arc::new(NightlyOrchestrator::new(
        Arc::clone(&store),
        provider,
        config.pipeline.clone(),
    ));

    // ── 6. Daily trigger ──────────────────────────────────────────────────────
    DailyTrigger::new(config.schedule_at).spawn(Arc::clone(&orchestrator));
    if config.run_on_start {
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            if let Err(e) = orchestrator.run().await {
                error!(error = %e, "❌ startup forecast run could not start");
            }
        });
    }

    // ── 7. Router ─────────────────────────────────────────────────────────────
    let state = build_state(orchestrator, config.api_key.clone());
    if state.api_key.is_none() {
        warn!("🔓 API_KEY not set — all endpoints are open (dev mode)");
    }
    let app = routes::router(state);

    // ── 8. Bind & Serve ───────────────────────────────────────────────────────
    info!(addr = ?config.bind_addr, schedule_utc = %config.schedule_at, "🚀 pricecast server starting");
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn ForecastStore>> {
    #[cfg(feature = "postgres")]
    if let Some(url) = &config.database_url {
        let store = pricecast::store::PgStore::connect(url).await?;
        info!("🐘 PostgreSQL store connected");
        return Ok(Arc::new(store));
    }

    #[cfg(not(feature = "postgres"))]
    if config.database_url.is_some() {
        warn!("DATABASE_URL is set but the `postgres` feature is off, ignoring it");
    }

    warn!("🧪 using in-memory store — data is lost on restart");
    Ok(Arc::new(MemoryStore::new()))
}
