//! # store::postgres — PostgreSQL Store
//!
//! `sqlx` implementation of [`ForecastStore`].
//!
//! ## Setup
//! 1. Create a database and set `DATABASE_URL` in `.env`
//! 2. Build with `--features postgres`
//! 3. The schema in `migrations/001_init.sql` is applied on startup
//!
//! Every write runs inside its own transaction; dropping a `Transaction`
//! without `commit()` rolls it back, so an error returned with `?` halfway
//! through a replace leaves the previous forecast rows untouched.

use anyhow::Context;
use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{postgres::PgPoolOptions, Executor, PgPool, Postgres, QueryBuilder};
use tracing::info;

use super::ForecastStore;
use crate::models::{
    instrument::normalize_symbol, CurrentForecast, ForecastBatch, InstrumentSeed, PointForecast,
    PriceBar, PriceObservation, TrackedInstrument, VolatilityForecast,
};

/// Rows per INSERT statement (3 binds each, well under the 65535 bind limit).
const INSERT_CHUNK: usize = 1_000;

// ─── Pool Init ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and apply the embedded schema.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        run_migrations(&pool).await?;

        info!("✅ PostgreSQL connected and migrations applied");
        Ok(Self { pool })
    }
}

async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    // Unprepared execution so the multi-statement script runs as one batch
    pool.execute(include_str!("../../migrations/001_init.sql"))
        .await
        .context("Failed to run migration 001_init.sql")?;

    Ok(())
}

// ─── Rows ─────────────────────────────────────────────────────────────────────

#[derive(sqlx::FromRow)]
struct InstrumentRow {
    id:     i64,
    symbol: String,
    name:   String,
}

impl From<InstrumentRow> for TrackedInstrument {
    fn from(row: InstrumentRow) -> Self {
        Self { id: row.id, symbol: row.symbol, name: row.name }
    }
}

#[derive(sqlx::FromRow)]
struct PriceRow {
    trading_date: NaiveDate,
    close:        f64,
}

#[derive(sqlx::FromRow)]
struct PointRow {
    run_date:        NaiveDate,
    target_date:     NaiveDate,
    predicted_price: f64,
}

#[derive(sqlx::FromRow)]
struct VolatilityRow {
    run_date:             NaiveDate,
    target_date:          NaiveDate,
    predicted_volatility: f64,
}

// ─── ForecastStore ────────────────────────────────────────────────────────────

#[async_trait]
impl ForecastStore for PgStore {
    async fn upsert_instruments(&self, seeds: &[InstrumentSeed]) -> anyhow::Result<Vec<TrackedInstrument>> {
        let mut tx = self.pool.begin().await.context("upsert_instruments: begin failed")?;
        for seed in seeds {
            sqlx::query(
                r#"
                INSERT INTO instruments (symbol, name)
                VALUES ($1, $2)
                ON CONFLICT (symbol) DO UPDATE SET name = EXCLUDED.name
                "#,
            )
            .bind(normalize_symbol(&seed.symbol))
            .bind(&seed.name)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("upsert_instruments failed for {}", seed.symbol))?;
        }
        tx.commit().await.context("upsert_instruments: commit failed")?;

        self.list_instruments().await
    }

    async fn list_instruments(&self) -> anyhow::Result<Vec<TrackedInstrument>> {
        let rows = sqlx::query_as::<_, InstrumentRow>(
            "SELECT id, symbol, name FROM instruments ORDER BY symbol",
        )
        .fetch_all(&self.pool)
        .await
        .context("list_instruments failed")?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn find_instrument(&self, symbol: &str) -> anyhow::Result<Option<TrackedInstrument>> {
        let row = sqlx::query_as::<_, InstrumentRow>(
            "SELECT id, symbol, name FROM instruments WHERE symbol = $1",
        )
        .bind(normalize_symbol(symbol))
        .fetch_optional(&self.pool)
        .await
        .context("find_instrument failed")?;

        Ok(row.map(Into::into))
    }

    async fn latest_price_date(&self, instrument_id: i64) -> anyhow::Result<Option<NaiveDate>> {
        sqlx::query_scalar::<_, Option<NaiveDate>>(
            "SELECT MAX(trading_date) FROM price_history WHERE instrument_id = $1",
        )
        .bind(instrument_id)
        .fetch_one(&self.pool)
        .await
        .context("latest_price_date failed")
    }

    async fn append_prices(&self, instrument_id: i64, bars: &[PriceBar]) -> anyhow::Result<usize> {
        if bars.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await.context("append_prices: begin failed")?;
        let mut inserted = 0u64;
        for chunk in bars.chunks(INSERT_CHUNK) {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO price_history (instrument_id, trading_date, close) ",
            );
            builder.push_values(chunk, |mut row, bar| {
                row.push_bind(instrument_id).push_bind(bar.date).push_bind(bar.close);
            });
            builder.push(" ON CONFLICT (instrument_id, trading_date) DO NOTHING");

            inserted += builder
                .build()
                .execute(&mut *tx)
                .await
                .context("append_prices insert failed")?
                .rows_affected();
        }
        tx.commit().await.context("append_prices: commit failed")?;

        Ok(inserted as usize)
    }

    async fn price_history(&self, instrument_id: i64) -> anyhow::Result<Vec<PriceObservation>> {
        let rows = sqlx::query_as::<_, PriceRow>(
            r#"
            SELECT trading_date, close
            FROM price_history
            WHERE instrument_id = $1
            ORDER BY trading_date
            "#,
        )
        .bind(instrument_id)
        .fetch_all(&self.pool)
        .await
        .context("price_history failed")?;

        Ok(rows
            .into_iter()
            .map(|r| PriceObservation { instrument_id, trading_date: r.trading_date, close: r.close })
            .collect())
    }

    async fn replace_forecasts(&self, instrument_id: i64, batch: &ForecastBatch) -> anyhow::Result<()> {
        let mut tx = self.pool.begin().await.context("replace_forecasts: begin failed")?;

        sqlx::query("DELETE FROM point_forecasts WHERE instrument_id = $1")
            .bind(instrument_id)
            .execute(&mut *tx)
            .await
            .context("delete point_forecasts failed")?;
        sqlx::query("DELETE FROM volatility_forecasts WHERE instrument_id = $1")
            .bind(instrument_id)
            .execute(&mut *tx)
            .await
            .context("delete volatility_forecasts failed")?;

        if !batch.points.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO point_forecasts (instrument_id, run_date, target_date, predicted_price) ",
            );
            builder.push_values(&batch.points, |mut row, p| {
                row.push_bind(instrument_id)
                    .push_bind(p.run_date)
                    .push_bind(p.target_date)
                    .push_bind(p.predicted_price);
            });
            builder.build().execute(&mut *tx).await.context("insert point_forecasts failed")?;
        }

        if !batch.volatility.is_empty() {
            let mut builder = QueryBuilder::<Postgres>::new(
                "INSERT INTO volatility_forecasts (instrument_id, run_date, target_date, predicted_volatility) ",
            );
            builder.push_values(&batch.volatility, |mut row, v| {
                row.push_bind(instrument_id)
                    .push_bind(v.run_date)
                    .push_bind(v.target_date)
                    .push_bind(v.predicted_volatility);
            });
            builder.build().execute(&mut *tx).await.context("insert volatility_forecasts failed")?;
        }

        tx.commit().await.context("replace_forecasts: commit failed")?;
        Ok(())
    }

    async fn current_forecast(&self, instrument_id: i64, limit: usize) -> anyhow::Result<Option<CurrentForecast>> {
        let points = sqlx::query_as::<_, PointRow>(
            r#"
            SELECT run_date, target_date, predicted_price
            FROM point_forecasts
            WHERE instrument_id = $1
              AND run_date = (SELECT MAX(run_date) FROM point_forecasts WHERE instrument_id = $1)
            ORDER BY target_date
            LIMIT $2
            "#,
        )
        .bind(instrument_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("current point forecast query failed")?;

        let Some(last_update) = points.first().map(|p| p.run_date) else {
            return Ok(None);
        };

        let volatility = sqlx::query_as::<_, VolatilityRow>(
            r#"
            SELECT run_date, target_date, predicted_volatility
            FROM volatility_forecasts
            WHERE instrument_id = $1 AND run_date = $2
            ORDER BY target_date
            LIMIT $3
            "#,
        )
        .bind(instrument_id)
        .bind(last_update)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("current volatility forecast query failed")?;

        Ok(Some(CurrentForecast {
            last_update,
            points: points
                .into_iter()
                .map(|r| PointForecast {
                    run_date:        r.run_date,
                    target_date:     r.target_date,
                    predicted_price: r.predicted_price,
                })
                .collect(),
            volatility: volatility
                .into_iter()
                .map(|r| VolatilityForecast {
                    run_date:             r.run_date,
                    target_date:          r.target_date,
                    predicted_volatility: r.predicted_volatility,
                })
                .collect(),
        }))
    }
}
