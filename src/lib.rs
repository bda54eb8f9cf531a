//! # pricecast
//!
//! Nightly price-history sync and short-horizon forecast service.
//!
//! ```text
//!  ┌────────────┐  01:00 UTC   ┌──────────────────────────────────────────────┐
//!  │ Scheduler  │ ───────────▶ │ NightlyOrchestrator (one run at a time)      │
//!  └────────────┘              │  per instrument:                              │
//!  POST /api/jobs/forecast ──▶ │   sync ─▶ series ─▶ SARIMA+GARCH ─▶ publish   │
//!                              └───────┬───────────────────────────┬──────────┘
//!                                      │ MarketDataProvider        │ ForecastStore
//!                                      ▼                           ▼
//!                              Yahoo chart API / mock      PostgreSQL / memory
//!
//!  GET /api/predictions/:symbol ◀──── current forecast set
//! ```

pub mod auth;
pub mod config;
pub mod engine;
pub mod error;
pub mod market;
pub mod models;
pub mod pipeline;
pub mod routes;
pub mod scheduler;
pub mod state;
pub mod store;
