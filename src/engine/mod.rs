//! # engine — Forecast Model Fitter
//!
//! CPU-bound statistical core of the nightly job. Nothing in here is async;
//! the orchestrator runs [`fit_forecast`] on the blocking pool.
//!
//! ```text
//! business-day closes
//!     │
//!     ├─ [1] Level model   → SARIMA (fixed order, or ADF + stepwise AIC search)
//!     │
//!     ├─ [2] Residuals     → in-sample, finite only, ×100
//!     │
//!     ├─ [3] Volatility    → zero-mean GARCH(1,1)  (all zeros if residuals are flat)
//!     │
//!     └─ [4] Forecast      → N price levels + N volatilities (√variance / 100)
//! ```

use thiserror::Error;

pub mod arima;
pub mod fitter;
pub mod garch;
pub mod optimizer;
pub mod order_search;
pub mod stationarity;

pub use arima::{SarimaFit, SarimaOrder};
pub use fitter::{fit_forecast, ModelForecast, ModelSpec, ModelTable, VolatilityOutcome};
pub use order_search::SearchBounds;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("insufficient data: need at least {needed} observations, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("optimizer did not converge after {iterations} iterations")]
    NonConvergence { iterations: usize },

    #[error("no candidate order converged ({tried} tried)")]
    NoCandidateConverged { tried: usize },

    #[error("forecast contains non-finite values")]
    NonFiniteForecast,

    #[error("invalid model order: {0}")]
    InvalidOrder(String),

    /// The fit never returned: it panicked or ran past its time budget.
    #[error("fit aborted: {0}")]
    Aborted(String),
}
