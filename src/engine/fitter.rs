//! # engine::fitter
//!
//! Glues the level model and the volatility model into one forecast.

use std::collections::HashMap;

use anyhow::{bail, Context};
use tracing::{debug, warn};

use super::arima::{Constraints, SarimaFit, SarimaOrder};
use super::garch::fit_garch11;
use super::order_search::{auto_sarima, SearchBounds};
use super::FitError;
use crate::models::instrument::normalize_symbol;

/// Residuals are rescaled before the volatility fit and scaled back afterwards.
const RESIDUAL_SCALE: f64 = 100.0;

/// Population variance at or below this counts as "no noise at all".
const ZERO_VARIANCE: f64 = 1e-12;

// ─── Model selection ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum ModelSpec {
    /// Fit exactly this order, coefficients unconstrained.
    FixedOrder(SarimaOrder),
    /// ADF for d, then stepwise AIC search within the bounds.
    AutoSearch(SearchBounds),
}

/// Per-instrument model choices. Symbols without an entry get the automatic search.
#[derive(Debug, Clone, Default)]
pub struct ModelTable {
    fixed:  HashMap<String, SarimaOrder>,
    bounds: SearchBounds,
}

impl ModelTable {
    pub fn new(fixed: HashMap<String, SarimaOrder>, bounds: SearchBounds) -> Self {
        let fixed = fixed.into_iter().map(|(s, o)| (normalize_symbol(&s), o)).collect();
        Self { fixed, bounds }
    }

    /// Parses `SYM=p,d,q,P,D,Q,m;SYM2=...`. Blank input yields an empty table.
    pub fn parse(raw: &str, bounds: SearchBounds) -> anyhow::Result<Self> {
        let mut fixed = HashMap::new();
        for entry in raw.split(';').map(str::trim).filter(|e| !e.is_empty()) {
            let (symbol, orders) = entry
                .split_once('=')
                .with_context(|| format!("fixed order entry `{entry}` is missing `=`"))?;
            let values = orders
                .split(',')
                .map(|v| v.trim().parse::<usize>())
                .collect::<Result<Vec<_>, _>>()
                .with_context(|| format!("fixed order entry `{entry}` has a non-integer term"))?;
            let [p, d, q, sp, sd, sq, m] = values[..] else {
                bail!("fixed order entry `{entry}` needs 7 terms (p,d,q,P,D,Q,m), got {}", values.len());
            };
            let order = SarimaOrder::new(p, d, q, (sp, sd, sq), m);
            order.validate().map_err(|e| anyhow::anyhow!("{symbol}: {e}"))?;
            fixed.insert(normalize_symbol(symbol), order);
        }
        Ok(Self { fixed, bounds })
    }

    pub fn resolve(&self, symbol: &str) -> ModelSpec {
        match self.fixed.get(&normalize_symbol(symbol)) {
            Some(order) => ModelSpec::FixedOrder(*order),
            None => ModelSpec::AutoSearch(self.bounds),
        }
    }

    pub fn fixed_len(&self) -> usize {
        self.fixed.len()
    }
}

// ─── Result ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum VolatilityOutcome {
    Garch(Vec<f64>),
    /// Residuals had no variance; the forecast is identically zero.
    ZeroVariance(Vec<f64>),
    /// The level forecast stands, the volatility fit did not.
    Unavailable(FitError),
}

impl VolatilityOutcome {
    pub fn values(&self) -> Option<&[f64]> {
        match self {
            VolatilityOutcome::Garch(v) | VolatilityOutcome::ZeroVariance(v) => Some(v),
            VolatilityOutcome::Unavailable(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ModelForecast {
    pub order:      SarimaOrder,
    pub aic:        f64,
    pub points:     Vec<f64>,
    pub volatility: VolatilityOutcome,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

pub fn fit_forecast(series: &[f64], spec: &ModelSpec, horizon: usize) -> Result<ModelForecast, FitError> {
    let level = match spec {
        ModelSpec::FixedOrder(order) => SarimaFit::fit(series, *order, Constraints::Relaxed)?,
        ModelSpec::AutoSearch(bounds) => auto_sarima(series, bounds)?,
    };
    debug!(order = %level.order, aic = level.aic, "level model fitted");

    let points = level.forecast(horizon);
    if points.iter().any(|v| !v.is_finite()) {
        return Err(FitError::NonFiniteForecast);
    }

    let scaled: Vec<f64> = level
        .residuals()
        .iter()
        .filter(|e| e.is_finite())
        .map(|e| e * RESIDUAL_SCALE)
        .collect();

    Ok(ModelForecast {
        order: level.order,
        aic: level.aic,
        points,
        volatility: volatility_forecast(&scaled, horizon),
    })
}

fn population_variance(x: &[f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let mean = x.iter().sum::<f64>() / x.len() as f64;
    x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / x.len() as f64
}

fn volatility_forecast(scaled: &[f64], horizon: usize) -> VolatilityOutcome {
    if population_variance(scaled) <= ZERO_VARIANCE {
        return VolatilityOutcome::ZeroVariance(vec![0.0; horizon]);
    }
    let fit = match fit_garch11(scaled) {
        Ok(fit) => fit,
        Err(e) => {
            warn!(error = %e, "volatility model failed, level forecast kept");
            return VolatilityOutcome::Unavailable(e);
        }
    };
    debug!(
        alpha = fit.params.alpha,
        beta = fit.params.beta,
        log_likelihood = fit.log_likelihood,
        "volatility model fitted"
    );
    let vol: Vec<f64> = fit
        .forecast_variance(horizon)
        .into_iter()
        .map(|v| v.sqrt() / RESIDUAL_SCALE)
        .collect();
    if vol.iter().any(|v| !v.is_finite()) {
        return VolatilityOutcome::Unavailable(FitError::NonFiniteForecast);
    }
    VolatilityOutcome::Garch(vol)
}
