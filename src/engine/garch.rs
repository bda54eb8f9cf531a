//! # engine::garch
//!
//! Zero-mean GARCH(1,1) with Gaussian likelihood:
//!
//! ```text
//! σ²_t = ω + α·r²_{t-1} + β·σ²_{t-1}      σ²_0 = mean(r²)
//! ```
//!
//! The simplex works on `(ln ω, logit s, logit α/s)` where `s = α + β` is
//! capped just under 1, so every point it visits satisfies ω > 0, α, β ≥ 0
//! and α + β < 1.

use tracing::warn;

use super::optimizer::{minimize, NelderMeadConfig};
use super::FitError;

pub const MIN_OBSERVATIONS: usize = 20;

const MIN_VARIANCE: f64 = 1e-12;
const MAX_PERSISTENCE: f64 = 0.9999;
const LN_2PI: f64 = 1.837_877_066_409_345_5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarchParams {
    pub omega: f64,
    pub alpha: f64,
    pub beta:  f64,
}

impl GarchParams {
    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }

    fn from_unconstrained(x: &[f64]) -> Self {
        let sigmoid = |v: f64| 1.0 / (1.0 + (-v).exp());
        let s = MAX_PERSISTENCE * sigmoid(x[1]);
        let alpha = s * sigmoid(x[2]);
        Self {
            omega: x[0].exp(),
            alpha,
            beta: s - alpha,
        }
    }

    fn to_unconstrained(&self) -> [f64; 3] {
        let logit = |p: f64| (p / (1.0 - p)).ln();
        let s = self.persistence();
        [self.omega.ln(), logit(s / MAX_PERSISTENCE), logit(self.alpha / s)]
    }
}

#[derive(Debug, Clone)]
pub struct GarchFit {
    pub params:         GarchParams,
    pub log_likelihood: f64,
    last_return_sq:     f64,
    last_variance:      f64,
}

fn conditional_variances(p: &GarchParams, r: &[f64], backcast: f64) -> Vec<f64> {
    let mut out = Vec::with_capacity(r.len());
    let mut v = backcast;
    for t in 0..r.len() {
        if t > 0 {
            v = (p.omega + p.alpha * r[t - 1] * r[t - 1] + p.beta * v).max(MIN_VARIANCE);
        }
        out.push(v);
    }
    out
}

fn neg_log_likelihood(p: &GarchParams, r: &[f64], backcast: f64) -> f64 {
    conditional_variances(p, r, backcast)
        .iter()
        .zip(r)
        .map(|(v, x)| 0.5 * (LN_2PI + v.ln() + x * x / v))
        .sum()
}

pub fn fit_garch11(returns: &[f64]) -> Result<GarchFit, FitError> {
    if returns.len() < MIN_OBSERVATIONS {
        return Err(FitError::InsufficientData { needed: MIN_OBSERVATIONS, got: returns.len() });
    }
    let backcast = returns.iter().map(|r| r * r).sum::<f64>() / returns.len() as f64;
    if !backcast.is_finite() || backcast <= MIN_VARIANCE {
        return Err(FitError::NonConvergence { iterations: 0 });
    }

    let start = GarchParams { omega: 0.1 * backcast, alpha: 0.1, beta: 0.8 };
    let x0 = start.to_unconstrained();
    let objective = |x: &[f64]| neg_log_likelihood(&GarchParams::from_unconstrained(x), returns, backcast);
    let minimum = minimize(objective, &x0, &NelderMeadConfig::for_dimension(3))?;
    if !minimum.converged {
        // every vertex maps to admissible parameters, so the best one is usable
        warn!(iterations = minimum.iterations, "GARCH optimiser hit its iteration limit, using best estimate");
    }

    let params = GarchParams::from_unconstrained(&minimum.x);
    if !(params.omega.is_finite() && params.omega > 0.0) {
        return Err(FitError::NonConvergence { iterations: minimum.iterations });
    }

    let variances = conditional_variances(&params, returns, backcast);
    let (Some(&last_variance), Some(&last_return)) = (variances.last(), returns.last()) else {
        return Err(FitError::InsufficientData { needed: MIN_OBSERVATIONS, got: 0 });
    };

    Ok(GarchFit {
        params,
        log_likelihood: -minimum.value,
        last_return_sq: last_return * last_return,
        last_variance,
    })
}

impl GarchFit {
    /// Conditional variance forecasts for steps 1..=horizon after the sample.
    pub fn forecast_variance(&self, horizon: usize) -> Vec<f64> {
        let GarchParams { omega, alpha, beta } = self.params;
        let mut out = Vec::with_capacity(horizon);
        let mut v = omega + alpha * self.last_return_sq + beta * self.last_variance;
        for _ in 0..horizon {
            out.push(v.max(0.0));
            v = omega + (alpha + beta) * v;
        }
        out
    }
}
