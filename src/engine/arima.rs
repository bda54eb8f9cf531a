//! # engine::arima
//!
//! Seasonal ARIMA `(p,d,q)(P,D,Q)[m]` estimated by conditional sum of squares.
//!
//! The series is differenced `d` times at lag 1 and `D` times at lag `m`; the
//! differenced series `w` (minus its mean when `d + D <= 1`) follows
//!
//! ```text
//! φ(B)·Φ(Bᵐ)·z_t = θ(B)·Θ(Bᵐ)·e_t
//! ```
//!
//! Both polynomial products are expanded once per parameter vector, so the
//! residual recursion only sees plain lag coefficient tables.
//!
//! With [`Constraints::Enforced`] the optimiser works on unconstrained values
//! that are mapped through the partial-autocorrelation transform, so every
//! candidate is stationary and invertible. [`Constraints::Relaxed`] uses the
//! raw coefficients, which tolerates short or irregular histories at the cost
//! of possibly explosive fits.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::optimizer::{minimize, NelderMeadConfig};
use super::FitError;

/// Residual variance floor; keeps the log-likelihood finite on flat series.
const MIN_SIGMA2: f64 = 1e-12;

/// Fewest residuals a fit may be estimated from.
const MIN_EFFECTIVE_OBS: usize = 10;

// ─── Order ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SarimaOrder {
    pub p:          usize,
    pub d:          usize,
    pub q:          usize,
    pub seasonal_p: usize,
    pub seasonal_d: usize,
    pub seasonal_q: usize,
    pub period:     usize,
}

impl SarimaOrder {
    pub fn new(p: usize, d: usize, q: usize, seasonal: (usize, usize, usize), period: usize) -> Self {
        Self {
            p,
            d,
            q,
            seasonal_p: seasonal.0,
            seasonal_d: seasonal.1,
            seasonal_q: seasonal.2,
            period,
        }
    }

    /// Number of ARMA coefficients (excludes intercept and σ²).
    pub fn n_coefficients(&self) -> usize {
        self.p + self.q + self.seasonal_p + self.seasonal_q
    }

    /// Lags the expanded AR polynomial reaches back.
    pub fn ar_span(&self) -> usize {
        self.p + self.period * self.seasonal_p
    }

    /// Observations consumed by differencing.
    pub fn differencing_loss(&self) -> usize {
        self.d + self.period * self.seasonal_d
    }

    fn has_seasonal_terms(&self) -> bool {
        self.seasonal_p + self.seasonal_d + self.seasonal_q > 0
    }

    pub fn validate(&self) -> Result<(), FitError> {
        if self.has_seasonal_terms() && self.period < 2 {
            return Err(FitError::InvalidOrder(format!("{self}: seasonal terms need a period of at least 2")));
        }
        Ok(())
    }
}

impl fmt::Display for SarimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{})({},{},{})[{}]",
            self.p, self.d, self.q, self.seasonal_p, self.seasonal_d, self.seasonal_q, self.period
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Constraints {
    Enforced,
    Relaxed,
}

// ─── Polynomial helpers ───────────────────────────────────────────────────────

fn difference(y: &[f64], lag: usize) -> Vec<f64> {
    if y.len() <= lag {
        return Vec::new();
    }
    y[lag..].iter().zip(y).map(|(a, b)| a - b).collect()
}

pub(crate) fn apply_differencing(y: &[f64], order: &SarimaOrder) -> Vec<f64> {
    let mut w = y.to_vec();
    for _ in 0..order.d {
        w = difference(&w, 1);
    }
    for _ in 0..order.seasonal_d {
        w = difference(&w, order.period);
    }
    w
}

fn poly_mul(a: &[f64], b: &[f64]) -> Vec<f64> {
    let mut out = vec![0.0; a.len() + b.len() - 1];
    for (i, ai) in a.iter().enumerate() {
        for (j, bj) in b.iter().enumerate() {
            out[i + j] += ai * bj;
        }
    }
    out
}

/// `1 + sign·(c₁B^step + c₂B^{2·step} + …)`
fn lag_poly(coefs: &[f64], step: usize, sign: f64) -> Vec<f64> {
    let mut poly = vec![0.0; coefs.len() * step + 1];
    poly[0] = 1.0;
    for (i, c) in coefs.iter().enumerate() {
        poly[(i + 1) * step] = sign * c;
    }
    poly
}

/// Coefficients of `(1 - B)^d (1 - Bᵐ)^D`, index = lag.
fn differencing_poly(order: &SarimaOrder) -> Vec<f64> {
    let mut poly = vec![1.0];
    for _ in 0..order.d {
        poly = poly_mul(&poly, &[1.0, -1.0]);
    }
    for _ in 0..order.seasonal_d {
        poly = poly_mul(&poly, &lag_poly(&[1.0], order.period, -1.0));
    }
    poly
}

/// Maps unconstrained reals to the coefficients of a stationary AR
/// polynomial `1 - φ₁B - … - φₙBⁿ` (Jones 1980 partial-autocorrelation map).
pub(crate) fn constrain_stationary(unconstrained: &[f64]) -> Vec<f64> {
    let n = unconstrained.len();
    if n == 0 {
        return Vec::new();
    }
    let r: Vec<f64> = unconstrained.iter().map(|x| x / (1.0 + x * x).sqrt()).collect();
    let mut y = vec![vec![0.0; n]; n];
    for k in 0..n {
        for i in 0..k {
            y[k][i] = y[k - 1][i] + r[k] * y[k - 1][k - i - 1];
        }
        y[k][k] = r[k];
    }
    y[n - 1].iter().map(|v| -v).collect()
}

/// Lag tables derived from one parameter vector.
#[derive(Debug, Clone)]
struct LagTables {
    /// `ar[k]` multiplies `z_{t-k}` (index 0 unused)
    ar: Vec<f64>,
    /// `ma[k]` multiplies `e_{t-k}` (index 0 unused)
    ma: Vec<f64>,
}

/// Splits `[φ.., θ.., Φ.., Θ..]` and expands the seasonal products.
fn lag_tables(order: &SarimaOrder, params: &[f64]) -> LagTables {
    let (phi, rest) = params.split_at(order.p);
    let (theta, rest) = rest.split_at(order.q);
    let (seasonal_phi, seasonal_theta) = rest.split_at(order.seasonal_p);

    let ar_poly = poly_mul(&lag_poly(phi, 1, -1.0), &lag_poly(seasonal_phi, order.period, -1.0));
    let ma_poly = poly_mul(&lag_poly(theta, 1, 1.0), &lag_poly(seasonal_theta, order.period, 1.0));

    LagTables {
        ar: ar_poly.iter().map(|c| -c).collect(),
        ma: ma_poly,
    }
}

/// Unconstrained optimiser vector → model coefficients.
fn transform_params(order: &SarimaOrder, x: &[f64], constraints: Constraints) -> Vec<f64> {
    if constraints == Constraints::Relaxed {
        return x.to_vec();
    }
    let (phi, rest) = x.split_at(order.p);
    let (theta, rest) = rest.split_at(order.q);
    let (seasonal_phi, seasonal_theta) = rest.split_at(order.seasonal_p);

    let mut out = Vec::with_capacity(x.len());
    out.extend(constrain_stationary(phi));
    out.extend(constrain_stationary(theta).into_iter().map(|v| -v));
    out.extend(constrain_stationary(seasonal_phi));
    out.extend(constrain_stationary(seasonal_theta).into_iter().map(|v| -v));
    out
}

/// Conditional residuals of `z` under `tables`. Residuals before the first
/// full AR window are zero and not part of the fit.
fn residual_recursion(z: &[f64], tables: &LagTables, start: usize) -> Vec<f64> {
    let mut e = vec![0.0; z.len()];
    for t in start..z.len() {
        let mut value = z[t];
        for k in 1..tables.ar.len().min(t + 1) {
            value -= tables.ar[k] * z[t - k];
        }
        for k in 1..tables.ma.len().min(t + 1) {
            value -= tables.ma[k] * e[t - k];
        }
        e[t] = value;
    }
    e
}

// ─── Fit ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SarimaFit {
    pub order:          SarimaOrder,
    /// `[φ.., θ.., Φ.., Θ..]`
    pub params:         Vec<f64>,
    /// Mean of the differenced series, when an intercept is part of the model.
    pub intercept:      Option<f64>,
    pub sigma2:         f64,
    pub log_likelihood: f64,
    pub aic:            f64,
    /// Observed series the model was fitted to.
    history:            Vec<f64>,
    /// Differenced series minus intercept.
    z:                  Vec<f64>,
    /// Residual per `z` index (zero before `start`).
    e:                  Vec<f64>,
    start:              usize,
    tables:             LagTables,
}

impl SarimaFit {
    /// Fit conditioned on the order's own AR span.
    pub fn fit(y: &[f64], order: SarimaOrder, constraints: Constraints) -> Result<Self, FitError> {
        Self::fit_conditioned(y, order, constraints, order.ar_span())
    }

    /// Fit whose sum of squares starts `conditioning` observations into the
    /// differenced series (never fewer than the AR span). Fits sharing the
    /// same differencing and `conditioning` have comparable AICs.
    pub fn fit_conditioned(
        y: &[f64],
        order: SarimaOrder,
        constraints: Constraints,
        conditioning: usize,
    ) -> Result<Self, FitError> {
        order.validate()?;

        let w = apply_differencing(y, &order);
        let start = conditioning.max(order.ar_span());
        let n_params = order.n_coefficients();
        let needed = MIN_EFFECTIVE_OBS.max(n_params + 3) + start + order.differencing_loss();
        if y.len() < needed {
            return Err(FitError::InsufficientData { needed, got: y.len() });
        }

        let intercept = (order.d + order.seasonal_d <= 1).then(|| stable_mean(&w));
        let mu = intercept.unwrap_or(0.0);
        let z: Vec<f64> = w.iter().map(|v| v - mu).collect();
        let n_eff = z.len() - start;

        let objective = |x: &[f64]| {
            let params = transform_params(&order, x, constraints);
            let tables = lag_tables(&order, &params);
            residual_recursion(&z, &tables, start)[start..].iter().map(|e| e * e).sum::<f64>()
        };

        let x0 = vec![0.0; n_params];
        let minimum = minimize(objective, &x0, &NelderMeadConfig::for_dimension(n_params))?;
        if !minimum.converged {
            return Err(FitError::NonConvergence { iterations: minimum.iterations });
        }

        let params = transform_params(&order, &minimum.x, constraints);
        let tables = lag_tables(&order, &params);
        let e = residual_recursion(&z, &tables, start);
        let css: f64 = e[start..].iter().map(|v| v * v).sum();

        let sigma2 = (css / n_eff as f64).max(MIN_SIGMA2);
        let log_likelihood = -0.5 * n_eff as f64 * ((2.0 * std::f64::consts::PI * sigma2).ln() + 1.0);
        let k = n_params + usize::from(intercept.is_some()) + 1;
        let aic = -2.0 * log_likelihood + 2.0 * k as f64;

        if !aic.is_finite() {
            return Err(FitError::NonConvergence { iterations: minimum.iterations });
        }

        Ok(Self {
            order,
            params,
            intercept,
            sigma2,
            log_likelihood,
            aic,
            history: y.to_vec(),
            z,
            e,
            start,
            tables,
        })
    }

    /// In-sample one-step residuals (only those the fit was conditioned on).
    pub fn residuals(&self) -> &[f64] {
        &self.e[self.start..]
    }

    /// `horizon` out-of-sample level forecasts on the original scale.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let mut z = self.z.clone();
        let mut e = self.e.clone();
        let mu = self.intercept.unwrap_or(0.0);

        let mut w_future = Vec::with_capacity(horizon);
        for _ in 0..horizon {
            let t = z.len();
            let mut value = 0.0;
            for k in 1..self.tables.ar.len().min(t + 1) {
                value += self.tables.ar[k] * z[t - k];
            }
            for k in 1..self.tables.ma.len().min(t + 1) {
                value += self.tables.ma[k] * e[t - k];
            }
            z.push(value);
            e.push(0.0);
            w_future.push(value + mu);
        }

        // undo differencing: y_t = w_t - Σ δ_k·y_{t-k}
        let delta = differencing_poly(&self.order);
        let mut y = self.history.clone();
        let mut out = Vec::with_capacity(horizon);
        for w in w_future {
            let t = y.len();
            let mut value = w;
            for (k, dk) in delta.iter().enumerate().skip(1) {
                value -= dk * y[t - k];
            }
            y.push(value);
            out.push(value);
        }
        out
    }
}

/// Mean computed as an offset from the first value, so a constant series
/// yields exactly that constant.
fn stable_mean(w: &[f64]) -> f64 {
    let Some(&first) = w.first() else { return 0.0 };
    first + w.iter().map(|v| v - first).sum::<f64>() / w.len() as f64
}
