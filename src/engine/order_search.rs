//! # engine::order_search
//!
//! Stepwise AIC search over seasonal ARIMA orders (Hyndman–Khandakar style).
//!
//! 1. `d` comes from repeated ADF tests, `D` is fixed at 0.
//! 2. Four starting models are fitted; the best AIC becomes the incumbent.
//! 3. Neighbours of the incumbent (±1 on one of p, q, P, Q, or on p and q /
//!    P and Q together) are fitted; any improvement becomes the new incumbent
//!    and the neighbourhood is rebuilt around it.
//! 4. Stop when no neighbour improves or the step budget is spent.
//!
//! Candidates that fail to fit are skipped. Every fitted order is cached.
//!
//! All candidates are conditioned on the same leading window (the widest AR
//! span the bounds admit), so their AICs are computed over identical residuals.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::arima::{Constraints, SarimaFit, SarimaOrder};
use super::stationarity::required_differences;
use super::FitError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBounds {
    pub max_p:          usize,
    pub max_q:          usize,
    pub max_seasonal_p: usize,
    pub max_seasonal_q: usize,
    /// Upper bound on p + q + P + Q.
    pub max_order:      usize,
    pub max_d:          usize,
    pub period:         usize,
    pub max_steps:      usize,
}

impl Default for SearchBounds {
    fn default() -> Self {
        Self {
            max_p:          3,
            max_q:          3,
            max_seasonal_p: 2,
            max_seasonal_q: 2,
            max_order:      5,
            max_d:          2,
            period:         5,
            max_steps:      100,
        }
    }
}

impl SearchBounds {
    fn admits(&self, o: &SarimaOrder) -> bool {
        o.p <= self.max_p
            && o.q <= self.max_q
            && o.seasonal_p <= self.max_seasonal_p
            && o.seasonal_q <= self.max_seasonal_q
            && o.n_coefficients() <= self.max_order
    }

    /// Widest AR span any admitted order can have.
    fn conditioning_window(&self) -> usize {
        self.max_p + self.period * self.max_seasonal_p
    }
}

struct Search<'a> {
    y:      &'a [f64],
    bounds: SearchBounds,
    /// Shared conditioning window for every candidate.
    window: usize,
    cache:  HashMap<SarimaOrder, Option<f64>>,
    best:   Option<SarimaFit>,
}

impl Search<'_> {
    /// Fits `order` unless seen before; returns `true` if it became the incumbent.
    fn try_order(&mut self, order: SarimaOrder) -> bool {
        if !self.bounds.admits(&order) || self.cache.contains_key(&order) {
            return false;
        }
        match SarimaFit::fit_conditioned(self.y, order, Constraints::Enforced, self.window) {
            Ok(fit) => {
                debug!(%order, aic = fit.aic, log_likelihood = fit.log_likelihood, "candidate fitted");
                self.cache.insert(order, Some(fit.aic));
                let improves = self.best.as_ref().map_or(true, |b| fit.aic < b.aic);
                if improves {
                    self.best = Some(fit);
                }
                improves
            }
            Err(e) => {
                debug!(%order, error = %e, "candidate skipped");
                self.cache.insert(order, None);
                false
            }
        }
    }
}

fn neighbours(o: &SarimaOrder) -> Vec<SarimaOrder> {
    let moves: [(i64, i64, i64, i64); 12] = [
        (-1, 0, 0, 0),
        (1, 0, 0, 0),
        (0, -1, 0, 0),
        (0, 1, 0, 0),
        (0, 0, -1, 0),
        (0, 0, 1, 0),
        (0, 0, 0, -1),
        (0, 0, 0, 1),
        (-1, -1, 0, 0),
        (1, 1, 0, 0),
        (0, 0, -1, -1),
        (0, 0, 1, 1),
    ];
    let shift = |v: usize, by: i64| usize::try_from(v as i64 + by).ok();
    moves
        .iter()
        .filter_map(|&(dp, dq, dsp, dsq)| {
            Some(SarimaOrder {
                p: shift(o.p, dp)?,
                q: shift(o.q, dq)?,
                seasonal_p: shift(o.seasonal_p, dsp)?,
                seasonal_q: shift(o.seasonal_q, dsq)?,
                ..*o
            })
        })
        .collect()
}

/// Best-AIC SARIMA fit for `y` within `bounds`.
pub fn auto_sarima(y: &[f64], bounds: &SearchBounds) -> Result<SarimaFit, FitError> {
    let d = required_differences(y, bounds.max_d);
    let m = bounds.period;
    let window = bounds.conditioning_window();
    debug!(d, period = m, window, "differencing order chosen");

    let mut search = Search {
        y,
        bounds: *bounds,
        window,
        cache: HashMap::new(),
        best: None,
    };

    for (p, q, seasonal) in [(1, 1, (0, 0, 1)), (0, 0, (0, 0, 0)), (1, 0, (1, 0, 0)), (0, 1, (0, 0, 1))] {
        search.try_order(SarimaOrder::new(p, d, q, seasonal, m));
    }

    let mut steps = 0;
    'outer: while steps < bounds.max_steps {
        let Some(incumbent) = search.best.as_ref().map(|b| b.order) else { break };
        for candidate in neighbours(&incumbent) {
            if steps >= bounds.max_steps {
                break 'outer;
            }
            if search.cache.contains_key(&candidate) || !bounds.admits(&candidate) {
                continue;
            }
            steps += 1;
            if search.try_order(candidate) {
                continue 'outer;
            }
        }
        break;
    }

    search.best.ok_or(FitError::NoCandidateConverged { tried: search.cache.len() })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ar1(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut prev = 0.0;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                let e = ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5;
                prev = phi * prev + e;
                10.0 + prev
            })
            .collect()
    }

    #[test]
    fn neighbours_never_go_negative() {
        let origin = SarimaOrder::new(0, 1, 0, (0, 0, 0), 5);
        let n = neighbours(&origin);
        assert_eq!(n.len(), 6);
        assert!(n.iter().all(|o| o.d == 1 && o.period == 5));
    }

    #[test]
    fn bounds_reject_oversized_orders() {
        let b = SearchBounds::default();
        assert!(b.admits(&SarimaOrder::new(3, 0, 2, (0, 0, 0), 5)));
        assert!(!b.admits(&SarimaOrder::new(3, 0, 3, (0, 0, 0), 5)));
        assert!(!b.admits(&SarimaOrder::new(0, 0, 0, (3, 0, 0), 5)));
    }

    #[test]
    fn finds_autoregressive_structure() {
        let y = ar1(300, 0.7, 99);
        let fit = auto_sarima(&y, &SearchBounds::default()).unwrap();
        assert_eq!(fit.order.d, 0);
        assert!(fit.order.p + fit.order.q >= 1, "picked {}", fit.order);
        assert!(fit.aic.is_finite());
    }

    fn random_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        let mut level = 100.0;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                level += 6.0 * (((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5);
                level
            })
            .collect()
    }

    #[test]
    fn conditioning_window_covers_widest_admitted_order() {
        let b = SearchBounds::default();
        assert_eq!(b.conditioning_window(), 13);
        assert_eq!(SarimaOrder::new(3, 0, 0, (2, 0, 0), 5).ar_span(), b.conditioning_window());
    }

    #[test]
    fn random_walks_rarely_pick_seasonal_autoregression() {
        let seeds = [1u64, 2, 3, 4, 5, 6];
        let seasonal: Vec<String> = seeds
            .iter()
            .map(|&seed| auto_sarima(&random_walk(200, seed), &SearchBounds::default()).unwrap().order)
            .filter(|o| o.seasonal_p > 0)
            .map(|o| o.to_string())
            .collect();
        // chance structure can still win the odd AIC comparison
        assert!(seasonal.len() <= 3, "seasonal AR on {} of {} walks: {seasonal:?}", seasonal.len(), seeds.len());
    }

    #[test]
    fn too_short_history_fails_every_candidate() {
        let err = auto_sarima(&[1.0, 2.0, 1.5, 1.7], &SearchBounds::default()).unwrap_err();
        assert!(matches!(err, FitError::NoCandidateConverged { tried: 4 }));
    }

    #[test]
    fn step_budget_is_respected() {
        let y = ar1(200, 0.5, 3);
        let bounds = SearchBounds { max_steps: 0, ..SearchBounds::default() };
        // only the four starting models are fitted
        let fit = auto_sarima(&y, &bounds).unwrap();
        let starts = [(1, 1, 0, 1), (0, 0, 0, 0), (1, 0, 1, 0), (0, 1, 0, 1)];
        let o = fit.order;
        assert!(starts.contains(&(o.p, o.q, o.seasonal_p, o.seasonal_q)), "picked {o}");
    }
}
