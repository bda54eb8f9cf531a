//! # engine::optimizer
//!
//! Derivative-free Nelder–Mead simplex minimiser shared by the SARIMA and
//! GARCH fits. Non-finite objective values are treated as `+inf`, so callers
//! can simply return `f64::INFINITY` for parameter vectors they reject.

use super::FitError;

/// Reflection, expansion, contraction and shrink coefficients.
const ALPHA: f64 = 1.0;
const GAMMA: f64 = 2.0;
const RHO:   f64 = 0.5;
const SIGMA: f64 = 0.5;

#[derive(Debug, Clone, Copy)]
pub struct NelderMeadConfig {
    pub max_iterations: usize,
    /// Simplex diameter at which the search stops (relative to `1 + |x|`).
    pub x_tolerance:    f64,
    /// Spread of objective values at which the search stops (relative to `1 + |f|`).
    pub f_tolerance:    f64,
    /// Initial step for coordinates that start at zero.
    pub zero_step:      f64,
}

impl NelderMeadConfig {
    pub fn for_dimension(n: usize) -> Self {
        Self {
            max_iterations: 1_000 + 600 * n,
            x_tolerance:    1e-6,
            f_tolerance:    1e-10,
            zero_step:      0.1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Minimum {
    pub x:          Vec<f64>,
    pub value:      f64,
    pub iterations: usize,
    /// `false` when the iteration budget ran out before the tolerances were met.
    pub converged:  bool,
}

fn eval<F: FnMut(&[f64]) -> f64>(f: &mut F, x: &[f64]) -> f64 {
    let v = f(x);
    if v.is_finite() { v } else { f64::INFINITY }
}

/// `c + t * (x - c)`
fn toward(c: &[f64], x: &[f64], t: f64) -> Vec<f64> {
    c.iter().zip(x).map(|(ci, xi)| ci + t * (xi - ci)).collect()
}

pub fn minimize<F>(mut f: F, x0: &[f64], cfg: &NelderMeadConfig) -> Result<Minimum, FitError>
where
    F: FnMut(&[f64]) -> f64,
{
    let n = x0.len();
    if n == 0 {
        let value = eval(&mut f, x0);
        if !value.is_finite() {
            return Err(FitError::NonConvergence { iterations: 0 });
        }
        return Ok(Minimum { x: Vec::new(), value, iterations: 0, converged: true });
    }

    let mut simplex: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    simplex.push(x0.to_vec());
    for i in 0..n {
        let mut x = x0.to_vec();
        x[i] += if x0[i] != 0.0 { 0.05 * x0[i] } else { cfg.zero_step };
        simplex.push(x);
    }
    let mut values: Vec<f64> = simplex.iter().map(|x| eval(&mut f, x)).collect();

    for iteration in 0..cfg.max_iterations {
        // best first, worst last
        let mut order: Vec<usize> = (0..=n).collect();
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
        simplex = order.iter().map(|&i| simplex[i].clone()).collect();
        values = order.iter().map(|&i| values[i]).collect();

        let best = &simplex[0];
        let x_spread = simplex[1..]
            .iter()
            .flat_map(|x| x.iter().zip(best).map(|(a, b)| (a - b).abs() / (1.0 + b.abs())))
            .fold(0.0, f64::max);
        if x_spread <= cfg.x_tolerance {
            if !values[0].is_finite() {
                return Err(FitError::NonConvergence { iterations: iteration });
            }
            let f_spread = values[n] - values[0];
            if f_spread <= cfg.f_tolerance * (1.0 + values[0].abs()) {
                return Ok(Minimum {
                    x:          simplex[0].clone(),
                    value:      values[0],
                    iterations: iteration,
                    converged:  true,
                });
            }
        }

        let centroid: Vec<f64> = (0..n)
            .map(|j| simplex[..n].iter().map(|x| x[j]).sum::<f64>() / n as f64)
            .collect();

        let reflected = toward(&centroid, &simplex[n], -ALPHA);
        let f_reflected = eval(&mut f, &reflected);

        if f_reflected < values[0] {
            let expanded = toward(&centroid, &reflected, GAMMA);
            let f_expanded = eval(&mut f, &expanded);
            if f_expanded < f_reflected {
                simplex[n] = expanded;
                values[n] = f_expanded;
            } else {
                simplex[n] = reflected;
                values[n] = f_reflected;
            }
            continue;
        }

        if f_reflected < values[n - 1] {
            simplex[n] = reflected;
            values[n] = f_reflected;
            continue;
        }

        let (contracted, f_contracted, accept) = if f_reflected < values[n] {
            let c = toward(&centroid, &reflected, RHO);
            let fc = eval(&mut f, &c);
            (c, fc, fc <= f_reflected)
        } else {
            let c = toward(&centroid, &simplex[n], RHO);
            let fc = eval(&mut f, &c);
            (c, fc, fc < values[n])
        };

        if accept {
            simplex[n] = contracted;
            values[n] = f_contracted;
            continue;
        }

        // shrink toward the best vertex
        let best = simplex[0].clone();
        for i in 1..=n {
            simplex[i] = toward(&best, &simplex[i], SIGMA);
            values[i] = eval(&mut f, &simplex[i]);
        }
    }

    // budget exhausted: hand back the best vertex and let the caller decide
    let best = (0..=n).min_by(|&a, &b| values[a].total_cmp(&values[b])).unwrap_or(0);
    if !values[best].is_finite() {
        return Err(FitError::NonConvergence { iterations: cfg.max_iterations });
    }
    Ok(Minimum {
        x:          simplex[best].clone(),
        value:      values[best],
        iterations: cfg.max_iterations,
        converged:  false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_quadratic_minimum() {
        let f = |x: &[f64]| (x[0] - 3.0).powi(2) + 2.0 * (x[1] + 1.0).powi(2);
        let m = minimize(f, &[0.0, 0.0], &NelderMeadConfig::for_dimension(2)).unwrap();
        assert!((m.x[0] - 3.0).abs() < 1e-4);
        assert!((m.x[1] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn rosenbrock_converges() {
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let m = minimize(f, &[-1.2, 1.0], &NelderMeadConfig::for_dimension(2)).unwrap();
        assert!((m.x[0] - 1.0).abs() < 1e-3);
        assert!((m.x[1] - 1.0).abs() < 1e-3);
    }

    #[test]
    fn flat_objective_terminates() {
        let m = minimize(|_: &[f64]| 0.0, &[0.0, 0.0, 0.0], &NelderMeadConfig::for_dimension(3)).unwrap();
        assert_eq!(m.value, 0.0);
        assert!(m.converged);
    }

    #[test]
    fn exhausted_budget_returns_best_vertex_unconverged() {
        let cfg = NelderMeadConfig { max_iterations: 3, ..NelderMeadConfig::for_dimension(2) };
        let f = |x: &[f64]| (1.0 - x[0]).powi(2) + 100.0 * (x[1] - x[0] * x[0]).powi(2);
        let m = minimize(f, &[-1.2, 1.0], &cfg).unwrap();
        assert!(!m.converged);
        assert!(m.value.is_finite());
    }

    #[test]
    fn everywhere_infinite_is_an_error() {
        let res = minimize(|_: &[f64]| f64::NAN, &[1.0], &NelderMeadConfig::for_dimension(1));
        assert!(matches!(res, Err(FitError::NonConvergence { .. })));
    }

    #[test]
    fn zero_dimensional_problem_evaluates_once() {
        let m = minimize(|_: &[f64]| 4.2, &[], &NelderMeadConfig::for_dimension(0)).unwrap();
        assert_eq!(m.value, 4.2);
        assert!(m.x.is_empty());
    }
}
