//! # engine::stationarity
//!
//! Augmented Dickey–Fuller test used to pick the number of regular
//! differences before the order search starts.

/// 5 % critical values of the ADF τ statistic (constant + trend) by sample size.
const CRITICAL_5PCT: [(f64, f64); 6] = [
    (25.0, -3.60),
    (50.0, -3.50),
    (100.0, -3.45),
    (250.0, -3.43),
    (500.0, -3.42),
    (f64::INFINITY, -3.41),
];

/// Relative spread below which a series counts as constant.
const CONSTANT_EPS: f64 = 1e-12;

pub fn is_constant(y: &[f64]) -> bool {
    let Some(&first) = y.first() else { return true };
    let scale = first.abs().max(1.0);
    y.iter().all(|v| (v - first).abs() <= CONSTANT_EPS * scale)
}

/// Solves `XᵀX·β = Xᵀy` and returns `(β, (XᵀX)⁻¹ diagonal, residual sum of squares)`.
/// `None` when the design is singular.
fn ols(rows: &[Vec<f64>], y: &[f64]) -> Option<(Vec<f64>, Vec<f64>, f64)> {
    let k = rows.first()?.len();
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];
    for (row, yi) in rows.iter().zip(y) {
        for i in 0..k {
            xty[i] += row[i] * yi;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    // Gauss–Jordan on [XᵀX | I | Xᵀy]
    let mut aug: Vec<Vec<f64>> = (0..k)
        .map(|i| {
            let mut r = xtx[i].clone();
            r.extend((0..k).map(|j| if i == j { 1.0 } else { 0.0 }));
            r.push(xty[i]);
            r
        })
        .collect();

    let scale = xtx.iter().enumerate().map(|(i, r)| r[i].abs()).fold(0.0, f64::max).max(1.0);
    for col in 0..k {
        let pivot = (col..k).max_by(|&a, &b| aug[a][col].abs().total_cmp(&aug[b][col].abs()))?;
        if aug[pivot][col].abs() <= 1e-10 * scale {
            return None;
        }
        aug.swap(col, pivot);
        let p = aug[col][col];
        for v in aug[col].iter_mut() {
            *v /= p;
        }
        for r in 0..k {
            if r != col {
                let factor = aug[r][col];
                if factor != 0.0 {
                    for c in 0..(2 * k + 1) {
                        aug[r][c] -= factor * aug[col][c];
                    }
                }
            }
        }
    }

    let beta: Vec<f64> = aug.iter().map(|r| r[2 * k]).collect();
    let inv_diag: Vec<f64> = (0..k).map(|i| aug[i][k + i]).collect();
    let rss = rows
        .iter()
        .zip(y)
        .map(|(row, yi)| {
            let fitted: f64 = row.iter().zip(&beta).map(|(x, b)| x * b).sum();
            (yi - fitted).powi(2)
        })
        .sum();
    Some((beta, inv_diag, rss))
}

/// ADF τ statistic with constant, linear trend and `⌊(n-1)^{1/3}⌋` lagged
/// differences. `None` when the series is too short or the regression is singular.
pub fn adf_statistic(y: &[f64]) -> Option<f64> {
    let n = y.len();
    if n < 8 {
        return None;
    }
    let lags = ((n - 1) as f64).cbrt().floor() as usize;
    let dy: Vec<f64> = y.windows(2).map(|w| w[1] - w[0]).collect();

    // Δy_t = a + b·t + ρ·y_{t-1} + Σ γ_i·Δy_{t-i}
    let mut rows = Vec::new();
    let mut target = Vec::new();
    for t in lags..dy.len() {
        let mut row = vec![1.0, t as f64, y[t]];
        row.extend((1..=lags).map(|i| dy[t - i]));
        rows.push(row);
        target.push(dy[t]);
    }
    let params = 3 + lags;
    if rows.len() <= params + 1 {
        return None;
    }

    let (beta, inv_diag, rss) = ols(&rows, &target)?;
    let dof = (rows.len() - params) as f64;
    let se = (rss / dof * inv_diag[2]).sqrt();
    if !se.is_finite() || se <= 0.0 {
        return None;
    }
    Some(beta[2] / se)
}

pub fn critical_value(n: usize) -> f64 {
    let n = n as f64;
    let mut prev = CRITICAL_5PCT[0];
    if n <= prev.0 {
        return prev.1;
    }
    for &(size, value) in &CRITICAL_5PCT[1..] {
        if n <= size {
            if size.is_infinite() {
                return value;
            }
            let w = (n - prev.0) / (size - prev.0);
            return prev.1 + w * (value - prev.1);
        }
        prev = (size, value);
    }
    prev.1
}

/// `true` when the unit-root null can *not* be rejected at 5 %.
/// Inconclusive regressions are treated as stationary.
pub fn has_unit_root(y: &[f64]) -> bool {
    match adf_statistic(y) {
        Some(stat) => stat > critical_value(y.len()),
        None => false,
    }
}

/// Number of lag-1 differences (≤ `max_d`) needed before the ADF test rejects.
pub fn required_differences(y: &[f64], max_d: usize) -> usize {
    let mut series = y.to_vec();
    let mut d = 0;
    while d < max_d && !is_constant(&series) && has_unit_root(&series) {
        series = series.windows(2).map(|w| w[1] - w[0]).collect();
        d += 1;
    }
    d
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut state = seed;
        (0..n)
            .map(|_| {
                state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
                ((state >> 33) as f64 / (1u64 << 31) as f64) - 0.5
            })
            .collect()
    }

    #[test]
    fn white_noise_is_stationary() {
        let y = noise(300, 7);
        assert!(!has_unit_root(&y));
        assert_eq!(required_differences(&y, 2), 0);
    }

    #[test]
    fn random_walk_needs_one_difference() {
        let mut level = 100.0;
        let y: Vec<f64> = noise(300, 11)
            .into_iter()
            .map(|e| {
                level += e;
                level
            })
            .collect();
        assert!(has_unit_root(&y));
        assert_eq!(required_differences(&y, 2), 1);
    }

    #[test]
    fn constant_series_needs_no_difference() {
        assert_eq!(required_differences(&[42.0; 50], 2), 0);
    }

    #[test]
    fn critical_values_interpolate() {
        assert_eq!(critical_value(10), -3.60);
        assert!((critical_value(75) - (-3.475)).abs() < 1e-12);
        assert_eq!(critical_value(10_000), -3.41);
    }

    #[test]
    fn singular_design_is_inconclusive() {
        // a straight line makes the lagged differences collinear with the constant
        let y: Vec<f64> = (0..40).map(|i| i as f64).collect();
        assert!(adf_statistic(&y).is_none());
    }
}
