//! Summary statistics over the retained observation arrays.

/// Pearson correlation between doses and values.
///
/// `None` when either side has no variance (e.g. a single dose level) or
/// there are fewer than two points.
pub fn pearson_r(doses: &[f64], values: &[f64]) -> Option<f64> {
    let n = doses.len();
    if n < 2 || values.len() != n {
        return None;
    }

    let mean_d = doses.iter().sum::<f64>() / n as f64;
    let mean_v = values.iter().sum::<f64>() / n as f64;

    let mut cov = 0.0;
    let mut var_d = 0.0;
    let mut var_v = 0.0;
    for i in 0..n {
        let dd = doses[i] - mean_d;
        let dv = values[i] - mean_v;
        cov += dd * dv;
        var_d += dd * dd;
        var_v += dv * dv;
    }

    if var_d <= 1e-18 || var_v <= 1e-18 {
        return None;
    }
    let r = cov / (var_d.sqrt() * var_v.sqrt());
    r.is_finite().then_some(r.clamp(-1.0, 1.0))
}

/// Coefficient of determination for a fitted line over the same points.
///
/// Defined as `1 - SSE/SST`; zero when the values have no variance.
pub fn r_squared(doses: &[f64], values: &[f64], intercept: f64, slope: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let mean_v = values.iter().sum::<f64>() / n as f64;

    let mut sse = 0.0;
    let mut sst = 0.0;
    for i in 0..n {
        let fitted = intercept + slope * doses[i];
        sse += (values[i] - fitted).powi(2);
        sst += (values[i] - mean_v).powi(2);
    }
    if sst <= 1e-18 {
        return 0.0;
    }
    (1.0 - sse / sst).clamp(0.0, 1.0)
}

/// Residual standard deviation of a fitted line.
///
/// Uses `n - 2` degrees of freedom when available (two fitted parameters);
/// with fewer points the residual spread is taken at face value.
pub fn residual_std(doses: &[f64], values: &[f64], intercept: f64, slope: f64) -> f64 {
    let n = values.len();
    if n == 0 {
        return 0.0;
    }
    let sse: f64 = (0..n)
        .map(|i| (values[i] - (intercept + slope * doses[i])).powi(2))
        .sum();
    let dof = n.saturating_sub(2).max(1) as f64;
    (sse / dof).sqrt()
}

/// Count distinct dose levels, treating doses within 0.05 mg/week as equal.
///
/// Lab logs routinely record `100` vs `100.0` vs `99.98` for the same
/// protocol; tenth-of-a-milligram resolution is the relevant granularity.
pub fn unique_dose_levels(doses: &[f64]) -> usize {
    let mut rounded: Vec<i64> = doses
        .iter()
        .filter(|d| d.is_finite())
        .map(|&d| (d * 10.0).round() as i64)
        .collect();
    rounded.sort_unstable();
    rounded.dedup();
    rounded.len()
}

/// Sample standard deviation (used for sparse fits where no line exists).
pub fn sample_std(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    var.sqrt()
}
