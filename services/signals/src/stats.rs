//! Rolling-statistics helpers shared by the calculators.

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; `0.0` below two observations.
pub fn stddev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Z-score of `value` against `(mean, stddev)`; `0.0` for zero deviation.
pub fn z_score(value: f64, mean: f64, stddev: f64) -> f64 {
    if stddev > 0.0 {
        (value - mean) / stddev
    } else {
        0.0
    }
}

/// Exponential moving average step.
pub fn ema(new_value: f64, prev_ema: f64, alpha: f64) -> f64 {
    alpha * new_value + (1.0 - alpha) * prev_ema
}

/// Linear-interpolated percentile, `pct` in `[0, 1]`; `0.0` when empty.
pub fn percentile(values: &[f64], pct: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pct = pct.clamp(0.0, 1.0);
    let idx = pct * (sorted.len() - 1) as f64;
    let lo = idx.floor() as usize;
    let hi = idx.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let w = idx - lo as f64;
    (1.0 - w) * sorted[lo] + w * sorted[hi]
}

/// Pearson correlation over the common prefix; `0.0` for degenerate input.
pub fn correlation(x: &[f64], y: &[f64]) -> f64 {
    let n = x.len().min(y.len());
    if n < 2 {
        return 0.0;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    let mut sxx = 0.0;
    let mut syy = 0.0;
    let mut sxy = 0.0;
    for i in 0..n {
        let dx = x[i] - mx;
        let dy = y[i] - my;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx > 0.0 && syy > 0.0 {
        sxy / (sxx * syy).sqrt()
    } else {
        0.0
    }
}
