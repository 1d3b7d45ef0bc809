//! Shared numerical helpers: the standard normal CDF and a percentile
//! helper, implemented once rather than re-derived per call site
//! (SPEC_FULL §4.9), in the manual-statistics style of
//! `hip3-mm/volatility.rs`'s `compute_stats`/`percentile` closure.

/// Standard normal cumulative distribution function `Φ(z)`, via the
/// Abramowitz & Stegun 7.1.26 rational approximation to `erf` (max error
/// ≈ 1.5e-7 — ample precision for sizing/probability use here).
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    const A1: f64 = 0.254829592;
    const A2: f64 = -0.284496736;
    const A3: f64 = 1.421413741;
    const A4: f64 = -1.453152027;
    const A5: f64 = 1.061405429;
    const P: f64 = 0.3275911;

    let t = 1.0 / (1.0 + P * x);
    let poly = ((((A5 * t + A4) * t + A3) * t + A2) * t + A1) * t;
    sign * (1.0 - poly * (-x * x).exp())
}

/// Linear-interpolation-free percentile on an already-sorted slice, same
/// nearest-rank idiom as `hip3-mm/volatility.rs`'s `percentile` closure.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let idx = (p / 100.0 * (n - 1) as f64).round() as usize;
    sorted[idx.min(n - 1)]
}

/// Sample standard deviation (Bessel-corrected); 0 for fewer than 2 values.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normal_cdf_at_zero_is_half() {
        assert!((normal_cdf(0.0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn normal_cdf_matches_known_reference_values() {
        // Φ(1.0) ≈ 0.8413, Φ(-1.96) ≈ 0.025, Φ(3.0) ≈ 0.99865
        assert!((normal_cdf(1.0) - 0.8413).abs() < 1e-3);
        assert!((normal_cdf(-1.96) - 0.025).abs() < 1e-3);
        assert!((normal_cdf(3.0) - 0.99865).abs() < 1e-3);
    }

    #[test]
    fn percentile_single_value() {
        assert_eq!(percentile(&[5.0], 99.0), 5.0);
    }

    #[test]
    fn percentile_matches_nearest_rank() {
        let sorted = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&sorted, 0.0), 1.0);
        assert_eq!(percentile(&sorted, 100.0), 5.0);
        assert_eq!(percentile(&sorted, 50.0), 3.0);
    }

    #[test]
    fn std_dev_zero_for_identical_values() {
        assert_eq!(std_dev(&[2.0, 2.0, 2.0]), 0.0);
    }

    #[test]
    fn std_dev_nonzero_for_spread_values() {
        let sd = std_dev(&[1.0, 2.0, 3.0, 4.0]);
        assert!((sd - 1.290994).abs() < 1e-4);
    }
}
