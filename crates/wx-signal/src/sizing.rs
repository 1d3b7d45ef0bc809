//! Shared sizing multipliers used by both `SpeedStrategy` and
//! `ConfidenceStrategy` (SPEC_FULL §4.10/§4.11: "Same liquidity and sigma
//! multipliers... apply").
//!
//! The spec names these three multipliers without pinning an exact curve;
//! the shapes below are the Open Question decision recorded in
//! `DESIGN.md`: thin liquidity near price extremes is derated, a crossing
//! grows stale linearly toward `maxCrossingAgeMs`, and higher sigma (more
//! confident separation from the threshold) is rewarded with more size.

/// Derates size near the price extremes, where the order book is thin and
/// a resting limit order is more likely to move the market against itself.
/// Peaks at 1.0 at `price = 0.5`, floors at 0.2 near 0 or 1.
pub fn liquidity_mult(price_yes: f64) -> f64 {
    let p = price_yes.clamp(0.0, 1.0);
    (p * (1.0 - p) * 4.0).clamp(0.2, 1.0)
}

/// Decays linearly from 1.0 (just crossed) to 0.5 (at `max_age_ms`).
pub fn urgency_mult(change_age_ms: i64, max_age_ms: i64) -> f64 {
    if max_age_ms <= 0 {
        return 1.0;
    }
    let fraction = (change_age_ms as f64 / max_age_ms as f64).clamp(0.0, 1.0);
    (1.0 - fraction * 0.5).clamp(0.5, 1.0)
}

/// Rewards a forecast that sits several standard deviations from the
/// threshold with larger size, capped to avoid overshooting on a single
/// guaranteed-outcome tail.
pub fn sigma_mult(sigma: f64) -> f64 {
    (0.5 + sigma.max(0.0) * 0.25).clamp(0.5, 1.5)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn liquidity_peaks_at_midpoint() {
        assert!((liquidity_mult(0.5) - 1.0).abs() < 1e-9);
        assert!(liquidity_mult(0.5) > liquidity_mult(0.1));
        assert!(liquidity_mult(0.5) > liquidity_mult(0.9));
    }

    #[test]
    fn liquidity_floors_near_extremes() {
        assert_eq!(liquidity_mult(0.0), 0.2);
        assert_eq!(liquidity_mult(1.0), 0.2);
    }

    #[test]
    fn urgency_decays_with_age() {
        assert_eq!(urgency_mult(0, 120_000), 1.0);
        assert!((urgency_mult(120_000, 120_000) - 0.5).abs() < 1e-9);
        assert!(urgency_mult(60_000, 120_000) < 1.0);
    }

    #[test]
    fn sigma_mult_increases_and_caps() {
        assert!((sigma_mult(0.0) - 0.5).abs() < 1e-9);
        assert!(sigma_mult(3.0) > sigma_mult(1.0));
        assert_eq!(sigma_mult(100.0), 1.5);
    }
}
