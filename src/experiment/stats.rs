//! Two-proportion z-test.
//!
//! Pooled-variance test of H0: p1 == p2 with a two-sided p-value taken
//! from the standard normal distribution.

use serde::{Deserialize, Serialize};

/// Result of a computable z-test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZTest {
    pub z_statistic: f64,
    pub p_value: f64,
}

/// Run a pooled two-proportion z-test on `successes_a / trials_a` versus
/// `successes_b / trials_b`.
///
/// Returns `None` when the statistic is undefined: a zero denominator,
/// zero pooled variance (both rates 0 or both 1), or any non-finite
/// intermediate.
#[must_use]
pub fn two_proportion_z_test(
    successes_a: u64,
    trials_a: u64,
    successes_b: u64,
    trials_b: u64,
) -> Option<ZTest> {
    if trials_a == 0 || trials_b == 0 {
        return None;
    }
    let (c1, n1) = (successes_a as f64, trials_a as f64);
    let (c2, n2) = (successes_b as f64, trials_b as f64);

    let p1 = c1 / n1;
    let p2 = c2 / n2;
    let pooled = (c1 + c2) / (n1 + n2);
    let variance = pooled * (1.0 - pooled) * (1.0 / n1 + 1.0 / n2);
    if !variance.is_finite() || variance <= 0.0 {
        return None;
    }

    let z = (p1 - p2) / variance.sqrt();
    let p_value = two_sided_p_value(z);
    if !z.is_finite() || !p_value.is_finite() {
        return None;
    }
    Some(ZTest {
        z_statistic: z,
        p_value,
    })
}

/// Two-sided tail probability P(|Z| >= |z|) for a standard normal Z.
#[must_use]
pub fn two_sided_p_value(z: f64) -> f64 {
    erfc(z.abs() / std::f64::consts::SQRT_2).clamp(0.0, 1.0)
}

/// Complementary error function.
///
/// Chebyshev fit with fractional error below 1.2e-7 everywhere, which is
/// well inside the 5-decimal precision p-values are reported with.
#[must_use]
pub fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87
                                    + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 { ans } else { 2.0 - ans }
}

/// Round half away from zero to `decimals` places.
#[must_use]
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}
