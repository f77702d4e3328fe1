// Standard normal distribution helpers

/// Standard normal CDF. Infinite arguments map to 0 and 1.
pub fn cdf(x: f64) -> f64 {
    if x == f64::INFINITY {
        return 1.0;
    }
    if x == f64::NEG_INFINITY {
        return 0.0;
    }
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

/// Probability mass of the standard normal between two points given in sigma units.
pub fn mass_between(lower: f64, upper: f64) -> f64 {
    (cdf(upper) - cdf(lower)).max(0.0)
}

/// Two-sided tail probability P(|Z| > t).
pub fn two_sided_tail(t: f64) -> f64 {
    (2.0 * (1.0 - cdf(t.abs()))).max(0.0)
}

/// Abramowitz and Stegun 7.1.26, absolute error below 1.5e-7.
fn erf(x: f64) -> f64 {
    let a1 = 0.254829592;
    let a2 = -0.284496736;
    let a3 = 1.421413741;
    let a4 = -1.453152027;
    let a5 = 1.061405429;
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();

    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - ((((a5 * t + a4) * t + a3) * t + a2) * t + a1) * t * (-x * x).exp();

    sign * y
}
