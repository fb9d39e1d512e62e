//! Model evaluation for the Hill dose-response curve.
//!
//! ```text
//! response(c) = max * c^n / (c^n + ec50^n)
//! ```
//!
//! The fitter relies on two primitive operations:
//! - residuals `response - observed` over a whole series
//! - the Jacobian row `d response / d (max, n, ec50)` at one concentration
//!
//! Numerical notes:
//! - We evaluate `max / (1 + (ec50/c)^n)`, which is the same function for
//!   positive inputs but does not overflow for large `n`.
//! - With `u = 1 / (1 + r)` and `r = (ec50/c)^n`, both non-trivial partial
//!   derivatives contain `r / (1 + r)^2 = u (1 - u)`, which stays finite when
//!   `r` overflows to infinity.

use crate::domain::ModelParameters;

/// Fraction of the maximum reached at concentration `c`.
fn occupancy(params: &ModelParameters, c: f64) -> f64 {
    let r = (params.ec50 / c).powf(params.hill);
    if r.is_infinite() {
        return 0.0;
    }
    1.0 / (1.0 + r)
}

/// Model response at concentration `c`.
pub fn response(params: &ModelParameters, c: f64) -> f64 {
    params.max_response * occupancy(params, c)
}

/// `response(c_i) - observed_i` for every point.
pub fn residuals(params: &ModelParameters, concentrations: &[f64], observed: &[f64]) -> Vec<f64> {
    concentrations
        .iter()
        .zip(observed.iter())
        .map(|(&c, &y)| response(params, c) - y)
        .collect()
}

/// Partial derivatives of `response(c)` with respect to `(max, hill, ec50)`.
pub fn jacobian_row(params: &ModelParameters, c: f64) -> [f64; 3] {
    let u = occupancy(params, c);
    let s = u * (1.0 - u);
    let a = params.max_response;

    let d_max = u;
    let d_hill = -a * s * (params.ec50 / c).ln();
    let d_ec50 = -a * s * params.hill / params.ec50;

    [d_max, if s == 0.0 { 0.0 } else { d_hill }, d_ec50]
}

/// Observed response on the normalised axis (`observed / max`).
pub fn normalized(params: &ModelParameters, observed: f64) -> f64 {
    observed / params.max_response
}

/// Fitted curve on the normalised axis (`response / max`).
pub fn normalized_response(params: &ModelParameters, c: f64) -> f64 {
    occupancy(params, c)
}

/// `n` log-spaced concentrations from `high` down to `low` (inclusive).
pub fn log_spaced(high: f64, low: f64, n: usize) -> Vec<f64> {
    let n = n.max(2);
    let (l0, l1) = (high.ln(), low.ln());
    (0..n)
        .map(|i| {
            let u = i as f64 / (n as f64 - 1.0);
            (l0 + u * (l1 - l0)).exp()
        })
        .collect()
}
