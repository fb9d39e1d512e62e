//! Damped linear least squares for Levenberg–Marquardt steps.
//!
//! One LM step minimises
//!
//! ```text
//! |J δ - b|^2 + λ |D δ|^2
//! ```
//!
//! with `b = -r` and `D = diag(d)`. We stack it into the tall system
//! `[J; sqrt(λ) D] δ = [b; 0]` and solve that with an SVD, so a rank-deficient
//! Jacobian is fine as long as the damping block fills in the missing rank.
//! Singular values below `RCOND × σ_max` are treated as zero.

use nalgebra::{DMatrix, DVector};

/// Relative cutoff for singular values.
const RCOND: f64 = 1e-12;

/// Solve the damped system for `δ`.
///
/// `diag` holds one scale per column of `jac`. Returns `None` on mismatched
/// dimensions, a negative or NaN `lambda`, or an all-zero system.
pub fn damped_least_squares(
    jac: &DMatrix<f64>,
    rhs: &DVector<f64>,
    diag: &[f64],
    lambda: f64,
) -> Option<DVector<f64>> {
    let (m, p) = jac.shape();
    if rhs.len() != m || diag.len() != p || lambda.is_nan() || lambda < 0.0 {
        return None;
    }

    let mut a = DMatrix::<f64>::zeros(m + p, p);
    a.rows_mut(0, m).copy_from(jac);
    let sl = lambda.sqrt();
    for (j, &d) in diag.iter().enumerate() {
        a[(m + j, j)] = sl * d;
    }
    let mut b = DVector::<f64>::zeros(m + p);
    b.rows_mut(0, m).copy_from(rhs);

    let svd = a.svd(true, true);
    let s_max = svd.singular_values.max();
    if !(s_max.is_finite() && s_max > 0.0) {
        return None;
    }
    svd.solve(&b, s_max * RCOND)
        .ok()
        .filter(|delta| delta.iter().all(|v| v.is_finite()))
}
