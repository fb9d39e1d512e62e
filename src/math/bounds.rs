//! Box constraints via variable transformation.
//!
//! The solver works on an unconstrained internal variable `u`; the model sees
//! the external value `x(u)`, which can never leave its bounds:
//!
//! - lower only: `x = min - 1 + sqrt(u^2 + 1)`
//! - upper only: `x = max + 1 - sqrt(u^2 + 1)`
//! - both:       `x = min + (sin(u) + 1) (max - min) / 2`
//! - none:       `x = u`
//!
//! These are the MINUIT transforms (also used by lmfit). `dx/du` is needed
//! for the chain rule when building the internal Jacobian.
//!
//! The one-sided forms are evaluated as `min + g(u)` / `max - g(u)` with
//! `g(u) = sqrt(u^2 + 1) - 1 = u^2 / (1 + sqrt(u^2 + 1))`. Adding and then
//! subtracting 1 would round a small bound such as `1e-7` to a value below it.

/// Bounds of a single parameter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Bound {
    Free,
    Lower(f64),
    Upper(f64),
    Both(f64, f64),
}

impl Bound {
    pub fn new(min: Option<f64>, max: Option<f64>) -> Self {
        match (min, max) {
            (None, None) => Bound::Free,
            (Some(lo), None) => Bound::Lower(lo),
            (None, Some(hi)) => Bound::Upper(hi),
            (Some(lo), Some(hi)) => Bound::Both(lo, hi),
        }
    }

    /// Clamp an external value into the feasible range.
    pub fn clamp(self, x: f64) -> f64 {
        match self {
            Bound::Free => x,
            Bound::Lower(lo) => x.max(lo),
            Bound::Upper(hi) => x.min(hi),
            Bound::Both(lo, hi) => x.clamp(lo, hi),
        }
    }

    /// External → internal.
    pub fn to_internal(self, x: f64) -> f64 {
        let x = self.clamp(x);
        match self {
            Bound::Free => x,
            Bound::Lower(lo) => offset_to_internal(x - lo),
            Bound::Upper(hi) => offset_to_internal(hi - x),
            Bound::Both(lo, hi) => {
                let span = hi - lo;
                if span <= 0.0 {
                    return 0.0;
                }
                (2.0 * (x - lo) / span - 1.0).clamp(-1.0, 1.0).asin()
            }
        }
    }

    /// Internal → external.
    pub fn to_external(self, u: f64) -> f64 {
        match self {
            Bound::Free => u,
            Bound::Lower(lo) => lo + offset(u),
            Bound::Upper(hi) => hi - offset(u),
            Bound::Both(lo, hi) => lo + (u.sin() + 1.0) * (hi - lo) / 2.0,
        }
    }

    /// `dx/du` at internal value `u`.
    pub fn derivative(self, u: f64) -> f64 {
        match self {
            Bound::Free => 1.0,
            Bound::Lower(_) => u / (u * u + 1.0).sqrt(),
            Bound::Upper(_) => -u / (u * u + 1.0).sqrt(),
            Bound::Both(lo, hi) => u.cos() * (hi - lo) / 2.0,
        }
    }
}

/// `sqrt(u^2 + 1) - 1`, never negative.
fn offset(u: f64) -> f64 {
    let u2 = u * u;
    u2 / (1.0 + (u2 + 1.0).sqrt())
}

/// Inverse of `offset` for `d >= 0`.
fn offset_to_internal(d: f64) -> f64 {
    let d = d.max(0.0);
    (d * (d + 2.0)).sqrt()
}

/// Smallest value strictly greater than a positive `x`.
///
/// Used to turn an exclusive lower limit into an inclusive bound.
pub fn just_above(x: f64) -> f64 {
    if x.is_finite() && x > 0.0 {
        f64::from_bits(x.to_bits() + 1)
    } else {
        x
    }
}
