//! Bounded Levenberg–Marquardt fit of the Hill model to one series.
//!
//! Given:
//! - concentrations `c_i`
//! - mean responses `y_i`
//! - a `FitSetup` (start values, bounds, vary flags)
//!
//! we minimise `Σ (response(c_i) - y_i)^2` over the varying parameters.
//!
//! Outline:
//! - bounded parameters are mapped to unconstrained internal variables
//!   (`math::bounds`), so every trial point is feasible
//! - each step solves the damped system `[J; sqrt(λ) D] δ = [-r; 0]` with the
//!   SVD solver in `math::ols`, `D` being the running Marquardt column scale
//! - `λ` follows Nielsen's update (shrink on good steps, grow geometrically on
//!   rejected ones)
//! - termination on relative SSE reduction, step size, scaled gradient or the
//!   iteration cap
//!
//! Everything is sequential and deterministic for a given input.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{
    ConcentrationSeries, FitQuality, FitResult, FitSetup, FitStatus, ModelParameters, ParamErrors, SolverConfig,
};
use crate::math::{Bound, damped_least_squares};
use crate::models::{jacobian_row, residuals};

/// Minimum number of distinct concentrations for a meaningful sigmoid fit.
const MIN_DISTINCT_CONCENTRATIONS: usize = 3;

/// Responses whose spread is below this fraction of their magnitude are
/// treated as constant.
const FLAT_RESPONSE_REL: f64 = 1e-9;

const LAMBDA_INIT: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e16;

/// Fit a single series.
///
/// Never returns the initial guess as a success: every early exit carries a
/// non-success `FitStatus` and a message.
pub fn fit_series(series: &ConcentrationSeries, setup: &FitSetup, solver: &SolverConfig) -> FitResult {
    let conc = series.concentrations();
    let y = series.means();
    let problem = Problem::new(&conc, &y, setup);

    if let Some((status, message)) = precheck(&conc, &y, problem.n_varying()) {
        debug!(dataset = %series.name, status = status.label(), "skipping fit: {message}");
        return problem.finish(&problem.start(), status, message, 0, 0);
    }

    let outcome = problem.minimize(solver);
    debug!(
        dataset = %series.name,
        status = outcome.status.label(),
        iterations = outcome.iterations,
        "fit finished: {}",
        outcome.message
    );
    problem.finish(
        &outcome.u,
        outcome.status,
        outcome.message,
        outcome.iterations,
        outcome.evaluations,
    )
}

fn precheck(conc: &[f64], y: &[f64], n_varying: usize) -> Option<(FitStatus, String)> {
    if conc.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Some((FitStatus::Failed, "series contains non-finite values".to_string()));
    }
    if conc.iter().any(|&c| c <= 0.0) {
        return Some((FitStatus::Failed, "concentrations must be positive".to_string()));
    }

    let distinct = distinct_count(conc);
    if distinct < MIN_DISTINCT_CONCENTRATIONS {
        return Some((
            FitStatus::InsufficientData,
            format!("{distinct} distinct concentrations, need at least {MIN_DISTINCT_CONCENTRATIONS}"),
        ));
    }
    if y.len() < n_varying {
        return Some((
            FitStatus::InsufficientData,
            format!("{} points for {n_varying} free parameters", y.len()),
        ));
    }
    if n_varying == 0 {
        return Some((FitStatus::InsufficientData, "no free parameters".to_string()));
    }

    let (lo, hi) = y
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let scale = lo.abs().max(hi.abs());
    if scale == 0.0 || hi - lo <= FLAT_RESPONSE_REL * scale {
        return Some((
            FitStatus::Degenerate,
            "responses are constant, no sigmoid to fit".to_string(),
        ));
    }

    None
}

fn distinct_count(values: &[f64]) -> usize {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    sorted.dedup_by(|a, b| (*a - *b).abs() <= 1e-12 * a.abs().max(b.abs()));
    sorted.len()
}

struct Outcome {
    u: Vec<f64>,
    status: FitStatus,
    message: String,
    iterations: usize,
    evaluations: usize,
}

/// The least-squares problem in internal coordinates.
struct Problem<'a> {
    conc: &'a [f64],
    y: &'a [f64],
    bounds: [Bound; 3],
    /// Value used for parameters that do not vary.
    fixed: [f64; 3],
    /// Indices (into `max, hill, ec50`) of the varying parameters.
    varying: Vec<usize>,
}

impl<'a> Problem<'a> {
    fn new(conc: &'a [f64], y: &'a [f64], setup: &FitSetup) -> Self {
        let specs = setup.specs();
        let bounds = specs.map(|s| Bound::new(s.min, s.max));
        let fixed = [0, 1, 2].map(|k| bounds[k].clamp(specs[k].initial));
        let varying = (0..3).filter(|&k| specs[k].vary).collect();
        Self {
            conc,
            y,
            bounds,
            fixed,
            varying,
        }
    }

    fn n_varying(&self) -> usize {
        self.varying.len()
    }

    fn start(&self) -> Vec<f64> {
        self.varying
            .iter()
            .map(|&k| self.bounds[k].to_internal(self.fixed[k]))
            .collect()
    }

    fn external(&self, u: &[f64]) -> [f64; 3] {
        let mut x = self.fixed;
        for (j, &k) in self.varying.iter().enumerate() {
            x[k] = self.bounds[k].to_external(u[j]);
        }
        x
    }

    fn params(&self, u: &[f64]) -> ModelParameters {
        let [max_response, hill, ec50] = self.external(u);
        ModelParameters {
            max_response,
            hill,
            ec50,
        }
    }

    fn residuals(&self, u: &[f64]) -> Vec<f64> {
        residuals(&self.params(u), self.conc, self.y)
    }

    /// Jacobian of the residuals w.r.t. the varying external parameters.
    fn jacobian_external(&self, u: &[f64]) -> DMatrix<f64> {
        let params = self.params(u);
        let mut jac = DMatrix::<f64>::zeros(self.conc.len(), self.varying.len());
        for (i, &c) in self.conc.iter().enumerate() {
            let row = jacobian_row(&params, c);
            for (j, &k) in self.varying.iter().enumerate() {
                jac[(i, j)] = row[k];
            }
        }
        jac
    }

    /// Jacobian w.r.t. the internal variables (chain rule through the bounds).
    fn jacobian_internal(&self, u: &[f64]) -> DMatrix<f64> {
        let mut jac = self.jacobian_external(u);
        for (j, &k) in self.varying.iter().enumerate() {
            let dx = self.bounds[k].derivative(u[j]);
            jac.column_mut(j).scale_mut(dx);
        }
        jac
    }

    fn minimize(&self, solver: &SolverConfig) -> Outcome {
        let p = self.n_varying();

        let mut u = self.start();
        let mut r = self.residuals(&u);
        let mut sse = sum_sq(&r);
        let mut evaluations = 1;
        let mut lambda = LAMBDA_INIT;
        let mut nu = 2.0;
        let mut scale = vec![0.0_f64; p];

        let outcome = |u: Vec<f64>, status, message: &str, iterations, evaluations| Outcome {
            u,
            status,
            message: message.to_string(),
            iterations,
            evaluations,
        };

        if !sse.is_finite() {
            return outcome(u, FitStatus::Failed, "non-finite residuals at the starting point", 0, evaluations);
        }

        for iteration in 1..=solver.max_iterations {
            if sse == 0.0 {
                return outcome(u, FitStatus::Converged, "exact fit", iteration - 1, evaluations);
            }

            let jac = self.jacobian_internal(&u);
            let rv = DVector::from_column_slice(&r);
            let neg_r = -&rv;
            let grad = jac.transpose() * &rv;

            // Marquardt scaling: running maximum of the Jacobian column norms.
            let mut gnorm = 0.0_f64;
            let rnorm = sse.sqrt();
            for j in 0..p {
                let col = jac.column(j).norm();
                scale[j] = scale[j].max(col).max(f64::MIN_POSITIVE.sqrt());
                if col > 0.0 {
                    gnorm = gnorm.max(grad[j].abs() / (col * rnorm));
                }
            }
            if gnorm <= solver.gtol {
                return outcome(u, FitStatus::Converged, "gradient is orthogonal to the residuals", iteration - 1, evaluations);
            }

            // Inner loop: increase damping until a step reduces the SSE.
            loop {
                let Some(delta) = damped_least_squares(&jac, &neg_r, &scale, lambda) else {
                    return outcome(u, FitStatus::Failed, "damped linear system could not be solved", iteration, evaluations);
                };

                let u_new: Vec<f64> = u.iter().zip(delta.iter()).map(|(a, d)| a + d).collect();
                let r_new = self.residuals(&u_new);
                let sse_new = sum_sq(&r_new);
                evaluations += 1;

                let step_norm = delta.norm();
                let u_norm = u.iter().map(|v| v * v).sum::<f64>().sqrt();
                let small_step = step_norm <= solver.xtol * (u_norm + solver.xtol);

                // Predicted reduction of the linearised model (in SSE units).
                let jd = &jac * &delta;
                let predicted = -(2.0 * rv.dot(&jd) + jd.norm_squared());

                if sse_new.is_finite() && sse_new < sse {
                    let actual = sse - sse_new;
                    let rho = if predicted > 0.0 { actual / predicted } else { 0.0 };
                    lambda *= (1.0 - (2.0 * rho - 1.0).powi(3)).max(1.0 / 3.0);
                    nu = 2.0;

                    let small_reduction = actual <= solver.ftol * sse && predicted.abs() <= solver.ftol * sse;
                    u = u_new;
                    r = r_new;
                    sse = sse_new;

                    if small_reduction {
                        return outcome(u, FitStatus::Converged, "relative reduction of the sum of squares is below ftol", iteration, evaluations);
                    }
                    if small_step {
                        return outcome(u, FitStatus::Converged, "relative step size is below xtol", iteration, evaluations);
                    }
                    break;
                }

                if small_step {
                    return outcome(u, FitStatus::Converged, "relative step size is below xtol", iteration, evaluations);
                }

                lambda *= nu;
                nu *= 2.0;
                if lambda > LAMBDA_MAX {
                    return outcome(u, FitStatus::Failed, "damping grew without reducing the sum of squares", iteration, evaluations);
                }
            }
        }

        outcome(
            u,
            FitStatus::MaxIterations,
            &format!("stopped after {} iterations", solver.max_iterations),
            solver.max_iterations,
            evaluations,
        )
    }

    fn finish(&self, u: &[f64], status: FitStatus, message: String, iterations: usize, evaluations: usize) -> FitResult {
        let params = self.params(u);
        let r = self.residuals(u);
        let quality = quality(&r, self.y, self.n_varying());
        let errors = if status.is_success() {
            self.std_errors(u, &quality)
        } else {
            ParamErrors::default()
        };

        FitResult {
            params,
            errors,
            status,
            message,
            iterations,
            evaluations,
            quality,
        }
    }

    /// `sqrt(diag((JᵀJ)⁻¹) · SSE / (n - p))` in external coordinates.
    fn std_errors(&self, u: &[f64], quality: &FitQuality) -> ParamErrors {
        let n = quality.n;
        let p = self.n_varying();
        if n <= p {
            return ParamErrors::default();
        }

        let jac = self.jacobian_external(u);
        let Some(cov) = (jac.transpose() * &jac).try_inverse() else {
            return ParamErrors::default();
        };

        let mut out = [None; 3];
        for (j, &k) in self.varying.iter().enumerate() {
            let var = cov[(j, j)] * quality.reduced_chi_square;
            if var.is_finite() && var >= 0.0 {
                out[k] = Some(var.sqrt());
            }
        }
        ParamErrors {
            max_response: out[0],
            hill: out[1],
            ec50: out[2],
        }
    }
}

fn sum_sq(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum()
}

fn quality(residuals: &[f64], y: &[f64], n_varying: usize) -> FitQuality {
    let n = residuals.len();
    let sse = sum_sq(residuals);
    let nf = n as f64;
    let k = n_varying as f64;

    let mean = y.iter().sum::<f64>() / nf.max(1.0);
    let sst: f64 = y.iter().map(|v| (v - mean).powi(2)).sum();
    let r_squared = (sst > 0.0).then(|| 1.0 - sse / sst);

    let dof = n.saturating_sub(n_varying).max(1) as f64;
    // Same convention as lmfit: n ln(chi2/n) + 2k and + ln(n) k.
    let chi = (sse / nf).max(f64::MIN_POSITIVE).ln() * nf;

    FitQuality {
        sse,
        rmse: (sse / nf.max(1.0)).sqrt(),
        reduced_chi_square: sse / dof,
        r_squared,
        aic: chi + 2.0 * k,
        bic: chi + nf.ln() * k,
        n,
        n_varying,
    }
}
