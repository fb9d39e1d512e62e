//! Curve fitting.
//!
//! Responsibilities:
//!
//! - bounded nonlinear least squares of the Hill model (`fitter`)
//! - fitting every series of a plate in parallel (`fit_all`)

pub mod fitter;

pub use fitter::*;

use rayon::prelude::*;

use crate::domain::{ConcentrationSeries, DatasetFit, FitSetup, SolverConfig};

/// Fit each series independently (parallel) and keep the input order.
pub fn fit_all(series: Vec<ConcentrationSeries>, setup: &FitSetup, solver: &SolverConfig) -> Vec<DatasetFit> {
    series
        .into_par_iter()
        .map(|s| {
            let fit = fit_series(&s, setup, solver);
            DatasetFit { series: s, fit }
        })
        .collect()
}
