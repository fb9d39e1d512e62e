//! Reporting utilities: normalised plotting coordinates and EC50 rows.

pub mod format;

pub use format::*;

use crate::domain::{ConcentrationSeries, DatasetFit, FitResult};
use crate::models::normalized;

/// One observation on the normalised response axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedPoint {
    pub concentration: f64,
    /// `mean / max`.
    pub value: f64,
    /// Error bar half-height, `std / max`.
    pub error: f64,
}

/// Express a series relative to the fitted maximal response.
pub fn compute_normalized(series: &ConcentrationSeries, fit: &FitResult) -> Vec<NormalizedPoint> {
    series
        .points
        .iter()
        .map(|p| NormalizedPoint {
            concentration: p.concentration,
            value: normalized(&fit.params, p.mean),
            error: normalized(&fit.params, p.std_dev),
        })
        .collect()
}

/// `(dataset name, EC50)` pairs of one file; `None` for unsuccessful fits.
pub fn ec50_entries(fits: &[DatasetFit]) -> Vec<(String, Option<f64>)> {
    fits.iter().map(|f| (f.series.name.clone(), f.fit.ec50())).collect()
}

/// Number of fits that did not succeed.
pub fn failed_fit_count(fits: &[DatasetFit]) -> usize {
    fits.iter().filter(|f| !f.fit.is_success()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitQuality, FitStatus, ModelParameters, ParamErrors, SeriesPoint};

    fn fit_with(status: FitStatus, max_response: f64, ec50: f64) -> FitResult {
        FitResult {
            params: ModelParameters {
                max_response,
                hill: 1.0,
                ec50,
            },
            errors: ParamErrors::default(),
            status,
            message: String::new(),
            iterations: 0,
            evaluations: 0,
            quality: FitQuality {
                sse: 0.0,
                rmse: 0.0,
                reduced_chi_square: 0.0,
                r_squared: Some(1.0),
                aic: 0.0,
                bic: 0.0,
                n: 0,
                n_varying: 2,
            },
        }
    }

    #[test]
    fn normalised_values_and_error_bars_divide_by_max() {
        let series = ConcentrationSeries {
            name: "wt".to_string(),
            points: vec![
                SeriesPoint {
                    concentration: 3.0,
                    mean: 1.5,
                    std_dev: 0.3,
                },
                SeriesPoint {
                    concentration: 1.0,
                    mean: 0.75,
                    std_dev: 0.0,
                },
            ],
        };
        let pts = compute_normalized(&series, &fit_with(FitStatus::Converged, 1.5, 0.1));
        assert_eq!(pts[0].value, 1.0);
        assert!((pts[0].error - 0.2).abs() < 1e-15);
        assert_eq!(pts[1].value, 0.5);
        assert_eq!(pts[1].error, 0.0);
    }

    #[test]
    fn ec50_entries_hide_failed_fits() {
        let empty = ConcentrationSeries {
            name: String::new(),
            points: Vec::new(),
        };
        let fits = vec![
            DatasetFit {
                series: ConcentrationSeries {
                    name: "a".to_string(),
                    ..empty.clone()
                },
                fit: fit_with(FitStatus::Converged, 1.2, 0.05),
            },
            DatasetFit {
                series: ConcentrationSeries {
                    name: "b".to_string(),
                    ..empty
                },
                fit: fit_with(FitStatus::Degenerate, 1.5, 0.004),
            },
        ];
        assert_eq!(
            ec50_entries(&fits),
            vec![("a".to_string(), Some(0.05)), ("b".to_string(), None)]
        );
        assert_eq!(failed_fit_count(&fits), 1);
    }
}
