//! Plot rendering behind a `PlotSink` seam.
//!
//! The pipeline only ever builds a `PlotRequest` (pure data) and hands it to
//! whatever sink the run was configured with:
//!
//! - `SvgPlotSink`: two-panel SVG through plotters (cargo feature `svg-plot`)
//! - `AsciiPlotSink`: terminal chart on stdout
//! - `NoopPlotSink`: nothing at all
//!
//! A missing plotting backend is never fatal; `make_plot_sink` degrades to the
//! no-op sink with a warning.

pub mod ascii;
#[cfg(feature = "svg-plot")]
pub mod svg;

pub use ascii::*;
#[cfg(feature = "svg-plot")]
pub use svg::*;

use std::path::{Path, PathBuf};

use crate::domain::{DatasetFit, FitsFile, PlotMode};
use crate::error::AppError;
use crate::models::{log_spaced, normalized_response};
use crate::report::{NormalizedPoint, compute_normalized};

/// One dataset as drawn: normalised observations plus the fitted curve.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotSeries {
    pub name: String,
    /// `None` when the fit did not succeed (no curve either).
    pub ec50: Option<f64>,
    pub points: Vec<NormalizedPoint>,
    /// `(concentration, normalised response)` on log-spaced concentrations.
    pub curve: Vec<(f64, f64)>,
}

/// Everything a sink needs to draw one plate.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotRequest {
    pub title: String,
    /// Base name for file-backed sinks (`results_{stem}.svg`).
    pub stem: String,
    pub axis_label: String,
    pub series: Vec<PlotSeries>,
}

impl PlotRequest {
    /// Smallest and largest positive concentration over points and curves.
    pub fn concentration_range(&self) -> Option<(f64, f64)> {
        let xs = self
            .series
            .iter()
            .flat_map(|s| s.points.iter().map(|p| p.concentration).chain(s.curve.iter().map(|&(c, _)| c)));
        finite_range(xs.filter(|&c| c > 0.0))
    }

    /// Response range over points (including error bars) and curves.
    pub fn response_range(&self) -> Option<(f64, f64)> {
        let ys = self.series.iter().flat_map(|s| {
            s.points
                .iter()
                .flat_map(|p| [p.value - p.error, p.value + p.error])
                .chain(s.curve.iter().map(|&(_, y)| y))
        });
        finite_range(ys)
    }
}

fn finite_range(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    (lo.is_finite() && hi.is_finite() && hi > lo).then_some((lo, hi))
}

/// Build the plot data for one plate.
///
/// Curves are sampled at `curve_points` log-spaced concentrations from the
/// highest to the lowest concentration of each series.
pub fn build_plot_request(
    title: &str,
    stem: &str,
    axis_label: &str,
    fits: &[DatasetFit],
    curve_points: usize,
) -> PlotRequest {
    let series = fits
        .iter()
        .map(|f| {
            let curve = match (f.fit.is_success(), finite_range(f.series.concentrations().into_iter())) {
                (true, Some((lo, hi))) => log_spaced(hi, lo, curve_points)
                    .into_iter()
                    .map(|c| (c, normalized_response(&f.fit.params, c)))
                    .collect(),
                _ => Vec::new(),
            };
            PlotSeries {
                name: f.series.name.clone(),
                ec50: f.fit.ec50(),
                points: compute_normalized(&f.series, &f.fit),
                curve,
            }
        })
        .collect();

    PlotRequest {
        title: title.to_string(),
        stem: stem.to_string(),
        axis_label: axis_label.to_string(),
        series,
    }
}

/// Rebuild the plot data from a saved fits file.
pub fn plot_request_from_fits(fits: &FitsFile, stem: &str, curve_points: usize) -> PlotRequest {
    let datasets: Vec<DatasetFit> = fits
        .datasets
        .iter()
        .map(|d| DatasetFit {
            series: d.series.clone(),
            fit: d.fit.clone(),
        })
        .collect();
    build_plot_request(&fits.experiment, stem, &fits.axis_label, &datasets, curve_points)
}

/// Where plots go.
pub trait PlotSink {
    /// Returns the written file, if the sink writes one.
    fn render(&self, request: &PlotRequest) -> Result<Option<PathBuf>, AppError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPlotSink;

impl PlotSink for NoopPlotSink {
    fn render(&self, _request: &PlotRequest) -> Result<Option<PathBuf>, AppError> {
        Ok(None)
    }
}

/// Prints an ASCII chart to stdout.
#[derive(Debug, Clone, Copy)]
pub struct AsciiPlotSink {
    pub width: usize,
    pub height: usize,
}

impl Default for AsciiPlotSink {
    fn default() -> Self {
        Self { width: 72, height: 20 }
    }
}

impl PlotSink for AsciiPlotSink {
    fn render(&self, request: &PlotRequest) -> Result<Option<PathBuf>, AppError> {
        println!("{}", render_ascii_plot(request, self.width, self.height));
        Ok(None)
    }
}

/// Pick the sink for a run.
pub fn make_plot_sink(mode: PlotMode, out_dir: &Path) -> Box<dyn PlotSink> {
    match mode {
        PlotMode::None => Box::new(NoopPlotSink),
        PlotMode::Ascii => Box::new(AsciiPlotSink::default()),
        PlotMode::Svg => svg_sink(out_dir),
    }
}

#[cfg(feature = "svg-plot")]
fn svg_sink(out_dir: &Path) -> Box<dyn PlotSink> {
    Box::new(SvgPlotSink::new(out_dir))
}

#[cfg(not(feature = "svg-plot"))]
fn svg_sink(_out_dir: &Path) -> Box<dyn PlotSink> {
    let err = AppError::new(
        crate::error::ErrorKind::MissingOptionalDependency,
        "SVG plots need the `svg-plot` feature; plots are disabled for this run.",
    );
    tracing::warn!(kind = %err.kind(), "{err}");
    Box::new(NoopPlotSink)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConcentrationSeries, FitQuality, FitResult, FitStatus, ModelParameters, ParamErrors, SeriesPoint,
    };

    fn dataset(status: FitStatus) -> DatasetFit {
        DatasetFit {
            series: ConcentrationSeries {
                name: "wt".to_string(),
                points: [3.0, 1.0, 1.0 / 3.0]
                    .iter()
                    .map(|&c| SeriesPoint {
                        concentration: c,
                        mean: 1.0,
                        std_dev: 0.2,
                    })
                    .collect(),
            },
            fit: FitResult {
                params: ModelParameters {
                    max_response: 2.0,
                    hill: 1.0,
                    ec50: 1.0,
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
                    r_squared: None,
                    aic: 0.0,
                    bic: 0.0,
                    n: 3,
                    n_varying: 2,
                },
            },
        }
    }

    #[test]
    fn request_normalises_and_samples_the_curve() {
        let req = build_plot_request("exp", "1_exp_wt", "mg/mL", &[dataset(FitStatus::Converged)], 50);
        let s = &req.series[0];
        assert_eq!(s.ec50, Some(1.0));
        assert_eq!(s.points[0].value, 0.5);
        assert_eq!(s.points[0].error, 0.1);
        assert_eq!(s.curve.len(), 50);
        assert!((s.curve[0].0 - 3.0).abs() < 1e-12);
        // Normalised Hill curve: 3 / (3 + 1).
        assert!((s.curve[0].1 - 0.75).abs() < 1e-12);
        assert!(s.curve.windows(2).all(|w| w[1].1 < w[0].1));
    }

    #[test]
    fn failed_fit_keeps_points_but_has_no_curve() {
        let req = build_plot_request("exp", "x", "mg/mL", &[dataset(FitStatus::MaxIterations)], 50);
        assert_eq!(req.series[0].ec50, None);
        assert!(req.series[0].curve.is_empty());
        assert_eq!(req.series[0].points.len(), 3);
    }

    #[test]
    fn ranges_cover_points_and_error_bars() {
        let req = build_plot_request("exp", "x", "mg/mL", &[dataset(FitStatus::MaxIterations)], 50);
        let (lo, hi) = req.concentration_range().unwrap();
        assert!((lo - 1.0 / 3.0).abs() < 1e-15);
        assert_eq!(hi, 3.0);
        let (y0, y1) = req.response_range().unwrap();
        assert!((y0 - 0.4).abs() < 1e-12 && (y1 - 0.6).abs() < 1e-12);
    }

    #[test]
    fn noop_sink_writes_nothing() {
        let req = build_plot_request("exp", "x", "mg/mL", &[], 50);
        assert_eq!(NoopPlotSink.render(&req).unwrap(), None);
    }

    #[cfg(not(feature = "svg-plot"))]
    #[test]
    fn svg_without_backend_falls_back_to_noop() {
        let dir = tempfile::tempdir().unwrap();
        let sink = make_plot_sink(PlotMode::Svg, dir.path());
        let req = build_plot_request("exp", "1_exp_wt", "mg/mL", &[dataset(FitStatus::Converged)], 50);

        assert_eq!(sink.render(&req).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[cfg(feature = "svg-plot")]
    #[test]
    fn svg_mode_writes_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = make_plot_sink(PlotMode::Svg, dir.path());
        let req = build_plot_request("exp", "1_exp_wt", "mg/mL", &[dataset(FitStatus::Converged)], 50);

        let path = sink.render(&req).unwrap().unwrap();
        assert_eq!(path, dir.path().join("results_1_exp_wt.svg"));
        assert!(path.is_file());
    }

    #[test]
    fn none_mode_never_plots() {
        let dir = tempfile::tempdir().unwrap();
        let req = build_plot_request("exp", "x", "mg/mL", &[dataset(FitStatus::Converged)], 50);
        assert_eq!(make_plot_sink(PlotMode::None, dir.path()).render(&req).unwrap(), None);
    }
}
