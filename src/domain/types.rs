//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during aggregation and fitting
//! - exported to JSON / tab-separated reports
//! - reloaded later for plotting

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::math::just_above;

/// Which replicate layout preset the plate uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LayoutMode {
    /// Four datasets, three replicate wells each, dilution steps down the rows.
    FourByThree,
    /// Two datasets, four replicate wells each, dilution steps across the columns.
    TwoByFour,
}

impl LayoutMode {
    pub fn layout(self) -> ReplicateLayout {
        match self {
            LayoutMode::FourByThree => ReplicateLayout::four_by_three(),
            LayoutMode::TwoByFour => ReplicateLayout::two_by_four(),
        }
    }
}

/// Which grid axis carries the dilution steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    /// Each grid row is one dilution step; groups index columns.
    Rows,
    /// The grid is transposed first: each grid column is one dilution step and
    /// groups index plate rows.
    Columns,
}

/// Explicit assignment of wells to replicate groups.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateLayout {
    pub orientation: Orientation,
    /// One entry per dataset; indices along the replicate axis.
    pub groups: Vec<Vec<usize>>,
}

impl ReplicateLayout {
    pub fn four_by_three() -> Self {
        Self {
            orientation: Orientation::Rows,
            groups: vec![vec![0, 1, 2], vec![3, 4, 5], vec![6, 7, 8], vec![9, 10, 11]],
        }
    }

    pub fn two_by_four() -> Self {
        Self {
            orientation: Orientation::Columns,
            groups: vec![vec![0, 1, 2, 3], vec![4, 5, 6, 7]],
        }
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of wells the replicate axis must provide (highest index + 1).
    pub fn replicate_extent(&self) -> usize {
        self.groups
            .iter()
            .flat_map(|g| g.iter())
            .map(|&i| i + 1)
            .max()
            .unwrap_or(0)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.groups.is_empty() {
            return Err(AppError::config("Replicate layout has no groups."));
        }
        if let Some(idx) = self.groups.iter().position(|g| g.is_empty()) {
            return Err(AppError::config(format!("Replicate group {idx} has no wells.")));
        }
        Ok(())
    }
}

/// Order in which the dilution steps appear in the grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DilutionOrder {
    /// First step holds the top concentration.
    Descending,
    /// First step holds the lowest concentration.
    Ascending,
}

/// Geometric dilution series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DilutionSeries {
    /// Highest concentration used.
    pub top: f64,
    /// Fold dilution between consecutive steps (must be > 1).
    pub factor: f64,
    /// Number of dilution steps.
    pub samples: usize,
    pub order: DilutionOrder,
}

impl DilutionSeries {
    pub fn validate(&self) -> Result<(), AppError> {
        if !(self.top.is_finite() && self.top > 0.0) {
            return Err(AppError::config(format!(
                "Top concentration must be positive, got {}.",
                self.top
            )));
        }
        if !(self.factor.is_finite() && self.factor > 1.0) {
            return Err(AppError::config(format!(
                "Dilution factor must be greater than 1, got {}.",
                self.factor
            )));
        }
        if self.samples == 0 {
            return Err(AppError::config("Sample count must be > 0."));
        }
        Ok(())
    }

    /// Lowest concentration of the series: `top / factor^(samples - 1)`.
    pub fn bottom(&self) -> f64 {
        self.top / self.factor.powi(self.samples.saturating_sub(1) as i32)
    }
}

/// How many data rows follow the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowSpan {
    /// Exactly this many lines after the header.
    Count(usize),
    /// Everything after the header except this many trailing lines.
    SkipFooter(usize),
}

/// Where the readings live inside a raw instrument export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDescriptor {
    pub header_lines: usize,
    pub rows: RowSpan,
    /// Zero-based index of the first reading column.
    pub first_column: usize,
    pub column_count: usize,
}

impl RegionDescriptor {
    /// The plate reader export this tool was built around: 10 header lines,
    /// 8 plate rows, a row label column followed by 12 wells.
    pub fn legacy() -> Self {
        Self {
            header_lines: 10,
            rows: RowSpan::Count(8),
            first_column: 1,
            column_count: 12,
        }
    }
}

impl Default for RegionDescriptor {
    fn default() -> Self {
        Self::legacy()
    }
}

/// Rectangular table of raw readings (rows = plate rows, columns = wells).
#[derive(Debug, Clone, PartialEq)]
pub struct RawGrid {
    rows: Vec<Vec<f64>>,
    n_cols: usize,
}

impl RawGrid {
    pub fn new(rows: Vec<Vec<f64>>) -> Result<Self, AppError> {
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if let Some(idx) = rows.iter().position(|r| r.len() != n_cols) {
            return Err(AppError::shape(format!(
                "Grid row {idx} has {} columns, expected {n_cols}.",
                rows[idx].len()
            )));
        }
        Ok(Self { rows, n_cols })
    }

    pub fn n_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn n_cols(&self) -> usize {
        self.n_cols
    }

    pub fn row(&self, r: usize) -> &[f64] {
        &self.rows[r]
    }

    pub fn get(&self, r: usize, c: usize) -> f64 {
        self.rows[r][c]
    }

    pub fn transpose(&self) -> RawGrid {
        let rows = (0..self.n_cols)
            .map(|c| self.rows.iter().map(|row| row[c]).collect())
            .collect();
        RawGrid {
            rows,
            n_cols: self.rows.len(),
        }
    }
}

/// One dilution step of an aggregated series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub concentration: f64,
    pub mean: f64,
    pub std_dev: f64,
}

/// Per-concentration summary of one replicate group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConcentrationSeries {
    pub name: String,
    pub points: Vec<SeriesPoint>,
}

impl ConcentrationSeries {
    pub fn concentrations(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.concentration).collect()
    }

    pub fn means(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.mean).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Parameters of the saturating-binding model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    pub max_response: f64,
    pub hill: f64,
    pub ec50: f64,
}

/// Starting value, bounds and vary flag for one model parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    pub initial: f64,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub vary: bool,
}

impl ParamSpec {
    pub fn free(initial: f64) -> Self {
        Self {
            initial,
            min: None,
            max: None,
            vary: true,
        }
    }

    pub fn fixed(initial: f64) -> Self {
        Self {
            vary: false,
            ..Self::free(initial)
        }
    }

    pub fn with_min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }
}

/// Lower bound on the fitted maximum response.
pub const MAX_RESPONSE_FLOOR: f64 = 1.0;
/// Exclusive lower limit of the fitted EC50.
pub const EC50_FLOOR: f64 = 1e-7;

/// Starting point and constraints for a fit, in `(max, hill, ec50)` order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitSetup {
    pub max_response: ParamSpec,
    pub hill: ParamSpec,
    pub ec50: ParamSpec,
}

impl FitSetup {
    /// `max` starts at 1.5 (≥ 1.0), `ec50` at 0.004 (> 1e-7), and the Hill
    /// exponent starts at 1.0 and only varies when `fit_hill` is set.
    pub fn standard(fit_hill: bool, hill_min: Option<f64>) -> Self {
        let mut hill = if fit_hill {
            ParamSpec::free(1.0)
        } else {
            ParamSpec::fixed(1.0)
        };
        hill.min = hill_min;
        Self {
            max_response: ParamSpec::free(1.5).with_min(MAX_RESPONSE_FLOOR),
            hill,
            ec50: ParamSpec::free(0.004).with_min(just_above(EC50_FLOOR)),
        }
    }

    pub fn specs(&self) -> [ParamSpec; 3] {
        [self.max_response, self.hill, self.ec50]
    }

    pub fn initial(&self) -> ModelParameters {
        ModelParameters {
            max_response: self.max_response.initial,
            hill: self.hill.initial,
            ec50: self.ec50.initial,
        }
    }
}

/// How a fit terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FitStatus {
    Converged,
    MaxIterations,
    InsufficientData,
    Degenerate,
    Failed,
}

impl FitStatus {
    pub fn is_success(self) -> bool {
        self == FitStatus::Converged
    }

    pub fn label(self) -> &'static str {
        match self {
            FitStatus::Converged => "converged",
            FitStatus::MaxIterations => "max-iterations",
            FitStatus::InsufficientData => "insufficient-data",
            FitStatus::Degenerate => "degenerate",
            FitStatus::Failed => "failed",
        }
    }
}

/// Residual statistics at the final parameter vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitQuality {
    pub sse: f64,
    pub rmse: f64,
    pub reduced_chi_square: f64,
    /// `None` when the responses have no variance.
    pub r_squared: Option<f64>,
    pub aic: f64,
    pub bic: f64,
    pub n: usize,
    pub n_varying: usize,
}

/// Standard errors of the varying parameters (`None` for fixed ones or when
/// the covariance could not be estimated).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ParamErrors {
    pub max_response: Option<f64>,
    pub hill: Option<f64>,
    pub ec50: Option<f64>,
}

/// Output of a single series fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitResult {
    pub params: ModelParameters,
    pub errors: ParamErrors,
    pub status: FitStatus,
    pub message: String,
    pub iterations: usize,
    pub evaluations: usize,
    pub quality: FitQuality,
}

impl FitResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    /// EC50 of a successful fit.
    pub fn ec50(&self) -> Option<f64> {
        self.is_success().then_some(self.params.ec50)
    }
}

/// A series together with its fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetFit {
    pub series: ConcentrationSeries,
    pub fit: FitResult,
}

/// A saved fits file (JSON): everything needed to re-plot a plate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitsFile {
    pub tool: String,
    pub generated_at: DateTime<Utc>,
    pub source: String,
    pub plate_id: String,
    pub experiment: String,
    pub axis_label: String,
    pub datasets: Vec<SavedDataset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedDataset {
    pub series: ConcentrationSeries,
    pub fit: FitResult,
    pub grid: CurveGrid,
}

/// Fitted curve sampled on log-spaced concentrations (raw response units).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurveGrid {
    pub concentration: Vec<f64>,
    pub response: Vec<f64>,
}

/// Identity of one input file's datasets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileManifest {
    pub plate_id: String,
    pub experiment: String,
    pub datasets: Vec<String>,
    /// Overrides the pipeline layout for this file.
    #[serde(default)]
    pub layout: Option<ReplicateLayout>,
}

/// What to do about plots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PlotMode {
    /// Two-panel SVG next to the reports.
    Svg,
    /// Terminal chart on stdout.
    Ascii,
    None,
}

/// Solver tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    pub max_iterations: usize,
    pub ftol: f64,
    pub xtol: f64,
    pub gtol: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
        }
    }
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub dilution: DilutionSeries,
    pub layout: ReplicateLayout,
    pub region: RegionDescriptor,
    /// Units of the concentration axis (reports and plots).
    pub axis_label: String,
    pub setup: FitSetup,
    pub solver: SolverConfig,

    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub manifest: Option<PathBuf>,
    pub plot: PlotMode,
    /// Number of log-spaced points used to draw fitted curves.
    pub curve_points: usize,
    pub clear_table: bool,
    pub export_json: bool,
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        self.dilution.validate()?;
        self.layout.validate()?;
        if self.solver.max_iterations == 0 {
            return Err(AppError::config("max_iterations must be > 0."));
        }
        if self.region.column_count == 0 {
            return Err(AppError::config("Region must contain at least one column."));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_grid_rejects_ragged_rows() {
        let err = RawGrid::new(vec![vec![1.0, 2.0], vec![3.0]]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::ShapeMismatch);
    }

    #[test]
    fn raw_grid_transpose_swaps_axes() {
        let grid = RawGrid::new(vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]).unwrap();
        let t = grid.transpose();
        assert_eq!(t.n_rows(), 3);
        assert_eq!(t.n_cols(), 2);
        assert_eq!(t.row(2), &[3.0, 6.0]);
    }

    #[test]
    fn layout_presets_cover_expected_wells() {
        assert_eq!(ReplicateLayout::four_by_three().replicate_extent(), 12);
        assert_eq!(ReplicateLayout::two_by_four().replicate_extent(), 8);
        assert_eq!(LayoutMode::TwoByFour.layout().group_count(), 2);
    }

    #[test]
    fn standard_setup_fixes_hill_by_default() {
        let setup = FitSetup::standard(false, None);
        assert!(!setup.hill.vary);
        assert_eq!(setup.max_response.min, Some(1.0));
        let ec50_min = setup.ec50.min.unwrap();
        assert!(ec50_min > EC50_FLOOR && ec50_min < 1.0000001e-7);
        assert!(FitSetup::standard(true, Some(0.0)).hill.vary);
    }

    #[test]
    fn dilution_validation() {
        let mut d = DilutionSeries {
            top: 3.0,
            factor: 3.0,
            samples: 8,
            order: DilutionOrder::Descending,
        };
        assert!(d.validate().is_ok());
        d.factor = 1.0;
        assert!(d.validate().is_err());
    }
}
