//! Read/write fits JSON files.
//!
//! A fits file is the "portable" representation of one processed plate:
//! - plate identity and concentration units
//! - every aggregated series with its fit result
//! - a precomputed fitted grid per dataset for quick plotting
//!
//! The schema is defined by `domain::FitsFile`.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use chrono::Utc;

use crate::domain::{CurveGrid, DatasetFit, FileManifest, FitResult, FitsFile, SavedDataset};
use crate::error::AppError;
use crate::models::{log_spaced, response};

/// Build the in-memory fits file for one plate.
pub fn build_fits_file(
    source: &str,
    manifest: &FileManifest,
    fits: &[DatasetFit],
    axis_label: &str,
    curve_points: usize,
) -> FitsFile {
    let datasets = fits
        .iter()
        .map(|f| {
            let concentrations = f.series.concentrations();
            SavedDataset {
                series: f.series.clone(),
                fit: f.fit.clone(),
                grid: build_grid(&f.fit, &concentrations, curve_points),
            }
        })
        .collect();

    FitsFile {
        tool: "ec50".to_string(),
        generated_at: Utc::now(),
        source: source.to_string(),
        plate_id: manifest.plate_id.clone(),
        experiment: manifest.experiment.clone(),
        axis_label: axis_label.to_string(),
        datasets,
    }
}

/// Write a fits JSON file.
pub fn write_fits_json(path: &Path, fits: &FitsFile) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::export(format!("Failed to create fits JSON '{}': {e}", path.display())))?;
    let mut w = BufWriter::new(file);

    serde_json::to_writer_pretty(&mut w, fits)
        .map_err(|e| AppError::export(format!("Failed to write fits JSON: {e}")))?;
    w.flush()
        .map_err(|e| AppError::export(format!("Failed to write fits JSON: {e}")))?;

    Ok(())
}

/// Read a fits JSON file.
pub fn read_fits_json(path: &Path) -> Result<FitsFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::io(format!("Failed to open fits JSON '{}': {e}", path.display())))?;
    let fits: FitsFile = serde_json::from_reader(file)
        .map_err(|e| AppError::config(format!("Invalid fits JSON '{}': {e}", path.display())))?;
    Ok(fits)
}

/// Fitted response on `n` log-spaced concentrations spanning the series.
///
/// Unsuccessful fits get an empty grid.
pub fn build_grid(fit: &FitResult, concentrations: &[f64], n: usize) -> CurveGrid {
    let (lo, hi) = concentrations
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &c| (lo.min(c), hi.max(c)));
    if !fit.is_success() || !(lo.is_finite() && hi.is_finite() && lo > 0.0 && hi > lo) {
        return CurveGrid {
            concentration: Vec::new(),
            response: Vec::new(),
        };
    }

    let concentration = log_spaced(hi, lo, n);
    let response = concentration.iter().map(|&c| response(&fit.params, c)).collect();
    CurveGrid {
        concentration,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ConcentrationSeries, FitSetup, ModelParameters, SeriesPoint, SolverConfig};
    use crate::fit::fit_series;

    fn fitted(name: &str, ec50: f64) -> DatasetFit {
        let truth = ModelParameters {
            max_response: 1.6,
            hill: 1.0,
            ec50,
        };
        let series = ConcentrationSeries {
            name: name.to_string(),
            points: (0..8)
                .map(|i| {
                    let c = 3.0 / 3f64.powi(i);
                    SeriesPoint {
                        concentration: c,
                        mean: response(&truth, c),
                        std_dev: 0.01,
                    }
                })
                .collect(),
        };
        let fit = fit_series(&series, &FitSetup::standard(false, None), &SolverConfig::default());
        DatasetFit { series, fit }
    }

    #[test]
    fn fits_json_round_trips_through_disk() {
        let manifest = FileManifest {
            plate_id: "4".to_string(),
            experiment: "exp".to_string(),
            datasets: vec!["a".to_string(), "b".to_string()],
            layout: None,
        };
        let fits = vec![fitted("a", 0.05), fitted("b", 0.3)];
        let file = build_fits_file("4_exp_a_b.txt", &manifest, &fits, "uM", 50);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("fits.json");
        write_fits_json(&path, &file).unwrap();
        let back = read_fits_json(&path).unwrap();

        assert_eq!(back.plate_id, "4");
        assert_eq!(back.datasets.len(), 2);
        assert_eq!(back.datasets[1].series.name, "b");
        assert_eq!(back.datasets[1].series.len(), 8);
        assert_eq!(back.datasets[1].fit.status, fits[1].fit.status);
        assert_eq!(back.datasets[0].grid.concentration.len(), 50);
    }

    #[test]
    fn grid_spans_the_series_on_a_log_scale() {
        let f = fitted("a", 0.05);
        let grid = build_grid(&f.fit, &f.series.concentrations(), 50);
        assert_eq!(grid.concentration.len(), 50);
        assert!((grid.concentration[0] - 3.0).abs() < 1e-12);
        assert!((grid.concentration[49] - 3.0 / 2187.0).abs() < 1e-15);
        // Constant ratio between neighbours.
        let r0 = grid.concentration[1] / grid.concentration[0];
        let r1 = grid.concentration[30] / grid.concentration[29];
        assert!((r0 - r1).abs() < 1e-12);
    }

    #[test]
    fn failed_fit_has_empty_grid() {
        let mut f = fitted("a", 0.05);
        f.fit.status = crate::domain::FitStatus::Degenerate;
        let grid = build_grid(&f.fit, &f.series.concentrations(), 50);
        assert!(grid.concentration.is_empty());
    }
}
