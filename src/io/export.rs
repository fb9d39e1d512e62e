//! Tab-separated report files.
//!
//! - one `{dataset}_results_{plate}.txt` per fitted series
//! - the cumulative `EC50Table.txt`, appended once per processed file
//!
//! The files are meant to be easy to consume in spreadsheets or downstream scripts.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::domain::{DatasetFit, FileManifest};
use crate::error::AppError;

/// File name of the cumulative EC50 table inside the output directory.
pub const EC50_TABLE_FILE: &str = "EC50Table.txt";

/// Path of the report written for one dataset of one plate.
pub fn dataset_report_path(dir: &Path, dataset: &str, plate_id: &str) -> PathBuf {
    dir.join(format!("{dataset}_results_{plate_id}.txt"))
}

/// Write the per-dataset table: aggregated points, then the fitted parameters.
pub fn write_dataset_report(
    dir: &Path,
    manifest: &FileManifest,
    dataset: &DatasetFit,
    axis_label: &str,
) -> Result<PathBuf, AppError> {
    let path = dataset_report_path(dir, &dataset.series.name, &manifest.plate_id);
    let file = File::create(&path)
        .map_err(|e| AppError::export(format!("Failed to create report '{}': {e}", path.display())))?;
    let mut w = BufWriter::new(file);

    write_report_body(&mut w, dataset, axis_label)
        .and_then(|()| w.flush())
        .map_err(|e| AppError::export(format!("Failed to write report '{}': {e}", path.display())))?;

    Ok(path)
}

fn write_report_body(w: &mut impl Write, dataset: &DatasetFit, axis_label: &str) -> std::io::Result<()> {
    writeln!(w, "{}", dataset.series.name)?;
    writeln!(w, "{axis_label}\taverage abs\tstandard deviation")?;
    for p in &dataset.series.points {
        writeln!(w, "{}\t{}\t{}", p.concentration, p.mean, p.std_dev)?;
    }

    let params = &dataset.fit.params;
    writeln!(w)?;
    writeln!(w, "Results from nonlinear regression")?;
    writeln!(w, "EC50\t{}", params.ec50)?;
    writeln!(w, "A\t{}", params.max_response)?;
    writeln!(w, "Hill coefficient\t{}", params.hill)?;
    writeln!(w, "Fit status\t{}", dataset.fit.status.label())?;
    Ok(())
}

/// The cumulative EC50 table.
///
/// Rows are only ever appended; a row written by an earlier run is never
/// rewritten. `clear` is the only way to start over.
#[derive(Debug, Clone)]
pub struct Ec50Table {
    path: PathBuf,
}

impl Ec50Table {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(EC50_TABLE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Truncate the table.
    pub fn clear(&self) -> Result<(), AppError> {
        File::create(&self.path)
            .map(|_| ())
            .map_err(|e| AppError::export(format!("Failed to clear '{}': {e}", self.path.display())))
    }

    /// Append one row: `experiment\tname1\tec50_1\tname2\tec50_2…`.
    ///
    /// `None` (a fit that did not succeed) is written as `NA`.
    pub fn append_row(&self, experiment: &str, entries: &[(String, Option<f64>)]) -> Result<(), AppError> {
        let mut line = experiment.to_string();
        for (name, ec50) in entries {
            line.push('\t');
            line.push_str(name);
            line.push('\t');
            match ec50 {
                Some(v) => line.push_str(&v.to_string()),
                None => line.push_str("NA"),
            }
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AppError::export(format!("Failed to open '{}': {e}", self.path.display())))?;
        let mut w = BufWriter::new(file);
        writeln!(w, "{line}")
            .and_then(|()| w.flush())
            .map_err(|e| AppError::export(format!("Failed to append to '{}': {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        ConcentrationSeries, FitQuality, FitResult, FitStatus, ModelParameters, ParamErrors, SeriesPoint,
    };
    use std::fs;

    fn manifest() -> FileManifest {
        FileManifest {
            plate_id: "P9".to_string(),
            experiment: "lysozyme".to_string(),
            datasets: vec!["wt".to_string()],
            layout: None,
        }
    }

    fn dataset(status: FitStatus) -> DatasetFit {
        DatasetFit {
            series: ConcentrationSeries {
                name: "wt".to_string(),
                points: vec![
                    SeriesPoint {
                        concentration: 3.0,
                        mean: 1.25,
                        std_dev: 0.5,
                    },
                    SeriesPoint {
                        concentration: 1.0,
                        mean: 0.75,
                        std_dev: 0.0,
                    },
                ],
            },
            fit: FitResult {
                params: ModelParameters {
                    max_response: 1.5,
                    hill: 1.0,
                    ec50: 0.25,
                },
                errors: ParamErrors::default(),
                status,
                message: String::new(),
                iterations: 7,
                evaluations: 9,
                quality: FitQuality {
                    sse: 0.0,
                    rmse: 0.0,
                    reduced_chi_square: 0.0,
                    r_squared: Some(1.0),
                    aic: 0.0,
                    bic: 0.0,
                    n: 2,
                    n_varying: 2,
                },
            },
        }
    }

    #[test]
    fn dataset_report_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_dataset_report(dir.path(), &manifest(), &dataset(FitStatus::Converged), "mg/mL").unwrap();
        assert_eq!(path, dir.path().join("wt_results_P9.txt"));

        let text = fs::read_to_string(&path).unwrap();
        let expected = concat!(
            "wt\n",
            "mg/mL\taverage abs\tstandard deviation\n",
            "3\t1.25\t0.5\n",
            "1\t0.75\t0\n",
            "\n",
            "Results from nonlinear regression\n",
            "EC50\t0.25\n",
            "A\t1.5\n",
            "Hill coefficient\t1\n",
            "Fit status\tconverged\n",
        );
        assert_eq!(text, expected);
    }

    #[test]
    fn ec50_table_only_appends() {
        let dir = tempfile::tempdir().unwrap();
        let table = Ec50Table::in_dir(dir.path());
        let entries = vec![("wt".to_string(), Some(0.25)), ("k33a".to_string(), None)];

        // Two "runs" over the same output directory.
        table.append_row("lysozyme", &entries).unwrap();
        let first = fs::read_to_string(table.path()).unwrap();
        table.append_row("lysozyme", &entries).unwrap();
        let second = fs::read_to_string(table.path()).unwrap();

        assert_eq!(first, "lysozyme\twt\t0.25\tk33a\tNA\n");
        assert!(second.starts_with(&first));
        assert_eq!(second.lines().count(), 2);
    }

    #[test]
    fn clear_truncates_the_table() {
        let dir = tempfile::tempdir().unwrap();
        let table = Ec50Table::in_dir(dir.path());
        table.append_row("e", &[("a".to_string(), Some(1.0))]).unwrap();
        table.clear().unwrap();
        assert_eq!(fs::read_to_string(table.path()).unwrap(), "");
    }

    #[test]
    fn missing_output_dir_is_export_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = write_dataset_report(&missing, &manifest(), &dataset(FitStatus::Converged), "mg/mL").unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Export);
    }
}
