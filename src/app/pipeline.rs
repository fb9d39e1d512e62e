//! Shared "fit pipeline" logic used by the `batch` and `fit` commands.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! sanitise -> parse region -> aggregate -> fit -> reports -> export -> EC50 row -> plot
//!
//! The commands can then focus on presentation (what gets printed).

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::data::aggregate;
use crate::domain::{DatasetFit, FileManifest, PipelineConfig, RawGrid, ReplicateLayout};
use crate::error::{AppError, ErrorKind};
use crate::fit::fit_all;
use crate::io::{
    Ec50Table, ManifestSource, build_fits_file, load_raw_grid, write_dataset_report, write_fits_json,
};
use crate::plot::{PlotSink, build_plot_request};
use crate::report::{ec50_entries, failed_fit_count};

/// All computed outputs of one processed input file.
#[derive(Debug, Clone)]
pub struct FileOutput {
    pub source: PathBuf,
    pub manifest: FileManifest,
    pub fits: Vec<DatasetFit>,
    /// Bytes dropped while decoding the export.
    pub dropped_bytes: usize,
    pub reports: Vec<PathBuf>,
    pub fits_json: Option<PathBuf>,
    pub plot: Option<PathBuf>,
}

/// Outcome of a batch run.
#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub files: Vec<FileOutput>,
    /// Entries that are not inputs (e.g. not `.txt`).
    pub skipped: usize,
    /// Inputs that could not be processed, with the reason.
    pub failed: Vec<(PathBuf, AppError)>,
}

impl BatchSummary {
    pub fn processed(&self) -> usize {
        self.files.len()
    }

    /// Fits that did not succeed, over all processed files.
    pub fn failed_fits(&self) -> usize {
        self.files.iter().map(|f| failed_fit_count(&f.fits)).sum()
    }
}

/// Aggregate a grid and fit every replicate group.
pub fn analyze_grid(
    grid: &RawGrid,
    layout: &ReplicateLayout,
    names: &[String],
    config: &PipelineConfig,
) -> Result<Vec<DatasetFit>, AppError> {
    let series = aggregate(grid, layout, &config.dilution, names)?;
    let fits = fit_all(series, &config.setup, &config.solver);

    for f in fits.iter().filter(|f| !f.fit.is_success()) {
        warn!(
            kind = %ErrorKind::FitNonConvergence,
            dataset = %f.series.name,
            status = f.fit.status.label(),
            "fit did not succeed: {}",
            f.fit.message
        );
    }
    Ok(fits)
}

/// Read one export and fit it, without writing anything.
pub fn fit_file(
    path: &Path,
    manifest: &FileManifest,
    config: &PipelineConfig,
) -> Result<(Vec<DatasetFit>, usize), AppError> {
    let ingested = load_raw_grid(path, &config.region)?;
    if ingested.dropped_bytes > 0 {
        warn!(
            kind = %ErrorKind::Encoding,
            file = %path.display(),
            dropped = ingested.dropped_bytes,
            "dropped undecodable bytes"
        );
    }

    let layout = manifest.layout.as_ref().unwrap_or(&config.layout);
    let fits = analyze_grid(&ingested.grid, layout, &manifest.datasets, config)?;
    Ok((fits, ingested.dropped_bytes))
}

/// Run the whole pipeline for one export and write its outputs.
///
/// The EC50 row is the last write that can fail the file, so a file listed as
/// failed never has a row in the table. The fits JSON and the plot are side
/// artifacts: their failures are logged and leave the field `None`.
pub fn process_file(
    path: &Path,
    manifest: &FileManifest,
    config: &PipelineConfig,
    table: &Ec50Table,
    sink: &dyn PlotSink,
) -> Result<FileOutput, AppError> {
    let (fits, dropped_bytes) = fit_file(path, manifest, config)?;

    let reports = fits
        .iter()
        .map(|f| write_dataset_report(&config.output_dir, manifest, f, &config.axis_label))
        .collect::<Result<Vec<_>, _>>()?;

    let stem = file_stem(path);
    let fits_json = if config.export_json {
        let out = config.output_dir.join(format!("{stem}_fits.json"));
        let file = build_fits_file(&file_name(path), manifest, &fits, &config.axis_label, config.curve_points);
        match write_fits_json(&out, &file) {
            Ok(()) => Some(out),
            Err(e) => {
                warn!(kind = %e.kind(), file = %path.display(), "fits JSON skipped: {e}");
                None
            }
        }
    } else {
        None
    };

    table.append_row(&manifest.experiment, &ec50_entries(&fits))?;

    let request = build_plot_request(&manifest.experiment, &stem, &config.axis_label, &fits, config.curve_points);
    let plot = match sink.render(&request) {
        Ok(p) => p,
        Err(e) => {
            warn!(kind = %e.kind(), file = %path.display(), "plot skipped: {e}");
            None
        }
    };

    Ok(FileOutput {
        source: path.to_path_buf(),
        manifest: manifest.clone(),
        fits,
        dropped_bytes,
        reports,
        fits_json,
        plot,
    })
}

/// Process every input file in `config.input_dir`, in name order.
///
/// Problems with a single file are logged and counted; only problems with the
/// directories themselves abort the batch.
pub fn run_batch(
    config: &PipelineConfig,
    source: &dyn ManifestSource,
    sink: &dyn PlotSink,
) -> Result<BatchSummary, AppError> {
    config.validate()?;

    fs::create_dir_all(&config.output_dir).map_err(|e| {
        AppError::io(format!(
            "Failed to create output directory '{}': {e}",
            config.output_dir.display()
        ))
    })?;
    let table = Ec50Table::in_dir(&config.output_dir);
    if config.clear_table {
        table.clear()?;
    }

    let inputs = list_inputs(&config.input_dir)?;
    info!(dir = %config.input_dir.display(), files = inputs.len(), "starting batch");

    let mut summary = BatchSummary::default();
    for path in inputs {
        let manifest = match source.resolve(&path) {
            Ok(Some(m)) => m,
            Ok(None) => {
                debug!(file = %path.display(), "not an input, skipping");
                summary.skipped += 1;
                continue;
            }
            Err(e) => {
                error!(kind = %e.kind(), file = %path.display(), "{e}");
                summary.failed.push((path, e));
                continue;
            }
        };

        match process_file(&path, &manifest, config, &table, sink) {
            Ok(out) => {
                info!(
                    file = %path.display(),
                    datasets = out.fits.len(),
                    failed_fits = failed_fit_count(&out.fits),
                    "processed"
                );
                summary.files.push(out);
            }
            Err(e) => {
                error!(kind = %e.kind(), file = %path.display(), "{e}");
                summary.failed.push((path, e));
            }
        }
    }

    info!(
        processed = summary.processed(),
        skipped = summary.skipped,
        failed = summary.failed.len(),
        failed_fits = summary.failed_fits(),
        "batch finished"
    );
    Ok(summary)
}

/// Regular files of a directory, sorted by name.
fn list_inputs(dir: &Path) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir)
        .map_err(|e| AppError::io(format!("Failed to list input directory '{}': {e}", dir.display())))?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AppError::io(format!("Failed to list '{}': {e}", dir.display())))?;
        let path = entry.path();
        if path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plate".to_string())
}
