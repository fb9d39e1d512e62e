//! Command-line parsing for the EC50 batch fitter.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the aggregation/fitting code. Everything here is turned into a
//! `PipelineConfig` (or a `PlateSpec`) by `app` before any work starts.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::domain::{LayoutMode, PlotMode};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "ec50", version, about = "Dose-response (EC50) fitting for plate reader exports")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Fit every export in the input directory and write reports (default).
    Batch(BatchArgs),
    /// Fit a single export and print the results.
    Fit(FitFileArgs),
    /// Plot a previously exported fits JSON in the terminal.
    Plot(PlotArgs),
    /// Write a synthetic plate export.
    Simulate(SimulateArgs),
}

/// Dilution series and plate layout.
#[derive(Debug, Args, Clone)]
pub struct DilutionArgs {
    /// Dilution factor between consecutive samples (2-fold, 3-fold, ...).
    #[arg(short = 'd', long, default_value_t = 3.0)]
    pub dilution: f64,

    /// Highest concentration used.
    #[arg(short = 'c', long, default_value_t = 3.0)]
    pub concentration: f64,

    /// Number of samples (dilution steps) used.
    #[arg(short = 's', long, default_value_t = 8)]
    pub samples: usize,

    /// The first dilution step holds the lowest concentration.
    #[arg(long)]
    pub ascending: bool,

    /// Replicate layout of the plate.
    #[arg(short = 'm', long, value_enum, default_value_t = LayoutMode::FourByThree)]
    pub mode: LayoutMode,
}

/// Options shared by every command that fits data.
#[derive(Debug, Args, Clone)]
pub struct FitArgs {
    #[command(flatten)]
    pub dilution: DilutionArgs,

    /// Units of the concentration axis (reports and plots).
    #[arg(short = 'a', long, default_value = "mg/mL")]
    pub axis: String,

    /// Fit the Hill coefficient instead of holding it at 1.
    #[arg(long)]
    pub fit_hill: bool,

    /// Hold the Hill coefficient at 1 (default; overrides `--fit-hill`).
    #[arg(long)]
    pub no_fit_hill: bool,

    /// Lower bound for a fitted Hill coefficient.
    #[arg(long)]
    pub hill_min: Option<f64>,

    /// Solver iteration cap.
    #[arg(long, default_value_t = 1000)]
    pub max_iterations: usize,

    /// Lines before the data region of each export.
    #[arg(long, default_value_t = 10)]
    pub header_lines: usize,

    /// Number of data lines (default 8).
    #[arg(long, conflicts_with = "footer_lines")]
    pub data_rows: Option<usize>,

    /// Read everything up to this many trailing lines instead of a fixed row count.
    #[arg(long)]
    pub footer_lines: Option<usize>,

    /// Zero-based column of the first reading (column 0 holds the row label).
    #[arg(long, default_value_t = 1)]
    pub first_column: usize,

    /// Number of reading columns.
    #[arg(long, default_value_t = 12)]
    pub columns: usize,
}

/// Options for a batch run.
#[derive(Debug, Args, Clone)]
pub struct BatchArgs {
    #[command(flatten)]
    pub fit: FitArgs,

    /// Directory holding the raw exports.
    #[arg(short = 'i', long, env = "EC50_INPUT_DIR", default_value = "input")]
    pub input: PathBuf,

    /// Directory receiving reports, the EC50 table and plots.
    #[arg(short = 'o', long, env = "EC50_OUTPUT_DIR", default_value = "results")]
    pub output: PathBuf,

    /// JSON manifest naming plate, experiment and datasets per file
    /// (otherwise parsed from `{plate}_{experiment}_{datasets...}.txt`).
    #[arg(long, value_name = "JSON")]
    pub manifest: Option<PathBuf>,

    /// Plot output.
    #[arg(long, value_enum, default_value_t = PlotMode::Svg)]
    pub plot: PlotMode,

    /// Truncate the EC50 table before appending.
    #[arg(long)]
    pub clear_table: bool,

    /// Also write `{file}_fits.json` per input file.
    #[arg(long)]
    pub export_json: bool,

    /// Points per fitted curve in plots and exports.
    #[arg(long, default_value_t = 50)]
    pub curve_points: usize,
}

/// Options for fitting a single export.
#[derive(Debug, Args, Clone)]
pub struct FitFileArgs {
    /// Raw plate export.
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Dataset names, comma separated (otherwise parsed from the file name).
    #[arg(long, value_delimiter = ',')]
    pub names: Option<Vec<String>>,

    #[command(flatten)]
    pub fit: FitArgs,

    /// Skip the terminal plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,
}

/// Options for plotting a saved fits file.
#[derive(Debug, Args, Clone)]
pub struct PlotArgs {
    /// Fits JSON produced by `ec50 batch --export-json`.
    #[arg(long, value_name = "JSON")]
    pub fits: PathBuf,

    /// Plot width (columns).
    #[arg(long, default_value_t = 100)]
    pub width: usize,

    /// Plot height (rows).
    #[arg(long, default_value_t = 25)]
    pub height: usize,

    /// Points per fitted curve.
    #[arg(long, default_value_t = 50)]
    pub curve_points: usize,
}

/// Options for generating a synthetic plate.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output file.
    #[arg(long, value_name = "FILE")]
    pub out: PathBuf,

    #[command(flatten)]
    pub dilution: DilutionArgs,

    /// True EC50 per dataset, comma separated (one per replicate group).
    #[arg(long, value_delimiter = ',', default_values_t = [0.01, 0.05, 0.2, 1.0])]
    pub ec50: Vec<f64>,

    /// True maximal response.
    #[arg(long, default_value_t = 1.8)]
    pub max_response: f64,

    /// True Hill coefficient.
    #[arg(long, default_value_t = 1.0)]
    pub hill: f64,

    /// Reading of wells without sample.
    #[arg(long, default_value_t = 0.04)]
    pub blank: f64,

    /// Standard deviation of the Gaussian reading noise.
    #[arg(long, default_value_t = 0.01)]
    pub noise: f64,

    /// Random seed.
    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}
