//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - loads `.env` and sets up logging
//! - parses CLI arguments into a `PipelineConfig`
//! - runs the batch (or single-file) pipeline
//! - prints summaries/plots

use std::fs;
use std::path::Path;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{BatchArgs, Command, DilutionArgs, FitArgs, FitFileArgs, PlotArgs, SimulateArgs};
use crate::data::{PlateSpec, simulate_plate};
use crate::domain::{
    DilutionOrder, DilutionSeries, FileManifest, FitSetup, ModelParameters, PipelineConfig, PlotMode,
    RegionDescriptor, RowSpan, SolverConfig,
};
use crate::error::AppError;
use crate::io::{FilenameConvention, JsonManifest, ManifestSource, read_fits_json};
use crate::plot::{
    AsciiPlotSink, PlotSink, build_plot_request, make_plot_sink, plot_request_from_fits, render_ascii_plot,
};
use crate::report::format_file_summary;

pub mod pipeline;

/// Entry point for the `ec50` binary.
pub fn run() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_logging();

    // `ec50` with no subcommand (or only flags) behaves like `ec50 batch ...`.
    let argv = rewrite_args(std::env::args().collect());
    let cli = crate::cli::Cli::parse_from(argv);

    match cli.command {
        Command::Batch(args) => handle_batch(args),
        Command::Fit(args) => handle_fit(args),
        Command::Plot(args) => handle_plot(args),
        Command::Simulate(args) => handle_simulate(args),
    }
}

/// Log to stderr; `RUST_LOG` overrides the default `info` level.
fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = pipeline_config_from_args(&args)?;
    let source: Box<dyn ManifestSource> = match &config.manifest {
        Some(path) => Box::new(JsonManifest::load(path)?),
        None => Box::new(FilenameConvention {
            datasets: config.layout.group_count(),
        }),
    };
    let sink = make_plot_sink(config.plot, &config.output_dir);

    let summary = pipeline::run_batch(&config, source.as_ref(), sink.as_ref())?;

    for file in &summary.files {
        println!(
            "{}",
            format_file_summary(&file.manifest, &file.fits, &config.axis_label)
        );
    }
    for (path, err) in &summary.failed {
        println!("failed: {} ({}): {err}", path.display(), err.kind());
    }
    println!(
        "processed={} skipped={} failed={} failed_fits={}",
        summary.processed(),
        summary.skipped,
        summary.failed.len(),
        summary.failed_fits()
    );
    Ok(())
}

fn handle_fit(args: FitFileArgs) -> Result<(), AppError> {
    let config = config_from_fit_args(&args.fit)?;
    config.validate()?;

    let manifest = match &args.names {
        Some(names) => FileManifest {
            plate_id: "-".to_string(),
            experiment: file_stem(&args.file),
            datasets: names.clone(),
            layout: None,
        },
        None => FilenameConvention {
            datasets: config.layout.group_count(),
        }
        .resolve(&args.file)?
        .ok_or_else(|| {
            AppError::config(format!(
                "Cannot derive dataset names from '{}'; pass --names.",
                args.file.display()
            ))
        })?,
    };

    let (fits, _) = pipeline::fit_file(&args.file, &manifest, &config)?;
    println!("{}", format_file_summary(&manifest, &fits, &config.axis_label));

    if !args.no_plot {
        let request = build_plot_request(
            &manifest.experiment,
            &file_stem(&args.file),
            &config.axis_label,
            &fits,
            config.curve_points,
        );
        AsciiPlotSink {
            width: args.width,
            height: args.height,
        }
        .render(&request)?;
    }
    Ok(())
}

fn handle_plot(args: PlotArgs) -> Result<(), AppError> {
    let fits = read_fits_json(&args.fits)?;
    let request = plot_request_from_fits(&fits, &file_stem(&args.fits), args.curve_points);
    println!("{}", render_ascii_plot(&request, args.width, args.height));
    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let spec = plate_spec_from_args(&args);
    let text = simulate_plate(&spec)?;
    fs::write(&args.out, text)
        .map_err(|e| AppError::export(format!("Failed to write '{}': {e}", args.out.display())))?;
    info!(file = %args.out.display(), seed = args.seed, "wrote synthetic plate");
    Ok(())
}

pub fn pipeline_config_from_args(args: &BatchArgs) -> Result<PipelineConfig, AppError> {
    let mut config = config_from_fit_args(&args.fit)?;
    config.input_dir = args.input.clone();
    config.output_dir = args.output.clone();
    config.manifest = args.manifest.clone();
    config.plot = args.plot;
    config.curve_points = args.curve_points;
    config.clear_table = args.clear_table;
    config.export_json = args.export_json;
    Ok(config)
}

fn config_from_fit_args(args: &FitArgs) -> Result<PipelineConfig, AppError> {
    let rows = match (args.data_rows, args.footer_lines) {
        (_, Some(n)) => RowSpan::SkipFooter(n),
        (Some(n), None) => RowSpan::Count(n),
        (None, None) => RegionDescriptor::legacy().rows,
    };
    if let Some(min) = args.hill_min.filter(|m| !m.is_finite()) {
        return Err(AppError::config(format!("--hill-min must be finite, got {min}.")));
    }

    let fit_hill = args.fit_hill && !args.no_fit_hill;
    Ok(PipelineConfig {
        dilution: dilution_from_args(&args.dilution),
        layout: args.dilution.mode.layout(),
        region: RegionDescriptor {
            header_lines: args.header_lines,
            rows,
            first_column: args.first_column,
            column_count: args.columns,
        },
        axis_label: args.axis.clone(),
        setup: FitSetup::standard(fit_hill, args.hill_min),
        solver: SolverConfig {
            max_iterations: args.max_iterations,
            ..SolverConfig::default()
        },
        input_dir: "input".into(),
        output_dir: "results".into(),
        manifest: None,
        plot: PlotMode::None,
        curve_points: 50,
        clear_table: false,
        export_json: false,
    })
}

fn dilution_from_args(args: &DilutionArgs) -> DilutionSeries {
    DilutionSeries {
        top: args.concentration,
        factor: args.dilution,
        samples: args.samples,
        order: if args.ascending {
            DilutionOrder::Ascending
        } else {
            DilutionOrder::Descending
        },
    }
}

fn plate_spec_from_args(args: &SimulateArgs) -> PlateSpec {
    PlateSpec {
        dilution: dilution_from_args(&args.dilution),
        layout: args.dilution.mode.layout(),
        groups: args
            .ec50
            .iter()
            .map(|&ec50| ModelParameters {
                max_response: args.max_response,
                hill: args.hill,
                ec50,
            })
            .collect(),
        blank: args.blank,
        noise_sd: args.noise,
        seed: args.seed,
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plate".to_string())
}

/// Rewrite argv so `ec50` defaults to `ec50 batch`.
///
/// Rules:
/// - `ec50`                       -> `ec50 batch`
/// - `ec50 -d 2 ...`              -> `ec50 batch -d 2 ...`
/// - `ec50 --help/--version/-h`   -> unchanged (show top-level help/version)
fn rewrite_args(mut argv: Vec<String>) -> Vec<String> {
    let Some(arg1) = argv.get(1).cloned() else {
        argv.push("batch".to_string());
        return argv;
    };

    let is_top_level_help_or_version = matches!(arg1.as_str(), "-h" | "--help" | "-V" | "--version" | "help");
    if is_top_level_help_or_version {
        return argv;
    }

    let is_subcommand = matches!(arg1.as_str(), "batch" | "fit" | "plot" | "simulate");
    if is_subcommand {
        return argv;
    }

    // If the first token is a flag, treat it as "batch flags".
    if arg1.starts_with('-') {
        argv.insert(1, "batch".to_string());
        return argv;
    }

    // Otherwise, leave as-is.
    argv
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Cli;
    use crate::domain::Orientation;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn parse_batch(list: &[&str]) -> BatchArgs {
        match Cli::parse_from(rewrite_args(args(list))).command {
            Command::Batch(b) => b,
            other => panic!("expected batch, got {other:?}"),
        }
    }

    #[test]
    fn bare_invocation_runs_batch() {
        assert_eq!(rewrite_args(args(&["ec50"])), args(&["ec50", "batch"]));
        assert_eq!(rewrite_args(args(&["ec50", "-d", "2"])), args(&["ec50", "batch", "-d", "2"]));
        assert_eq!(rewrite_args(args(&["ec50", "--help"])), args(&["ec50", "--help"]));
        assert_eq!(rewrite_args(args(&["ec50", "fit", "x.txt"])), args(&["ec50", "fit", "x.txt"]));
    }

    #[test]
    fn defaults_match_the_legacy_script() {
        let config = pipeline_config_from_args(&parse_batch(&["ec50", "--input", "in", "--output", "out"])).unwrap();
        assert_eq!(config.dilution.factor, 3.0);
        assert_eq!(config.dilution.top, 3.0);
        assert_eq!(config.dilution.samples, 8);
        assert_eq!(config.axis_label, "mg/mL");
        assert_eq!(config.layout, crate::domain::ReplicateLayout::four_by_three());
        assert_eq!(config.region, RegionDescriptor::legacy());
        assert!(!config.setup.hill.vary);
        assert_eq!(config.plot, PlotMode::Svg);
        assert_eq!(config.input_dir, Path::new("in"));
    }

    #[test]
    fn flags_reach_the_config() {
        let config = pipeline_config_from_args(&parse_batch(&[
            "ec50",
            "-d",
            "2",
            "-c",
            "10",
            "-s",
            "12",
            "-m",
            "two-by-four",
            "--fit-hill",
            "--hill-min",
            "0",
            "--footer-lines",
            "3",
            "--plot",
            "none",
            "--clear-table",
        ]))
        .unwrap();
        assert_eq!(config.dilution.factor, 2.0);
        assert_eq!(config.dilution.top, 10.0);
        assert_eq!(config.dilution.samples, 12);
        assert_eq!(config.layout.orientation, Orientation::Columns);
        assert!(config.setup.hill.vary);
        assert_eq!(config.setup.hill.min, Some(0.0));
        assert_eq!(config.region.rows, RowSpan::SkipFooter(3));
        assert_eq!(config.plot, PlotMode::None);
        assert!(config.clear_table);
    }

    #[test]
    fn no_fit_hill_wins() {
        let config =
            pipeline_config_from_args(&parse_batch(&["ec50", "--fit-hill", "--no-fit-hill"])).unwrap();
        assert!(!config.setup.hill.vary);
    }
}
