//! Two-panel SVG plots rendered with plotters.
//!
//! Upper panel: linear concentration axis. Lower panel: logarithmic axis with a
//! legend carrying each dataset's EC50. Observations are drawn as points with
//! vertical error bars, fits as lines, one colour per dataset.

use std::path::{Path, PathBuf};

use plotters::coord::ranged1d::Ranged;
use plotters::coord::types::RangedCoordf64;
use plotters::prelude::*;

use super::{PlotRequest, PlotSink};
use crate::error::AppError;

const COLORS: [RGBColor; 4] = [BLUE, GREEN, RED, BLACK];
const SIZE: (u32, u32) = (800, 1000);

/// Writes `results_{stem}.svg` into a directory.
#[derive(Debug, Clone)]
pub struct SvgPlotSink {
    out_dir: PathBuf,
}

impl SvgPlotSink {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            out_dir: out_dir.to_path_buf(),
        }
    }

    pub fn path_for(&self, request: &PlotRequest) -> PathBuf {
        self.out_dir.join(format!("results_{}.svg", request.stem))
    }
}

impl PlotSink for SvgPlotSink {
    fn render(&self, request: &PlotRequest) -> Result<Option<PathBuf>, AppError> {
        let Some(x_range) = request.concentration_range() else {
            return Ok(None);
        };
        let path = self.path_for(request);
        draw_plot(&path, request, x_range)?;
        Ok(Some(path))
    }
}

/// Draw both panels into `path`.
fn draw_plot(path: &Path, request: &PlotRequest, (c_min, c_max): (f64, f64)) -> Result<(), AppError> {
    let (y_lo, y_hi) = request.response_range().unwrap_or((0.0, 1.0));
    let pad = ((y_hi - y_lo) * 0.05).max(1e-3);
    let y_range = (y_lo - pad).min(0.0)..(y_hi + pad);

    let root = SVGBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;
    let panels = root.split_evenly((2, 1));

    let mut linear = ChartBuilder::on(&panels[0])
        .caption(&request.title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d(0.0..c_max * 1.05, y_range.clone())
        .map_err(plot_err)?;
    linear
        .configure_mesh()
        .x_desc(request.axis_label.as_str())
        .y_desc("normalized absorbance")
        .draw()
        .map_err(plot_err)?;
    draw_datasets(&mut linear, request, false)?;

    let mut log = ChartBuilder::on(&panels[1])
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(50)
        .build_cartesian_2d((c_min / 1.5..c_max * 1.5).log_scale(), y_range)
        .map_err(plot_err)?;
    log.configure_mesh()
        .x_desc(request.axis_label.as_str())
        .y_desc("normalized absorbance")
        .draw()
        .map_err(plot_err)?;
    draw_datasets(&mut log, request, true)?;
    log.configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .position(SeriesLabelPosition::LowerRight)
        .draw()
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

fn draw_datasets<DB, X>(
    chart: &mut ChartContext<'_, DB, Cartesian2d<X, RangedCoordf64>>,
    request: &PlotRequest,
    with_legend: bool,
) -> Result<(), AppError>
where
    DB: DrawingBackend,
    X: Ranged<ValueType = f64>,
{
    for (i, s) in request.series.iter().enumerate() {
        let color = COLORS[i % COLORS.len()];

        chart
            .draw_series(s.points.iter().map(|p| {
                ErrorBar::new_vertical(
                    p.concentration,
                    p.value - p.error,
                    p.value,
                    p.value + p.error,
                    color.filled(),
                    6,
                )
            }))
            .map_err(plot_err)?;
        chart
            .draw_series(s.points.iter().map(|p| Circle::new((p.concentration, p.value), 3, color.filled())))
            .map_err(plot_err)?;

        if s.curve.is_empty() {
            continue;
        }
        let anno = chart
            .draw_series(LineSeries::new(s.curve.iter().copied(), color.stroke_width(2)))
            .map_err(plot_err)?;
        if with_legend {
            let label = match s.ec50 {
                Some(v) => format!("{}  EC50: {v:.4} {}", s.name, request.axis_label),
                None => format!("{}  EC50: NA", s.name),
            };
            anno.label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2)));
        }
    }
    Ok(())
}

fn plot_err(e: impl std::fmt::Display) -> AppError {
    AppError::export(format!("Plot rendering failed: {e}"))
}
