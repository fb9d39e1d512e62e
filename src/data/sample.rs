//! Synthetic plate exports.
//!
//! Produces text shaped like the plate reader export (`RegionDescriptor::legacy`):
//! ten header lines, eight data lines each starting with a row label, and a few
//! footer lines. Readings come from the Hill model plus seeded Gaussian noise, so
//! the same spec always produces the same file.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::data::aggregate::concentrations;
use crate::domain::{DilutionSeries, ModelParameters, Orientation, ReplicateLayout};
use crate::error::AppError;
use crate::models::response;

const PLATE_ROWS: usize = 8;
const PLATE_COLS: usize = 12;
const HEADER_LINES: usize = 10;
const ROW_LABELS: [&str; PLATE_ROWS] = ["A", "B", "C", "D", "E", "F", "G", "H"];

/// What to put on the synthetic plate.
#[derive(Debug, Clone)]
pub struct PlateSpec {
    pub dilution: DilutionSeries,
    pub layout: ReplicateLayout,
    /// True parameters, one per replicate group.
    pub groups: Vec<ModelParameters>,
    /// Absorbance of wells that hold no sample.
    pub blank: f64,
    /// Standard deviation of the additive Gaussian noise.
    pub noise_sd: f64,
    pub seed: u64,
}

/// Fill an 8 × 12 plate according to the layout.
pub fn simulate_grid(spec: &PlateSpec) -> Result<Vec<Vec<f64>>, AppError> {
    spec.layout.validate()?;
    if spec.groups.len() != spec.layout.group_count() {
        return Err(AppError::config(format!(
            "Layout has {} groups but {} parameter sets were given.",
            spec.layout.group_count(),
            spec.groups.len()
        )));
    }
    if !(spec.noise_sd.is_finite() && spec.noise_sd >= 0.0) {
        return Err(AppError::config("Noise standard deviation must be >= 0."));
    }

    let conc = concentrations(&spec.dilution)?;
    let (step_limit, replicate_limit) = match spec.layout.orientation {
        Orientation::Rows => (PLATE_ROWS, PLATE_COLS),
        Orientation::Columns => (PLATE_COLS, PLATE_ROWS),
    };
    if conc.len() > step_limit || spec.layout.replicate_extent() > replicate_limit {
        return Err(AppError::shape(format!(
            "{} dilution steps with this layout do not fit on an {PLATE_ROWS}x{PLATE_COLS} plate.",
            conc.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);
    let normal = Normal::new(0.0, spec.noise_sd)
        .map_err(|e| AppError::config(format!("Noise distribution error: {e}")))?;

    let mut plate = vec![vec![spec.blank; PLATE_COLS]; PLATE_ROWS];
    for (step, &c) in conc.iter().enumerate() {
        for (group, params) in spec.layout.groups.iter().zip(spec.groups.iter()) {
            let expected = response(params, c);
            for &well in group {
                let value = expected + normal.sample(&mut rng);
                let (r, col) = match spec.layout.orientation {
                    Orientation::Rows => (step, well),
                    Orientation::Columns => (well, step),
                };
                plate[r][col] = value;
            }
        }
    }

    Ok(plate)
}

/// Render a full raw export (header, labelled data rows, footer).
pub fn simulate_plate(spec: &PlateSpec) -> Result<String, AppError> {
    let plate = simulate_grid(spec)?;

    let mut out = String::new();
    out.push_str("##BLOCKS= 1\n");
    out.push_str("Plate:\tPlate1\t1.3\tPlateFormat\tEndpoint\tAbsorbance\tRaw\n");
    for i in 2..HEADER_LINES {
        out.push_str(&format!("~header line {i}\n"));
    }
    for (label, row) in ROW_LABELS.iter().zip(plate.iter()) {
        out.push_str(label);
        for v in row {
            out.push_str(&format!("\t{v:.4}"));
        }
        out.push('\n');
    }
    out.push('\n');
    out.push_str("~End\n");
    out.push_str(&format!("Synthetic plate, seed {}\n", spec.seed));

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{DilutionOrder, RegionDescriptor};
    use crate::io::ingest::parse_region;

    fn spec(noise_sd: f64) -> PlateSpec {
        PlateSpec {
            dilution: DilutionSeries {
                top: 3.0,
                factor: 3.0,
                samples: 8,
                order: DilutionOrder::Descending,
            },
            layout: ReplicateLayout::four_by_three(),
            groups: [0.02, 0.1, 0.3, 1.0]
                .iter()
                .map(|&ec50| ModelParameters {
                    max_response: 1.8,
                    hill: 1.0,
                    ec50,
                })
                .collect(),
            blank: 0.04,
            noise_sd,
            seed: 7,
        }
    }

    #[test]
    fn same_seed_same_plate() {
        assert_eq!(simulate_plate(&spec(0.01)).unwrap(), simulate_plate(&spec(0.01)).unwrap());
    }

    #[test]
    fn export_parses_with_legacy_region() {
        let text = simulate_plate(&spec(0.0)).unwrap();
        let grid = parse_region(&text, &RegionDescriptor::legacy()).unwrap();
        assert_eq!(grid.n_rows(), 8);
        assert_eq!(grid.n_cols(), 12);
        // Row A, group 1 at the top concentration: 1.8 * 3 / (3 + 0.02).
        assert!((grid.get(0, 0) - 1.8 * 3.0 / 3.02).abs() < 1e-4);
    }

    #[test]
    fn group_count_must_match_layout() {
        let mut s = spec(0.0);
        s.groups.pop();
        assert!(simulate_grid(&s).is_err());
    }
}
