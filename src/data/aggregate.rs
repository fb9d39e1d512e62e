//! Replicate aggregation: raw plate grid → per-concentration summary series.
//!
//! Concentrations are never read from the file. They are generated from the
//! dilution series and matched to grid steps by position.

use tracing::debug;

use crate::domain::{
    ConcentrationSeries, DilutionOrder, DilutionSeries, Orientation, RawGrid, ReplicateLayout, SeriesPoint,
};
use crate::error::AppError;
use crate::math::mean_and_population_std;

/// Concentration of every dilution step, in grid order.
///
/// Descending: `top, top/f, top/f^2, …, top/f^(samples-1)`.
pub fn concentrations(dilution: &DilutionSeries) -> Result<Vec<f64>, AppError> {
    dilution.validate()?;

    let mut out: Vec<f64> = (0..dilution.samples)
        .map(|i| dilution.top / dilution.factor.powi(i as i32))
        .collect();
    if dilution.order == DilutionOrder::Ascending {
        out.reverse();
    }
    Ok(out)
}

/// Aggregate the grid into one series per replicate group.
///
/// `names` supplies the dataset name of each group, in group order.
pub fn aggregate(
    grid: &RawGrid,
    layout: &ReplicateLayout,
    dilution: &DilutionSeries,
    names: &[String],
) -> Result<Vec<ConcentrationSeries>, AppError> {
    layout.validate()?;
    if names.len() != layout.group_count() {
        return Err(AppError::config(format!(
            "Layout has {} replicate groups but {} dataset names were given.",
            layout.group_count(),
            names.len()
        )));
    }

    let conc = concentrations(dilution)?;
    let steps = match layout.orientation {
        Orientation::Rows => grid.clone(),
        Orientation::Columns => grid.transpose(),
    };
    check_shape(&steps, layout, dilution.samples)?;

    if steps.n_rows() > dilution.samples {
        debug!(
            available = steps.n_rows(),
            used = dilution.samples,
            "ignoring dilution steps beyond the sample count"
        );
    }

    let mut series: Vec<ConcentrationSeries> = names
        .iter()
        .map(|name| ConcentrationSeries {
            name: name.clone(),
            points: Vec::with_capacity(dilution.samples),
        })
        .collect();

    let mut wells = Vec::new();
    for (step, &concentration) in conc.iter().enumerate() {
        let row = steps.row(step);
        for (group, out) in layout.groups.iter().zip(series.iter_mut()) {
            wells.clear();
            wells.extend(group.iter().map(|&idx| row[idx]));
            let Some((mean, std_dev)) = mean_and_population_std(&wells) else {
                return Err(AppError::config(format!("Replicate group of '{}' has no wells.", out.name)));
            };
            out.points.push(SeriesPoint {
                concentration,
                mean,
                std_dev,
            });
        }
    }

    Ok(series)
}

fn check_shape(steps: &RawGrid, layout: &ReplicateLayout, samples: usize) -> Result<(), AppError> {
    let (step_axis, replicate_axis) = match layout.orientation {
        Orientation::Rows => ("rows", "columns"),
        Orientation::Columns => ("columns", "rows"),
    };
    if steps.n_rows() < samples {
        return Err(AppError::shape(format!(
            "Grid has {} {step_axis} but {samples} dilution steps were requested.",
            steps.n_rows()
        )));
    }
    let needed = layout.replicate_extent();
    if steps.n_cols() < needed {
        return Err(AppError::shape(format!(
            "Grid has {} {replicate_axis} but the replicate layout needs {needed}.",
            steps.n_cols()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use approx::assert_relative_eq;

    fn dilution(samples: usize) -> DilutionSeries {
        DilutionSeries {
            top: 3.0,
            factor: 3.0,
            samples,
            order: DilutionOrder::Descending,
        }
    }

    fn names(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("ds{i}")).collect()
    }

    fn grid(rows: usize, cols: usize, f: impl Fn(usize, usize) -> f64) -> RawGrid {
        RawGrid::new((0..rows).map(|r| (0..cols).map(|c| f(r, c)).collect()).collect()).unwrap()
    }

    #[test]
    fn default_dilution_scenario() {
        let conc = concentrations(&dilution(8)).unwrap();
        let expected = [
            3.0,
            1.0,
            1.0 / 3.0,
            1.0 / 9.0,
            1.0 / 27.0,
            1.0 / 81.0,
            1.0 / 243.0,
            1.0 / 729.0,
        ];
        assert_eq!(conc.len(), 8);
        for (a, b) in conc.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, max_relative = 1e-12);
        }
    }

    #[test]
    fn concentrations_are_monotonic_with_exact_extremes() {
        for (top, factor, samples) in [(3.0, 3.0, 8), (10.0, 2.0, 12), (0.5, 1.5, 3), (1.0, 10.0, 1)] {
            let d = DilutionSeries {
                top,
                factor,
                samples,
                order: DilutionOrder::Descending,
            };
            let conc = concentrations(&d).unwrap();
            assert_eq!(conc.len(), samples);
            assert_eq!(conc[0], top);
            assert_relative_eq!(conc[samples - 1], d.bottom(), max_relative = 1e-12);
            assert!(conc.windows(2).all(|w| w[1] < w[0]));

            let asc = concentrations(&DilutionSeries {
                order: DilutionOrder::Ascending,
                ..d
            })
            .unwrap();
            assert!(asc.windows(2).all(|w| w[1] > w[0]));
            assert_eq!(asc[samples - 1], top);
        }
    }

    #[test]
    fn invalid_dilution_is_rejected() {
        let mut d = dilution(8);
        d.factor = 0.5;
        assert_eq!(concentrations(&d).unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn constant_group_has_exact_mean_and_zero_std() {
        let g = grid(8, 12, |r, c| if c < 3 { 0.5 } else { (r * 12 + c) as f64 * 0.01 });
        let series = aggregate(&g, &ReplicateLayout::four_by_three(), &dilution(8), &names(4)).unwrap();

        assert_eq!(series.len(), 4);
        assert_eq!(series[0].len(), 8);
        for p in &series[0].points {
            assert_eq!(p.mean, 0.5);
            assert_eq!(p.std_dev, 0.0);
        }
    }

    #[test]
    fn four_by_three_groups_consecutive_columns() {
        let g = grid(8, 12, |r, c| (r * 100 + c) as f64);
        let series = aggregate(&g, &ReplicateLayout::four_by_three(), &dilution(8), &names(4)).unwrap();

        // Row 2, group 3 = columns 9, 10, 11 → mean 210.
        assert_relative_eq!(series[3].points[2].mean, 210.0);
        assert_relative_eq!(series[3].points[2].std_dev, (2.0_f64 / 3.0).sqrt(), max_relative = 1e-12);
        assert_relative_eq!(series[1].points[0].concentration, 3.0);
    }

    #[test]
    fn two_by_four_transposes_before_grouping() {
        // 8 plate rows × 12 columns; dilution runs across columns.
        let g = grid(8, 12, |r, c| (c * 10 + r) as f64);
        let series = aggregate(&g, &ReplicateLayout::two_by_four(), &dilution(8), &names(2)).unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].len(), 8);
        // Step 5 = column 5; group 0 = plate rows 0..4 → 50,51,52,53.
        assert_relative_eq!(series[0].points[5].mean, 51.5);
        // group 1 = plate rows 4..8 → 54..57.
        assert_relative_eq!(series[1].points[5].mean, 55.5);
    }

    #[test]
    fn too_few_rows_is_a_shape_mismatch() {
        let g = grid(6, 12, |_, _| 1.0);
        let err = aggregate(&g, &ReplicateLayout::four_by_three(), &dilution(8), &names(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn too_few_columns_is_a_shape_mismatch() {
        let g = grid(8, 11, |_, _| 1.0);
        let err = aggregate(&g, &ReplicateLayout::four_by_three(), &dilution(8), &names(4)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);

        // Two-by-four needs 8 plate rows.
        let g = grid(7, 12, |_, _| 1.0);
        let err = aggregate(&g, &ReplicateLayout::two_by_four(), &dilution(8), &names(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ShapeMismatch);
    }

    #[test]
    fn name_count_must_match_groups() {
        let g = grid(8, 12, |_, _| 1.0);
        let err = aggregate(&g, &ReplicateLayout::four_by_three(), &dilution(8), &names(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn empty_replicate_group_is_a_config_error() {
        let g = grid(8, 12, |_, _| 1.0);
        let layout = ReplicateLayout {
            orientation: Orientation::Rows,
            groups: vec![vec![0, 1, 2], Vec::new()],
        };
        let err = aggregate(&g, &layout, &dilution(8), &names(2)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Config);
    }

    #[test]
    fn aggregation_is_idempotent() {
        let g = grid(8, 12, |r, c| ((r + 1) as f64).ln() * 0.37 + c as f64 * 0.013);
        let layout = ReplicateLayout::four_by_three();
        let a = aggregate(&g, &layout, &dilution(8), &names(4)).unwrap();
        let b = aggregate(&g, &layout, &dilution(8), &names(4)).unwrap();
        assert_eq!(a, b);
    }
}
