//! ASCII plotting for terminal output.
//!
//! This is intentionally "dumb" (fixed-size grid), optimized for:
//! - quick visual sanity checks in a terminal
//! - deterministic output (helpful for golden tests)
//!
//! The concentration axis is logarithmic. Each dataset gets its own point
//! marker (`o`, `x`, `+`, `#`) and curve character (`-`, `~`, `=`, `:`).

use super::PlotRequest;

const MARKERS: [char; 4] = ['o', 'x', '+', '#'];
const CURVE_CHARS: [char; 4] = ['-', '~', '=', ':'];

/// Render all series of a request onto one log-concentration chart.
pub fn render_ascii_plot(request: &PlotRequest, width: usize, height: usize) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some((c_min, c_max)) = request.concentration_range() else {
        return format!("Plot: {} (no data)\n", request.title);
    };
    let (x_min, x_max) = (c_min.log10(), c_max.log10());
    let (y_min, y_max) = request.response_range().unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Curves first so points overlay them.
    for (i, s) in request.series.iter().enumerate() {
        let cells: Vec<(usize, usize)> = s
            .curve
            .iter()
            .filter(|&&(c, y)| c > 0.0 && y.is_finite())
            .map(|&(c, y)| (map_x(c.log10(), x_min, x_max, width), map_y(y, y_min, y_max, height)))
            .collect();
        draw_polyline(&mut grid, &cells, CURVE_CHARS[i % CURVE_CHARS.len()]);
    }

    for (i, s) in request.series.iter().enumerate() {
        for p in s.points.iter().filter(|p| p.concentration > 0.0 && p.value.is_finite()) {
            let x = map_x(p.concentration.log10(), x_min, x_max, width);
            let y = map_y(p.value, y_min, y_max, height);
            grid[y][x] = MARKERS[i % MARKERS.len()];
        }
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: {} | {}=[{c_min:.4e}, {c_max:.4e}] (log) | normalized=[{y_min:.2}, {y_max:.2}]\n",
        request.title, request.axis_label
    ));

    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }

    for (i, s) in request.series.iter().enumerate() {
        let ec50 = match s.ec50 {
            Some(v) => format!("{v:.4} {}", request.axis_label),
            None => "NA".to_string(),
        };
        out.push_str(&format!(
            "{} {} {}  EC50: {ec50}\n",
            MARKERS[i % MARKERS.len()],
            CURVE_CHARS[i % CURVE_CHARS.len()],
            s.name
        ));
    }

    out
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, x_min: f64, x_max: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = ((x - x_min) / (x_max - x_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_polyline(grid: &mut [Vec<char>], cells: &[(usize, usize)], ch: char) {
    let mut prev = None;
    for &(x, y) in cells {
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, y, ch),
            None => {
                if grid[y][x] == ' ' {
                    grid[y][x] = ch;
                }
            }
        }
        prev = Some((x, y));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::PlotSeries;
    use crate::report::NormalizedPoint;

    fn point(concentration: f64, value: f64) -> NormalizedPoint {
        NormalizedPoint {
            concentration,
            value,
            error: 0.0,
        }
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let request = PlotRequest {
            title: "demo".to_string(),
            stem: "demo".to_string(),
            axis_label: "uM".to_string(),
            series: vec![PlotSeries {
                name: "wt".to_string(),
                ec50: Some(10.0),
                points: vec![point(1.0, 0.1), point(10.0, 0.5), point(100.0, 0.9)],
                curve: vec![(1.0, 0.1), (100.0, 0.9)],
            }],
        };

        let txt = render_ascii_plot(&request, 10, 5);
        let expected = concat!(
            "Plot: demo | uM=[1.0000e0, 1.0000e2] (log) | normalized=[0.06, 0.94]\n",
            "        -o\n",
            "      --\n",
            "    -o\n",
            "  --\n",
            "o-\n",
            "o - wt  EC50: 10.0000 uM\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn empty_request_is_not_a_panic() {
        let request = PlotRequest {
            title: "none".to_string(),
            stem: "none".to_string(),
            axis_label: "uM".to_string(),
            series: Vec::new(),
        };
        assert_eq!(render_ascii_plot(&request, 40, 10), "Plot: none (no data)\n");
    }

    #[test]
    fn each_dataset_gets_its_own_marker() {
        let series = |name: &str, v: f64| PlotSeries {
            name: name.to_string(),
            ec50: None,
            points: vec![point(1.0, v), point(100.0, v + 0.1)],
            curve: Vec::new(),
        };
        let request = PlotRequest {
            title: "t".to_string(),
            stem: "t".to_string(),
            axis_label: "uM".to_string(),
            series: vec![series("a", 0.2), series("b", 0.8)],
        };
        let txt = render_ascii_plot(&request, 20, 8);
        assert!(txt.contains('o') && txt.contains('x'));
        assert!(txt.ends_with("x ~ b  EC50: NA\n"));
    }
}
