//! ASCII plotting of a fitted spectrum for terminal output.
//!
//! Fixed-size character grid with deterministic output:
//! - observed continuum-normalized flux: `o`
//! - best-fit synthetic spectrum: `-` line

use crate::domain::PfsObject;
use crate::error::AppError;

/// Plot settings.
#[derive(Debug, Clone, Copy)]
pub struct PlotWindow {
    pub width: usize,
    pub height: usize,
    /// Wavelength range to show; the full spectrum when `None`.
    pub wvl_range: Option<(f64, f64)>,
}

impl Default for PlotWindow {
    fn default() -> Self {
        Self {
            width: 100,
            height: 20,
            wvl_range: None,
        }
    }
}

/// Plot observed normalized flux against the stored synthesis.
///
/// Requires a fitted record (continuum and synthesis present).
pub fn render_spectrum_plot(object: &PfsObject, window: &PlotWindow) -> Result<String, AppError> {
    let (Some(cont), Some(synth)) = (&object.continuum, &object.synth) else {
        return Err(AppError::new(
            2,
            format!("Record {} has no fit to plot.", object.id),
        ));
    };
    let spec = &object.spectrum;
    if cont.refinedcont.len() != spec.len() || synth.len() != spec.len() {
        return Err(AppError::new(
            2,
            format!("Record {} has arrays of inconsistent length.", object.id),
        ));
    }

    let in_window = |w: f64| match window.wvl_range {
        Some((lo, hi)) => w >= lo && w <= hi,
        None => true,
    };

    let mut observed = Vec::new();
    let mut model = Vec::new();
    for i in 0..spec.len() {
        let w = spec.wvl[i];
        if !in_window(w) {
            continue;
        }
        model.push((w, synth[i]));
        let c = cont.refinedcont[i];
        let f = spec.flux[i] / c;
        if spec.ivar[i] > 0.0 && c > 0.0 && f.is_finite() {
            observed.push((w, f));
        }
    }

    let Some((w_min, w_max)) = x_range(&model) else {
        return Err(AppError::new(
            3,
            "Fewer than two pixels in the plot window.",
        ));
    };
    Ok(render_plot(&observed, &model, w_min, w_max, window.width, window.height))
}

fn render_plot(
    observed: &[(f64, f64)],
    model: &[(f64, f64)],
    w_min: f64,
    w_max: f64,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let (y_min, y_max) = y_range(observed, model).unwrap_or((0.0, 1.2));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Model first so observed points overlay it.
    draw_curve(&mut grid, model, w_min, w_max, y_min, y_max);
    for &(w, f) in observed {
        let x = map_x(w, w_min, w_max, width);
        let y = map_y(f, y_min, y_max, height);
        grid[y][x] = 'o';
    }

    let mut out = String::new();
    out.push_str(&format!(
        "Plot: wvl=[{w_min:.1}, {w_max:.1}]A | flux=[{y_min:.3}, {y_max:.3}]\n"
    ));
    for row in grid {
        out.push_str(row.into_iter().collect::<String>().trim_end());
        out.push('\n');
    }
    out
}

fn x_range(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let min = points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
    let max = points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
    (min.is_finite() && max.is_finite() && max > min).then_some((min, max))
}

fn y_range(observed: &[(f64, f64)], model: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for &(_, y) in observed.iter().chain(model) {
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }
    (min_y.is_finite() && max_y.is_finite() && max_y > min_y).then_some((min_y, max_y))
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let pad = ((max - min).abs() * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(w: f64, w_min: f64, w_max: f64, width: usize) -> usize {
    let u = ((w - w_min) / (w_max - w_min)).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // Row 0 is the top.
    (height as f64 - 1.0 - u * (height as f64 - 1.0)).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], w_min: f64, w_max: f64, y_min: f64, y_max: f64) {
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(w, y) in curve {
        let x = map_x(w, w_min, w_max, width);
        let yy = map_y(y, y_min, y_max, height);
        match prev {
            Some((x0, y0)) => draw_line(grid, x0, y0, x, yy, '-'),
            None => grid[yy][x] = '-',
        }
        prev = Some((x, yy));
    }
}

/// Bresenham line between two cells, leaving occupied cells alone.
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let (mut x, mut y) = (x0 as isize, y0 as isize);
    let (x1, y1) = (x1 as isize, y1 as isize);

    let dx = (x1 - x).abs();
    let sx = if x < x1 { 1 } else { -1 };
    let dy = -(y1 - y).abs();
    let sy = if y < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if let Some(cell) = grid
            .get_mut(y as usize)
            .and_then(|row| row.get_mut(x as usize))
        {
            if *cell == ' ' {
                *cell = ch;
            }
        }
        if x == x1 && y == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Continuum, ObjectId, Photometry, Spectrum};

    fn object() -> PfsObject {
        let id = ObjectId {
            cat_id: 1,
            tract: 2,
            patch: "3,3".to_string(),
            obj_id: 4,
            visits: vec![],
        };
        let spectrum = Spectrum {
            wvl: vec![8500.0, 8501.0, 8502.0],
            flux: vec![2.0, 1.0, 2.0],
            ivar: vec![1.0, 1.0, 1.0],
        };
        let mut obj = PfsObject::new(id, spectrum, Photometry::default());
        obj.continuum = Some(Continuum {
            initcont: vec![2.0; 3],
            refinedcont: vec![2.0; 3],
        });
        obj.synth = Some(vec![1.0, 0.5, 1.0]);
        obj
    }

    #[test]
    fn plot_golden_snapshot_small() {
        let window = PlotWindow {
            width: 10,
            height: 5,
            wvl_range: None,
        };
        let txt = render_spectrum_plot(&object(), &window).unwrap();
        let expected = concat!(
            "Plot: wvl=[8500.0, 8502.0]A | flux=[0.475, 1.025]\n",
            "o        o\n",
            " -      -\n",
            "  --   -\n",
            "    - -\n",
            "     o\n",
        );
        assert_eq!(txt, expected);
    }

    #[test]
    fn unfitted_record_cannot_be_plotted() {
        let mut obj = object();
        obj.synth = None;
        assert_eq!(
            render_spectrum_plot(&obj, &PlotWindow::default()).unwrap_err().exit_code(),
            2
        );
    }

    #[test]
    fn window_narrower_than_two_pixels_is_rejected() {
        let window = PlotWindow {
            wvl_range: Some((8500.5, 8501.5)),
            ..PlotWindow::default()
        };
        assert_eq!(render_spectrum_plot(&object(), &window).unwrap_err().exit_code(), 3);
    }
}
