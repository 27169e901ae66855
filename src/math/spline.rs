//! Cubic B-spline least-squares fitting.
//!
//! Knots are placed at a uniform breakpoint spacing over the fitted range, with
//! the usual `degree + 1` repeated end knots. Basis values are computed with the
//! non-recursive Cox-de Boor recurrence.

use nalgebra::{DMatrix, DVector};

use crate::math::solve_weighted_least_squares;

const DEGREE: usize = 3;

/// A fitted cubic B-spline.
#[derive(Debug, Clone)]
pub struct BSpline {
    knots: Vec<f64>,
    coeffs: Vec<f64>,
    x_min: f64,
    x_max: f64,
}

impl BSpline {
    /// Evaluate the spline; `x` is clamped to the fitted range.
    pub fn evaluate(&self, x: f64) -> f64 {
        let x = x.clamp(self.x_min, self.x_max);
        let n_basis = self.coeffs.len();
        let span = find_span(&self.knots, n_basis, x);
        let basis = basis_at(&self.knots, span, x);
        basis
            .iter()
            .enumerate()
            .map(|(r, b)| b * self.coeffs[span - DEGREE + r])
            .sum()
    }
}

/// Weighted least-squares cubic B-spline with breakpoints every `spacing`.
///
/// Points with non-finite values or non-positive weights are ignored. Returns
/// `None` when fewer than four usable points remain or the solve fails.
pub fn fit_bspline(x: &[f64], y: &[f64], w: &[f64], spacing: f64) -> Option<BSpline> {
    let idx: Vec<usize> = (0..x.len())
        .filter(|&i| x[i].is_finite() && y[i].is_finite() && w[i].is_finite() && w[i] > 0.0)
        .collect();
    if idx.len() < DEGREE + 1 {
        return None;
    }

    let x_min = x[idx[0]];
    let x_max = x[idx[idx.len() - 1]];
    if !(x_max > x_min) {
        return None;
    }

    // Keep the basis smaller than the number of points so the system stays overdetermined.
    let spacing = if spacing.is_finite() && spacing > 0.0 {
        spacing
    } else {
        x_max - x_min
    };
    let mut n_intervals = (((x_max - x_min) / spacing).round() as usize).max(1);
    while n_intervals > 1 && n_intervals + DEGREE > idx.len() {
        n_intervals -= 1;
    }

    let knots = knot_vector(x_min, x_max, n_intervals);
    let n_basis = knots.len() - DEGREE - 1;

    let mut design = DMatrix::<f64>::zeros(idx.len(), n_basis);
    let mut rhs = DVector::<f64>::zeros(idx.len());
    let mut weights = Vec::with_capacity(idx.len());
    for (row, &i) in idx.iter().enumerate() {
        let span = find_span(&knots, n_basis, x[i]);
        let basis = basis_at(&knots, span, x[i]);
        for (r, b) in basis.iter().enumerate() {
            design[(row, span - DEGREE + r)] = *b;
        }
        rhs[row] = y[i];
        weights.push(w[i]);
    }

    let coeffs = solve_weighted_least_squares(&design, &rhs, &weights)?;
    Some(BSpline {
        knots,
        coeffs: coeffs.iter().copied().collect(),
        x_min,
        x_max,
    })
}

fn knot_vector(x_min: f64, x_max: f64, n_intervals: usize) -> Vec<f64> {
    let step = (x_max - x_min) / n_intervals as f64;
    let mut knots = vec![x_min; DEGREE + 1];
    for i in 1..n_intervals {
        knots.push(x_min + step * i as f64);
    }
    knots.extend(std::iter::repeat_n(x_max, DEGREE + 1));
    knots
}

/// Index `k` with `knots[k] <= x < knots[k + 1]`, clamped to the valid spans.
fn find_span(knots: &[f64], n_basis: usize, x: f64) -> usize {
    let k = knots.partition_point(|&t| t <= x).saturating_sub(1);
    k.clamp(DEGREE, n_basis - 1)
}

/// Non-zero basis values `N[span - DEGREE ..= span]` at `x`.
fn basis_at(knots: &[f64], span: usize, x: f64) -> [f64; DEGREE + 1] {
    let mut n = [0.0; DEGREE + 1];
    let mut left = [0.0; DEGREE + 1];
    let mut right = [0.0; DEGREE + 1];
    n[0] = 1.0;
    for j in 1..=DEGREE {
        left[j] = x - knots[span + 1 - j];
        right[j] = knots[span + j] - x;
        let mut saved = 0.0;
        for r in 0..j {
            let denom = right[r + 1] + left[j - r];
            let temp = if denom == 0.0 { 0.0 } else { n[r] / denom };
            n[r] = saved + right[r + 1] * temp;
            saved = left[j - r] * temp;
        }
        n[j] = saved;
    }
    n
}
