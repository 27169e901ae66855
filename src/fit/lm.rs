//! Bounded Levenberg-Marquardt least squares.
//!
//! Minimizes `Σ ((y_i - f_i(p)) / σ_i)^2` over a box. Steps are projected onto
//! the box; the Jacobian is a forward difference, taken backward when the
//! forward step would leave the box. The model is an arbitrary fallible
//! closure so grid read failures surface as errors instead of bad fits.

use nalgebra::{DMatrix, DVector};
use rayon::prelude::*;

use crate::error::AppError;
use crate::math::solve_least_squares;

/// Stopping rules for `levenberg_marquardt`.
#[derive(Debug, Clone, Copy)]
pub struct LmOptions {
    pub max_iter: usize,
    /// Relative chi-squared decrease.
    pub ftol: f64,
    /// Relative parameter step.
    pub xtol: f64,
    /// Largest gradient component.
    pub gtol: f64,
}

impl Default for LmOptions {
    fn default() -> Self {
        Self {
            max_iter: 100,
            ftol: 1e-10,
            xtol: 1e-10,
            gtol: 1e-10,
        }
    }
}

/// Box bounds and finite-difference steps per parameter.
#[derive(Debug, Clone)]
pub struct LmBounds {
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub steps: Vec<f64>,
}

impl LmBounds {
    fn clamp(&self, p: &mut [f64]) {
        for ((v, &lo), &hi) in p.iter_mut().zip(&self.lower).zip(&self.upper) {
            *v = v.clamp(lo, hi);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LmFit {
    pub params: Vec<f64>,
    /// Pseudo-inverse of `J^T J` at the solution.
    pub covariance: DMatrix<f64>,
    pub chi2: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl LmFit {
    /// 1-sigma error of parameter `i`, if the covariance is usable.
    pub fn error(&self, i: usize) -> Option<f64> {
        let var = self.covariance[(i, i)];
        (var.is_finite() && var >= 0.0).then(|| var.sqrt())
    }
}

const LAMBDA_START: f64 = 1e-3;
const LAMBDA_MAX: f64 = 1e10;

pub fn levenberg_marquardt<F>(
    model: F,
    y: &[f64],
    sigma: &[f64],
    p0: &[f64],
    bounds: &LmBounds,
    opts: &LmOptions,
) -> Result<LmFit, AppError>
where
    F: Fn(&[f64]) -> Result<Vec<f64>, AppError> + Sync,
{
    let np = p0.len();
    if np == 0 || bounds.lower.len() != np || bounds.upper.len() != np || bounds.steps.len() != np
    {
        return Err(AppError::new(4, "Inconsistent parameter and bound sizes."));
    }
    if y.len() != sigma.len() || y.len() < np {
        return Err(AppError::new(
            3,
            format!("Need at least {np} data points to fit, got {}.", y.len()),
        ));
    }

    let mut p = p0.to_vec();
    bounds.clamp(&mut p);

    let mut resid = residuals(&model(&p)?, y, sigma)?;
    let mut chi2 = dot(&resid);
    let mut lambda = LAMBDA_START;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < opts.max_iter && !converged {
        iterations += 1;

        let jac = jacobian(&model, &p, sigma, bounds)?;
        let a = jac.transpose() * &jac;
        let g = jac.transpose() * DVector::from_column_slice(&resid);
        if g.amax() < opts.gtol {
            converged = true;
            break;
        }

        let mut accepted = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = a.clone();
            for k in 0..np {
                let d = a[(k, k)];
                damped[(k, k)] += lambda * if d > 0.0 { d } else { 1.0 };
            }
            let Some(delta) = solve_least_squares(&damped, &g) else {
                lambda *= 10.0;
                continue;
            };

            let mut trial: Vec<f64> = p.iter().zip(delta.iter()).map(|(a, b)| a + b).collect();
            bounds.clamp(&mut trial);
            let step: f64 = trial
                .iter()
                .zip(&p)
                .map(|(a, b)| (a - b).powi(2))
                .sum::<f64>()
                .sqrt();
            let norm: f64 = p.iter().map(|v| v * v).sum::<f64>().sqrt();
            if step <= opts.xtol * (norm + opts.xtol) {
                converged = true;
                break;
            }

            let trial_resid = residuals(&model(&trial)?, y, sigma)?;
            let trial_chi2 = dot(&trial_resid);
            if trial_chi2 < chi2 {
                let rel = (chi2 - trial_chi2) / chi2.max(f64::MIN_POSITIVE);
                p = trial;
                resid = trial_resid;
                chi2 = trial_chi2;
                lambda = (lambda / 10.0).max(1e-12);
                accepted = true;
                if rel < opts.ftol {
                    converged = true;
                }
                break;
            }
            lambda *= 10.0;
        }

        if !accepted && !converged {
            // No downhill step at any damping: already at the (bounded) minimum.
            converged = true;
        }
    }

    if p.iter().any(|v| !v.is_finite()) || !chi2.is_finite() {
        return Err(AppError::new(4, "Fit produced non-finite parameters."));
    }

    let jac = jacobian(&model, &p, sigma, bounds)?;
    let covariance = (jac.transpose() * &jac)
        .pseudo_inverse(1e-12)
        .map_err(|e| AppError::new(4, format!("Covariance inversion failed: {e}")))?;

    Ok(LmFit {
        params: p,
        covariance,
        chi2,
        iterations,
        converged,
    })
}

fn residuals(model: &[f64], y: &[f64], sigma: &[f64]) -> Result<Vec<f64>, AppError> {
    if model.len() != y.len() {
        return Err(AppError::new(
            4,
            format!("Model returned {} values for {} data points.", model.len(), y.len()),
        ));
    }
    Ok(model
        .iter()
        .zip(y)
        .zip(sigma)
        .map(|((m, y), s)| (y - m) / s)
        .collect())
}

fn dot(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum()
}

/// Weighted Jacobian `d f_i / d p_j / σ_i`, one column per rayon task.
fn jacobian<F>(
    model: &F,
    p: &[f64],
    sigma: &[f64],
    bounds: &LmBounds,
) -> Result<DMatrix<f64>, AppError>
where
    F: Fn(&[f64]) -> Result<Vec<f64>, AppError> + Sync,
{
    let base = model(p)?;
    let columns: Vec<Vec<f64>> = (0..p.len())
        .into_par_iter()
        .map(|j| -> Result<Vec<f64>, AppError> {
            let mut h = bounds.steps[j];
            if p[j] + h > bounds.upper[j] {
                h = -h;
            }
            let mut shifted = p.to_vec();
            shifted[j] += h;
            let f = model(&shifted)?;
            Ok(f.iter()
                .zip(&base)
                .zip(sigma)
                .map(|((a, b), s)| (a - b) / h / s)
                .collect())
        })
        .collect::<Result<_, AppError>>()?;

    Ok(DMatrix::from_fn(base.len(), p.len(), |i, j| columns[j][i]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gaussian(x: &[f64], p: &[f64]) -> Vec<f64> {
        x.iter()
            .map(|&v| 1.0 - p[0] * (-0.5 * ((v - p[1]) / 0.8).powi(2)).exp())
            .collect()
    }

    #[test]
    fn recovers_line_depth_and_center() {
        let x: Vec<f64> = (0..200).map(|i| 8530.0 + 0.1 * i as f64).collect();
        let truth = [0.45, 8541.3];
        let y = gaussian(&x, &truth);
        let sigma = vec![0.01; x.len()];
        let bounds = LmBounds {
            lower: vec![0.0, 8535.0],
            upper: vec![1.0, 8545.0],
            steps: vec![1e-4, 1e-4],
        };
        let fit = levenberg_marquardt(
            |p| Ok(gaussian(&x, p)),
            &y,
            &sigma,
            &[0.3, 8540.5],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap();
        assert!((fit.params[0] - 0.45).abs() < 1e-5);
        assert!((fit.params[1] - 8541.3).abs() < 1e-4);
        assert!(fit.error(0).unwrap() > 0.0);
    }

    #[test]
    fn solution_respects_bounds() {
        let x: Vec<f64> = (0..50).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 * v).collect();
        let bounds = LmBounds {
            lower: vec![0.0],
            upper: vec![2.0],
            steps: vec![1e-3],
        };
        let fit = levenberg_marquardt(
            |p| Ok(x.iter().map(|v| p[0] * v).collect()),
            &y,
            &vec![1.0; 50],
            &[1.0],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap();
        assert_eq!(fit.params[0], 2.0);
        assert!(fit.converged);
    }

    #[test]
    fn linear_model_error_matches_analytic() {
        // y = a x with unit sigma: var(a) = 1 / Σ x^2.
        let x: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 0.5 * v).collect();
        let bounds = LmBounds {
            lower: vec![-10.0],
            upper: vec![10.0],
            steps: vec![1e-3],
        };
        let fit = levenberg_marquardt(
            |p| Ok(x.iter().map(|v| p[0] * v).collect()),
            &y,
            &vec![1.0; 10],
            &[0.0],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap();
        let sxx: f64 = x.iter().map(|v| v * v).sum();
        assert!((fit.params[0] - 0.5).abs() < 1e-8);
        assert!((fit.error(0).unwrap() - (1.0 / sxx).sqrt()).abs() < 1e-8);
    }

    #[test]
    fn model_errors_propagate() {
        let bounds = LmBounds {
            lower: vec![0.0],
            upper: vec![1.0],
            steps: vec![1e-3],
        };
        let err = levenberg_marquardt(
            |_| Err(AppError::new(4, "grid read failed")),
            &[1.0, 2.0],
            &[1.0, 1.0],
            &[0.5],
            &bounds,
            &LmOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.message(), "grid read failed");
    }
}
