//! Coarse starting-point scan over grid nodes.
//!
//! Each candidate is scored independently (in parallel) and the lowest
//! chi-squared wins; ties go to the earlier candidate so the choice does not
//! depend on thread scheduling.

use rayon::prelude::*;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct SeedCandidate {
    pub idx: usize,
    pub params: Vec<f64>,
    pub chi2: f64,
}

/// Cartesian product of per-parameter node lists, first list varying slowest.
pub fn candidate_grid(axes: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let mut out: Vec<Vec<f64>> = vec![Vec::new()];
    for nodes in axes {
        out = out
            .iter()
            .flat_map(|prefix| {
                nodes.iter().map(move |&v| {
                    let mut next = prefix.clone();
                    next.push(v);
                    next
                })
            })
            .collect();
    }
    out
}

/// Score every candidate with `chi2` and return the best one.
///
/// Candidates whose score is `None` or non-finite are dropped; errors from
/// `chi2` abort the scan.
pub fn best_seed<F>(candidates: &[Vec<f64>], chi2: F) -> Result<SeedCandidate, AppError>
where
    F: Fn(&[f64]) -> Result<Option<f64>, AppError> + Sync,
{
    if candidates.is_empty() {
        return Err(AppError::new(4, "Seed grid is empty."));
    }

    let scored: Vec<SeedCandidate> = candidates
        .par_iter()
        .enumerate()
        .map(|(idx, params)| -> Result<Option<SeedCandidate>, AppError> {
            Ok(chi2(params)?.filter(|c| c.is_finite()).map(|chi2| SeedCandidate {
                idx,
                params: params.clone(),
                chi2,
            }))
        })
        .collect::<Result<Vec<Option<SeedCandidate>>, AppError>>()?
        .into_iter()
        .flatten()
        .collect();

    if scored.is_empty() {
        return Err(AppError::new(4, "No seed candidate produced a finite chi-squared."));
    }

    let mut best = &scored[0];
    for c in &scored[1..] {
        if c.chi2 < best.chi2 || (c.chi2 == best.chi2 && c.idx < best.idx) {
            best = c;
        }
    }
    Ok(best.clone())
}
