//! Grid axes and node bracketing.

use serde::{Deserialize, Serialize};

use crate::domain::{Atmosphere, Param};
use crate::error::AppError;

/// Node position in `(teff, logg, feh, alphafe)` order.
pub type NodeIndex = [usize; 4];

/// Sorted node values along each grid dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridAxes {
    pub teff: Vec<f64>,
    pub logg: Vec<f64>,
    pub feh: Vec<f64>,
    pub alphafe: Vec<f64>,
}

/// The two nodes surrounding a value and the weight of the upper one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bracket {
    pub lo: usize,
    pub hi: usize,
    pub frac: f64,
}

impl GridAxes {
    pub fn axis(&self, param: Param) -> &[f64] {
        match param {
            Param::Teff => &self.teff,
            Param::Logg => &self.logg,
            Param::FeH => &self.feh,
            Param::AlphaFe => &self.alphafe,
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        for param in Param::ALL {
            let nodes = self.axis(param);
            if nodes.is_empty() {
                return Err(AppError::new(
                    2,
                    format!("Grid axis {} has no nodes.", param.display_name()),
                ));
            }
            if nodes.iter().any(|v| !v.is_finite()) || nodes.windows(2).any(|w| w[1] <= w[0]) {
                return Err(AppError::new(
                    2,
                    format!(
                        "Grid axis {} must be finite and strictly increasing.",
                        param.display_name()
                    ),
                ));
            }
        }
        Ok(())
    }

    /// `(min, max)` node values along a dimension.
    pub fn extent(&self, param: Param) -> (f64, f64) {
        let nodes = self.axis(param);
        match (nodes.first(), nodes.last()) {
            (Some(&lo), Some(&hi)) => (lo, hi),
            _ => (f64::NAN, f64::NAN),
        }
    }

    /// Node count along each dimension.
    pub fn shape(&self) -> [usize; 4] {
        Param::ALL.map(|p| self.axis(p).len())
    }

    pub fn n_nodes(&self) -> usize {
        self.shape().iter().product()
    }

    pub fn node(&self, idx: NodeIndex) -> Atmosphere {
        Atmosphere::new(
            self.teff[idx[0]],
            self.logg[idx[1]],
            self.feh[idx[2]],
            self.alphafe[idx[3]],
        )
    }

    /// All node indices, last dimension varying fastest.
    pub fn node_indices(&self) -> Vec<NodeIndex> {
        let mut out = Vec::with_capacity(self.n_nodes());
        for i in 0..self.teff.len() {
            for j in 0..self.logg.len() {
                for k in 0..self.feh.len() {
                    for l in 0..self.alphafe.len() {
                        out.push([i, j, k, l]);
                    }
                }
            }
        }
        out
    }

    pub fn brackets(&self, atm: &Atmosphere) -> [Bracket; 4] {
        Param::ALL.map(|p| bracket(self.axis(p), atm.get(p)))
    }
}

/// Locate `x` among sorted `nodes`; values outside are clamped to the edge node.
pub fn bracket(nodes: &[f64], x: f64) -> Bracket {
    let n = nodes.len();
    if n <= 1 || x <= nodes[0] {
        return Bracket { lo: 0, hi: 0, frac: 0.0 };
    }
    if x >= nodes[n - 1] {
        return Bracket {
            lo: n - 1,
            hi: n - 1,
            frac: 0.0,
        };
    }
    let hi = nodes.partition_point(|&v| v <= x);
    let lo = hi - 1;
    let frac = (x - nodes[lo]) / (nodes[hi] - nodes[lo]);
    Bracket { lo, hi, frac }
}

/// Evenly spaced nodes from `lo` to `hi` inclusive.
pub fn linspace_nodes(lo: f64, hi: f64, step: f64) -> Vec<f64> {
    if !(step > 0.0) || hi < lo {
        return vec![lo];
    }
    let n = ((hi - lo) / step).round() as usize + 1;
    (0..n).map(|i| lo + step * i as f64).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bracket_interior_and_edges() {
        let nodes = [4000.0, 4500.0, 5000.0];
        let b = bracket(&nodes, 4600.0);
        assert_eq!((b.lo, b.hi), (1, 2));
        assert!((b.frac - 0.2).abs() < 1e-12);

        assert_eq!(bracket(&nodes, 3000.0), Bracket { lo: 0, hi: 0, frac: 0.0 });
        assert_eq!(bracket(&nodes, 9000.0), Bracket { lo: 2, hi: 2, frac: 0.0 });
    }

    #[test]
    fn bracket_on_node_has_zero_upper_weight() {
        let b = bracket(&[0.0, 0.5, 1.0], 0.5);
        assert_eq!(b.lo, 1);
        assert_eq!(b.frac, 0.0);
    }

    #[test]
    fn validate_rejects_unsorted_axis() {
        let axes = GridAxes {
            teff: vec![4000.0, 3900.0],
            logg: vec![1.0],
            feh: vec![-1.0],
            alphafe: vec![0.0],
        };
        assert_eq!(axes.validate().unwrap_err().exit_code(), 2);
    }

    #[test]
    fn linspace_includes_endpoints() {
        let v = linspace_nodes(-0.8, 1.2, 0.1);
        assert_eq!(v.len(), 21);
        assert!((v[20] - 1.2).abs() < 1e-9);
    }
}
