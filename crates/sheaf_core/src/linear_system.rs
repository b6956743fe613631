//! Linear constraint systems `A x <= b` and the geometric queries the
//! reachability pipeline asks of them.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SheafError};
use crate::lp::{self, LpSolution};

/// Slack tolerated when testing membership against a half-space.
pub const FEAS_EPS: f64 = 1e-9;

/// A finite system of linear inequalities `A x <= b` over free
/// variables, interpreted as a convex polytope.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    a: DMatrix<f64>,
    b: DVector<f64>,
}

/// Largest ball inscribed in a polytope.
#[derive(Debug, Clone)]
pub struct ChebyshevCenter {
    /// Center of the inscribed ball.
    pub center: DVector<f64>,
    /// Radius of the inscribed ball. Nonpositive when the polytope has
    /// empty interior.
    pub radius: f64,
}

/// Controls the Monte-Carlo volume estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSettings {
    /// Number of bounding-box samples per estimate.
    pub samples: usize,
}

impl Default for VolumeSettings {
    fn default() -> Self {
        VolumeSettings { samples: 10_000 }
    }
}

impl LinearSystem {
    /// Creates a system from a constraint matrix and offset vector.
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
        if b.len() != a.nrows() {
            return Err(SheafError::DimensionMismatch {
                what: "constraint offsets",
                expected: a.nrows(),
                found: b.len(),
            });
        }
        if a.ncols() == 0 {
            return Err(SheafError::DimensionMismatch {
                what: "constraint matrix columns",
                expected: 1,
                found: 0,
            });
        }
        Ok(LinearSystem { a, b })
    }

    /// Internal constructor for callers that already hold the shape
    /// invariants.
    pub(crate) fn from_parts(a: DMatrix<f64>, b: DVector<f64>) -> Self {
        debug_assert_eq!(a.nrows(), b.len());
        LinearSystem { a, b }
    }

    /// Ambient dimension (number of variables).
    pub fn dim(&self) -> usize {
        self.a.ncols()
    }

    /// Number of inequality rows.
    pub fn num_rows(&self) -> usize {
        self.a.nrows()
    }

    /// Constraint matrix.
    pub fn a(&self) -> &DMatrix<f64> {
        &self.a
    }

    /// Offset vector.
    pub fn b(&self) -> &DVector<f64> {
        &self.b
    }

    /// Maximizes `objective . x` over the polytope.
    pub fn max_opt(&self, objective: &DVector<f64>) -> Result<LpSolution> {
        self.check_objective(objective)?;
        lp::maximize(objective, &self.a, &self.b)
    }

    /// Minimizes `objective . x` over the polytope.
    pub fn min_opt(&self, objective: &DVector<f64>) -> Result<LpSolution> {
        self.check_objective(objective)?;
        lp::minimize(objective, &self.a, &self.b)
    }

    /// True iff `point` satisfies every row up to [`FEAS_EPS`] slack.
    pub fn check_membership(&self, point: &DVector<f64>) -> bool {
        assert_eq!(point.len(), self.dim(), "membership point has wrong arity");
        for i in 0..self.num_rows() {
            let lhs: f64 = self.a.row(i).iter().zip(point.iter()).map(|(a, x)| a * x).sum();
            if lhs > self.b[i] + FEAS_EPS {
                return false;
            }
        }
        true
    }

    /// Center and radius of the largest inscribed ball, via the
    /// standard augmented LP maximizing the radius variable.
    pub fn chebyshev_center(&self) -> Result<ChebyshevCenter> {
        let dim = self.dim();
        let rows = self.num_rows();
        let mut aug = DMatrix::zeros(rows, dim + 1);
        for i in 0..rows {
            for j in 0..dim {
                aug[(i, j)] = self.a[(i, j)];
            }
            aug[(i, dim)] = self.a.row(i).iter().map(|v| v * v).sum::<f64>().sqrt();
        }
        let mut objective = DVector::zeros(dim + 1);
        objective[dim] = 1.0;
        let sol = lp::maximize(&objective, &aug, &self.b)?;
        Ok(ChebyshevCenter {
            center: sol.point.rows(0, dim).into_owned(),
            radius: sol.point[dim],
        })
    }

    /// Per-axis `(min, max)` bounds of the polytope.
    pub fn bounding_box(&self) -> Result<Vec<(f64, f64)>> {
        let dim = self.dim();
        let mut bounds = Vec::with_capacity(dim);
        for axis in 0..dim {
            let mut e = DVector::zeros(dim);
            e[axis] = 1.0;
            let lo = self.min_opt(&e)?.value;
            let hi = self.max_opt(&e)?.value;
            bounds.push((lo, hi));
        }
        Ok(bounds)
    }

    /// Monte-Carlo volume estimate: the axis-aligned bounding-box
    /// volume scaled by the hit ratio of uniform box samples.
    pub fn volume(&self, settings: &VolumeSettings, rng: &mut StdRng) -> Result<f64> {
        let bounds = self.bounding_box()?;
        let box_volume: f64 = bounds.iter().map(|(lo, hi)| (hi - lo).max(0.0)).product();
        if box_volume == 0.0 || settings.samples == 0 {
            return Ok(0.0);
        }
        let mut hits = 0usize;
        for _ in 0..settings.samples {
            let point = sample_box_point(&bounds, rng);
            if self.check_membership(&point) {
                hits += 1;
            }
        }
        Ok(box_volume * hits as f64 / settings.samples as f64)
    }

    /// Samples `count` points uniformly from the axis-aligned box of
    /// half-width `radius * shrink` around the Chebyshev center.
    ///
    /// The box is not clipped against the polytope, so for thin regions
    /// a sample may fall slightly outside it.
    pub fn sample_chebyshev_box(
        &self,
        count: usize,
        shrink: f64,
        rng: &mut StdRng,
    ) -> Result<Vec<DVector<f64>>> {
        let cheb = self.chebyshev_center()?;
        let half_width = (cheb.radius * shrink).max(0.0);
        let bounds: Vec<(f64, f64)> = cheb
            .center
            .iter()
            .map(|&c| (c - half_width, c + half_width))
            .collect();
        Ok((0..count).map(|_| sample_box_point(&bounds, rng)).collect())
    }

    fn check_objective(&self, objective: &DVector<f64>) -> Result<()> {
        if objective.len() != self.dim() {
            return Err(SheafError::DimensionMismatch {
                what: "lp objective",
                expected: self.dim(),
                found: objective.len(),
            });
        }
        Ok(())
    }
}

fn sample_box_point(bounds: &[(f64, f64)], rng: &mut StdRng) -> DVector<f64> {
    DVector::from_iterator(
        bounds.len(),
        bounds.iter().map(|&(lo, hi)| lo + (hi - lo) * rng.gen::<f64>()),
    )
}
