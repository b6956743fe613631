//! Parallelotopes in half-space form and their generator representation.
//!
//! A parallelotope in `R^d` is described by `2 d` half-spaces: `d` upper
//! rows `u_i . x <= b_i` and their mirrored lower rows
//! `-u_i . x <= b_{d+i}`. Solving the upper system yields the base
//! vertex; flipping one offset at a time yields the generators. The
//! affine map `q + sum_i a_i g_i` over `a in [0, 1]^d` then parametrizes
//! the parallelotope, which is how polynomial dynamics get restricted to
//! it before bounding.

use nalgebra::{DMatrix, DVector};
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::{Result, SheafError};
use crate::linear_system::LinearSystem;
use crate::poly::Poly;

/// Tolerance for the lower rows mirroring the upper rows.
const MIRROR_EPS: f64 = 1e-9;

/// A parallelotope described by `2 d` paired half-spaces.
#[derive(Debug, Clone)]
pub struct Parallelotope {
    sys: LinearSystem,
}

impl Parallelotope {
    /// Creates a parallelotope from `2 d` half-space rows where row
    /// `d + i` must be the negation of row `i`.
    pub fn from_halfspaces(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self> {
        let dim = a.ncols();
        if dim == 0 {
            return Err(SheafError::DimensionMismatch {
                what: "parallelotope dimension",
                expected: 1,
                found: 0,
            });
        }
        if a.nrows() != 2 * dim {
            return Err(SheafError::DimensionMismatch {
                what: "parallelotope rows",
                expected: 2 * dim,
                found: a.nrows(),
            });
        }
        if b.len() != a.nrows() {
            return Err(SheafError::DimensionMismatch {
                what: "parallelotope offsets",
                expected: a.nrows(),
                found: b.len(),
            });
        }
        for i in 0..dim {
            for j in 0..dim {
                if (a[(i, j)] + a[(dim + i, j)]).abs() > MIRROR_EPS {
                    return Err(SheafError::structural(format!(
                        "half-space row {} is not the negation of row {i}",
                        dim + i
                    )));
                }
            }
        }
        Ok(Parallelotope {
            sys: LinearSystem::from_parts(a, b),
        })
    }

    /// Ambient dimension.
    pub fn dim(&self) -> usize {
        self.sys.dim()
    }

    /// The half-space system of the parallelotope.
    pub fn linear_system(&self) -> &LinearSystem {
        &self.sys
    }

    /// The vertex at which every upper half-space is tight.
    pub fn base_vertex(&self) -> Result<DVector<f64>> {
        self.generators().map(|(base, _)| base)
    }

    /// Base vertex and the `d` edge generators emanating from it.
    ///
    /// Generator `i` connects the base vertex to the vertex where the
    /// `i`-th upper constraint is replaced by its tight lower mirror.
    pub fn generators(&self) -> Result<(DVector<f64>, Vec<DVector<f64>>)> {
        let dim = self.dim();
        let upper_a = self.sys.a().rows(0, dim).into_owned();
        let upper_b = self.sys.b().rows(0, dim).into_owned();
        let lu = upper_a.lu();
        let base = lu
            .solve(&upper_b)
            .ok_or_else(|| SheafError::singular("parallelotope axes are linearly dependent"))?;
        let mut generators = Vec::with_capacity(dim);
        for i in 0..dim {
            let mut rhs = upper_b.clone();
            rhs[i] = -self.sys.b()[dim + i];
            let vertex = lu
                .solve(&rhs)
                .ok_or_else(|| SheafError::singular("parallelotope axes are linearly dependent"))?;
            generators.push(vertex - &base);
        }
        Ok((base, generators))
    }

    /// Coordinate polynomials of the affine map `q + sum_i a_i g_i`
    /// carrying the unit box onto this parallelotope.
    pub fn generator_rep(&self) -> Result<Vec<Poly>> {
        let (base, generators) = self.generators()?;
        let dim = self.dim();
        let polys = (0..dim)
            .map(|coord| {
                let coeffs: Vec<f64> = (0..dim).map(|g| generators[g][coord]).collect();
                Poly::affine(base[coord], &coeffs)
            })
            .collect();
        Ok(polys)
    }

    /// Samples a point uniformly with respect to the generator
    /// parameters.
    pub fn sample_point(&self, rng: &mut StdRng) -> Result<DVector<f64>> {
        let (base, generators) = self.generators()?;
        let mut point = base;
        for generator in &generators {
            point += generator * rng.gen::<f64>();
        }
        Ok(point)
    }
}
