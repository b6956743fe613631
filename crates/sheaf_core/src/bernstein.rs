//! Bernstein-form range bounding of polynomials over the unit box.
//!
//! Rewriting a polynomial of multidegree `D` in the tensor Bernstein
//! basis gives coefficients `b_I = sum_{J <= I} a_J prod_k
//! C(I_k, J_k) / C(D_k, J_k)`. Their extrema enclose the range of the
//! polynomial over `[0, 1]^n`, exactly so for multilinear polynomials.
//! This is the default bound oracle for bundle transformation.

use crate::error::{Result, SheafError};
use crate::poly::Poly;
use crate::traits::BoundOracle;

/// Refuse Bernstein index spaces larger than this many coefficients.
const MAX_INDICES: usize = 1 << 22;

/// Stateless [`BoundOracle`] backed by [`bernstein_bounds`].
#[derive(Debug, Clone, Copy, Default)]
pub struct BernsteinOracle;

impl BoundOracle for BernsteinOracle {
    fn bounds(&self, field: &Poly) -> Result<(f64, f64)> {
        bernstein_bounds(field)
    }
}

/// Returns `(upper, lower)` bounds of `poly` over the unit box.
pub fn bernstein_bounds(poly: &Poly) -> Result<(f64, f64)> {
    for (exps, coeff) in poly.terms() {
        if !coeff.is_finite() {
            return Err(SheafError::BoundOracleFailure {
                detail: format!("non-finite coefficient {coeff} on term {exps:?}"),
            });
        }
    }

    let degrees = poly.max_degrees();
    let mut num_indices = 1usize;
    for &d in &degrees {
        num_indices = num_indices.checked_mul(d as usize + 1).unwrap_or(usize::MAX);
    }
    if num_indices > MAX_INDICES {
        return Err(SheafError::BoundOracleFailure {
            detail: format!("Bernstein index space exceeds {MAX_INDICES} coefficients"),
        });
    }

    let max_degree = degrees.iter().copied().max().unwrap_or(0) as usize;
    let binom = pascal(max_degree);

    let mut upper = f64::NEG_INFINITY;
    let mut lower = f64::INFINITY;
    let mut index = vec![0u32; poly.dim()];
    loop {
        let mut coeff = 0.0;
        for (exps, a) in poly.terms() {
            if exps.iter().zip(index.iter()).all(|(j, i)| j <= i) {
                let mut weight = a;
                for ((&j, &i), &d) in exps.iter().zip(index.iter()).zip(degrees.iter()) {
                    weight *= binom[i as usize][j as usize] / binom[d as usize][j as usize];
                }
                coeff += weight;
            }
        }
        if !coeff.is_finite() {
            return Err(SheafError::BoundOracleFailure {
                detail: "non-finite Bernstein coefficient".to_string(),
            });
        }
        upper = upper.max(coeff);
        lower = lower.min(coeff);
        if !advance(&mut index, &degrees) {
            break;
        }
    }
    Ok((upper, lower))
}

/// Rows 0..=n of Pascal's triangle as `f64`.
fn pascal(n: usize) -> Vec<Vec<f64>> {
    let mut rows: Vec<Vec<f64>> = Vec::with_capacity(n + 1);
    for r in 0..=n {
        let mut row = vec![1.0; r + 1];
        for k in 1..r {
            row[k] = rows[r - 1][k - 1] + rows[r - 1][k];
        }
        rows.push(row);
    }
    rows
}

/// Steps a mixed-radix counter through `prod_k (degrees[k] + 1)` states.
fn advance(index: &mut [u32], degrees: &[u32]) -> bool {
    for (slot, &limit) in index.iter_mut().zip(degrees.iter()) {
        if *slot < limit {
            *slot += 1;
            return true;
        }
        *slot = 0;
    }
    false
}
