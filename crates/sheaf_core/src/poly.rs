//! Sparse multivariate polynomials over `f64`.
//!
//! Dynamics, generator representations and template projections are all
//! expressed as polynomials in a fixed number of variables. Terms are
//! stored sparsely, keyed by exponent vector, so composition of a
//! polynomial vector field with an affine generator map stays cheap even
//! in higher dimensions.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Exponent vector of a single term, one entry per variable.
pub type Exponents = Vec<u32>;

/// A sparse polynomial in `dim` variables with `f64` coefficients.
///
/// The zero polynomial has an empty term map. Inserting a term with a
/// zero coefficient is a no-op, so structural equality coincides with
/// arithmetic equality for polynomials built through this API.
#[derive(Debug, Clone, PartialEq)]
pub struct Poly {
    dim: usize,
    terms: BTreeMap<Exponents, f64>,
}

impl Poly {
    /// The zero polynomial in `dim` variables.
    pub fn zero(dim: usize) -> Self {
        Poly {
            dim,
            terms: BTreeMap::new(),
        }
    }

    /// The constant polynomial `value` in `dim` variables.
    pub fn constant(dim: usize, value: f64) -> Self {
        let mut p = Poly::zero(dim);
        p.add_term(vec![0; dim], value);
        p
    }

    /// The monomial `x_index` in `dim` variables.
    pub fn var(dim: usize, index: usize) -> Self {
        assert!(index < dim, "variable index {index} out of range for dimension {dim}");
        let mut exps = vec![0; dim];
        exps[index] = 1;
        let mut p = Poly::zero(dim);
        p.add_term(exps, 1.0);
        p
    }

    /// The affine polynomial `constant + coeffs[0] x_0 + ... + coeffs[d-1] x_{d-1}`.
    pub fn affine(constant: f64, coeffs: &[f64]) -> Self {
        let dim = coeffs.len();
        let mut p = Poly::constant(dim, constant);
        for (i, &c) in coeffs.iter().enumerate() {
            let mut exps = vec![0; dim];
            exps[i] = 1;
            p.add_term(exps, c);
        }
        p
    }

    /// Builds a polynomial from explicit `(exponents, coefficient)` terms.
    pub fn from_terms(dim: usize, terms: impl IntoIterator<Item = (Exponents, f64)>) -> Self {
        let mut p = Poly::zero(dim);
        for (exps, coeff) in terms {
            assert_eq!(exps.len(), dim, "term arity does not match dimension {dim}");
            p.add_term(exps, coeff);
        }
        p
    }

    /// Number of variables.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// True iff this is the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    /// Iterates over `(exponents, coefficient)` terms in lexicographic
    /// exponent order.
    pub fn terms(&self) -> impl Iterator<Item = (&Exponents, f64)> {
        self.terms.iter().map(|(e, &c)| (e, c))
    }

    /// Number of stored (nonzero) terms.
    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    /// Per-variable maximum exponent, the multidegree of the polynomial.
    pub fn max_degrees(&self) -> Vec<u32> {
        let mut degrees = vec![0; self.dim];
        for exps in self.terms.keys() {
            for (d, &e) in degrees.iter_mut().zip(exps.iter()) {
                *d = (*d).max(e);
            }
        }
        degrees
    }

    /// Evaluates the polynomial at `point`.
    pub fn eval(&self, point: &[f64]) -> f64 {
        assert_eq!(point.len(), self.dim, "evaluation point has wrong arity");
        let mut acc = 0.0;
        for (exps, coeff) in &self.terms {
            let mut term = *coeff;
            for (&x, &e) in point.iter().zip(exps.iter()) {
                if e > 0 {
                    term *= x.powi(e as i32);
                }
            }
            acc += term;
        }
        acc
    }

    /// Returns `scale * self`.
    pub fn scale(&self, scale: f64) -> Poly {
        let mut out = Poly::zero(self.dim);
        for (exps, coeff) in &self.terms {
            out.add_term(exps.clone(), coeff * scale);
        }
        out
    }

    /// Returns `self^exponent` by repeated multiplication.
    pub fn powi(&self, exponent: u32) -> Poly {
        let mut out = Poly::constant(self.dim, 1.0);
        for _ in 0..exponent {
            out = &out * self;
        }
        out
    }

    /// Substitutes `subs[i]` for variable `i`, returning a polynomial in
    /// the variables of the substituents.
    ///
    /// All substituents must share one arity; that arity becomes the
    /// arity of the result.
    pub fn compose(&self, subs: &[Poly]) -> Poly {
        assert_eq!(subs.len(), self.dim, "one substituent required per variable");
        let out_dim = subs.first().map_or(0, Poly::dim);
        assert!(
            subs.iter().all(|s| s.dim() == out_dim),
            "substituents must share one arity"
        );
        let mut out = Poly::zero(out_dim);
        for (exps, coeff) in &self.terms {
            let mut term = Poly::constant(out_dim, *coeff);
            for (sub, &e) in subs.iter().zip(exps.iter()) {
                if e > 0 {
                    term = &term * &sub.powi(e);
                }
            }
            out = &out + &term;
        }
        out
    }

    fn add_term(&mut self, exps: Exponents, coeff: f64) {
        if coeff == 0.0 {
            return;
        }
        let entry = self.terms.entry(exps);
        match entry {
            std::collections::btree_map::Entry::Occupied(mut slot) => {
                let updated = slot.get() + coeff;
                if updated == 0.0 {
                    slot.remove();
                } else {
                    *slot.get_mut() = updated;
                }
            }
            std::collections::btree_map::Entry::Vacant(slot) => {
                slot.insert(coeff);
            }
        }
    }
}

impl Add for &Poly {
    type Output = Poly;

    fn add(self, rhs: &Poly) -> Poly {
        assert_eq!(self.dim, rhs.dim, "polynomial arities differ");
        let mut out = self.clone();
        for (exps, coeff) in &rhs.terms {
            out.add_term(exps.clone(), *coeff);
        }
        out
    }
}

impl Sub for &Poly {
    type Output = Poly;

    fn sub(self, rhs: &Poly) -> Poly {
        assert_eq!(self.dim, rhs.dim, "polynomial arities differ");
        let mut out = self.clone();
        for (exps, coeff) in &rhs.terms {
            out.add_term(exps.clone(), -coeff);
        }
        out
    }
}

impl Mul for &Poly {
    type Output = Poly;

    fn mul(self, rhs: &Poly) -> Poly {
        assert_eq!(self.dim, rhs.dim, "polynomial arities differ");
        let mut out = Poly::zero(self.dim);
        for (le, lc) in &self.terms {
            for (re, rc) in &rhs.terms {
                let exps: Exponents = le.iter().zip(re.iter()).map(|(a, b)| a + b).collect();
                out.add_term(exps, lc * rc);
            }
        }
        out
    }
}

impl Neg for &Poly {
    type Output = Poly;

    fn neg(self) -> Poly {
        self.scale(-1.0)
    }
}

impl fmt::Display for Poly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.terms.is_empty() {
            return write!(f, "0");
        }
        for (idx, (exps, coeff)) in self.terms.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{coeff}")?;
            for (var, &e) in exps.iter().enumerate() {
                match e {
                    0 => {}
                    1 => write!(f, "*x{var}")?,
                    _ => write!(f, "*x{var}^{e}")?,
                }
            }
        }
        Ok(())
    }
}
