//! Concrete polynomial model backing the [`Model`] trait.

use crate::error::{Result, SheafError};
use crate::poly::Poly;
use crate::traits::Model;

/// A discrete-time system whose step map is given explicitly as one
/// polynomial per state coordinate.
///
/// Continuous systems are expected to arrive here already discretized,
/// e.g. by an Euler step `x + delta * f(x)` folded into the
/// polynomials.
#[derive(Debug, Clone)]
pub struct PolyModel {
    name: String,
    var_names: Vec<String>,
    dynamics: Vec<Poly>,
}

impl PolyModel {
    /// Creates a model, checking that every coordinate polynomial has
    /// the arity implied by the variable list.
    pub fn new(
        name: impl Into<String>,
        var_names: Vec<String>,
        dynamics: Vec<Poly>,
    ) -> Result<Self> {
        let dim = var_names.len();
        if dim == 0 {
            return Err(SheafError::DimensionMismatch {
                what: "model variables",
                expected: 1,
                found: 0,
            });
        }
        if dynamics.len() != dim {
            return Err(SheafError::DimensionMismatch {
                what: "model dynamics",
                expected: dim,
                found: dynamics.len(),
            });
        }
        for poly in &dynamics {
            if poly.dim() != dim {
                return Err(SheafError::DimensionMismatch {
                    what: "dynamics polynomial arity",
                    expected: dim,
                    found: poly.dim(),
                });
            }
        }
        Ok(PolyModel {
            name: name.into(),
            var_names,
            dynamics,
        })
    }
}

impl Model for PolyModel {
    fn name(&self) -> &str {
        &self.name
    }

    fn dim(&self) -> usize {
        self.var_names.len()
    }

    fn var_names(&self) -> &[String] {
        &self.var_names
    }

    fn dynamics(&self) -> &[Poly] {
        &self.dynamics
    }
}
