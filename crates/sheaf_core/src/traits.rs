use nalgebra::DVector;
use rand::rngs::StdRng;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::poly::Poly;

/// Represents a discrete-time polynomial dynamical system.
///
/// One transformation step maps a state `x` to `f(x)` where every
/// coordinate of `f` is a polynomial in the state variables.
pub trait Model: Send + Sync {
    /// Short human-readable name of the system.
    fn name(&self) -> &str;

    /// Returns the dimension of the state space.
    fn dim(&self) -> usize;

    /// Variable names, one per state dimension.
    fn var_names(&self) -> &[String];

    /// Coordinate polynomials of the step map, one per state dimension.
    fn dynamics(&self) -> &[Poly];

    /// Evaluates the step map.
    /// x: current state
    /// out: buffer to write x_{n+1}
    fn apply(&self, x: &[f64], out: &mut [f64]) {
        for (poly, slot) in self.dynamics().iter().zip(out.iter_mut()) {
            *slot = poly.eval(x);
        }
    }
}

/// Bounds a polynomial over the unit box `[0, 1]^n`.
///
/// Implementations must be sound: the returned `(upper, lower)` pair
/// must enclose the true range. Tighter is better, exact is not
/// required.
pub trait BoundOracle: Send + Sync {
    /// Returns `(upper, lower)` bounds of `field` over the unit box.
    fn bounds(&self, field: &Poly) -> Result<(f64, f64)>;
}

/// Produces trajectory endpoints used to fit adaptive templates.
pub trait TrajectorySampler: Send + Sync {
    /// Samples `num_trajs` start points from `bundle`, propagates each
    /// one `traj_steps` steps through the bundle's model and returns
    /// the final states.
    fn sample_endpoints(
        &self,
        bundle: &Bundle,
        num_trajs: usize,
        traj_steps: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<DVector<f64>>>;
}
