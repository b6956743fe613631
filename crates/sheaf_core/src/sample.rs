//! Seeded sampling utilities: substream derivation and the default
//! trajectory sampler behind PCA template fitting.

use nalgebra::DVector;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;

use crate::bundle::Bundle;
use crate::error::Result;
use crate::traits::TrajectorySampler;

/// Derives an independent seed for substream `index` of `seed`.
///
/// SplitMix64-style mixing, cheap and stable, so related indices (0, 1,
/// 2, ...) yield unrelated streams.
pub fn substream_seed(seed: u64, index: u64) -> u64 {
    fn mix(mut x: u64) -> u64 {
        x ^= x >> 30;
        x = x.wrapping_mul(0xbf58476d1ce4e5b9);
        x ^= x >> 27;
        x = x.wrapping_mul(0x94d049bb133111eb);
        x ^ (x >> 31)
    }
    mix(seed ^ mix(index.wrapping_add(0x9e3779b97f4a7c15)))
}

/// Seeded generator for substream `index` of `seed`.
pub fn substream_rng(seed: u64, index: u64) -> StdRng {
    StdRng::seed_from_u64(substream_seed(seed, index))
}

/// Samples trajectory start points from the axis-aligned box around the
/// Chebyshev center of the bundle's intersection polytope, then
/// propagates each one through the model.
///
/// Start points are drawn before any propagation happens, so results do
/// not depend on the parallel schedule.
#[derive(Debug, Clone, Copy)]
pub struct BoxSampler {
    /// Scale applied to the Chebyshev radius when sizing the start box.
    pub shrink: f64,
}

impl BoxSampler {
    pub fn new() -> Self {
        BoxSampler { shrink: 1.0 }
    }
}

impl Default for BoxSampler {
    fn default() -> Self {
        BoxSampler::new()
    }
}

impl TrajectorySampler for BoxSampler {
    fn sample_endpoints(
        &self,
        bundle: &Bundle,
        num_trajs: usize,
        traj_steps: usize,
        rng: &mut StdRng,
    ) -> Result<Vec<DVector<f64>>> {
        let sys = bundle.intersection_polytope();
        let starts = sys.sample_chebyshev_box(num_trajs, self.shrink, rng)?;
        let model = bundle.model();
        let endpoints = starts
            .into_par_iter()
            .map(|start| {
                let mut state: Vec<f64> = start.iter().copied().collect();
                let mut next = vec![0.0; state.len()];
                for _ in 0..traj_steps {
                    model.apply(&state, &mut next);
                    std::mem::swap(&mut state, &mut next);
                }
                DVector::from_vec(state)
            })
            .collect();
        Ok(endpoints)
    }
}
