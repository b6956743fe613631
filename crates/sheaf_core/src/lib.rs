//! The `sheaf_core` crate computes over-approximations of the reachable
//! sets of discrete polynomial dynamical systems using parallelotope
//! bundles.
//!
//! Key components:
//! - **Traits**: `Model` (polynomial step maps), `BoundOracle` (range
//!   bounding over the unit box), `TrajectorySampler` (endpoint clouds
//!   for template fitting).
//! - **Bundle**: labeled directions, paired offsets and templates, with
//!   LP-backed canonization.
//! - **Transform**: per-template composition of the dynamics with the
//!   generator map, bounded through Bernstein expansion and merged by
//!   minimum.
//! - **Strategies**: static, PCA and delayed PCA template adaptation,
//!   composable in order.
//! - **Reach**: the step driver producing a `FlowPipe` of snapshots
//!   with projection and volume queries.

pub mod bernstein;
pub mod bundle;
pub mod error;
pub mod flowpipe;
pub mod linear_system;
pub mod lp;
pub mod model;
pub mod parallelotope;
pub mod poly;
pub mod reach;
pub mod sample;
pub mod strategy;
pub mod traits;
pub mod transform;
