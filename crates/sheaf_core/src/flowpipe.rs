//! Flowpipes: the per-step bundle snapshots of a reachability run.

use nalgebra::DVector;

use crate::bundle::Bundle;
use crate::error::{Result, SheafError};
use crate::linear_system::VolumeSettings;
use crate::sample::substream_rng;

/// The sequence of over-approximations produced by a run. Snapshot 0 is
/// the initial bundle; snapshot `k` covers the states reachable in
/// exactly `k` steps.
#[derive(Debug, Clone)]
pub struct FlowPipe {
    bundles: Vec<Bundle>,
}

impl FlowPipe {
    /// Starts a flowpipe at the initial bundle.
    pub fn new(initial: Bundle) -> Self {
        FlowPipe {
            bundles: vec![initial],
        }
    }

    /// Appends the next snapshot.
    pub fn push(&mut self, bundle: Bundle) {
        debug_assert_eq!(bundle.dim(), self.dim());
        self.bundles.push(bundle);
    }

    /// Number of snapshots, including the initial bundle.
    pub fn len(&self) -> usize {
        self.bundles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bundles.is_empty()
    }

    /// State-space dimension of the snapshots.
    pub fn dim(&self) -> usize {
        self.bundles[0].dim()
    }

    /// All snapshots in step order.
    pub fn bundles(&self) -> &[Bundle] {
        &self.bundles
    }

    /// Snapshot `index`, if present.
    pub fn get(&self, index: usize) -> Option<&Bundle> {
        self.bundles.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Bundle> {
        self.bundles.iter()
    }

    /// Per-step bounds of state variable `var`: a `(min, max)` series
    /// with one entry per snapshot.
    pub fn project(&self, var: usize) -> Result<(Vec<f64>, Vec<f64>)> {
        let dim = self.dim();
        if var >= dim {
            return Err(SheafError::structural(format!(
                "projection variable {var} out of range for dimension {dim}"
            )));
        }
        let mut objective = DVector::zeros(dim);
        objective[var] = 1.0;
        let mut min_series = Vec::with_capacity(self.len());
        let mut max_series = Vec::with_capacity(self.len());
        for bundle in &self.bundles {
            let sys = bundle.intersection_polytope();
            min_series.push(sys.min_opt(&objective)?.value);
            max_series.push(sys.max_opt(&objective)?.value);
        }
        Ok((min_series, max_series))
    }

    /// Volume estimate per snapshot. Each snapshot gets its own rng
    /// substream of `seed`, so the series is reproducible regardless of
    /// how many snapshots precede it.
    pub fn volume_series(&self, settings: &VolumeSettings, seed: u64) -> Result<Vec<f64>> {
        self.bundles
            .iter()
            .enumerate()
            .map(|(index, bundle)| {
                let mut rng = substream_rng(seed, index as u64);
                bundle.intersection_polytope().volume(settings, &mut rng)
            })
            .collect()
    }

    /// Sum of the per-snapshot volume estimates.
    pub fn total_volume(&self, settings: &VolumeSettings, seed: u64) -> Result<f64> {
        Ok(self.volume_series(settings, seed)?.iter().sum())
    }
}

impl<'a> IntoIterator for &'a FlowPipe {
    type Item = &'a Bundle;
    type IntoIter = std::slice::Iter<'a, Bundle>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolyModel;
    use crate::poly::Poly;
    use crate::traits::Model;
    use std::sync::Arc;

    fn identity_model() -> Arc<dyn Model> {
        Arc::new(
            PolyModel::new(
                "identity",
                vec!["x".into(), "y".into()],
                vec![Poly::var(2, 0), Poly::var(2, 1)],
            )
            .unwrap(),
        )
    }

    fn box_bundle(half_width: f64) -> Bundle {
        Bundle::new(
            identity_model(),
            vec![
                DVector::from_vec(vec![1.0, 0.0]),
                DVector::from_vec(vec![0.0, 1.0]),
            ],
            vec![half_width, half_width],
            vec![half_width, half_width],
            vec![vec![0, 1]],
        )
        .unwrap()
    }

    fn shrinking_pipe() -> FlowPipe {
        let mut pipe = FlowPipe::new(box_bundle(1.0));
        pipe.push(box_bundle(0.5));
        pipe.push(box_bundle(0.25));
        pipe
    }

    #[test]
    fn projection_series_orders_min_below_max() {
        let pipe = shrinking_pipe();
        let (min_series, max_series) = pipe.project(0).unwrap();
        assert_eq!(max_series, vec![1.0, 0.5, 0.25]);
        assert_eq!(min_series, vec![-1.0, -0.5, -0.25]);
        for (lo, hi) in min_series.iter().zip(max_series.iter()) {
            assert!(lo <= hi);
        }
    }

    #[test]
    fn projection_rejects_unknown_variables() {
        let pipe = shrinking_pipe();
        assert!(matches!(
            pipe.project(2),
            Err(SheafError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    fn volume_series_is_reproducible_and_box_exact() {
        let pipe = shrinking_pipe();
        let settings = VolumeSettings { samples: 1000 };
        let first = pipe.volume_series(&settings, 13).unwrap();
        let second = pipe.volume_series(&settings, 13).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
        assert!((first[0] - 4.0).abs() < 1e-9);
        assert!((first[1] - 1.0).abs() < 1e-9);
        let total = pipe.total_volume(&settings, 13).unwrap();
        assert!((total - first.iter().sum::<f64>()).abs() < 1e-12);
    }

    #[test]
    fn iteration_visits_snapshots_in_order() {
        let pipe = shrinking_pipe();
        assert_eq!(pipe.len(), 3);
        assert!(!pipe.is_empty());
        let widths: Vec<f64> = pipe.iter().map(|b| b.offu()[0]).collect();
        assert_eq!(widths, vec![1.0, 0.5, 0.25]);
        assert!(pipe.get(3).is_none());
    }
}
