//! PCA-fitted templates tracking the dominant spread of trajectories.
//!
//! Both strategies sample trajectory endpoints from the current bundle,
//! take the principal components of the endpoint cloud as new bundle
//! directions and install them as one labeled template. They differ in
//! cadence: [`PcaStrategy`] refreshes every `iter_steps` steps and
//! keeps one fitted template alive, [`DelayedPcaStrategy`] installs a
//! new template every step and retires each one after a fixed life
//! span, keeping a sliding window alive.

use std::collections::VecDeque;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{retire_template, TemplateStrategy};
use crate::bundle::Bundle;
use crate::error::{Result, SheafError};
use crate::sample::BoxSampler;
use crate::traits::TrajectorySampler;

/// Controls a [`PcaStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PcaSettings {
    /// Steps each sampled trajectory is propagated.
    pub traj_steps: usize,
    /// Trajectories sampled per refresh.
    pub num_trajs: usize,
    /// A fresh template is fitted every `iter_steps` steps.
    pub iter_steps: usize,
    /// Master seed for trajectory sampling.
    pub seed: u64,
}

impl Default for PcaSettings {
    fn default() -> Self {
        PcaSettings {
            traj_steps: 5,
            num_trajs: 100,
            iter_steps: 10,
            seed: 0,
        }
    }
}

/// Controls a [`DelayedPcaStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayedPcaSettings {
    /// Steps each sampled trajectory is propagated.
    pub traj_steps: usize,
    /// Trajectories sampled per step.
    pub num_trajs: usize,
    /// Number of close hooks a template survives after the one that
    /// installed it.
    pub life_span: usize,
    /// Master seed for trajectory sampling.
    pub seed: u64,
}

impl Default for DelayedPcaSettings {
    fn default() -> Self {
        DelayedPcaSettings {
            traj_steps: 5,
            num_trajs: 100,
            life_span: 5,
            seed: 0,
        }
    }
}

/// Periodically refits one PCA template, retiring the previous one at
/// the next refresh.
pub struct PcaStrategy {
    settings: PcaSettings,
    sampler: Arc<dyn TrajectorySampler>,
    rng: StdRng,
    step: usize,
    ptope_count: usize,
    order: usize,
    live: VecDeque<String>,
}

impl PcaStrategy {
    pub fn new(settings: PcaSettings) -> Self {
        PcaStrategy::with_sampler(settings, Arc::new(BoxSampler::new()))
    }

    pub fn with_sampler(settings: PcaSettings, sampler: Arc<dyn TrajectorySampler>) -> Self {
        assert!(settings.iter_steps > 0, "iter_steps must be positive");
        assert!(settings.num_trajs >= 2, "PCA needs at least two trajectories");
        PcaStrategy {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            sampler,
            step: 0,
            ptope_count: 0,
            order: 0,
            live: VecDeque::new(),
        }
    }

    fn prefix(&self) -> String {
        if self.order == 0 {
            "pca".to_string()
        } else {
            format!("pca{}", self.order)
        }
    }
}

impl TemplateStrategy for PcaStrategy {
    fn kind(&self) -> &'static str {
        "pca"
    }

    fn assign_order(&mut self, order: usize) {
        self.order = order;
    }

    fn open(&mut self, bundle: &mut Bundle) -> Result<()> {
        if self.step % self.settings.iter_steps == 0 {
            let label = format!("{}-ptope{}", self.prefix(), self.ptope_count + 1);
            install_fitted_template(
                bundle,
                self.sampler.as_ref(),
                self.settings.num_trajs,
                self.settings.traj_steps,
                &mut self.rng,
                &label,
            )?;
            self.ptope_count += 1;
            self.live.push_back(label);
        }
        Ok(())
    }

    fn close(&mut self, bundle: &mut Bundle) -> Result<()> {
        if self.step % self.settings.iter_steps == 0 && self.step > 0 && self.live.len() > 1 {
            if let Some(old) = self.live.pop_front() {
                retire_template(bundle, &old)?;
                debug!(label = %old, step = self.step, "retired PCA template");
            }
        }
        self.step += 1;
        Ok(())
    }
}

/// Installs a PCA template every step and retires each one `life_span`
/// closes after the step that installed it.
pub struct DelayedPcaStrategy {
    settings: DelayedPcaSettings,
    sampler: Arc<dyn TrajectorySampler>,
    rng: StdRng,
    step: usize,
    ptope_count: usize,
    order: usize,
    live: Vec<(String, usize)>,
}

impl DelayedPcaStrategy {
    pub fn new(settings: DelayedPcaSettings) -> Self {
        DelayedPcaStrategy::with_sampler(settings, Arc::new(BoxSampler::new()))
    }

    pub fn with_sampler(settings: DelayedPcaSettings, sampler: Arc<dyn TrajectorySampler>) -> Self {
        assert!(settings.num_trajs >= 2, "PCA needs at least two trajectories");
        DelayedPcaStrategy {
            rng: StdRng::seed_from_u64(settings.seed),
            settings,
            sampler,
            step: 0,
            ptope_count: 0,
            order: 0,
            live: Vec::new(),
        }
    }

    fn prefix(&self) -> String {
        if self.order == 0 {
            "delayed-pca".to_string()
        } else {
            format!("delayed-pca{}", self.order)
        }
    }
}

impl TemplateStrategy for DelayedPcaStrategy {
    fn kind(&self) -> &'static str {
        "delayed-pca"
    }

    fn assign_order(&mut self, order: usize) {
        self.order = order;
    }

    fn open(&mut self, bundle: &mut Bundle) -> Result<()> {
        let label = format!("{}-ptope{}", self.prefix(), self.ptope_count + 1);
        install_fitted_template(
            bundle,
            self.sampler.as_ref(),
            self.settings.num_trajs,
            self.settings.traj_steps,
            &mut self.rng,
            &label,
        )?;
        self.ptope_count += 1;
        self.live.push((label, self.settings.life_span));
        Ok(())
    }

    fn close(&mut self, bundle: &mut Bundle) -> Result<()> {
        let mut survivors = Vec::with_capacity(self.live.len());
        for (label, life) in self.live.drain(..) {
            if life == 0 {
                retire_template(bundle, &label)?;
                debug!(label = %label, step = self.step, "retired delayed PCA template");
            } else {
                survivors.push((label, life - 1));
            }
        }
        self.live = survivors;
        self.step += 1;
        Ok(())
    }
}

/// Fits principal directions to sampled endpoints and installs them as
/// one labeled template; direction labels derive from the template
/// label.
fn install_fitted_template(
    bundle: &mut Bundle,
    sampler: &dyn TrajectorySampler,
    num_trajs: usize,
    traj_steps: usize,
    rng: &mut StdRng,
    label: &str,
) -> Result<()> {
    let endpoints = sampler.sample_endpoints(bundle, num_trajs, traj_steps, rng)?;
    let components = principal_directions(&endpoints, bundle.dim())?;
    let dir_labels = (0..components.len())
        .map(|k| format!("{label}-dir{k}"))
        .collect();
    let indices = bundle.add_directions(components, dir_labels)?;
    if let Err(err) = bundle.add_template(indices.clone(), label.to_string()) {
        // Unwind the fresh directions so a failed install leaves the
        // bundle as it was.
        let _ = bundle.remove_directions(&indices);
        return Err(err);
    }
    debug!(label, "installed fitted template");
    Ok(())
}

/// Principal components of a point cloud, unit length, ordered by
/// descending variance.
fn principal_directions(points: &[DVector<f64>], dim: usize) -> Result<Vec<DVector<f64>>> {
    if points.len() < 2 {
        return Err(SheafError::structural(
            "PCA needs at least two sample points",
        ));
    }
    for point in points {
        if point.len() != dim {
            return Err(SheafError::DimensionMismatch {
                what: "sample point",
                expected: dim,
                found: point.len(),
            });
        }
        if point.iter().any(|v| !v.is_finite()) {
            return Err(SheafError::structural(
                "trajectory endpoints must be finite to fit a template",
            ));
        }
    }

    let count = points.len();
    let mut mean = DVector::zeros(dim);
    for point in points {
        mean += point;
    }
    mean /= count as f64;

    let mut centered = DMatrix::zeros(count, dim);
    for (i, point) in points.iter().enumerate() {
        for j in 0..dim {
            centered[(i, j)] = point[j] - mean[j];
        }
    }
    let covariance = centered.transpose() * &centered / (count as f64 - 1.0);
    let eigen = SymmetricEigen::new(covariance);

    let mut order: Vec<usize> = (0..dim).collect();
    order.sort_by(|&a, &b| {
        eigen.eigenvalues[b]
            .partial_cmp(&eigen.eigenvalues[a])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(order
        .into_iter()
        .map(|k| eigen.eigenvectors.column(k).into_owned())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolyModel;
    use crate::poly::Poly;
    use crate::traits::Model;

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

    fn box_bundle() -> Bundle {
        Bundle::new(
            identity_model(),
            vec![
                DVector::from_vec(vec![1.0, 0.0]),
                DVector::from_vec(vec![0.0, 1.0]),
            ],
            vec![1.0, 1.0],
            vec![1.0, 1.0],
            vec![vec![0, 1]],
        )
        .unwrap()
    }

    struct FixedSampler(Vec<DVector<f64>>);

    impl TrajectorySampler for FixedSampler {
        fn sample_endpoints(
            &self,
            _bundle: &Bundle,
            _num_trajs: usize,
            _traj_steps: usize,
            _rng: &mut StdRng,
        ) -> Result<Vec<DVector<f64>>> {
            Ok(self.0.clone())
        }
    }

    fn diagonal_cloud() -> Arc<dyn TrajectorySampler> {
        Arc::new(FixedSampler(
            [-1.0, 0.0, 1.0, 2.0]
                .iter()
                .map(|&t| DVector::from_vec(vec![t, t]))
                .collect(),
        ))
    }

    #[test]
    fn principal_directions_align_with_the_spread() {
        let points: Vec<DVector<f64>> = [-1.0f64, -0.5, 0.5, 1.0]
            .iter()
            .map(|&t| DVector::from_vec(vec![t, t]))
            .collect();
        let dirs = principal_directions(&points, 2).unwrap();
        let diagonal = DVector::from_vec(vec![1.0, 1.0]).normalize();
        assert!((dirs[0].dot(&diagonal).abs() - 1.0).abs() < 1e-9);
        assert!(dirs[1].dot(&diagonal).abs() < 1e-9);
        assert!((dirs[1].norm() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn identical_points_still_yield_an_orthonormal_template() {
        let points = vec![DVector::from_vec(vec![0.5, 0.5]); 4];
        let dirs = principal_directions(&points, 2).unwrap();
        assert!((dirs[0].norm() - 1.0).abs() < 1e-9);
        assert!(dirs[0].dot(&dirs[1]).abs() < 1e-9);
    }

    #[test]
    fn non_finite_endpoints_are_rejected() {
        let points = vec![
            DVector::from_vec(vec![f64::INFINITY, 0.0]),
            DVector::from_vec(vec![0.0, 0.0]),
        ];
        assert!(matches!(
            principal_directions(&points, 2),
            Err(SheafError::StructuralInconsistency { .. })
        ));
    }

    #[test]
    fn pca_refresh_cycle_installs_then_retires() {
        let settings = PcaSettings {
            iter_steps: 2,
            num_trajs: 4,
            traj_steps: 1,
            seed: 5,
        };
        let mut strategy = PcaStrategy::with_sampler(settings, diagonal_cloud());
        let mut bundle = box_bundle();

        // Step 0: refresh installs ptope1.
        strategy.open(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);
        assert_eq!(bundle.num_directions(), 4);
        assert!(bundle.template_index_of("pca-ptope1").is_some());
        strategy.close(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);

        // Step 1: off-cycle, nothing changes.
        strategy.open(&mut bundle).unwrap();
        strategy.close(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);

        // Step 2: refresh installs ptope2, then retires ptope1.
        strategy.open(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 3);
        assert_eq!(bundle.num_directions(), 6);
        strategy.close(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);
        assert_eq!(bundle.num_directions(), 4);
        assert_eq!(bundle.template_index_of("pca-ptope1"), None);
        assert!(bundle.template_index_of("pca-ptope2").is_some());
    }

    #[test]
    fn delayed_pca_keeps_a_sliding_window() {
        let settings = DelayedPcaSettings {
            life_span: 1,
            num_trajs: 4,
            traj_steps: 1,
            seed: 5,
        };
        let mut strategy = DelayedPcaStrategy::with_sampler(settings, diagonal_cloud());
        let mut bundle = box_bundle();

        strategy.open(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);
        strategy.close(&mut bundle).unwrap();
        assert_eq!(bundle.num_templates(), 2);

        for step in 2..=4 {
            strategy.open(&mut bundle).unwrap();
            // Window: the fresh template plus the one from last step.
            assert_eq!(bundle.num_templates(), 3, "at open of step {step}");
            strategy.close(&mut bundle).unwrap();
            assert_eq!(bundle.num_templates(), 2, "after close of step {step}");
        }
        assert_eq!(bundle.template_index_of("delayed-pca-ptope1"), None);
        assert!(bundle.template_index_of("delayed-pca-ptope4").is_some());
    }

    #[test]
    fn composite_order_prefixes_labels() {
        let settings = PcaSettings {
            iter_steps: 1,
            num_trajs: 4,
            traj_steps: 1,
            seed: 5,
        };
        let mut strategy = PcaStrategy::with_sampler(settings, diagonal_cloud());
        strategy.assign_order(2);
        let mut bundle = box_bundle();
        strategy.open(&mut bundle).unwrap();
        assert!(bundle.template_index_of("pca2-ptope1").is_some());
        assert_eq!(bundle.dir_labels()[2], "pca2-ptope1-dir0");
    }
}
