//! Top-level reachability driver tying strategies, transformer and
//! flowpipe together.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::bundle::Bundle;
use crate::flowpipe::FlowPipe;
use crate::strategy::TemplateStrategy;
use crate::transform::BundleTransformer;

/// Runs `num_steps` reachability steps from `initial`.
///
/// Each step opens the strategy, transforms the bundle and closes the
/// strategy, then records the bundle as the next flowpipe snapshot.
/// Snapshot 0 is the untouched initial bundle. The first error aborts
/// the run; the flowpipe built so far is dropped with it.
pub fn compute_flowpipe(
    initial: Bundle,
    transformer: &BundleTransformer,
    strategy: &mut dyn TemplateStrategy,
    num_steps: usize,
) -> Result<FlowPipe> {
    let mut bundle = initial;
    let mut pipe = FlowPipe::new(bundle.clone());
    info!(
        model = bundle.model().name(),
        steps = num_steps,
        "computing flowpipe"
    );
    for step in 0..num_steps {
        strategy
            .open(&mut bundle)
            .with_context(|| format!("strategy open failed at step {step}"))?;
        transformer
            .transform(&mut bundle)
            .with_context(|| format!("transformation failed at step {step}"))?;
        strategy
            .close(&mut bundle)
            .with_context(|| format!("strategy close failed at step {step}"))?;
        debug!(
            step,
            directions = bundle.num_directions(),
            templates = bundle.num_templates(),
            "step complete"
        );
        pipe.push(bundle.clone());
    }
    Ok(pipe)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bernstein::BernsteinOracle;
    use crate::model::PolyModel;
    use crate::poly::Poly;
    use crate::strategy::StaticStrategy;
    use crate::traits::Model;
    use crate::transform::{TransformMode, TransformSettings};
    use nalgebra::DVector;
    use std::sync::Arc;

    fn contraction_model() -> Arc<dyn Model> {
        Arc::new(
            PolyModel::new(
                "half",
                vec!["x".into(), "y".into()],
                vec![Poly::var(2, 0).scale(0.5), Poly::var(2, 1).scale(0.5)],
            )
            .unwrap(),
        )
    }

    fn box_bundle(extra_unreferenced_direction: bool) -> Bundle {
        let mut dirs = vec![
            DVector::from_vec(vec![1.0, 0.0]),
            DVector::from_vec(vec![0.0, 1.0]),
        ];
        let mut offs = vec![1.0, 1.0];
        if extra_unreferenced_direction {
            dirs.push(DVector::from_vec(vec![1.0, 1.0]));
            offs.push(2.0);
        }
        Bundle::new(
            contraction_model(),
            dirs,
            offs.clone(),
            offs,
            vec![vec![0, 1]],
        )
        .unwrap()
    }

    fn transformer(mode: TransformMode) -> BundleTransformer {
        BundleTransformer::new(
            Arc::new(BernsteinOracle),
            TransformSettings {
                mode,
                parallel: false,
            },
        )
    }

    #[test]
    fn static_run_contracts_the_box() {
        let transformer = transformer(TransformMode::AllForOne);
        let mut strategy = StaticStrategy;
        let pipe =
            compute_flowpipe(box_bundle(false), &transformer, &mut strategy, 3).unwrap();
        assert_eq!(pipe.len(), 4);
        for (k, bundle) in pipe.iter().enumerate() {
            let expected = 0.5f64.powi(k as i32);
            assert!((bundle.offu()[0] - expected).abs() < 1e-9);
            assert!((bundle.offl()[1] - expected).abs() < 1e-9);
        }
    }

    #[test]
    fn step_errors_carry_their_step_index() {
        let transformer = transformer(TransformMode::OneForOne);
        let mut strategy = StaticStrategy;
        let err = compute_flowpipe(box_bundle(true), &transformer, &mut strategy, 2)
            .unwrap_err();
        assert_eq!(err.to_string(), "transformation failed at step 0");
        assert!(format!("{err:#}").contains("structural inconsistency"));
    }
}
