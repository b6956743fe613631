//! One-step transformation of a bundle under its model's dynamics.
//!
//! For each template the dynamics are composed with the template
//! parallelotope's generator map, restricting the image to a polynomial
//! over the unit box. Bounding `L_i . f(gamma(a))` with the oracle then
//! yields new offsets for direction `i`; across templates the smallest
//! offsets win. A final canonization re-tightens all offsets against
//! the merged intersection polytope.

use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bundle::Bundle;
use crate::error::{Result, SheafError};
use crate::poly::Poly;
use crate::traits::BoundOracle;

/// Which directions each template is responsible for bounding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransformMode {
    /// Every template bounds every direction.
    AllForOne,
    /// Every template bounds only the directions it selects.
    OneForOne,
}

/// Controls a [`BundleTransformer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransformSettings {
    pub mode: TransformMode,
    /// Bound templates on the rayon pool instead of in a loop. Results
    /// are identical either way; bounds are merged in template order.
    pub parallel: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        TransformSettings {
            mode: TransformMode::AllForOne,
            parallel: false,
        }
    }
}

/// Applies one dynamics step to bundles, tightening offsets through a
/// bound oracle.
pub struct BundleTransformer {
    oracle: Arc<dyn BoundOracle>,
    settings: TransformSettings,
}

/// Per-direction bounds produced by one template: `(direction index,
/// upper bound, lower bound)` of the image along that direction.
type DirectionBounds = Vec<(usize, f64, f64)>;

impl BundleTransformer {
    pub fn new(oracle: Arc<dyn BoundOracle>, settings: TransformSettings) -> Self {
        BundleTransformer { oracle, settings }
    }

    pub fn settings(&self) -> TransformSettings {
        self.settings
    }

    /// Replaces the bundle with its one-step image and canonizes it.
    ///
    /// On any error the bundle keeps its pre-call offsets. In
    /// one-for-one mode every direction must be selected by at least
    /// one template, otherwise some offset would never be bounded.
    pub fn transform(&self, bundle: &mut Bundle) -> Result<()> {
        let n = bundle.num_directions();
        if self.settings.mode == TransformMode::OneForOne {
            if let Some(missing) = (0..n).find(|&i| !bundle.direction_referenced(i)) {
                return Err(SheafError::structural(format!(
                    "one-for-one transformation leaves direction '{}' unbounded; \
                     assign it to a template or use all-for-one",
                    bundle.dir_labels()[missing]
                )));
            }
        }

        let num_templates = bundle.num_templates();
        let per_template: Vec<DirectionBounds> = if self.settings.parallel {
            (0..num_templates)
                .into_par_iter()
                .map(|t| self.template_bounds(bundle, t))
                .collect::<Result<_>>()?
        } else {
            (0..num_templates)
                .map(|t| self.template_bounds(bundle, t))
                .collect::<Result<_>>()?
        };

        let mut new_offu = vec![f64::INFINITY; n];
        let mut new_offl = vec![f64::INFINITY; n];
        for bounds in &per_template {
            for &(dir, upper, lower) in bounds {
                new_offu[dir] = new_offu[dir].min(upper);
                new_offl[dir] = new_offl[dir].min(-lower);
            }
        }
        if let Some(i) = (0..n).find(|&i| !new_offu[i].is_finite() || !new_offl[i].is_finite()) {
            return Err(SheafError::BoundOracleFailure {
                detail: format!(
                    "non-finite bound for direction '{}' after merging templates",
                    bundle.dir_labels()[i]
                ),
            });
        }

        let saved_offu = bundle.offu().to_vec();
        let saved_offl = bundle.offl().to_vec();
        bundle.set_offsets(new_offu, new_offl);
        if let Err(err) = bundle.canonize() {
            bundle.set_offsets(saved_offu, saved_offl);
            return Err(err);
        }
        debug!(
            templates = num_templates,
            directions = n,
            mode = ?self.settings.mode,
            "transformed bundle"
        );
        Ok(())
    }

    /// Bounds the image of one template's parallelotope along every
    /// direction in this template's scope.
    fn template_bounds(&self, bundle: &Bundle, template_idx: usize) -> Result<DirectionBounds> {
        let ptope = bundle.parallelotope(template_idx)?;
        let gamma = ptope.generator_rep()?;
        let composed: Vec<Poly> = bundle
            .model()
            .dynamics()
            .iter()
            .map(|f| f.compose(&gamma))
            .collect();
        let scope: Vec<usize> = match self.settings.mode {
            TransformMode::AllForOne => (0..bundle.num_directions()).collect(),
            TransformMode::OneForOne => bundle.template(template_idx).to_vec(),
        };

        let mut out = Vec::with_capacity(scope.len());
        for dir_idx in scope {
            let dir = bundle.direction(dir_idx);
            let mut field = Poly::zero(bundle.dim());
            for (&coeff, fog) in dir.iter().zip(composed.iter()) {
                if coeff != 0.0 {
                    field = &field + &fog.scale(coeff);
                }
            }
            let (upper, lower) = self.oracle.bounds(&field)?;
            trace!(
                template = template_idx,
                direction = dir_idx,
                upper,
                lower,
                "bounded direction image"
            );
            out.push((dir_idx, upper, lower));
        }
        Ok(out)
    }
}
