//! Template adaptation strategies driving the reachability loop.
//!
//! A strategy gets a hook before (`open`) and after (`close`) every
//! transformation step and adapts the bundle's template set through the
//! labeled direction/template surface. Offsets are owned by the
//! transformer; strategies never touch them.

pub mod pca;

pub use pca::{DelayedPcaSettings, DelayedPcaStrategy, PcaSettings, PcaStrategy};

use crate::bundle::Bundle;
use crate::error::{Result, SheafError};

/// Hooks invoked around every transformation step.
pub trait TemplateStrategy {
    /// Strategy kind, used to disambiguate labels inside composites.
    fn kind(&self) -> &'static str;

    /// Called before the bundle is transformed at each step.
    fn open(&mut self, bundle: &mut Bundle) -> Result<()>;

    /// Called after the bundle is transformed at each step.
    fn close(&mut self, bundle: &mut Bundle) -> Result<()>;

    /// Assigns the 1-based occurrence index among same-kind members of
    /// a composite. Standalone strategies keep the default of 0.
    fn assign_order(&mut self, _order: usize) {}
}

/// Keeps the initial template set for the whole computation.
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticStrategy;

impl TemplateStrategy for StaticStrategy {
    fn kind(&self) -> &'static str {
        "static"
    }

    fn open(&mut self, _bundle: &mut Bundle) -> Result<()> {
        Ok(())
    }

    fn close(&mut self, _bundle: &mut Bundle) -> Result<()> {
        Ok(())
    }
}

/// Dispatches to several member strategies in list order, on open and
/// on close alike.
pub struct CompositeStrategy {
    members: Vec<Box<dyn TemplateStrategy>>,
}

impl CompositeStrategy {
    /// Builds a composite. Members sharing a kind receive 1-based
    /// occurrence indices so their labels stay distinct; a kind that
    /// appears once keeps its standalone label.
    pub fn new(mut members: Vec<Box<dyn TemplateStrategy>>) -> Self {
        let kinds: Vec<&'static str> = members.iter().map(|m| m.kind()).collect();
        for (i, member) in members.iter_mut().enumerate() {
            if kinds.iter().filter(|&&k| k == kinds[i]).count() > 1 {
                let order = kinds[..=i].iter().filter(|&&k| k == kinds[i]).count();
                member.assign_order(order);
            }
        }
        CompositeStrategy { members }
    }

    /// Number of member strategies.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl TemplateStrategy for CompositeStrategy {
    fn kind(&self) -> &'static str {
        "composite"
    }

    fn open(&mut self, bundle: &mut Bundle) -> Result<()> {
        for member in &mut self.members {
            member.open(bundle)?;
        }
        Ok(())
    }

    fn close(&mut self, bundle: &mut Bundle) -> Result<()> {
        for member in &mut self.members {
            member.close(bundle)?;
        }
        Ok(())
    }
}

/// Removes the template carrying `label`, then any of its directions no
/// longer referenced by the surviving templates.
pub(crate) fn retire_template(bundle: &mut Bundle, label: &str) -> Result<()> {
    let index = bundle
        .template_index_of(label)
        .ok_or_else(|| SheafError::structural(format!("no template labeled '{label}'")))?;
    let entries = bundle.template(index).to_vec();
    bundle.remove_templates(&[index])?;
    let orphaned: Vec<usize> = entries
        .into_iter()
        .filter(|&dir| !bundle.direction_referenced(dir))
        .collect();
    bundle.remove_directions(&orphaned)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PolyModel;
    use crate::poly::Poly;
    use crate::traits::Model;
    use nalgebra::DVector;
    use std::cell::RefCell;
    use std::rc::Rc;
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

    struct Probe {
        tag: &'static str,
        order: usize,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl TemplateStrategy for Probe {
        fn kind(&self) -> &'static str {
            self.tag
        }

        fn open(&mut self, _bundle: &mut Bundle) -> Result<()> {
            self.log.borrow_mut().push(format!("open {}{}", self.tag, self.order));
            Ok(())
        }

        fn close(&mut self, _bundle: &mut Bundle) -> Result<()> {
            self.log.borrow_mut().push(format!("close {}{}", self.tag, self.order));
            Ok(())
        }

        fn assign_order(&mut self, order: usize) {
            self.order = order;
        }
    }

    #[test]
    fn static_strategy_leaves_the_bundle_alone() {
        let mut bundle = box_bundle();
        let mut strategy = StaticStrategy;
        strategy.open(&mut bundle).unwrap();
        strategy.close(&mut bundle).unwrap();
        assert_eq!(bundle.num_directions(), 2);
        assert_eq!(bundle.num_templates(), 1);
    }

    #[test]
    fn composite_dispatches_in_list_order_and_numbers_same_kinds() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let members: Vec<Box<dyn TemplateStrategy>> = vec![
            Box::new(Probe { tag: "a", order: 0, log: log.clone() }),
            Box::new(Probe { tag: "b", order: 0, log: log.clone() }),
            Box::new(Probe { tag: "a", order: 0, log: log.clone() }),
        ];
        let mut composite = CompositeStrategy::new(members);
        assert_eq!(composite.len(), 3);

        let mut bundle = box_bundle();
        composite.open(&mut bundle).unwrap();
        composite.close(&mut bundle).unwrap();
        assert_eq!(
            log.borrow().as_slice(),
            &[
                "open a1".to_string(),
                "open b0".to_string(),
                "open a2".to_string(),
                "close a1".to_string(),
                "close b0".to_string(),
                "close a2".to_string(),
            ]
        );
    }

    #[test]
    fn retire_template_drops_exclusive_directions_only() {
        let mut bundle = box_bundle();
        let added = bundle
            .add_directions(
                vec![
                    DVector::from_vec(vec![1.0, 1.0]),
                    DVector::from_vec(vec![1.0, -1.0]),
                ],
                vec!["w0".into(), "w1".into()],
            )
            .unwrap();
        bundle.add_template(vec![added[0], added[1]], "fitted".into()).unwrap();
        // The first extra direction is also shared with another template.
        bundle.add_template(vec![0, added[0]], "shared".into()).unwrap();

        retire_template(&mut bundle, "fitted").unwrap();
        assert_eq!(bundle.template_index_of("fitted"), None);
        assert!(bundle.template_index_of("shared").is_some());
        // w0 survives through the shared template, w1 is gone.
        assert_eq!(bundle.num_directions(), 3);
        assert_eq!(bundle.dir_labels().last().map(String::as_str), Some("w0"));

        assert!(matches!(
            retire_template(&mut bundle, "fitted"),
            Err(SheafError::StructuralInconsistency { .. })
        ));
    }
}
