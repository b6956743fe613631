//! Parallelotope bundles: a shared direction matrix, paired offsets and
//! the templates tying them into parallelotopes.
//!
//! A bundle over `R^d` keeps `n >= d` directions `L_i` with upper and
//! lower offsets bounding `L_i . x <= offu_i` and `-L_i . x <= offl_i`,
//! plus templates that each pick `d` independent directions to form a
//! [`Parallelotope`]. The represented set is the intersection of all
//! `2 n` half-spaces. Directions and templates carry labels so adaptive
//! strategies can retire exactly what they installed, regardless of
//! index shifts in between.

use std::fmt;
use std::sync::Arc;

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, SheafError};
use crate::linear_system::LinearSystem;
use crate::parallelotope::Parallelotope;
use crate::traits::Model;

/// Templates whose direction matrix has |det| below this are rejected.
const SINGULAR_EPS: f64 = 1e-12;

/// A parallelotope bundle attached to a dynamical model.
#[derive(Clone)]
pub struct Bundle {
    model: Arc<dyn Model>,
    directions: Vec<DVector<f64>>,
    offu: Vec<f64>,
    offl: Vec<f64>,
    dir_labels: Vec<String>,
    templates: Vec<Vec<usize>>,
    template_labels: Vec<String>,
}

impl Bundle {
    /// Creates a bundle, validating shapes, template indices and
    /// template independence. Directions get labels `L0, L1, ...` and
    /// templates `T0, T1, ...`.
    pub fn new(
        model: Arc<dyn Model>,
        directions: Vec<DVector<f64>>,
        offu: Vec<f64>,
        offl: Vec<f64>,
        templates: Vec<Vec<usize>>,
    ) -> Result<Self> {
        let dim = model.dim();
        if directions.is_empty() {
            return Err(SheafError::structural("bundle needs at least one direction"));
        }
        for dir in &directions {
            if dir.len() != dim {
                return Err(SheafError::DimensionMismatch {
                    what: "direction",
                    expected: dim,
                    found: dir.len(),
                });
            }
        }
        if offu.len() != directions.len() {
            return Err(SheafError::DimensionMismatch {
                what: "upper offsets",
                expected: directions.len(),
                found: offu.len(),
            });
        }
        if offl.len() != directions.len() {
            return Err(SheafError::DimensionMismatch {
                what: "lower offsets",
                expected: directions.len(),
                found: offl.len(),
            });
        }
        if offu.iter().chain(offl.iter()).any(|v| !v.is_finite()) {
            return Err(SheafError::structural("offsets must be finite"));
        }
        if templates.is_empty() {
            return Err(SheafError::structural("bundle needs at least one template"));
        }
        for (t, template) in templates.iter().enumerate() {
            check_template(&directions, template, &format!("T{t}"), dim)?;
        }

        let dir_labels = (0..directions.len()).map(|i| format!("L{i}")).collect();
        let template_labels = (0..templates.len()).map(|t| format!("T{t}")).collect();
        Ok(Bundle {
            model,
            directions,
            offu,
            offl,
            dir_labels,
            templates,
            template_labels,
        })
    }

    /// State-space dimension.
    pub fn dim(&self) -> usize {
        self.model.dim()
    }

    /// The model whose dynamics transform this bundle.
    pub fn model(&self) -> &dyn Model {
        self.model.as_ref()
    }

    /// Number of directions.
    pub fn num_directions(&self) -> usize {
        self.directions.len()
    }

    /// Number of templates.
    pub fn num_templates(&self) -> usize {
        self.templates.len()
    }

    /// Direction row `index`.
    pub fn direction(&self, index: usize) -> &DVector<f64> {
        &self.directions[index]
    }

    /// All direction rows.
    pub fn directions(&self) -> &[DVector<f64>] {
        &self.directions
    }

    /// Upper offsets, one per direction.
    pub fn offu(&self) -> &[f64] {
        &self.offu
    }

    /// Lower offsets, one per direction.
    pub fn offl(&self) -> &[f64] {
        &self.offl
    }

    /// Direction labels, parallel to [`Bundle::directions`].
    pub fn dir_labels(&self) -> &[String] {
        &self.dir_labels
    }

    /// Template `index` as direction indices.
    pub fn template(&self, index: usize) -> &[usize] {
        &self.templates[index]
    }

    /// All templates.
    pub fn templates(&self) -> &[Vec<usize>] {
        &self.templates
    }

    /// Template labels, parallel to [`Bundle::templates`].
    pub fn template_labels(&self) -> &[String] {
        &self.template_labels
    }

    /// Index of the template carrying `label`, if present.
    pub fn template_index_of(&self, label: &str) -> Option<usize> {
        self.template_labels.iter().position(|l| l == label)
    }

    /// Indices of all templates whose label starts with `prefix`, in
    /// template order. Strategies label what they install, so this
    /// recovers one strategy's live templates.
    pub fn templates_labeled_with(&self, prefix: &str) -> Vec<usize> {
        self.template_labels
            .iter()
            .enumerate()
            .filter(|(_, l)| l.starts_with(prefix))
            .map(|(i, _)| i)
            .collect()
    }

    /// True iff some template references direction `index`.
    pub fn direction_referenced(&self, index: usize) -> bool {
        self.templates.iter().any(|t| t.contains(&index))
    }

    /// The intersection polytope of all `2 n` half-spaces.
    pub fn intersection_polytope(&self) -> LinearSystem {
        let n = self.num_directions();
        let dim = self.dim();
        let mut a = DMatrix::zeros(2 * n, dim);
        let mut b = DVector::zeros(2 * n);
        for (i, dir) in self.directions.iter().enumerate() {
            for j in 0..dim {
                a[(i, j)] = dir[j];
                a[(n + i, j)] = -dir[j];
            }
            b[i] = self.offu[i];
            b[n + i] = self.offl[i];
        }
        LinearSystem::from_parts(a, b)
    }

    /// Tightens every offset against the intersection polytope.
    ///
    /// Offsets only shrink or stay put, the represented set is
    /// unchanged, and applying this twice equals applying it once. On
    /// error (e.g. an empty intersection) the bundle is left untouched.
    pub fn canonize(&mut self) -> Result<()> {
        let sys = self.intersection_polytope();
        let mut new_offu = Vec::with_capacity(self.directions.len());
        let mut new_offl = Vec::with_capacity(self.directions.len());
        for dir in &self.directions {
            new_offu.push(sys.max_opt(dir)?.value);
            new_offl.push(sys.max_opt(&dir.map(|v| -v))?.value);
        }
        self.offu = new_offu;
        self.offl = new_offl;
        Ok(())
    }

    /// Builds the parallelotope of template `index` from the current
    /// offsets.
    pub fn parallelotope(&self, index: usize) -> Result<Parallelotope> {
        let template = self.templates.get(index).ok_or_else(|| {
            SheafError::structural(format!(
                "template index {index} out of range ({} templates)",
                self.templates.len()
            ))
        })?;
        let dim = self.dim();
        let mut a = DMatrix::zeros(2 * dim, dim);
        let mut b = DVector::zeros(2 * dim);
        for (row, &dir_idx) in template.iter().enumerate() {
            let dir = &self.directions[dir_idx];
            for j in 0..dim {
                a[(row, j)] = dir[j];
                a[(dim + row, j)] = -dir[j];
            }
            b[row] = self.offu[dir_idx];
            b[dim + row] = self.offl[dir_idx];
        }
        Parallelotope::from_halfspaces(a, b)
    }

    /// Appends directions with the given labels, initializing their
    /// offsets by optimizing against the current intersection polytope.
    /// Returns the indices assigned to the new directions.
    ///
    /// The represented set is unchanged: the new half-spaces are tight
    /// against the existing polytope, not tighter.
    pub fn add_directions(
        &mut self,
        directions: Vec<DVector<f64>>,
        labels: Vec<String>,
    ) -> Result<Vec<usize>> {
        if labels.len() != directions.len() {
            return Err(SheafError::DimensionMismatch {
                what: "direction labels",
                expected: directions.len(),
                found: labels.len(),
            });
        }
        for dir in &directions {
            if dir.len() != self.dim() {
                return Err(SheafError::DimensionMismatch {
                    what: "direction",
                    expected: self.dim(),
                    found: dir.len(),
                });
            }
        }
        for (i, label) in labels.iter().enumerate() {
            if self.dir_labels.contains(label) || labels[..i].contains(label) {
                return Err(SheafError::structural(format!(
                    "duplicate direction label '{label}'"
                )));
            }
        }

        let sys = self.intersection_polytope();
        let mut new_offu = Vec::with_capacity(directions.len());
        let mut new_offl = Vec::with_capacity(directions.len());
        for dir in &directions {
            new_offu.push(sys.max_opt(dir)?.value);
            new_offl.push(sys.max_opt(&dir.map(|v| -v))?.value);
        }

        let start = self.directions.len();
        self.directions.extend(directions);
        self.offu.extend(new_offu);
        self.offl.extend(new_offl);
        self.dir_labels.extend(labels);
        Ok((start..self.directions.len()).collect())
    }

    /// Removes the given directions. Every index must be unreferenced
    /// by all templates; remaining template entries are shifted down to
    /// account for the removals.
    pub fn remove_directions(&mut self, indices: &[usize]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&bad) = sorted.iter().find(|&&i| i >= self.num_directions()) {
            return Err(SheafError::structural(format!(
                "direction index {bad} out of range ({} directions)",
                self.num_directions()
            )));
        }
        if sorted.len() == self.num_directions() {
            return Err(SheafError::structural(
                "removing every direction would leave the bundle empty",
            ));
        }
        for (t, template) in self.templates.iter().enumerate() {
            if let Some(&hit) = template.iter().find(|&&e| sorted.binary_search(&e).is_ok()) {
                return Err(SheafError::structural(format!(
                    "direction {hit} is still referenced by template '{}'",
                    self.template_labels[t]
                )));
            }
        }
        for &idx in sorted.iter().rev() {
            self.directions.remove(idx);
            self.offu.remove(idx);
            self.offl.remove(idx);
            self.dir_labels.remove(idx);
        }
        for template in &mut self.templates {
            for entry in template.iter_mut() {
                *entry -= sorted.partition_point(|&removed| removed < *entry);
            }
        }
        Ok(())
    }

    /// Appends a template over existing directions and returns its
    /// index.
    pub fn add_template(&mut self, entries: Vec<usize>, label: String) -> Result<usize> {
        check_template(&self.directions, &entries, &label, self.dim())?;
        if self.template_labels.contains(&label) {
            return Err(SheafError::structural(format!(
                "duplicate template label '{label}'"
            )));
        }
        self.templates.push(entries);
        self.template_labels.push(label);
        Ok(self.templates.len() - 1)
    }

    /// Removes the given templates. Directions they referenced stay in
    /// the bundle; at least one template must survive.
    pub fn remove_templates(&mut self, indices: &[usize]) -> Result<()> {
        if indices.is_empty() {
            return Ok(());
        }
        let mut sorted = indices.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        if let Some(&bad) = sorted.iter().find(|&&i| i >= self.num_templates()) {
            return Err(SheafError::structural(format!(
                "template index {bad} out of range ({} templates)",
                self.num_templates()
            )));
        }
        if sorted.len() == self.num_templates() {
            return Err(SheafError::structural(
                "removing every template would leave the bundle empty",
            ));
        }
        for &idx in sorted.iter().rev() {
            self.templates.remove(idx);
            self.template_labels.remove(idx);
        }
        Ok(())
    }

    pub(crate) fn set_offsets(&mut self, offu: Vec<f64>, offl: Vec<f64>) {
        debug_assert_eq!(offu.len(), self.directions.len());
        debug_assert_eq!(offl.len(), self.directions.len());
        self.offu = offu;
        self.offl = offl;
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("model", &self.model.name())
            .field("dim", &self.dim())
            .field("num_directions", &self.num_directions())
            .field("num_templates", &self.num_templates())
            .finish()
    }
}

fn check_template(
    directions: &[DVector<f64>],
    entries: &[usize],
    label: &str,
    dim: usize,
) -> Result<()> {
    if entries.len() != dim {
        return Err(SheafError::DimensionMismatch {
            what: "template",
            expected: dim,
            found: entries.len(),
        });
    }
    if let Some(&bad) = entries.iter().find(|&&e| e >= directions.len()) {
        return Err(SheafError::structural(format!(
            "template '{label}' references direction {bad} of {}",
            directions.len()
        )));
    }
    let matrix = DMatrix::from_fn(dim, dim, |r, c| directions[entries[r]][c]);
    if matrix.determinant().abs() <= SINGULAR_EPS {
        return Err(SheafError::singular(format!(
            "template '{label}' selects linearly dependent directions"
        )));
    }
    Ok(())
}
