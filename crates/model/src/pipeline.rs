use std::{collections::HashMap, sync::Arc};

use tracing::debug;
use volta_discretization::{DiscretizedModel, Mesh};
use volta_symbolic::parameters::ParameterValues;

use crate::{Model, ModelError, Stage};

/// Memoized resolve, simplify, and discretize.
///
/// Simplified models are keyed by the structural hash of the model and of
/// the parameter values, and discretized models additionally by the mesh
/// hash. Parameters declared as runtime inputs stay symbolic, so a sweep
/// over input values reuses one cached discretization.
#[derive(Debug, Default)]
pub struct Pipeline {
    simplified: HashMap<(u64, u64), Arc<Model>>,
    discretized: HashMap<(u64, u64, u64), Arc<Model>>,
}

impl Pipeline {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves and simplifies a constructing model.
    ///
    /// # Errors
    ///
    /// Fails if `model` is not constructing or resolution fails.
    pub fn simplified(
        &mut self,
        model: &Model,
        values: &ParameterValues,
    ) -> Result<Arc<Model>, ModelError> {
        let key = Self::key(model, values)?;
        if let Some(cached) = self.simplified.get(&key) {
            debug!(model = model.name(), "simplify cache hit");
            return Ok(Arc::clone(cached));
        }

        debug!(model = model.name(), "simplify cache miss");
        let simplified = Arc::new(model.resolve(values)?.simplify()?);
        self.simplified.insert(key, Arc::clone(&simplified));
        Ok(simplified)
    }

    /// Resolves, simplifies, and discretizes a constructing model.
    ///
    /// # Errors
    ///
    /// Fails if `model` is not constructing or any stage fails.
    pub fn discretized(
        &mut self,
        model: &Model,
        values: &ParameterValues,
        mesh: &Mesh,
    ) -> Result<Arc<Model>, ModelError> {
        let (model_hash, values_hash) = Self::key(model, values)?;
        let key = (model_hash, values_hash, mesh.structural_hash());
        if let Some(cached) = self.discretized.get(&key) {
            debug!(model = model.name(), "discretize cache hit");
            return Ok(Arc::clone(cached));
        }

        let simplified = self.simplified(model, values)?;
        debug!(model = model.name(), "discretize cache miss");
        let discretized = Arc::new(simplified.discretize(mesh)?);
        self.discretized.insert(key, Arc::clone(&discretized));
        Ok(discretized)
    }

    /// Like [`Pipeline::discretized`], returning the numeric model only.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::discretized`].
    pub fn build(
        &mut self,
        model: &Model,
        values: &ParameterValues,
        mesh: &Mesh,
    ) -> Result<Arc<DiscretizedModel>, ModelError> {
        let discretized = self.discretized(model, values, mesh)?;
        discretized
            .discretized()
            .cloned()
            .ok_or(ModelError::InvalidTransition {
                from: discretized.stage(),
                to: Stage::Discretized,
            })
    }

    /// Number of cached discretizations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.discretized.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.discretized.is_empty() && self.simplified.is_empty()
    }

    pub fn clear(&mut self) {
        self.simplified.clear();
        self.discretized.clear();
    }

    fn key(model: &Model, values: &ParameterValues) -> Result<(u64, u64), ModelError> {
        let system = model.symbolic(Stage::Constructing, Stage::Resolved)?;
        Ok((system.structural_hash(), values.structural_hash()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use volta_symbolic::{Domain, Symbol, parameters::ParameterValue};

    fn decay() -> Model {
        let c = Symbol::variable("c", Domain::empty());
        let rate = c.clone().mul(Symbol::parameter("k")).unwrap().neg();
        let mut model = Model::new("decay");
        model
            .add_rhs(c.clone(), rate)
            .unwrap()
            .set_initial_condition(&c, 1.0)
            .unwrap();
        model
    }

    #[test]
    fn repeated_builds_share_one_model() {
        let mut values = ParameterValues::new();
        values.set("k", ParameterValue::Input);

        let mut pipeline = Pipeline::new();
        let first = pipeline.build(&decay(), &values, &Mesh::default()).unwrap();
        let second = pipeline.build(&decay(), &values, &Mesh::default()).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(pipeline.len(), 1);
    }

    #[test]
    fn new_parameter_values_miss_the_cache() {
        let mut pipeline = Pipeline::new();
        let mut values = ParameterValues::new();
        values.set("k", 1.0);
        let first = pipeline.build(&decay(), &values, &Mesh::default()).unwrap();

        values.set("k", 2.0);
        let second = pipeline.build(&decay(), &values, &Mesh::default()).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(pipeline.len(), 2);

        pipeline.clear();
        assert!(pipeline.is_empty());
    }

    #[test]
    fn only_constructing_models_are_built() {
        let mut values = ParameterValues::new();
        values.set("k", 1.0);
        let resolved = decay().resolve(&values).unwrap();

        assert!(matches!(
            Pipeline::new().simplified(&resolved, &values),
            Err(ModelError::InvalidTransition {
                from: Stage::Resolved,
                ..
            })
        ));
    }
}
