use super::definition::ModelDefinition;
use super::loader::{LoadError, ReferenceTables};
use super::ModelName;
use crate::scoring::RafError;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Caller-constructed set of loaded model definitions, shared read-only across calculations.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<ModelName, Arc<ModelDefinition>>,
}

impl ModelRegistry {
    pub fn bundled() -> Result<Self, LoadError> {
        Self::from_tables(&ReferenceTables::bundled()?)
    }

    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, LoadError> {
        Self::from_tables(&ReferenceTables::from_dir(dir)?)
    }

    pub fn from_tables(tables: &ReferenceTables) -> Result<Self, LoadError> {
        let mut registry = Self::default();
        for model in tables.models() {
            let definition = tables.definition(model)?;
            info!(
                model = %model,
                categories = definition.catalog().len(),
                codes = definition.mapped_code_count(),
                edges = definition.hierarchy().edge_count(),
                coefficients = definition.coefficients().len(),
                rules = definition.rules().len(),
                "model definition loaded"
            );
            registry.insert(definition);
        }
        Ok(registry)
    }

    pub fn from_definitions<I>(definitions: I) -> Self
    where
        I: IntoIterator<Item = ModelDefinition>,
    {
        let mut registry = Self::default();
        for definition in definitions {
            registry.insert(definition);
        }
        registry
    }

    pub fn insert(&mut self, definition: ModelDefinition) {
        self.models.insert(definition.name(), Arc::new(definition));
    }

    /// Fails with a configuration error when the model is recognised but was never loaded.
    pub fn get(&self, model: ModelName) -> Result<Arc<ModelDefinition>, RafError> {
        self.models
            .get(&model)
            .cloned()
            .ok_or(RafError::Configuration { model })
    }

    pub fn contains(&self, model: ModelName) -> bool {
        self.models.contains_key(&model)
    }

    /// Loaded models in catalogue order.
    pub fn models(&self) -> Vec<ModelName> {
        let mut models: Vec<ModelName> = self.models.keys().copied().collect();
        models.sort();
        models
    }
}
