use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::error::{SchemaError, SchemaResult};
use crate::schema::ModelSchema;

/// Explicit name → schema registry.
///
/// Models are registered once at startup; relations name their target by
/// model name and are resolved through here on access.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    models: HashMap<String, Arc<ModelSchema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a schema and returns the shared handle.
    pub fn register(&mut self, schema: ModelSchema) -> SchemaResult<Arc<ModelSchema>> {
        if self.models.contains_key(schema.name()) {
            return Err(SchemaError::AlreadyRegistered(schema.name().to_string()));
        }
        let schema = Arc::new(schema);
        debug!(
            model = schema.name(),
            source = schema.source(),
            properties = schema.len(),
            "registered model schema"
        );
        self.models
            .insert(schema.name().to_string(), Arc::clone(&schema));
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModelSchema>> {
        self.models.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    /// Registered model names, unordered.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
