//! Process-wide registry of virtual schemas.
use crate::errors::{GatewayError, Result};
use crate::schema::Schema;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Schemas known to the gateway, keyed by lowercased name.
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: BTreeMap<String, Arc<Schema>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Names are unique, case insensitively.
    pub fn register(&mut self, schema: Schema) -> Result<Arc<Schema>> {
        let key = schema.name.to_lowercase();
        if self.schemas.contains_key(&key) {
            return Err(GatewayError::DuplicateSchema(schema.name));
        }
        let schema = Arc::new(schema);
        self.schemas.insert(key, schema.clone());
        Ok(schema)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Schema>> {
        self.schemas.get(&name.to_lowercase()).cloned()
    }

    /// Schema names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.schemas.values().map(|s| s.name.clone()).collect()
    }

    pub fn schemas(&self) -> impl Iterator<Item = &Arc<Schema>> {
        self.schemas.values()
    }
}
