//! Schema registry: the read-mostly set of known tools.
//!
//! Readers take an `Arc` to an immutable [`RegistrySnapshot`]; writers build
//! a new snapshot and swap it in under the write lock. A request that grabbed
//! a snapshot keeps seeing it even if the registry is reloaded mid-flight.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::SchemaError;
use crate::schema::ToolSchema;

/// An immutable view of the registry at one point in time.
#[derive(Debug, Default, Clone)]
pub struct RegistrySnapshot {
    order: Vec<String>,
    schemas: HashMap<String, Arc<ToolSchema>>,
}

impl RegistrySnapshot {
    /// Look up a schema by tool id.
    pub fn get(&self, tool_id: &str) -> Result<Arc<ToolSchema>, SchemaError> {
        self.schemas
            .get(tool_id)
            .cloned()
            .ok_or_else(|| SchemaError::UnknownTool(tool_id.to_string()))
    }

    /// Registered ids in registration order.
    pub fn ids(&self) -> &[String] {
        &self.order
    }

    /// Schemas in registration order.
    pub fn schemas(&self) -> Vec<Arc<ToolSchema>> {
        self.order
            .iter()
            .filter_map(|id| self.schemas.get(id).cloned())
            .collect()
    }

    /// The schemas named in `tool_ids`, once each, in registration order.
    /// Fails on the first id that is not registered.
    pub fn restrict(&self, tool_ids: &[String]) -> Result<Vec<Arc<ToolSchema>>, SchemaError> {
        if let Some(unknown) = tool_ids.iter().find(|id| !self.schemas.contains_key(id.as_str())) {
            return Err(SchemaError::UnknownTool(unknown.clone()));
        }
        Ok(self
            .order
            .iter()
            .filter(|id| tool_ids.contains(id))
            .filter_map(|id| self.schemas.get(id).cloned())
            .collect())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    fn insert(&mut self, schema: ToolSchema) {
        let id = schema.id.clone();
        if self.schemas.insert(id.clone(), Arc::new(schema)).is_none() {
            self.order.push(id);
        }
    }
}

/// Holds every tool schema.
///
/// In strict mode re-registering an id fails; otherwise it replaces the old
/// schema in place, keeping its registration position.
pub struct SchemaRegistry {
    strict: bool,
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl SchemaRegistry {
    pub fn new(strict: bool) -> Self {
        Self {
            strict,
            current: RwLock::new(Arc::new(RegistrySnapshot::default())),
        }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Validate and add a schema.
    pub fn register(&self, schema: ToolSchema) -> Result<(), SchemaError> {
        schema.validate()?;
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if self.strict && guard.schemas.contains_key(&schema.id) {
            return Err(SchemaError::DuplicateSchema(schema.id));
        }
        let mut next = RegistrySnapshot::clone(&guard);
        tracing::debug!(tool_id = %schema.id, params = schema.parameters.len(), "Registering tool schema");
        next.insert(schema);
        *guard = Arc::new(next);
        Ok(())
    }

    /// Replace the whole registry in one swap. Nothing changes if any schema
    /// is invalid.
    pub fn replace_all(&self, schemas: Vec<ToolSchema>) -> Result<(), SchemaError> {
        let mut next = RegistrySnapshot::default();
        for schema in schemas {
            schema.validate()?;
            if self.strict && next.schemas.contains_key(&schema.id) {
                return Err(SchemaError::DuplicateSchema(schema.id));
            }
            next.insert(schema);
        }
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        *guard = Arc::new(next);
        Ok(())
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn get(&self, tool_id: &str) -> Result<Arc<ToolSchema>, SchemaError> {
        self.snapshot().get(tool_id)
    }

    /// Registered ids in registration order.
    pub fn list_ids(&self) -> Vec<String> {
        self.snapshot().ids().to_vec()
    }
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ParamType, ParameterSpec};

    fn schema(id: &str, description: &str) -> ToolSchema {
        ToolSchema::new(id, description)
            .param(ParameterSpec::required("topic", "", ParamType::text(1, 200)))
    }

    #[test]
    fn register_and_lookup() {
        let registry = SchemaRegistry::default();
        registry.register(schema("note_maker", "notes")).unwrap();
        assert!(registry.get("note_maker").is_ok());
        assert_eq!(
            registry.get("missing").unwrap_err(),
            SchemaError::UnknownTool("missing".into())
        );
    }

    #[test]
    fn list_ids_keeps_registration_order() {
        let registry = SchemaRegistry::default();
        for id in ["b_tool", "a_tool", "c_tool"] {
            registry.register(schema(id, "")).unwrap();
        }
        assert_eq!(registry.list_ids(), vec!["b_tool", "a_tool", "c_tool"]);
    }

    #[test]
    fn restrict_follows_registration_order_once() {
        let registry = SchemaRegistry::default();
        for id in ["flashcard_generator", "note_maker", "quiz_generator"] {
            registry.register(schema(id, "")).unwrap();
        }
        let snapshot = registry.snapshot();

        let ids = |schemas: Vec<Arc<ToolSchema>>| schemas.iter().map(|s| s.id.clone()).collect::<Vec<_>>();
        let requested = vec!["quiz_generator".to_string(), "flashcard_generator".to_string(), "quiz_generator".to_string()];
        assert_eq!(
            ids(snapshot.restrict(&requested).unwrap()),
            vec!["flashcard_generator", "quiz_generator"]
        );
        assert_eq!(
            snapshot.restrict(&["mind_map".to_string()]).unwrap_err(),
            SchemaError::UnknownTool("mind_map".into())
        );
    }

    #[test]
    fn lenient_mode_overwrites_in_place() {
        let registry = SchemaRegistry::new(false);
        registry.register(schema("a", "old")).unwrap();
        registry.register(schema("b", "")).unwrap();
        registry.register(schema("a", "new")).unwrap();
        assert_eq!(registry.get("a").unwrap().description, "new");
        assert_eq!(registry.list_ids(), vec!["a", "b"]);
    }

    #[test]
    fn strict_mode_rejects_duplicates() {
        let registry = SchemaRegistry::new(true);
        registry.register(schema("a", "")).unwrap();
        assert_eq!(
            registry.register(schema("a", "")).unwrap_err(),
            SchemaError::DuplicateSchema("a".into())
        );
    }

    #[test]
    fn invalid_schema_is_rejected() {
        let registry = SchemaRegistry::default();
        let bad = ToolSchema::new("bad", "").param(ParameterSpec::required("n", "", ParamType::int_range(3, 1)));
        assert!(matches!(registry.register(bad), Err(SchemaError::InvalidSchema { .. })));
        assert!(registry.list_ids().is_empty());
    }

    #[test]
    fn snapshot_survives_reload() {
        let registry = SchemaRegistry::default();
        registry.register(schema("a", "first")).unwrap();
        let held = registry.snapshot();

        registry.replace_all(vec![schema("z", "")]).unwrap();

        assert_eq!(held.get("a").unwrap().description, "first");
        assert!(held.get("z").is_err());
        assert_eq!(registry.list_ids(), vec!["z"]);
    }
}
