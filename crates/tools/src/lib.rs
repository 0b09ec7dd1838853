//! Built-in educational tools for TutorLink.
//!
//! The catalog holds the schemas of the note maker, flashcard generator,
//! concept explainer and quiz generator. The tools themselves are external
//! services reached through [`HttpToolInvoker`].

pub mod catalog;
pub mod http;

use tutorlink_core::error::{Error, SchemaError};
use tutorlink_core::registry::SchemaRegistry;

pub use http::HttpToolInvoker;

/// Create a registry holding the built-in schemas.
pub fn default_registry(strict: bool) -> SchemaRegistry {
    let registry = SchemaRegistry::new(strict);
    for schema in catalog::builtin_schemas() {
        // Built-in schemas are covered by catalog tests.
        if let Err(e) = registry.register(schema) {
            tracing::error!(error = %e, "Built-in schema rejected");
        }
    }
    registry
}

/// Create the registry described by the `[registry]` config section:
/// the built-ins, then the optional schema file on top.
pub fn registry_from_config(config: &tutorlink_config::AppConfig) -> Result<SchemaRegistry, Error> {
    let registry = default_registry(config.registry.strict);

    if let Some(path) = &config.registry.schema_file {
        let schemas = tutorlink_config::load_schema_catalog(path).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        for schema in schemas {
            registry.register(schema)?;
        }
        tracing::info!(path = %path.display(), tools = registry.list_ids().len(), "Loaded schema file");
    }

    Ok(registry)
}

/// Every tool id in the registry must have an endpoint to be dispatchable.
pub fn missing_endpoints(
    registry: &SchemaRegistry,
    config: &tutorlink_config::AppConfig,
) -> Vec<String> {
    registry
        .list_ids()
        .into_iter()
        .filter(|id| !config.tools.contains_key(id))
        .collect()
}

/// Re-read the schema file and swap the whole registry in one step.
pub fn reload(registry: &SchemaRegistry, config: &tutorlink_config::AppConfig) -> Result<(), Error> {
    let mut schemas = catalog::builtin_schemas();
    if let Some(path) = &config.registry.schema_file {
        let extra = tutorlink_config::load_schema_catalog(path).map_err(|e| Error::Config {
            message: e.to_string(),
        })?;
        for schema in extra {
            if registry.is_strict() && schemas.iter().any(|s| s.id == schema.id) {
                return Err(SchemaError::DuplicateSchema(schema.id).into());
            }
            match schemas.iter_mut().find(|s| s.id == schema.id) {
                Some(existing) => *existing = schema,
                None => schemas.push(schema),
            }
        }
    }
    registry.replace_all(schemas)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_registry_has_builtins_in_order() {
        let registry = default_registry(false);
        assert_eq!(
            registry.list_ids(),
            vec!["note_maker", "flashcard_generator", "concept_explainer", "quiz_generator"]
        );
    }

    #[test]
    fn default_config_has_every_endpoint() {
        let config = tutorlink_config::AppConfig::default();
        let registry = registry_from_config(&config).unwrap();
        assert!(missing_endpoints(&registry, &config).is_empty());
    }

    #[test]
    fn schema_file_extends_and_overrides() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
[[tools]]
id = "flashcard_generator"
description = "Overridden flashcards"

[[tools.parameters]]
name = "topic"
required = true
type = {{ kind = "text", max_len = 50 }}

[[tools]]
id = "mind_map"
description = "Draws a mind map"
"#
        )
        .unwrap();

        let mut config = tutorlink_config::AppConfig::default();
        config.registry.schema_file = Some(file.path().to_path_buf());

        let registry = registry_from_config(&config).unwrap();
        assert_eq!(registry.list_ids().len(), 5);
        assert_eq!(
            registry.get("flashcard_generator").unwrap().description,
            "Overridden flashcards"
        );
        assert_eq!(missing_endpoints(&registry, &config), vec!["mind_map"]);

        reload(&registry, &config).unwrap();
        assert_eq!(registry.list_ids().len(), 5);
    }

    #[test]
    fn strict_registry_rejects_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "[[tools]]\nid = \"note_maker\"\n").unwrap();

        let mut config = tutorlink_config::AppConfig::default();
        config.registry.strict = true;
        config.registry.schema_file = Some(file.path().to_path_buf());

        let err = registry_from_config(&config).err().unwrap();
        assert!(matches!(err, Error::Schema(SchemaError::DuplicateSchema(_))));
    }
}
