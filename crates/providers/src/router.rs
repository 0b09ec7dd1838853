//! Oracle router: selects the oracle backend based on config.
//!
//! Handles oracle creation and wraps the selected backend in the retry
//! policy from the `[oracle]` section.

use std::collections::HashMap;
use std::sync::Arc;
use tutorlink_core::provider::Oracle;
use crate::openai_compat::OpenAiCompatOracle;
use crate::retry::RetryingOracle;

/// Holds every configured oracle backend by name.
pub struct OracleRouter {
    oracles: HashMap<String, Arc<dyn Oracle>>,
    default_oracle: String,
}

impl OracleRouter {
    /// Create a new router with a default backend name.
    pub fn new(default_oracle: impl Into<String>) -> Self {
        Self {
            oracles: HashMap::new(),
            default_oracle: default_oracle.into(),
        }
    }

    /// Register an oracle.
    pub fn register(&mut self, name: impl Into<String>, oracle: Arc<dyn Oracle>) {
        self.oracles.insert(name.into(), oracle);
    }

    /// Get the default oracle.
    pub fn default(&self) -> Option<Arc<dyn Oracle>> {
        self.oracles.get(&self.default_oracle).cloned()
    }

    /// Get a specific oracle by name.
    pub fn get(&self, name: &str) -> Option<Arc<dyn Oracle>> {
        self.oracles.get(name).cloned()
    }

    /// List all registered oracle names.
    pub fn list(&self) -> Vec<&str> {
        self.oracles.keys().map(|s| s.as_str()).collect()
    }
}

/// Build every configured oracle backend.
pub fn build_from_config(config: &tutorlink_config::AppConfig) -> OracleRouter {
    let mut router = OracleRouter::new(&config.default_provider);

    for (name, provider_config) in &config.providers {
        let api_key = provider_config
            .api_key
            .clone()
            .or_else(|| config.api_key.clone())
            .unwrap_or_default();

        let base_url = provider_config
            .api_url
            .clone()
            .unwrap_or_else(|| default_base_url(name));

        router.register(
            name.clone(),
            Arc::new(OpenAiCompatOracle::new(name, &base_url, &api_key)),
        );
    }

    // Ensure the default backend exists (even if not explicitly configured)
    if router.get(&config.default_provider).is_none() {
        let api_key = config.api_key.clone().unwrap_or_default();
        let base_url = default_base_url(&config.default_provider);
        router.register(
            config.default_provider.clone(),
            Arc::new(OpenAiCompatOracle::new(&config.default_provider, &base_url, &api_key)),
        );
    }

    router
}

/// The default backend wrapped in the configured retry policy.
pub fn build_oracle(config: &tutorlink_config::AppConfig) -> Option<Arc<dyn Oracle>> {
    let inner = build_from_config(config).default()?;
    Some(Arc::new(RetryingOracle::from_config(inner, &config.oracle)))
}

/// Get the default base URL for well-known providers.
fn default_base_url(provider_name: &str) -> String {
    match provider_name {
        "openrouter" => "https://openrouter.ai/api/v1".into(),
        "openai" => "https://api.openai.com/v1".into(),
        "ollama" => "http://localhost:11434/v1".into(),
        "deepseek" => "https://api.deepseek.com/v1".into(),
        "groq" => "https://api.groq.com/openai/v1".into(),
        "together" => "https://api.together.xyz/v1".into(),
        "vllm" => "http://localhost:8000/v1".into(),
        "llamacpp" | "llama.cpp" => "http://localhost:8080/v1".into(),
        _ => format!("https://{provider_name}.api.example.com/v1"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tutorlink_config::{AppConfig, ProviderConfig};

    #[test]
    fn router_register_and_lookup() {
        let mut router = OracleRouter::new("openai");
        router.register("openai", Arc::new(OpenAiCompatOracle::openai("sk-test")));

        assert!(router.get("openai").is_some());
        assert!(router.get("nonexistent").is_none());
        assert!(router.default().is_some());
    }

    #[test]
    fn default_base_urls() {
        assert!(default_base_url("openrouter").contains("openrouter.ai"));
        assert!(default_base_url("openai").contains("api.openai.com"));
        assert!(default_base_url("ollama").contains("localhost:11434"));
    }

    #[test]
    fn build_from_default_config() {
        let config = AppConfig::default();
        let router = build_from_config(&config);
        assert!(router.default().is_some());
        assert_eq!(router.list(), vec!["openai"]);
    }

    #[test]
    fn configured_providers_are_registered() {
        let mut config = AppConfig::default();
        config.default_provider = "ollama".into();
        config.providers.insert(
            "ollama".into(),
            ProviderConfig {
                api_url: Some("http://gpu-box:11434/v1".into()),
                ..Default::default()
            },
        );
        let router = build_from_config(&config);
        assert_eq!(router.default().unwrap().name(), "ollama");
    }

    #[test]
    fn build_oracle_wraps_default() {
        let oracle = build_oracle(&AppConfig::default()).unwrap();
        assert_eq!(oracle.name(), "openai");
    }
}
