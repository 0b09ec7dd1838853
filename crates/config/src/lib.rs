//! Configuration loading, validation, and management for TutorLink.
//!
//! Loads configuration from `~/.tutorlink/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tutorlink_core::ToolSchema;

/// The root configuration structure.
///
/// Maps directly to `~/.tutorlink/config.toml`.
#[derive(Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// API key (can be overridden per-provider)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Default oracle provider
    #[serde(default = "default_provider")]
    pub default_provider: String,

    /// Default model
    #[serde(default = "default_model")]
    pub default_model: String,

    /// Sampling temperature for oracle calls
    #[serde(default = "default_temperature")]
    pub default_temperature: f32,

    /// Max tokens per oracle response
    #[serde(default = "default_max_tokens")]
    pub default_max_tokens: u32,

    /// Provider-specific configurations
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,

    /// Per-call timeout and retry budget
    #[serde(default)]
    pub oracle: OracleConfig,

    #[serde(default)]
    pub classifier: ClassifierConfig,

    #[serde(default)]
    pub extractor: ExtractorConfig,

    #[serde(default)]
    pub registry: RegistryConfig,

    /// Tool endpoints keyed by tool id
    #[serde(default = "default_tools")]
    pub tools: HashMap<String, ToolEndpointConfig>,

    #[serde(default)]
    pub gateway: GatewayConfig,

    #[serde(default)]
    pub sessions: SessionConfig,
}

fn default_provider() -> String {
    "openai".into()
}
fn default_model() -> String {
    "gpt-4o-mini".into()
}
fn default_temperature() -> f32 {
    0.1
}
fn default_max_tokens() -> u32 {
    1024
}

/// Redact a secret for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_key", &redact(&self.api_key))
            .field("default_provider", &self.default_provider)
            .field("default_model", &self.default_model)
            .field("default_temperature", &self.default_temperature)
            .field("default_max_tokens", &self.default_max_tokens)
            .field("providers", &self.providers)
            .field("oracle", &self.oracle)
            .field("classifier", &self.classifier)
            .field("extractor", &self.extractor)
            .field("registry", &self.registry)
            .field("tools", &self.tools)
            .field("gateway", &self.gateway)
            .field("sessions", &self.sessions)
            .finish()
    }
}

#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("default_model", &self.default_model)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    #[serde(default = "default_oracle_timeout")]
    pub timeout_secs: u64,

    /// Extra attempts after the first failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Base delay, doubled per retry
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_oracle_timeout() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    2
}
fn default_backoff_ms() -> u64 {
    250
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_oracle_timeout(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Number of recent turns included in the classification prompt
    #[serde(default = "default_history_window")]
    pub history_window: usize,

    /// Below this the controller reports no intent
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
}

fn default_history_window() -> usize {
    6
}
fn default_confidence_threshold() -> f64 {
    0.5
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            history_window: default_history_window(),
            confidence_threshold: default_confidence_threshold(),
        }
    }
}

/// How the extractor talks to the oracle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionStrategy {
    /// One oracle call per field, run concurrently
    #[default]
    PerField,
    /// One combined oracle call for all fields
    Batched,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Maximum in-flight oracle calls per request
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Confidence assigned to profile-derived values
    #[serde(default = "default_inferred_confidence")]
    pub inferred_confidence: f64,

    #[serde(default)]
    pub strategy: ExtractionStrategy,

    #[serde(default = "default_history_window")]
    pub history_window: usize,
}

fn default_max_concurrency() -> usize {
    4
}
fn default_inferred_confidence() -> f64 {
    0.6
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            inferred_confidence: default_inferred_confidence(),
            strategy: ExtractionStrategy::default(),
            history_window: default_history_window(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Reject re-registration of an existing tool id
    #[serde(default)]
    pub strict: bool,

    /// TOML catalog registered on top of the built-in tools
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEndpointConfig {
    pub url: String,

    #[serde(default = "default_tool_timeout")]
    pub timeout_secs: u64,
}

fn default_tool_timeout() -> u64 {
    30
}

fn default_tools() -> HashMap<String, ToolEndpointConfig> {
    [
        ("note_maker", 8001),
        ("flashcard_generator", 8002),
        ("concept_explainer", 8003),
        ("quiz_generator", 8004),
    ]
    .into_iter()
    .map(|(id, port)| {
        (
            id.to_string(),
            ToolEndpointConfig {
                url: format!("http://localhost:{port}"),
                timeout_secs: default_tool_timeout(),
            },
        )
    })
    .collect()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,

    /// Requests per minute per client; 0 disables limiting
    #[serde(default = "default_rate_limit")]
    pub rate_limit_per_minute: u32,

    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_port() -> u16 {
    8000
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_rate_limit() -> u32 {
    60
}
fn default_max_body_bytes() -> usize {
    1024 * 1024
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            rate_limit_per_minute: default_rate_limit(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Upper bound on `sessions.timeout_minutes` (one year).
pub const MAX_SESSION_TIMEOUT_MINUTES: u64 = 525_600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_timeout")]
    pub timeout_minutes: u64,

    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

fn default_session_timeout() -> u64 {
    120
}
fn default_max_history() -> usize {
    50
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: default_session_timeout(),
            max_history: default_max_history(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location with env var overrides.
    ///
    /// Priority: env vars > config file > defaults
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_path();
        let mut config = Self::load_from(&config_path)?;

        if config.api_key.is_none() {
            config.api_key = std::env::var("TUTORLINK_API_KEY")
                .ok()
                .or_else(|| std::env::var("OPENAI_API_KEY").ok());
        }

        if let Ok(provider) = std::env::var("TUTORLINK_PROVIDER") {
            config.default_provider = provider;
        }

        if let Ok(model) = std::env::var("TUTORLINK_MODEL") {
            config.default_model = model;
        }

        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::info!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".tutorlink")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=2.0).contains(&self.default_temperature) {
            return Err(ConfigError::ValidationError(
                "default_temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.classifier.confidence_threshold) {
            return Err(ConfigError::ValidationError(
                "classifier.confidence_threshold must be between 0.0 and 1.0".into(),
            ));
        }

        if self.classifier.history_window == 0 || self.extractor.history_window == 0 {
            return Err(ConfigError::ValidationError(
                "history_window must be at least 1".into(),
            ));
        }

        if self.extractor.max_concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "extractor.max_concurrency must be at least 1".into(),
            ));
        }

        if !(0.0..=1.0).contains(&self.extractor.inferred_confidence) {
            return Err(ConfigError::ValidationError(
                "extractor.inferred_confidence must be between 0.0 and 1.0".into(),
            ));
        }

        if !(1..=MAX_SESSION_TIMEOUT_MINUTES).contains(&self.sessions.timeout_minutes) {
            return Err(ConfigError::ValidationError(format!(
                "sessions.timeout_minutes must be between 1 and {MAX_SESSION_TIMEOUT_MINUTES}"
            )));
        }

        if self.sessions.max_history == 0 {
            return Err(ConfigError::ValidationError(
                "sessions.max_history must be at least 1".into(),
            ));
        }

        if self.oracle.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "oracle.timeout_secs must be at least 1".into(),
            ));
        }

        for (tool_id, endpoint) in &self.tools {
            if !(endpoint.url.starts_with("http://") || endpoint.url.starts_with("https://")) {
                return Err(ConfigError::ValidationError(format!(
                    "tools.{tool_id}.url must be an http(s) URL, got '{}'",
                    endpoint.url
                )));
            }
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
            || self
                .providers
                .get(&self.default_provider)
                .is_some_and(|p| p.api_key.is_some())
    }

    /// Generate a default config TOML string.
    pub fn default_toml() -> String {
        let config = Self::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            default_provider: default_provider(),
            default_model: default_model(),
            default_temperature: default_temperature(),
            default_max_tokens: default_max_tokens(),
            providers: HashMap::new(),
            oracle: OracleConfig::default(),
            classifier: ClassifierConfig::default(),
            extractor: ExtractorConfig::default(),
            registry: RegistryConfig::default(),
            tools: default_tools(),
            gateway: GatewayConfig::default(),
            sessions: SessionConfig::default(),
        }
    }
}

/// A TOML file of tool schemas (`[[tools]]` tables).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaCatalog {
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
}

/// Read a schema catalog. Schemas are validated when registered, not here.
pub fn load_schema_catalog(path: &Path) -> Result<Vec<ToolSchema>, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let catalog: SchemaCatalog = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    tracing::debug!(path = %path.display(), tools = catalog.tools.len(), "Loaded schema catalog");
    Ok(catalog.tools)
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
