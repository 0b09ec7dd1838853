//! Oracle trait: the abstraction over language-model backends.
//!
//! The oracle is a black box: it receives a prompt and answers with text.
//! Nothing it returns is trusted; the engine parses, coerces and validates
//! every answer before using it.
//!
//! Implementations: OpenAI-compatible endpoints, the retrying wrapper, and
//! deterministic stubs in tests.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::OracleError;
use crate::message::Message;

/// Output constraint passed alongside the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Text,
    /// A single JSON object
    Json,
}

/// A single oracle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleRequest {
    /// The model to use (e.g., "gpt-4o-mini")
    pub model: String,

    /// The prompt, as chat messages
    pub messages: Vec<Message>,

    /// Temperature (0.0 = deterministic, 1.0 = creative)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Requested response shape
    #[serde(default)]
    pub format: ResponseFormat,
}

fn default_temperature() -> f32 {
    0.1
}

impl OracleRequest {
    /// A JSON-constrained request with a system instruction and a user prompt.
    pub fn json(model: impl Into<String>, system: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            messages: vec![Message::system(system), Message::user(prompt)],
            temperature: default_temperature(),
            max_tokens: None,
            format: ResponseFormat::Json,
        }
    }

    /// The final user prompt text, if any.
    pub fn prompt(&self) -> &str {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == crate::message::Role::User)
            .map(|m| m.content.as_str())
            .unwrap_or("")
    }
}

/// The oracle's answer. Untrusted text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Raw generated text
    pub content: String,

    /// Which model actually responded (may differ from requested)
    pub model: String,

    /// Token usage statistics
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
}

impl OracleResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            model: String::new(),
            usage: None,
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// The core Oracle trait.
///
/// The classifier and the extractor call `complete()` without knowing which
/// backend answers.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// A human-readable name for this oracle (e.g., "openai").
    fn name(&self) -> &str;

    /// Send a request and get a complete response.
    async fn complete(&self, request: OracleRequest) -> std::result::Result<OracleResponse, OracleError>;

    /// Whether the oracle is reachable.
    async fn health_check(&self) -> std::result::Result<bool, OracleError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_request_defaults() {
        let req = OracleRequest::json("gpt-4o-mini", "sys", "classify this");
        assert_eq!(req.format, ResponseFormat::Json);
        assert!((req.temperature - 0.1).abs() < f32::EPSILON);
        assert_eq!(req.prompt(), "classify this");
    }

    #[test]
    fn request_serialization() {
        let req = OracleRequest::json("m", "sys", "hello");
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("\"format\":\"json\""));
        assert!(json.contains("hello"));
    }
}
