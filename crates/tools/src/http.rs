//! HTTP tool invoker: POSTs a validated request to `{endpoint}/generate`.
//!
//! The body is the tool's parameters at the top level plus `user_info` and
//! `chat_history`. A 200 answer is relayed unchanged; a body reporting
//! `"success": false` is a rejection.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};
use tutorlink_core::error::InvocationError;
use tutorlink_core::tool::{ToolInvoker, ToolRequest, ToolResult};

#[derive(Debug, Clone)]
struct Endpoint {
    url: String,
    timeout: Duration,
}

/// Dispatches tool requests over HTTP.
pub struct HttpToolInvoker {
    endpoints: HashMap<String, Endpoint>,
    client: reqwest::Client,
}

impl HttpToolInvoker {
    pub fn new() -> Self {
        Self {
            endpoints: HashMap::new(),
            client: reqwest::Client::new(),
        }
    }

    /// Build from the `[tools]` config table.
    pub fn from_config(tools: &HashMap<String, tutorlink_config::ToolEndpointConfig>) -> Self {
        tools.iter().fold(Self::new(), |invoker, (id, cfg)| {
            invoker.with_endpoint(id, &cfg.url, Duration::from_secs(cfg.timeout_secs))
        })
    }

    pub fn with_endpoint(mut self, tool_id: impl Into<String>, url: &str, timeout: Duration) -> Self {
        self.endpoints.insert(
            tool_id.into(),
            Endpoint {
                url: url.trim_end_matches('/').to_string(),
                timeout,
            },
        );
        self
    }

    /// The `/generate` URL for a tool, if configured.
    pub fn generate_url(&self, tool_id: &str) -> Option<String> {
        self.endpoints.get(tool_id).map(|e| format!("{}/generate", e.url))
    }

    fn request_body(request: &ToolRequest) -> serde_json::Value {
        let mut body = match &request.parameters {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        body.insert(
            "user_info".into(),
            serde_json::to_value(&request.user_info).unwrap_or_default(),
        );
        body.insert(
            "chat_history".into(),
            serde_json::to_value(&request.chat_history).unwrap_or_default(),
        );
        serde_json::Value::Object(body)
    }
}

impl Default for HttpToolInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, request: ToolRequest) -> std::result::Result<ToolResult, InvocationError> {
        let tool_id = request.tool_id.clone();
        let endpoint = self
            .endpoints
            .get(&tool_id)
            .ok_or_else(|| InvocationError::NotConfigured(tool_id.clone()))?;
        let url = format!("{}/generate", endpoint.url);

        debug!(tool_id = %tool_id, url = %url, "Dispatching tool request");

        let response = self
            .client
            .post(&url)
            .timeout(endpoint.timeout)
            .json(&Self::request_body(&request))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    InvocationError::Timeout {
                        tool_id: tool_id.clone(),
                        timeout_secs: endpoint.timeout.as_secs(),
                    }
                } else {
                    InvocationError::Connection {
                        tool_id: tool_id.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = response.status().as_u16();
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if status != 200 {
            let message = body["error"]
                .as_str()
                .map(String::from)
                .unwrap_or_else(|| format!("HTTP {status}"));
            warn!(tool_id = %tool_id, status, "Tool returned error status");
            return Err(InvocationError::Http {
                tool_id,
                status,
                message,
            });
        }

        if body["success"].as_bool() == Some(false) {
            let reason = body["error"].as_str().unwrap_or("tool reported failure").to_string();
            return Err(InvocationError::Rejected { tool_id, reason });
        }

        Ok(ToolResult {
            tool_id,
            success: true,
            data: body,
        })
    }
}
