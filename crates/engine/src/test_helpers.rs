//! Deterministic oracle and invoker stubs.
//!
//! [`RuleOracle`] answers by matching markers in the user prompt, so the
//! answer to one field never depends on the order concurrent calls arrive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tutorlink_core::error::{InvocationError, OracleError};
use tutorlink_core::provider::{Oracle, OracleRequest, OracleResponse};
use tutorlink_core::tool::{ToolInvoker, ToolRequest, ToolResult};

/// Answers with the response of the first rule whose needle appears in the
/// prompt, else with `{"found": false}`. Prompts matching a failure needle
/// get a network error instead.
pub struct RuleOracle {
    rules: Vec<(String, String)>,
    failures: Vec<String>,
    fallback: String,
    calls: AtomicUsize,
}

impl RuleOracle {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            failures: Vec::new(),
            fallback: r#"{"found": false}"#.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn rule(mut self, needle: impl Into<String>, response: impl Into<String>) -> Self {
        self.rules.push((needle.into(), response.into()));
        self
    }

    pub fn fail(mut self, needle: impl Into<String>) -> Self {
        self.failures.push(needle.into());
        self
    }

    pub fn fallback(mut self, response: impl Into<String>) -> Self {
        self.fallback = response.into();
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for RuleOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for RuleOracle {
    fn name(&self) -> &str {
        "rules"
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let prompt = request.prompt();
        if let Some(needle) = self.failures.iter().find(|n| prompt.contains(n.as_str())) {
            return Err(OracleError::Network(format!("scripted failure on '{needle}'")));
        }
        let content = self
            .rules
            .iter()
            .find(|(needle, _)| prompt.contains(needle.as_str()))
            .map(|(_, response)| response.clone())
            .unwrap_or_else(|| self.fallback.clone());
        Ok(OracleResponse {
            content,
            model: request.model,
            usage: None,
        })
    }
}

/// Always fails with a network error.
pub struct FailingOracle {
    calls: AtomicUsize,
}

impl FailingOracle {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Default for FailingOracle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Oracle for FailingOracle {
    fn name(&self) -> &str {
        "failing"
    }

    async fn complete(&self, _request: OracleRequest) -> Result<OracleResponse, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(OracleError::Network("connection refused".into()))
    }
}

/// Never answers.
pub struct HangingOracle;

#[async_trait]
impl Oracle for HangingOracle {
    fn name(&self) -> &str {
        "hanging"
    }

    async fn complete(&self, _request: OracleRequest) -> Result<OracleResponse, OracleError> {
        std::future::pending().await
    }
}

struct TimeoutOracle {
    inner: Arc<dyn Oracle>,
    timeout: Duration,
}

#[async_trait]
impl Oracle for TimeoutOracle {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: OracleRequest) -> Result<OracleResponse, OracleError> {
        tokio::time::timeout(self.timeout, self.inner.complete(request))
            .await
            .map_err(|_| OracleError::Timeout(format!("no answer within {:?}", self.timeout)))?
    }
}

/// Wrap an oracle with a per-call timeout.
pub fn with_timeout(inner: Arc<dyn Oracle>, timeout: Duration) -> Arc<dyn Oracle> {
    Arc::new(TimeoutOracle { inner, timeout })
}

/// Records every request and answers with a fixed outcome.
pub struct RecordingInvoker {
    requests: Mutex<Vec<ToolRequest>>,
    failure: Option<InvocationError>,
}

impl RecordingInvoker {
    /// Succeeds, echoing the parameters back as `data`.
    pub fn new() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: None,
        }
    }

    pub fn failing(error: InvocationError) -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failure: Some(error),
        }
    }

    pub fn requests(&self) -> Vec<ToolRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl Default for RecordingInvoker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolInvoker for RecordingInvoker {
    async fn invoke(&self, request: ToolRequest) -> Result<ToolResult, InvocationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        if let Some(error) = &self.failure {
            return Err(error.clone());
        }
        Ok(ToolResult {
            tool_id: request.tool_id,
            success: true,
            data: serde_json::json!({ "echo": request.parameters }),
        })
    }
}
