//! Tool invoker trait: the boundary to the external educational tools.
//!
//! The engine hands over only a request built from a validated
//! [`ResolvedInvocation`](crate::invocation::ResolvedInvocation); the invoker
//! relays the tool's answer unchanged.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::InvocationError;
use crate::invocation::ResolvedInvocation;
use crate::message::Message;
use crate::personalization::PersonalizationContext;

/// Body sent to a tool endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolRequest {
    pub tool_id: String,

    /// Validated parameters as a JSON object
    pub parameters: serde_json::Value,

    /// The normalized student profile
    pub user_info: PersonalizationContext,

    #[serde(default)]
    pub chat_history: Vec<Message>,
}

impl ToolRequest {
    pub fn from_invocation(
        invocation: &ResolvedInvocation,
        user_info: &PersonalizationContext,
        chat_history: &[Message],
    ) -> Self {
        Self {
            tool_id: invocation.tool_id.clone(),
            parameters: invocation.parameters_json(),
            user_info: user_info.clone(),
            chat_history: chat_history.to_vec(),
        }
    }
}

/// The tool's answer, relayed to the caller as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub tool_id: String,

    /// Whether the tool reported success
    pub success: bool,

    /// The tool's response body
    pub data: serde_json::Value,
}

/// Dispatches validated requests to tools.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, request: ToolRequest) -> std::result::Result<ToolResult, InvocationError>;
}
