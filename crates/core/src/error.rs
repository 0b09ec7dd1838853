//! Error types for the TutorLink domain.
//!
//! Uses `thiserror` for ergonomic error definitions.
//! Each bounded context has its own error variant.

use thiserror::Error;

/// The top-level error type for all TutorLink operations.
#[derive(Debug, Error)]
pub enum Error {
    // --- Oracle errors ---
    #[error("Oracle error: {0}")]
    Oracle(#[from] OracleError),

    // --- Schema registry errors ---
    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    // --- Classification errors ---
    #[error("Classification error: {0}")]
    Classification(#[from] ClassificationError),

    // --- Tool invocation errors ---
    #[error("Invocation error: {0}")]
    Invocation(#[from] InvocationError),

    // --- Configuration errors ---
    #[error("Configuration error: {message}")]
    Config { message: String },

    // --- Serialization ---
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias using our Error.
pub type Result<T> = std::result::Result<T, Error>;

// --- Bounded context errors ---

/// Failures talking to the language-model oracle.
#[derive(Debug, Clone, Error)]
pub enum OracleError {
    #[error("API request failed: {message} (status: {status_code})")]
    Api { status_code: u16, message: String },

    #[error("Rate limited by oracle, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Oracle not configured: {0}")]
    NotConfigured(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Malformed oracle response: {0}")]
    MalformedResponse(String),

    #[error("Oracle call cancelled")]
    Cancelled,
}

impl OracleError {
    /// Whether another attempt may succeed.
    ///
    /// Authentication and configuration failures are permanent; a cancelled
    /// call must never be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api { status_code, .. } => *status_code >= 500,
            Self::RateLimited { .. } | Self::Timeout(_) | Self::Network(_) => true,
            Self::MalformedResponse(_) => true,
            Self::AuthenticationFailed(_) | Self::NotConfigured(_) | Self::Cancelled => false,
        }
    }
}

/// Schema registry failures.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemaError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Schema already registered for tool: {0}")]
    DuplicateSchema(String),

    #[error("Invalid schema for {tool_id}: {reason}")]
    InvalidSchema { tool_id: String, reason: String },
}

/// The intent step could not produce a ranking.
#[derive(Debug, Clone, Error)]
pub enum ClassificationError {
    #[error("Classification unavailable: {0}")]
    Unavailable(String),
}

/// A raw value could not be converted to a parameter's semantic type.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoercionError {
    #[error("expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: String,
    },

    #[error("empty value")]
    Empty,

    #[error("could not parse '{0}' as an integer")]
    NotAnInteger(String),

    #[error("could not parse '{0}' as a boolean")]
    NotABoolean(String),
}

/// Tool execution failed after a valid dispatch.
#[derive(Debug, Clone, Error)]
pub enum InvocationError {
    #[error("No endpoint configured for tool: {0}")]
    NotConfigured(String),

    #[error("Tool timed out: {tool_id} after {timeout_secs}s")]
    Timeout { tool_id: String, timeout_secs: u64 },

    #[error("Could not connect to {tool_id}: {reason}")]
    Connection { tool_id: String, reason: String },

    #[error("Tool {tool_id} returned HTTP {status}: {message}")]
    Http {
        tool_id: String,
        status: u16,
        message: String,
    },

    #[error("Tool {tool_id} rejected the request: {reason}")]
    Rejected { tool_id: String, reason: String },
}

impl InvocationError {
    /// Stable machine-readable code for callers.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "UNKNOWN_TOOL",
            Self::Timeout { .. } => "TIMEOUT",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::Http { .. } => "HTTP_ERROR",
            Self::Rejected { .. } => "TOOL_REJECTED",
        }
    }
}
