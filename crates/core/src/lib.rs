//! # TutorLink Core
//!
//! Domain types, traits, and error definitions for the TutorLink tool
//! orchestrator. This crate has **zero framework dependencies**; it defines
//! the domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every external collaborator (the language-model oracle, the tool invoker)
//! is a trait here. Implementations live in their respective crates. This
//! enables:
//! - Swapping implementations via configuration
//! - Deterministic testing with stub oracles
//! - Clean dependency graph (all crates depend inward on core)

pub mod error;
pub mod event;
pub mod invocation;
pub mod message;
pub mod personalization;
pub mod provider;
pub mod registry;
pub mod schema;
pub mod tool;
pub mod value;

// Re-export key types at crate root for ergonomics
pub use error::{
    ClassificationError, CoercionError, Error, InvocationError, OracleError, Result, SchemaError,
};
pub use event::{EventBus, OrchestrationEvent};
pub use invocation::{
    ExtractedField, FieldIssue, IntentCandidate, Provenance, ResolvedInvocation, ValidationFailure,
};
pub use message::{trim_history, Message, Role, MAX_TURN_CHARS};
pub use personalization::{EmotionalState, PersonalizationContext, StudentProfile, TeachingStyle};
pub use provider::{Oracle, OracleRequest, OracleResponse, ResponseFormat, Usage};
pub use registry::{RegistrySnapshot, SchemaRegistry};
pub use schema::{DefaultRule, Derivation, ParamType, ParameterSpec, ToolSchema};
pub use tool::{ToolInvoker, ToolRequest, ToolResult};
pub use value::ParamValue;
