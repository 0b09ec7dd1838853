//! The orchestration engine: from a conversation to a validated tool call.
//!
//! Each request moves through an explicit state machine:
//!
//! 1. **Normalize** the caller's loose student profile
//! 2. **Classify** intent against the registered tool schemas
//! 3. **Extract** one candidate value per parameter (oracle, then
//!    personalization derivation, then static default)
//! 4. **Reconcile** the fields into a [`ResolvedInvocation`] or a list of
//!    missing/invalid fields
//! 5. **Dispatch** the invocation to the tool, or ask for clarification
//!
//! Oracle calls are the only suspension points. Everything else is a pure
//! function of its inputs and is tested without an oracle.
//!
//! [`ResolvedInvocation`]: tutorlink_core::ResolvedInvocation

pub mod classifier;
pub mod context;
pub mod controller;
pub mod extractor;
pub mod profile;
pub mod prompt;
pub mod reconcile;
pub mod session;

#[cfg(any(test, feature = "testing"))]
pub mod test_helpers;

pub use classifier::{Classification, IntentClassifier};
pub use context::ConversationContext;
pub use controller::{
    Analysis, EngineSettings, OrchestrationOutcome, OrchestrationRequest, OrchestrationState,
    Orchestrator, StepResult,
};
pub use extractor::{Extraction, ExtractorSettings, ParameterExtractor};
pub use profile::{normalize, NormalizedProfile};
pub use reconcile::Reconciler;
pub use session::{Session, SessionStore, ToolInteraction};

use tokio_util::sync::CancellationToken;
use tutorlink_config::AppConfig;
use tutorlink_core::error::OracleError;
use tutorlink_core::provider::{Oracle, OracleRequest, OracleResponse};

/// Model parameters shared by every oracle call of the engine.
#[derive(Debug, Clone)]
pub struct OracleSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: Option<u32>,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".into(),
            temperature: 0.1,
            max_tokens: Some(1024),
        }
    }
}

impl OracleSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let model = config
            .providers
            .get(&config.default_provider)
            .and_then(|p| p.default_model.clone())
            .unwrap_or_else(|| config.default_model.clone());
        Self {
            model,
            temperature: config.default_temperature,
            max_tokens: Some(config.default_max_tokens),
        }
    }

    /// A JSON-constrained request carrying these settings.
    pub fn request(&self, system: &str, prompt: String) -> OracleRequest {
        let mut request = OracleRequest::json(self.model.clone(), system, prompt);
        request.temperature = self.temperature;
        request.max_tokens = self.max_tokens;
        request
    }
}

/// Run one oracle call, abandoning it as soon as `cancel` fires.
pub(crate) async fn complete_or_cancel(
    oracle: &dyn Oracle,
    request: OracleRequest,
    cancel: &CancellationToken,
) -> Result<OracleResponse, OracleError> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(OracleError::Cancelled),
        result = oracle.complete(request) => result,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{HangingOracle, RuleOracle};
    use std::time::Duration;

    #[test]
    fn settings_prefer_provider_model() {
        let mut config = AppConfig::default();
        config.default_temperature = 0.3;
        config.providers.insert(
            config.default_provider.clone(),
            tutorlink_config::ProviderConfig {
                default_model: Some("gpt-4o".into()),
                ..Default::default()
            },
        );
        let settings = OracleSettings::from_config(&config);
        assert_eq!(settings.model, "gpt-4o");
        assert_eq!(settings.temperature, 0.3);

        let request = settings.request("sys", "hello".into());
        assert_eq!(request.prompt(), "hello");
        assert_eq!(request.model, "gpt-4o");
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let oracle = RuleOracle::new();
        let result = complete_or_cancel(&oracle, OracleSettings::default().request("s", "p".into()), &token).await;
        assert!(matches!(result, Err(OracleError::Cancelled)));
        assert_eq!(oracle.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_aborts_in_flight_call() {
        let token = CancellationToken::new();
        let trigger = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });
        let result = complete_or_cancel(
            &HangingOracle,
            OracleSettings::default().request("s", "p".into()),
            &token,
        )
        .await;
        assert!(matches!(result, Err(OracleError::Cancelled)));
    }
}
