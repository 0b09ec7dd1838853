//! Orchestration controller: the per-request state machine.
//!
//! ```text
//! Received → Classifying → (NoIntent | Extracting) → Reconciling → (Ready | NeedsClarification | Failed)
//! ```
//!
//! Transitions are computed by [`next`], a pure function of the current state
//! and what the last component reported. The [`Orchestrator`] drives the
//! components, feeds their results through [`next`], and publishes every
//! transition on the event bus.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tutorlink_config::AppConfig;
use tutorlink_core::event::{EventBus, OrchestrationEvent};
use tutorlink_core::invocation::{ExtractedField, FieldIssue, IntentCandidate, ResolvedInvocation, ValidationFailure};
use tutorlink_core::message::Message;
use tutorlink_core::personalization::StudentProfile;
use tutorlink_core::provider::Oracle;
use tutorlink_core::registry::SchemaRegistry;
use tutorlink_core::schema::ToolSchema;
use tutorlink_core::tool::{ToolInvoker, ToolRequest, ToolResult};

use crate::classifier::{Classification, IntentClassifier};
use crate::context::ConversationContext;
use crate::extractor::{Extraction, ExtractorSettings, ParameterExtractor};
use crate::profile::{self, NormalizedProfile};
use crate::reconcile::Reconciler;
use crate::OracleSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationState {
    Received,
    Classifying,
    NoIntent,
    Extracting,
    Reconciling,
    Ready,
    NeedsClarification,
    Failed,
}

impl OrchestrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Classifying => "classifying",
            Self::NoIntent => "no_intent",
            Self::Extracting => "extracting",
            Self::Reconciling => "reconciling",
            Self::Ready => "ready",
            Self::NeedsClarification => "needs_clarification",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::NoIntent | Self::Ready | Self::NeedsClarification | Self::Failed
        )
    }
}

impl std::fmt::Display for OrchestrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the last component reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    Started,
    Classified { confident: bool },
    ClassificationUnavailable,
    Extracted { oracle_unavailable: bool },
    Reconciled { ready: bool },
    SchemaMissing,
    Cancelled,
}

/// The transition function. Terminal states absorb every step; a step that
/// makes no sense in the current state fails the request.
pub fn next(state: OrchestrationState, step: StepResult) -> OrchestrationState {
    use OrchestrationState as S;
    use StepResult as R;

    if state.is_terminal() {
        return state;
    }
    match (state, step) {
        (_, R::Cancelled) | (_, R::SchemaMissing) => S::Failed,
        (S::Received, R::Started) => S::Classifying,
        (S::Classifying, R::Classified { confident: true }) => S::Extracting,
        (S::Classifying, R::Classified { confident: false }) => S::NoIntent,
        (S::Classifying, R::ClassificationUnavailable) => S::NoIntent,
        (S::Extracting, R::Extracted { oracle_unavailable: false }) => S::Reconciling,
        (S::Extracting, R::Extracted { oracle_unavailable: true }) => S::Failed,
        (S::Reconciling, R::Reconciled { ready: true }) => S::Ready,
        (S::Reconciling, R::Reconciled { ready: false }) => S::NeedsClarification,
        _ => S::Failed,
    }
}

/// Caller-facing request. Everything except the message is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrchestrationRequest {
    pub message: String,

    #[serde(default)]
    pub chat_history: Vec<Message>,

    #[serde(default)]
    pub user_info: StudentProfile,

    /// Restrict classification to these tools (default: every registered tool)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<String>>,
}

impl OrchestrationRequest {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.chat_history = history;
        self
    }

    pub fn with_profile(mut self, profile: StudentProfile) -> Self {
        self.user_info = profile;
        self
    }
}

/// The four caller-facing outcomes, plus tool failure kept apart from
/// extraction and validation failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum OrchestrationOutcome {
    Dispatched {
        request_id: String,
        tool_id: String,
        confidence: f64,
        parameters: serde_json::Value,
        result: ToolResult,
    },
    NeedsClarification {
        request_id: String,
        tool_id: String,
        missing: Vec<String>,
        invalid: Vec<FieldIssue>,
        prompt: String,
    },
    NoIntent {
        request_id: String,
        reason: String,
        candidates: Vec<IntentCandidate>,
    },
    ToolFailed {
        request_id: String,
        tool_id: String,
        code: String,
        error: String,
    },
    Failed {
        request_id: String,
        reason: String,
    },
}

impl OrchestrationOutcome {
    pub fn request_id(&self) -> &str {
        match self {
            Self::Dispatched { request_id, .. }
            | Self::NeedsClarification { request_id, .. }
            | Self::NoIntent { request_id, .. }
            | Self::ToolFailed { request_id, .. }
            | Self::Failed { request_id, .. } => request_id,
        }
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Dispatched { .. } => "dispatched",
            Self::NeedsClarification { .. } => "needs_clarification",
            Self::NoIntent { .. } => "no_intent",
            Self::ToolFailed { .. } => "tool_failed",
            Self::Failed { .. } => "failed",
        }
    }

    /// The tool this outcome concerns, if one was selected.
    pub fn tool_id(&self) -> Option<&str> {
        match self {
            Self::Dispatched { tool_id, .. }
            | Self::NeedsClarification { tool_id, .. }
            | Self::ToolFailed { tool_id, .. } => Some(tool_id),
            Self::NoIntent { .. } | Self::Failed { .. } => None,
        }
    }
}

/// Everything the engine decided for one request, without dispatching.
#[derive(Debug, Clone, Serialize)]
pub struct Analysis {
    pub request_id: String,
    pub state: OrchestrationState,
    pub personalization: NormalizedProfile,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub classification: Option<Classification>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_tool: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extraction: Option<Extraction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<ResolvedInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<ValidationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Engine tuning, from the `[classifier]` and `[extractor]` config sections.
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub oracle: OracleSettings,
    pub classifier_window: usize,
    pub confidence_threshold: f64,
    pub extractor: ExtractorSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            oracle: OracleSettings::default(),
            classifier_window: 6,
            confidence_threshold: 0.5,
            extractor: ExtractorSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            oracle: OracleSettings::from_config(config),
            classifier_window: config.classifier.history_window,
            confidence_threshold: config.classifier.confidence_threshold,
            extractor: ExtractorSettings::from(&config.extractor),
        }
    }
}

/// Walks one request through the state machine and publishes each move.
struct Transitions<'a> {
    request_id: &'a str,
    state: OrchestrationState,
    events: &'a EventBus,
}

impl<'a> Transitions<'a> {
    fn new(request_id: &'a str, events: &'a EventBus) -> Self {
        Self {
            request_id,
            state: OrchestrationState::Received,
            events,
        }
    }

    fn advance(&mut self, step: StepResult) -> OrchestrationState {
        let to = next(self.state, step);
        if to != self.state {
            debug!(request_id = self.request_id, from = %self.state, %to, ?step, "State transition");
            self.events.publish(OrchestrationEvent::StateChanged {
                request_id: self.request_id.to_string(),
                from: self.state.as_str().to_string(),
                to: to.as_str().to_string(),
                timestamp: Utc::now(),
            });
            self.state = to;
        }
        to
    }
}

/// Runs requests through normalization, classification, extraction,
/// reconciliation and dispatch.
pub struct Orchestrator {
    registry: Arc<SchemaRegistry>,
    classifier: IntentClassifier,
    extractor: ParameterExtractor,
    reconciler: Reconciler,
    invoker: Arc<dyn ToolInvoker>,
    events: Arc<EventBus>,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<SchemaRegistry>,
        oracle: Arc<dyn Oracle>,
        invoker: Arc<dyn ToolInvoker>,
        settings: EngineSettings,
    ) -> Self {
        let inferred_confidence = settings.extractor.inferred_confidence;
        Self {
            registry,
            classifier: IntentClassifier::new(
                oracle.clone(),
                settings.oracle.clone(),
                settings.classifier_window,
                settings.confidence_threshold,
            ),
            extractor: ParameterExtractor::new(oracle, settings.oracle, settings.extractor),
            reconciler: Reconciler::new(inferred_confidence),
            invoker,
            events: Arc::new(EventBus::default()),
        }
    }

    /// Publish on a shared bus instead of a private one.
    pub fn with_events(mut self, events: Arc<EventBus>) -> Self {
        self.events = events;
        self
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub async fn orchestrate(&self, request: OrchestrationRequest) -> OrchestrationOutcome {
        self.orchestrate_with_cancel(request, &CancellationToken::new())
            .await
    }

    /// Like [`orchestrate`](Self::orchestrate); cancelling `cancel` aborts this
    /// request's outstanding oracle calls and resolves it as failed.
    pub async fn orchestrate_with_cancel(
        &self,
        request: OrchestrationRequest,
        cancel: &CancellationToken,
    ) -> OrchestrationOutcome {
        let started = Instant::now();
        let request_id = uuid::Uuid::new_v4().to_string();
        info!(
            request_id = %request_id,
            message_len = request.message.len(),
            history = request.chat_history.len(),
            "Orchestration started"
        );

        let (analysis, ctx) = self.run(&request_id, &request, cancel).await;
        let outcome = self.conclude(analysis, &ctx, cancel).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        info!(request_id = %request_id, status = outcome.status(), duration_ms, "Orchestration finished");
        self.events.publish(OrchestrationEvent::Completed {
            request_id,
            outcome: outcome.status().to_string(),
            duration_ms,
            timestamp: Utc::now(),
        });
        outcome
    }

    /// Classification, extraction and reconciliation only. No tool is called.
    pub async fn analyze(&self, request: &OrchestrationRequest) -> Analysis {
        let request_id = uuid::Uuid::new_v4().to_string();
        let (analysis, _) = self.run(&request_id, request, &CancellationToken::new()).await;
        analysis
    }

    /// Check a caller-assembled parameter set against `schema`. Every
    /// supplied value counts as explicit, so violations are reported rather
    /// than corrected. Nothing is dispatched.
    pub fn validate(
        &self,
        schema: &ToolSchema,
        parameters: &serde_json::Map<String, serde_json::Value>,
        profile: &StudentProfile,
    ) -> Result<ResolvedInvocation, ValidationFailure> {
        let ctx = ConversationContext::new(&[], String::new(), profile::normalize(profile).context);
        let mut rejected = Vec::new();
        let mut fields = Vec::with_capacity(parameters.len());

        for (name, raw) in parameters {
            let Some(spec) = schema.parameter(name) else {
                rejected.push(FieldIssue {
                    name: name.clone(),
                    reason: format!("is not a parameter of {}", schema.id),
                });
                continue;
            };
            if raw.is_null() {
                continue;
            }
            match spec.param_type.coerce(raw) {
                Ok(value) => fields.push(ExtractedField::explicit(name, value, 1.0)),
                Err(e) => rejected.push(FieldIssue {
                    name: name.clone(),
                    reason: e.to_string(),
                }),
            }
        }

        let reconciled = self.reconciler.reconcile(schema, &fields, &ctx);
        if rejected.is_empty() {
            return reconciled;
        }
        let mut failure = reconciled.err().unwrap_or_else(|| ValidationFailure {
            tool_id: schema.id.clone(),
            missing: Vec::new(),
            invalid: Vec::new(),
        });
        failure.missing.retain(|m| !rejected.iter().any(|r| &r.name == m));
        failure.invalid.extend(rejected);
        debug!(tool_id = %schema.id, missing = failure.missing.len(), invalid = failure.invalid.len(), "Parameter set rejected");
        Err(failure)
    }

    async fn run(
        &self,
        request_id: &str,
        request: &OrchestrationRequest,
        cancel: &CancellationToken,
    ) -> (Analysis, ConversationContext) {
        let personalization = profile::normalize(&request.user_info);
        let ctx = ConversationContext::new(
            &request.chat_history,
            request.message.clone(),
            personalization.context.clone(),
        );
        let mut machine = Transitions::new(request_id, &self.events);
        let mut analysis = Analysis {
            request_id: request_id.to_string(),
            state: machine.advance(StepResult::Started),
            personalization,
            classification: None,
            selected_tool: None,
            extraction: None,
            invocation: None,
            validation: None,
            reason: None,
        };

        // One snapshot for the whole request.
        let snapshot = self.registry.snapshot();
        let candidates: Vec<Arc<ToolSchema>> = match &request.tools {
            None => snapshot.schemas(),
            Some(ids) => match snapshot.restrict(ids) {
                Ok(schemas) => schemas,
                Err(e) => {
                    warn!(request_id, error = %e, "Requested tool is not registered");
                    analysis.state = machine.advance(StepResult::SchemaMissing);
                    analysis.reason = Some(e.to_string());
                    return (analysis, ctx);
                }
            },
        };

        let classification = match self.classifier.classify(&ctx, &candidates, cancel).await {
            Ok(c) => c,
            Err(e) => {
                let step = if cancel.is_cancelled() {
                    analysis.reason = Some("cancelled".into());
                    StepResult::Cancelled
                } else {
                    warn!(request_id, error = %e, "No tool identified, classification unavailable");
                    analysis.reason = Some(e.to_string());
                    StepResult::ClassificationUnavailable
                };
                analysis.state = machine.advance(step);
                return (analysis, ctx);
            }
        };

        let confident = classification.is_confident();
        let top = classification.top().cloned();
        analysis.classification = Some(classification);
        analysis.state = machine.advance(StepResult::Classified { confident });
        let top = match top {
            Some(c) if confident => c,
            Some(c) => {
                analysis.reason = Some(format!(
                    "top candidate {} scored {:.2}, below threshold {:.2}",
                    c.tool_id,
                    c.confidence,
                    self.classifier.threshold()
                ));
                return (analysis, ctx);
            }
            None => {
                analysis.reason = Some("no candidate tools".into());
                return (analysis, ctx);
            }
        };

        let schema = match snapshot.get(&top.tool_id) {
            Ok(schema) => schema,
            Err(e) => {
                analysis.state = machine.advance(StepResult::SchemaMissing);
                analysis.reason = Some(e.to_string());
                return (analysis, ctx);
            }
        };
        info!(request_id, tool_id = %schema.id, confidence = top.confidence, "Intent classified");
        analysis.selected_tool = Some(schema.id.clone());

        let extraction = self.extractor.extract(&schema, &ctx, cancel).await;
        let step = if extraction.cancelled {
            analysis.reason = Some("cancelled".into());
            StepResult::Cancelled
        } else {
            if extraction.oracle_unavailable() {
                warn!(request_id, tool_id = %schema.id, calls = extraction.oracle_calls, "Oracle unavailable for every extraction call");
                analysis.reason = Some("oracle unavailable during parameter extraction".into());
            }
            StepResult::Extracted {
                oracle_unavailable: extraction.oracle_unavailable(),
            }
        };
        let fields = extraction.fields.clone();
        analysis.extraction = Some(extraction);
        analysis.state = machine.advance(step);
        if analysis.state != OrchestrationState::Reconciling {
            return (analysis, ctx);
        }

        let reconciled = self.reconciler.reconcile(&schema, &fields, &ctx);
        analysis.state = machine.advance(StepResult::Reconciled {
            ready: reconciled.is_ok(),
        });
        match reconciled {
            Ok(invocation) => analysis.invocation = Some(invocation),
            Err(failure) => analysis.validation = Some(failure),
        }
        (analysis, ctx)
    }

    /// Turn a finished analysis into the caller-facing outcome, dispatching
    /// when it is ready.
    async fn conclude(
        &self,
        analysis: Analysis,
        ctx: &ConversationContext,
        cancel: &CancellationToken,
    ) -> OrchestrationOutcome {
        let request_id = analysis.request_id;
        match (analysis.state, analysis.invocation, analysis.validation) {
            (OrchestrationState::Ready, Some(invocation), _) => {
                self.dispatch(request_id, invocation, ctx, cancel).await
            }
            (OrchestrationState::NeedsClarification, _, Some(failure)) => {
                self.events.publish(OrchestrationEvent::ClarificationRequested {
                    request_id: request_id.clone(),
                    tool_id: failure.tool_id.clone(),
                    missing: failure.missing.clone(),
                    timestamp: Utc::now(),
                });
                let prompt = failure.clarification_prompt();
                OrchestrationOutcome::NeedsClarification {
                    request_id,
                    tool_id: failure.tool_id,
                    missing: failure.missing,
                    invalid: failure.invalid,
                    prompt,
                }
            }
            (OrchestrationState::NoIntent, _, _) => OrchestrationOutcome::NoIntent {
                request_id,
                reason: analysis
                    .reason
                    .unwrap_or_else(|| "no actionable tool identified".into()),
                candidates: analysis
                    .classification
                    .map(|c| c.candidates)
                    .unwrap_or_default(),
            },
            (state, _, _) => OrchestrationOutcome::Failed {
                request_id,
                reason: analysis
                    .reason
                    .unwrap_or_else(|| format!("request stopped in state {state}")),
            },
        }
    }

    async fn dispatch(
        &self,
        request_id: String,
        invocation: ResolvedInvocation,
        ctx: &ConversationContext,
        cancel: &CancellationToken,
    ) -> OrchestrationOutcome {
        let tool_id = invocation.tool_id.clone();
        let parameters = invocation.parameters_json();
        let request = ToolRequest::from_invocation(&invocation, &ctx.personalization, &ctx.full_history());

        info!(request_id = %request_id, tool_id = %tool_id, confidence = invocation.confidence, "Dispatching tool");
        self.events.publish(OrchestrationEvent::ToolDispatched {
            request_id: request_id.clone(),
            tool_id: tool_id.clone(),
            confidence: invocation.confidence,
            timestamp: Utc::now(),
        });

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return OrchestrationOutcome::Failed {
                    request_id,
                    reason: "cancelled".into(),
                };
            }
            result = self.invoker.invoke(request) => result,
        };
        self.events.publish(OrchestrationEvent::ToolCompleted {
            request_id: request_id.clone(),
            tool_id: tool_id.clone(),
            success: result.as_ref().is_ok_and(|r| r.success),
            duration_ms: started.elapsed().as_millis() as u64,
            timestamp: Utc::now(),
        });

        match result {
            Ok(result) => OrchestrationOutcome::Dispatched {
                request_id,
                tool_id,
                confidence: invocation.confidence,
                parameters,
                result,
            },
            Err(e) => {
                warn!(request_id = %request_id, tool_id = %tool_id, error = %e, "Tool execution failed");
                OrchestrationOutcome::ToolFailed {
                    request_id,
                    tool_id,
                    code: e.code().to_string(),
                    error: e.to_string(),
                }
            }
        }
    }
}
