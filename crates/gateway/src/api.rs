//! Orchestration endpoints.
//!
//! - `GET    /tools`            List registered tool schemas
//! - `GET    /tools/{id}`       One tool schema
//! - `POST   /tools/reload`     Re-read the schema file and swap the registry
//! - `POST   /orchestrate`      Classify, extract, validate and dispatch
//! - `POST   /analyze`          Same pipeline without dispatching
//! - `POST   /validate`         Check a caller-assembled parameter set
//! - `GET    /sessions`         List live sessions
//! - `POST   /sessions`         Create a session
//! - `GET    /sessions/{id}`    Get a session
//! - `DELETE /sessions/{id}`    End a session

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use tutorlink_core::invocation::{ResolvedInvocation, ValidationFailure};
use tutorlink_core::message::Message;
use tutorlink_core::personalization::StudentProfile;
use tutorlink_core::schema::ToolSchema;
use tutorlink_engine::{Analysis, OrchestrationOutcome, OrchestrationRequest, Session, ToolInteraction};

use crate::SharedState;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/tools", get(list_tools_handler))
        .route("/tools/reload", post(reload_tools_handler))
        .route("/tools/{id}", get(get_tool_handler))
        .route("/orchestrate", post(orchestrate_handler))
        .route("/analyze", post(analyze_handler))
        .route("/validate", post(validate_handler))
        .route("/sessions", get(list_sessions_handler).post(create_session_handler))
        .route(
            "/sessions/{id}",
            get(get_session_handler).delete(delete_session_handler),
        )
        .with_state(state)
}

// ── DTOs ──────────────────────────────────────────────────────────────────

#[derive(Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

#[derive(Serialize, Deserialize)]
struct ToolListResponse {
    tools: Vec<ToolSchema>,
    count: usize,
}

#[derive(Serialize, Deserialize)]
struct ReloadResponse {
    tools: Vec<String>,
}

#[derive(Deserialize)]
struct OrchestrateBody {
    message: String,
    #[serde(default)]
    chat_history: Vec<Message>,
    /// Falls back to the session's profile when absent
    #[serde(default)]
    user_info: Option<StudentProfile>,
    #[serde(default)]
    tools: Option<Vec<String>>,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Deserialize)]
struct ValidateBody {
    tool_id: String,
    #[serde(default)]
    parameters: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    user_info: StudentProfile,
}

#[derive(Serialize, Deserialize)]
struct ValidateResponse {
    valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    invocation: Option<ResolvedInvocation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    validation: Option<ValidationFailure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    prompt: Option<String>,
}

#[derive(Deserialize)]
struct CreateSessionBody {
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    user_info: StudentProfile,
}

#[derive(Serialize, Deserialize)]
struct SessionSummaryDto {
    id: String,
    user_id: Option<String>,
    turns: usize,
    interactions: usize,
    last_active: String,
}

#[derive(Serialize, Deserialize)]
struct SessionListResponse {
    sessions: Vec<SessionSummaryDto>,
    count: usize,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_tools_handler(State(state): State<SharedState>) -> Json<ToolListResponse> {
    let tools: Vec<ToolSchema> = state
        .registry()
        .snapshot()
        .schemas()
        .iter()
        .map(|s| s.as_ref().clone())
        .collect();
    Json(ToolListResponse {
        count: tools.len(),
        tools,
    })
}

async fn get_tool_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ToolSchema>, ApiError> {
    state
        .registry()
        .get(&id)
        .map(|s| Json(s.as_ref().clone()))
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))
}

async fn reload_tools_handler(State(state): State<SharedState>) -> Result<Json<ReloadResponse>, ApiError> {
    tutorlink_tools::reload(state.registry(), &state.config).map_err(|e| {
        warn!(error = %e, "Schema reload rejected");
        api_error(StatusCode::UNPROCESSABLE_ENTITY, e.to_string())
    })?;
    let tools = state.registry().list_ids();
    info!(tools = tools.len(), "Schema registry reloaded");
    Ok(Json(ReloadResponse { tools }))
}

async fn orchestrate_handler(
    State(state): State<SharedState>,
    Json(body): Json<OrchestrateBody>,
) -> Result<Json<OrchestrationOutcome>, ApiError> {
    let session = match &body.session_id {
        Some(id) => Some(
            state
                .sessions
                .get(id)
                .await
                .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Session '{id}' not found")))?,
        ),
        None => None,
    };

    let message = body.message.clone();
    let request = build_request(body.message, body.chat_history, body.user_info, body.tools, session.as_ref());
    let outcome = state.orchestrator.orchestrate(request).await;
    state.counters.record(&outcome);

    if let Some(session) = session {
        let mut turns = vec![Message::user(message)];
        if let Some(reply) = session_reply(&outcome) {
            turns.push(Message::assistant(reply));
        }
        state.sessions.append_turns(&session.id, turns).await;
        state
            .sessions
            .record_interaction(
                &session.id,
                ToolInteraction {
                    request_id: outcome.request_id().to_string(),
                    status: outcome.status().to_string(),
                    tool_id: outcome.tool_id().map(str::to_string),
                    timestamp: Utc::now(),
                },
            )
            .await;
    }

    Ok(Json(outcome))
}

async fn analyze_handler(
    State(state): State<SharedState>,
    Json(body): Json<OrchestrateBody>,
) -> Result<Json<Analysis>, ApiError> {
    let session = match &body.session_id {
        Some(id) => Some(
            state
                .sessions
                .get(id)
                .await
                .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Session '{id}' not found")))?,
        ),
        None => None,
    };
    let request = build_request(body.message, body.chat_history, body.user_info, body.tools, session.as_ref());
    Ok(Json(state.orchestrator.analyze(&request).await))
}

async fn validate_handler(
    State(state): State<SharedState>,
    Json(body): Json<ValidateBody>,
) -> Result<Json<ValidateResponse>, ApiError> {
    let schema = state
        .registry()
        .get(&body.tool_id)
        .map_err(|e| api_error(StatusCode::NOT_FOUND, e.to_string()))?;

    let response = match state.orchestrator.validate(&schema, &body.parameters, &body.user_info) {
        Ok(invocation) => ValidateResponse {
            valid: true,
            invocation: Some(invocation),
            validation: None,
            prompt: None,
        },
        Err(failure) => ValidateResponse {
            valid: false,
            invocation: None,
            prompt: Some(failure.clarification_prompt()),
            validation: Some(failure),
        },
    };
    Ok(Json(response))
}

async fn list_sessions_handler(State(state): State<SharedState>) -> Json<SessionListResponse> {
    let sessions: Vec<SessionSummaryDto> = state
        .sessions
        .list()
        .await
        .into_iter()
        .map(|s| SessionSummaryDto {
            id: s.id,
            user_id: s.user_id,
            turns: s.history.len(),
            interactions: s.interactions.len(),
            last_active: s.last_active.to_rfc3339(),
        })
        .collect();
    Json(SessionListResponse {
        count: sessions.len(),
        sessions,
    })
}

async fn create_session_handler(
    State(state): State<SharedState>,
    Json(body): Json<CreateSessionBody>,
) -> (StatusCode, Json<Session>) {
    let user_id = body.user_id.or_else(|| body.user_info.user_id.clone());
    let session = state.sessions.create(user_id, body.user_info).await;
    (StatusCode::CREATED, Json(session))
}

async fn get_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("Session '{id}' not found")))
}

async fn delete_session_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> StatusCode {
    if state.sessions.remove(&id).await {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::NOT_FOUND
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────

/// Session history goes before the caller's turns; the caller's profile
/// wins over the session's.
fn build_request(
    message: String,
    chat_history: Vec<Message>,
    user_info: Option<StudentProfile>,
    tools: Option<Vec<String>>,
    session: Option<&Session>,
) -> OrchestrationRequest {
    let (history, profile) = match session {
        Some(s) => {
            let mut history = s.history.clone();
            history.extend(chat_history);
            (history, user_info.unwrap_or_else(|| s.profile.clone()))
        }
        None => (chat_history, user_info.unwrap_or_default()),
    };
    OrchestrationRequest {
        message,
        chat_history: history,
        user_info: profile,
        tools,
    }
}

/// What the session remembers the assistant saying.
fn session_reply(outcome: &OrchestrationOutcome) -> Option<String> {
    match outcome {
        OrchestrationOutcome::Dispatched { tool_id, .. } => Some(format!("Used {tool_id}.")),
        OrchestrationOutcome::NeedsClarification { prompt, .. } => Some(prompt.clone()),
        _ => None,
    }
}
