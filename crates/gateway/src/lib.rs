//! HTTP API gateway for TutorLink.
//!
//! A thin surface over the orchestration engine: health and status
//! probes, the tool catalog, orchestration and analysis, and student
//! sessions.
//!
//! Built on Axum.

pub mod api;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    middleware::{self, Next},
    response::Json,
    routing::get,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use tutorlink_config::AppConfig;
use tutorlink_core::registry::SchemaRegistry;
use tutorlink_engine::{EngineSettings, OrchestrationOutcome, Orchestrator, SessionStore};

/// How often expired sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(300);

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub orchestrator: Arc<Orchestrator>,
    pub sessions: Arc<SessionStore>,
    pub oracle_name: String,
    pub counters: OutcomeCounters,
    pub start_time: chrono::DateTime<chrono::Utc>,
}

pub type SharedState = Arc<GatewayState>;

impl GatewayState {
    pub fn new(config: AppConfig, orchestrator: Arc<Orchestrator>, oracle_name: impl Into<String>) -> Self {
        let sessions = Arc::new(SessionStore::from_config(&config.sessions));
        Self {
            config,
            orchestrator,
            sessions,
            oracle_name: oracle_name.into(),
            counters: OutcomeCounters::default(),
            start_time: chrono::Utc::now(),
        }
    }

    pub fn registry(&self) -> &SchemaRegistry {
        self.orchestrator.registry()
    }
}

/// Orchestration outcomes served since startup.
#[derive(Debug, Default)]
pub struct OutcomeCounters {
    dispatched: AtomicU64,
    needs_clarification: AtomicU64,
    no_intent: AtomicU64,
    tool_failed: AtomicU64,
    failed: AtomicU64,
}

impl OutcomeCounters {
    pub fn record(&self, outcome: &OrchestrationOutcome) {
        let counter = match outcome {
            OrchestrationOutcome::Dispatched { .. } => &self.dispatched,
            OrchestrationOutcome::NeedsClarification { .. } => &self.needs_clarification,
            OrchestrationOutcome::NoIntent { .. } => &self.no_intent,
            OrchestrationOutcome::ToolFailed { .. } => &self.tool_failed,
            OrchestrationOutcome::Failed { .. } => &self.failed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> HashMap<&'static str, u64> {
        HashMap::from([
            ("dispatched", self.dispatched.load(Ordering::Relaxed)),
            ("needs_clarification", self.needs_clarification.load(Ordering::Relaxed)),
            ("no_intent", self.no_intent.load(Ordering::Relaxed)),
            ("tool_failed", self.tool_failed.load(Ordering::Relaxed)),
            ("failed", self.failed.load(Ordering::Relaxed)),
        ])
    }
}

/// Build the router with every route and layer.
///
/// Layers applied:
/// - CORS for browser-based tutoring frontends
/// - Request body size limit (`gateway.max_body_bytes`)
/// - Request quota (`gateway.rate_limit_per_minute` per session or client)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::DELETE,
        ])
        .allow_headers([
            axum::http::header::CONTENT_TYPE,
            axum::http::header::AUTHORIZATION,
            axum::http::HeaderName::from_static(SESSION_HEADER),
        ])
        .max_age(Duration::from_secs(3600));

    let quota = Arc::new(RequestQuota::new(
        state.config.gateway.rate_limit_per_minute,
        Duration::from_secs(60),
    ));
    let max_body = state.config.gateway.max_body_bytes;

    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .with_state(state.clone())
        .merge(api::api_router(state))
        .layer(DefaultBodyLimit::max(max_body))
        .layer(middleware::from_fn(move |req, next| {
            let quota = quota.clone();
            quota_middleware(quota, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Start the gateway HTTP server.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let oracle = tutorlink_providers::build_oracle(&config)
        .ok_or("No oracle configured, set an API key or a provider")?;
    let oracle_name = oracle.name().to_string();
    let registry = Arc::new(tutorlink_tools::registry_from_config(&config)?);
    for id in tutorlink_tools::missing_endpoints(&registry, &config) {
        warn!(tool_id = %id, "Tool has no endpoint configured; dispatch will fail");
    }
    let invoker = Arc::new(tutorlink_tools::HttpToolInvoker::from_config(&config.tools));
    let orchestrator = Arc::new(Orchestrator::new(
        registry,
        oracle,
        invoker,
        EngineSettings::from_config(&config),
    ));

    let state = Arc::new(GatewayState::new(config, orchestrator, oracle_name));
    spawn_session_sweeper(state.sessions.clone());

    let app = build_router(state);

    info!(addr = %addr, "Gateway starting");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn spawn_session_sweeper(sessions: Arc<SessionStore>) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });
}

// --- Request quota ---

/// Header a tutoring frontend sets to scope its quota to one session.
const SESSION_HEADER: &str = "x-session-id";

/// Sessions kept before idle windows are evicted.
const QUOTA_EVICT_THRESHOLD: usize = 10_000;

/// Fixed-window request budget per quota key. A limit of zero disables it.
///
/// A student with two open sessions gets two budgets, so one busy study
/// tab does not starve another behind the same address.
struct RequestQuota {
    per_window: u32,
    window: Duration,
    windows: std::sync::Mutex<HashMap<String, QuotaWindow>>,
}

#[derive(Debug, Clone, Copy)]
struct QuotaWindow {
    opened: Instant,
    used: u32,
}

impl RequestQuota {
    fn new(per_window: u32, window: Duration) -> Self {
        Self {
            per_window,
            window,
            windows: std::sync::Mutex::new(HashMap::new()),
        }
    }

    fn admit(&self, key: &str) -> bool {
        self.admit_at(key, Instant::now())
    }

    /// Spends one request from `key`'s window, opening a fresh window once
    /// the old one has elapsed.
    fn admit_at(&self, key: &str, now: Instant) -> bool {
        if self.per_window == 0 {
            return true;
        }
        let mut windows = self.windows.lock().unwrap_or_else(|e| e.into_inner());

        if windows.len() >= QUOTA_EVICT_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.opened) < self.window);
        }

        let slot = windows.entry(key.to_string()).or_insert(QuotaWindow { opened: now, used: 0 });
        if now.duration_since(slot.opened) >= self.window {
            *slot = QuotaWindow { opened: now, used: 0 };
        }
        if slot.used >= self.per_window {
            return false;
        }
        slot.used += 1;
        true
    }
}

/// Session header, then the originating forwarded address, then the bearer
/// token, then "anonymous".
fn quota_key(headers: &axum::http::HeaderMap) -> String {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    };
    if let Some(session) = header(SESSION_HEADER) {
        return format!("session:{session}");
    }
    if let Some(addr) = header("x-forwarded-for").and_then(|v| v.split(',').next()) {
        return format!("addr:{}", addr.trim());
    }
    match header("authorization") {
        Some(token) => format!("token:{token}"),
        None => "anonymous".to_string(),
    }
}

/// `/health` is exempt.
async fn quota_middleware(
    quota: Arc<RequestQuota>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let key = quota_key(req.headers());
    if !quota.admit(&key) {
        warn!(key = %key.chars().take(32).collect::<String>(), "Request quota exhausted");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

// --- Handlers ---

#[derive(Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".into(),
        version: env!("CARGO_PKG_VERSION").into(),
    })
}

#[derive(Serialize, Deserialize)]
struct StatusResponse {
    version: String,
    uptime_secs: i64,
    oracle: String,
    model: String,
    tools: Vec<String>,
    sessions: usize,
    outcomes: HashMap<String, u64>,
}

async fn status_handler(State(state): State<SharedState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        version: env!("CARGO_PKG_VERSION").into(),
        uptime_secs: (chrono::Utc::now() - state.start_time).num_seconds(),
        oracle: state.oracle_name.clone(),
        model: state.config.default_model.clone(),
        tools: state.registry().list_ids(),
        sessions: state.sessions.len().await,
        outcomes: state
            .counters
            .snapshot()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;
    use tutorlink_core::error::InvocationError;
    use tutorlink_core::provider::Oracle;
    use tutorlink_core::tool::ToolInvoker;
    use tutorlink_engine::test_helpers::{RecordingInvoker, RuleOracle};

    const CLASSIFIED: &str = r#"{"scores": {"flashcard_generator": 0.9}}"#;
    const TOPIC: &str = r#"{"found": true, "value": "derivatives", "confidence": 0.9}"#;

    fn state_with(config: AppConfig, oracle: Arc<dyn Oracle>, invoker: Arc<dyn ToolInvoker>) -> SharedState {
        let registry = Arc::new(tutorlink_tools::default_registry(true));
        let orchestrator = Arc::new(Orchestrator::new(
            registry,
            oracle,
            invoker,
            EngineSettings::from_config(&config),
        ));
        Arc::new(GatewayState::new(config, orchestrator, "rules"))
    }

    fn test_state() -> SharedState {
        let oracle = RuleOracle::new()
            .rule("Available tools:", CLASSIFIED)
            .rule("Parameter: \"topic\"", TOPIC);
        state_with(AppConfig::default(), Arc::new(oracle), Arc::new(RecordingInvoker::new()))
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("Content-Type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn health_endpoint() {
        let response = build_router(test_state()).oneshot(get("/health")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["status"], "ok");
    }

    #[tokio::test]
    async fn tools_are_listed_in_registration_order() {
        let response = build_router(test_state()).oneshot(get("/tools")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["count"], 4);
        assert_eq!(json["tools"][0]["id"], "note_maker");
    }

    #[tokio::test]
    async fn unknown_tool_is_404() {
        let response = build_router(test_state())
            .oneshot(get("/tools/essay_grader"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn orchestrate_dispatches() {
        let state = test_state();
        let response = build_router(state.clone())
            .oneshot(post_json(
                "/orchestrate",
                serde_json::json!({
                    "message": "Can you create flashcards for derivatives?",
                    "user_info": {"mastery_level": 6}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["status"], "dispatched");
        assert_eq!(json["tool_id"], "flashcard_generator");
        assert_eq!(json["parameters"]["difficulty"], "medium");
        assert_eq!(state.counters.snapshot()["dispatched"], 1);
    }

    #[tokio::test]
    async fn orchestrate_reports_tool_failure() {
        let oracle = RuleOracle::new()
            .rule("Available tools:", CLASSIFIED)
            .rule("Parameter: \"topic\"", TOPIC);
        let invoker = RecordingInvoker::failing(InvocationError::Connection {
            tool_id: "flashcard_generator".into(),
            reason: "refused".into(),
        });
        let state = state_with(AppConfig::default(), Arc::new(oracle), Arc::new(invoker));
        let response = build_router(state)
            .oneshot(post_json("/orchestrate", serde_json::json!({"message": "flashcards on limits"})))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["status"], "tool_failed");
        assert_eq!(json["code"], "CONNECTION_ERROR");
    }

    #[tokio::test]
    async fn orchestrate_with_unknown_session_is_404() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/orchestrate",
                serde_json::json!({"message": "hi", "session_id": "nope"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn session_remembers_clarification() {
        let oracle = RuleOracle::new().rule("Available tools:", CLASSIFIED);
        let state = state_with(AppConfig::default(), Arc::new(oracle), Arc::new(RecordingInvoker::new()));
        let app = build_router(state.clone());

        let created = app
            .clone()
            .oneshot(post_json("/sessions", serde_json::json!({"user_id": "s1"})))
            .await
            .unwrap();
        assert_eq!(created.status(), StatusCode::CREATED);
        let session_id = body_json(created).await["id"].as_str().unwrap().to_string();

        let response = app
            .clone()
            .oneshot(post_json(
                "/orchestrate",
                serde_json::json!({"message": "make me flashcards", "session_id": session_id}),
            ))
            .await
            .unwrap();
        assert_eq!(body_json(response).await["status"], "needs_clarification");

        let session = body_json(app.oneshot(get(&format!("/sessions/{session_id}"))).await.unwrap()).await;
        assert_eq!(session["history"].as_array().unwrap().len(), 2);
        assert_eq!(session["interactions"][0]["status"], "needs_clarification");
    }

    #[tokio::test]
    async fn analyze_returns_trace() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/analyze",
                serde_json::json!({"message": "flashcards for derivatives", "user_info": {"teaching_style": "quantum"}}),
            ))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["personalization"]["context"]["teaching_style"], "direct");
        assert_eq!(json["personalization"]["warnings"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn analyze_with_unknown_session_is_404() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/analyze",
                serde_json::json!({"message": "flashcards for derivatives", "session_id": "gone"}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validate_accepts_a_complete_parameter_set() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/validate",
                serde_json::json!({
                    "tool_id": "flashcard_generator",
                    "parameters": {"topic": "derivatives", "count": 10, "difficulty": "easy"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["valid"], true);
        assert_eq!(json["invocation"]["parameters"]["count"], 10);
        assert!(json.get("validation").is_none());
    }

    #[tokio::test]
    async fn validate_reports_missing_and_invalid_fields() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/validate",
                serde_json::json!({
                    "tool_id": "flashcard_generator",
                    "parameters": {"count": 99, "difficulty": "easy"}
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["valid"], false);
        assert_eq!(json["validation"]["missing"], serde_json::json!(["topic"]));
        assert_eq!(json["validation"]["invalid"][0]["name"], "count");
        assert!(json["prompt"].as_str().unwrap().contains("topic"));
    }

    #[tokio::test]
    async fn validate_unknown_tool_is_404() {
        let response = build_router(test_state())
            .oneshot(post_json(
                "/validate",
                serde_json::json!({"tool_id": "essay_grader", "parameters": {}}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn malformed_body_is_rejected() {
        let response = build_router(test_state())
            .oneshot(post_json("/orchestrate", serde_json::json!({"chat_history": []})))
            .await
            .unwrap();
        assert!(response.status().is_client_error());
    }

    #[tokio::test]
    async fn rate_limit_applies_but_not_to_health() {
        let mut config = AppConfig::default();
        config.gateway.rate_limit_per_minute = 2;
        let state = state_with(config, Arc::new(RuleOracle::new()), Arc::new(RecordingInvoker::new()));
        let app = build_router(state);

        for _ in 0..2 {
            let ok = app.clone().oneshot(get("/status")).await.unwrap();
            assert_eq!(ok.status(), StatusCode::OK);
        }
        let limited = app.clone().oneshot(get("/status")).await.unwrap();
        assert_eq!(limited.status(), StatusCode::TOO_MANY_REQUESTS);

        let health = app.oneshot(get("/health")).await.unwrap();
        assert_eq!(health.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn status_reports_registry_and_oracle() {
        let json = body_json(build_router(test_state()).oneshot(get("/status")).await.unwrap()).await;
        assert_eq!(json["oracle"], "rules");
        assert_eq!(json["tools"].as_array().unwrap().len(), 4);
        assert_eq!(json["outcomes"]["failed"], 0);
    }

    #[test]
    fn zero_quota_disables() {
        let quota = RequestQuota::new(0, Duration::from_secs(60));
        assert!((0..100).all(|_| quota.admit("c")));
    }

    #[test]
    fn quota_window_reopens_after_elapsing() {
        let quota = RequestQuota::new(2, Duration::from_secs(60));
        let t0 = Instant::now();
        assert!(quota.admit_at("session:a", t0));
        assert!(quota.admit_at("session:a", t0 + Duration::from_secs(1)));
        assert!(!quota.admit_at("session:a", t0 + Duration::from_secs(59)));
        assert!(quota.admit_at("session:b", t0 + Duration::from_secs(59)));
        assert!(quota.admit_at("session:a", t0 + Duration::from_secs(60)));
    }

    #[test]
    fn quota_key_prefers_session_over_address() {
        let mut headers = axum::http::HeaderMap::new();
        assert_eq!(quota_key(&headers), "anonymous");
        headers.insert("authorization", "Bearer abc".parse().unwrap());
        assert_eq!(quota_key(&headers), "token:Bearer abc");
        headers.insert("x-forwarded-for", "10.0.0.7, 172.16.0.1".parse().unwrap());
        assert_eq!(quota_key(&headers), "addr:10.0.0.7");
        headers.insert("x-session-id", "s-42".parse().unwrap());
        assert_eq!(quota_key(&headers), "session:s-42");
    }

    #[tokio::test]
    async fn sessions_behind_one_address_get_separate_quotas() {
        let mut config = AppConfig::default();
        config.gateway.rate_limit_per_minute = 1;
        let state = state_with(config, Arc::new(RuleOracle::new()), Arc::new(RecordingInvoker::new()));
        let app = build_router(state);

        let status_for = |session: &str| {
            Request::builder()
                .uri("/status")
                .header("X-Forwarded-For", "10.0.0.7")
                .header("X-Session-Id", session)
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(app.clone().oneshot(status_for("a")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(status_for("b")).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.oneshot(status_for("a")).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );
    }
}
