//! `tutorlink orchestrate` and `tutorlink analyze`: run one request
//! through the engine from the command line.

use std::path::Path;
use std::sync::Arc;

use tutorlink_config::AppConfig;
use tutorlink_core::message::Message;
use tutorlink_core::personalization::StudentProfile;
use tutorlink_engine::{EngineSettings, OrchestrationRequest, Orchestrator};
use tutorlink_tools::HttpToolInvoker;

use crate::RequestArgs;

pub async fn run(args: RequestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orchestrator = build_orchestrator(&config)?;
    let request = build_request(args)?;

    let outcome = orchestrator.orchestrate(request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

pub async fn analyze(args: RequestArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let orchestrator = build_orchestrator(&config)?;
    let request = build_request(args)?;

    let analysis = orchestrator.analyze(&request).await;
    println!("{}", serde_json::to_string_pretty(&analysis)?);
    Ok(())
}

fn build_orchestrator(config: &AppConfig) -> Result<Orchestrator, Box<dyn std::error::Error>> {
    let oracle = tutorlink_providers::build_oracle(config).ok_or_else(|| {
        format!(
            "No oracle available for provider '{}'. Set TUTORLINK_API_KEY or OPENAI_API_KEY.",
            config.default_provider
        )
    })?;
    let registry = tutorlink_tools::registry_from_config(config)?;
    for tool_id in tutorlink_tools::missing_endpoints(&registry, config) {
        tracing::warn!(tool_id = %tool_id, "No endpoint configured; dispatch will fail");
    }
    let invoker = HttpToolInvoker::from_config(&config.tools);

    Ok(Orchestrator::new(
        Arc::new(registry),
        oracle,
        Arc::new(invoker),
        EngineSettings::from_config(config),
    ))
}

fn build_request(args: RequestArgs) -> Result<OrchestrationRequest, Box<dyn std::error::Error>> {
    let mut request = OrchestrationRequest::new(args.message);
    if let Some(path) = &args.history {
        request = request.with_history(read_history(path)?);
    }
    if let Some(raw) = &args.profile {
        request = request.with_profile(parse_profile(raw)?);
    }
    if !args.tools.is_empty() {
        request.tools = Some(args.tools);
    }
    Ok(request)
}

fn read_history(path: &Path) -> Result<Vec<Message>, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read history file {}: {e}", path.display()))?;
    let history = serde_json::from_str(&content)
        .map_err(|e| format!("Invalid history file {}: {e}", path.display()))?;
    Ok(history)
}

fn parse_profile(raw: &str) -> Result<StudentProfile, Box<dyn std::error::Error>> {
    serde_json::from_str(raw).map_err(|e| format!("Invalid --profile JSON: {e}").into())
}
