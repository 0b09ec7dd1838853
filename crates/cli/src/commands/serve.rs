//! `tutorlink serve`: start the HTTP API server.

use tutorlink_config::AppConfig;

pub async fn run(port_override: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    if let Some(port) = port_override {
        config.gateway.port = port;
    }

    println!("📚 TutorLink Gateway");
    println!("   Listening:  {}:{}", config.gateway.host, config.gateway.port);
    println!("   Provider:   {} ({})", config.default_provider, config.default_model);
    if config.gateway.rate_limit_per_minute > 0 {
        println!("   Rate limit: {}/min", config.gateway.rate_limit_per_minute);
    }

    tutorlink_gateway::start(config).await?;

    Ok(())
}
