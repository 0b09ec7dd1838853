//! `tutorlink config`: configuration management commands.

use tutorlink_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let mut warnings = Vec::new();

            if !config.has_api_key() {
                warnings.push("No API key set (set TUTORLINK_API_KEY or OPENAI_API_KEY env var)".to_string());
            }

            if config.gateway.host == "0.0.0.0" {
                warnings.push("Gateway bound to 0.0.0.0 (reachable from other hosts)".to_string());
            }

            match tutorlink_tools::registry_from_config(&config) {
                Ok(registry) => {
                    for tool_id in tutorlink_tools::missing_endpoints(&registry, &config) {
                        warnings.push(format!("Tool '{tool_id}' has no endpoint under [tools]"));
                    }
                }
                Err(e) => warnings.push(format!("Schema catalog rejected: {e}")),
            }

            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:    {}", config.default_provider);
            println!("   Model:       {}", config.default_model);
            println!("   Threshold:   {}", config.classifier.confidence_threshold);
            println!("   Extraction:  {:?}", config.extractor.strategy);
            println!(
                "   Gateway:     {}:{}",
                config.gateway.host, config.gateway.port
            );
            println!("   Tools:       {}", config.tools.len());
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let toml_str = toml::to_string_pretty(&redacted(config))?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", AppConfig::config_path().display());
    Ok(())
}

fn redacted(mut config: AppConfig) -> AppConfig {
    let mask = |key: &mut Option<String>| {
        if key.is_some() {
            *key = Some("[REDACTED]".into());
        }
    };
    mask(&mut config.api_key);
    for provider in config.providers.values_mut() {
        mask(&mut provider.api_key);
    }
    config
}
