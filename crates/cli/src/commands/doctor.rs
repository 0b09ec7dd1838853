//! `tutorlink doctor`: diagnose system health.

use tutorlink_config::AppConfig;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    println!("🩺 TutorLink Doctor: System Diagnostics");
    println!("========================================\n");

    let mut issues = 0;

    let config_path = AppConfig::config_path();
    if !config_path.exists() {
        println!("  ⚠️  No config file at {}, using defaults", config_path.display());
    }

    let config = match AppConfig::load() {
        Ok(config) => {
            println!("  ✅ Configuration valid");
            config
        }
        Err(e) => {
            println!("  ❌ Config file invalid: {e}");
            println!("\n  ⚠️  1 issue(s) found. Fix the config to run further checks.");
            return Ok(());
        }
    };

    if config.has_api_key() {
        println!("  ✅ API key configured");
    } else {
        println!("  ⚠️  No API key configured; set TUTORLINK_API_KEY or add api_key to config.toml");
        issues += 1;
    }

    match tutorlink_tools::registry_from_config(&config) {
        Ok(registry) => {
            println!("  ✅ {} tool schema(s) registered", registry.list_ids().len());
            let missing = tutorlink_tools::missing_endpoints(&registry, &config);
            if missing.is_empty() {
                println!("  ✅ Every tool has an endpoint");
            } else {
                println!("  ⚠️  Tools without endpoints: {}", missing.join(", "));
                issues += 1;
            }
        }
        Err(e) => {
            println!("  ❌ Schema catalog rejected: {e}");
            issues += 1;
        }
    }

    match tutorlink_providers::build_oracle(&config) {
        Some(oracle) => match oracle.health_check().await {
            Ok(true) => println!("  ✅ Oracle '{}' reachable", oracle.name()),
            Ok(false) => {
                println!("  ⚠️  Oracle '{}' answered but reported unhealthy", oracle.name());
                issues += 1;
            }
            Err(e) => {
                println!("  ❌ Oracle '{}' unreachable: {e}", oracle.name());
                issues += 1;
            }
        },
        None => {
            println!("  ❌ No oracle for provider '{}'", config.default_provider);
            issues += 1;
        }
    }

    println!();
    if issues == 0 {
        println!("  🎉 All checks passed!");
    } else {
        println!("  ⚠️  {issues} issue(s) found. See above for details.");
    }

    Ok(())
}
