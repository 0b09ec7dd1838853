//! `tutorlink tools`: list the registered tool schemas.

use tutorlink_config::AppConfig;

pub async fn run(json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = tutorlink_tools::registry_from_config(&config)?;
    let schemas = registry.snapshot().schemas();

    if json {
        let list: Vec<_> = schemas.iter().map(|s| s.as_ref()).collect();
        println!("{}", serde_json::to_string_pretty(&list)?);
        return Ok(());
    }

    println!("🧰 Registered tools ({})", schemas.len());
    for schema in &schemas {
        let endpoint = config
            .tools
            .get(&schema.id)
            .map(|t| t.url.as_str())
            .unwrap_or("(no endpoint)");
        println!();
        println!("  {}  →  {endpoint}", schema.id);
        println!("     {}", schema.description);
        for param in &schema.parameters {
            let marker = if param.required { "*" } else { " " };
            println!("     {marker} {:<20} {}", param.name, param.param_type.describe());
        }
    }
    Ok(())
}
