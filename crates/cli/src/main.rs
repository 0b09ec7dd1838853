//! TutorLink CLI, the main entry point.
//!
//! Commands:
//! - `serve`        Start the HTTP gateway
//! - `orchestrate`  Route one student message to a tool
//! - `analyze`      Show what the engine would do, without calling a tool
//! - `tools`        List the registered tool schemas
//! - `config`       Show, validate or locate the configuration
//! - `doctor`       Diagnose system health

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "tutorlink",
    about = "TutorLink: routes tutoring conversations to educational tools",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true, env = "TUTORLINK_LOG_JSON")]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP gateway server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Route a student message to a tool and call it
    Orchestrate(RequestArgs),

    /// Classify and extract without calling a tool
    Analyze(RequestArgs),

    /// List registered tool schemas
    Tools {
        /// Print full schemas as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Diagnose system health
    Doctor,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Check the configuration file for problems
    Validate,
    /// Print the configuration file path
    Path,
}

#[derive(Args)]
pub struct RequestArgs {
    /// The student's latest message
    pub message: String,

    /// JSON file holding prior turns: `[{"role": "user", "content": "..."}]`
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Student profile as inline JSON, e.g. `{"mastery_level": 6}`
    #[arg(long)]
    pub profile: Option<String>,

    /// Only consider these tools (repeatable)
    #[arg(long = "tool")]
    pub tools: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr);
    if cli.log_json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    match cli.command {
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Orchestrate(args) => commands::orchestrate::run(args).await?,
        Commands::Analyze(args) => commands::orchestrate::analyze(args).await?,
        Commands::Tools { json } => commands::tools::run(json).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show().await?,
            ConfigAction::Validate => commands::config_cmd::validate().await?,
            ConfigAction::Path => commands::config_cmd::path().await?,
        },
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
