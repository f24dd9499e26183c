//! quizpilot CLI: the main entry point.
//!
//! Commands:
//! - `serve`:  Start the HTTP frontend that accepts quiz URLs
//! - `solve`:  Run one quiz chain in the foreground
//! - `config`: Show, locate, create or validate the config file
//! - `doctor`: Diagnose configuration and external dependencies

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "quizpilot",
    about = "quizpilot: autonomous quiz-solving agent",
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
    #[arg(long, global = true)]
    json_logs: bool,

    /// Config file to use instead of ~/.quizpilot/config.toml
    #[arg(short, long, global = true, env = "QUIZPILOT_CONFIG")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Solve one quiz chain in the foreground and print the report
    Solve {
        /// First quiz URL
        #[arg(long)]
        url: String,

        /// Override the step ceiling
        #[arg(long)]
        max_steps: Option<u32>,
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
    /// Print the effective configuration with credentials redacted
    Show,
    /// Print the config file path
    Path,
    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Check the configuration for serving
    Validate,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    if cli.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Serve { port } => commands::serve::run(config_path, port).await?,
        Commands::Solve { url, max_steps } => commands::solve::run(config_path, &url, max_steps).await?,
        Commands::Config { action } => match action {
            ConfigAction::Show => commands::config_cmd::show(config_path)?,
            ConfigAction::Path => commands::config_cmd::path(config_path),
            ConfigAction::Init { force } => commands::config_cmd::init(config_path, force)?,
            ConfigAction::Validate => commands::config_cmd::validate(config_path)?,
        },
        Commands::Doctor => commands::doctor::run(config_path).await?,
    }

    Ok(())
}
