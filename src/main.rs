// Copyright 2025 Decoy Contributors
// Licensed under GPL-3.0

//! Decoy CLI application

use anyhow::Result;
use clap::{Parser, Subcommand};
use decoy::config::AppConfig;

mod cli;

#[derive(Parser)]
#[command(name = "decoy")]
#[command(about = "Local traffic interception: selective DNS rewriting with a TLS-terminating reverse proxy", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the DNS resolver and HTTPS proxy (the default)
    Run,
    /// Show the effective configuration
    Status,
    /// Reset every network interface to automatic DNS (recovery after a
    /// crashed session)
    ResetDns,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => {
            let config = AppConfig::load()?;
            init_logging(&config.log_level, cli.verbose);
            cli::serve::run(config).await?;
        }
        Commands::Status => {
            let config = AppConfig::load()?;
            init_logging(&config.log_level, cli.verbose);
            cli::serve::status(&config);
        }
        Commands::ResetDns => {
            init_logging("info", cli.verbose);
            cli::dns::reset()?;
        }
    }

    Ok(())
}

/// Configure tracing output. `RUST_LOG` wins over everything; otherwise the
/// configured level applies, raised to debug by `--verbose`.
fn init_logging(level: &str, verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if verbose {
        EnvFilter::new("decoy=debug")
    } else {
        let level = match level {
            "debug" | "info" | "warn" | "error" => level,
            _ => "info",
        };
        EnvFilter::new(format!("decoy={level}"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
