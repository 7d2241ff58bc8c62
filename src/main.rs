//! campus-cache - Offline cache controller for the Smart Campus web app
//!
//! CLI entry point that dispatches to subcommands.

use campus_cache::cli::{Cli, Commands};
use campus_cache::config::{Config, ConfigManager};
use campus_cache::error::CampusResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CampusResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor state
    if let Commands::Completions(args) = cli.command {
        return campus_cache::cli::commands::completions(args);
    }

    let config_manager = if let Some(ref path) = cli.config {
        ConfigManager::with_path(path.clone())
    } else {
        ConfigManager::new()
    };
    let config = config_manager.load().await?;

    init_logging(cli.verbose, &config);
    campus_cache::ui::init_theme();

    if let Commands::Config(args) = cli.command {
        return campus_cache::cli::commands::config(args, &config, &config_manager).await;
    }

    // Ensure state directories exist
    ConfigManager::ensure_state_dirs(&config).await?;

    match cli.command {
        Commands::Install(args) => campus_cache::cli::commands::install(args, &config).await,
        Commands::Activate => campus_cache::cli::commands::activate(&config).await,
        Commands::Fetch(args) => campus_cache::cli::commands::fetch(args, &config).await,
        Commands::Cache(args) => campus_cache::cli::commands::cache(args, &config).await,
        Commands::Status => campus_cache::cli::commands::status(&config).await,
        Commands::Config(_) | Commands::Completions(_) => unreachable!("handled above"),
    }
}

/// 0 = warn, 1 = info, 2+ = debug
fn init_logging(verbose: u8, config: &Config) {
    let filter = match verbose {
        0 => EnvFilter::new("campus_cache=warn"),
        1 => EnvFilter::new("campus_cache=info"),
        _ => EnvFilter::new("campus_cache=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.without_time().init();
    }
}
