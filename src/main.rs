//! bos-artifacts - content-addressed build artifacts and provenance
//!
//! CLI entry point that dispatches to subcommands.

use bos_artifacts::cli::{commands, Cli, Commands, LogFormat};
use bos_artifacts::config::ConfigManager;
use bos_artifacts::error::ArtifactResult;
use bos_artifacts::ui;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
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

async fn run() -> ArtifactResult<()> {
    let cli = Cli::parse();

    // Completions need neither config nor logging
    if let Commands::Completions(args) = &cli.command {
        return commands::completions(args).await;
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = manager.load().await?;

    let format = cli
        .log_format
        .unwrap_or_else(|| LogFormat::from_config(&config.general.log_format));
    init_logging(cli.verbose, format);
    debug!("Loaded configuration from {}", manager.path().display());

    ui::init_theme();

    // Dispatch to command
    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Hash(args) => commands::hash(args).await,
        Commands::ConfigHash(args) => commands::config_hash(args, &config).await,
        Commands::Package(args) => commands::package(args, &config).await,
        Commands::Publish(args) => commands::publish(args, &config).await,
        Commands::Query(args) => commands::query(args, &config).await,
        Commands::Install(args) => commands::install(args, &config).await,
        Commands::FetchSources(args) => commands::fetch_sources(args, &config).await,
        Commands::VerifyMirror(args) => commands::verify_mirror(args).await,
        Commands::Stamp(args) => commands::stamp(args, &config).await,
        Commands::Verify(args) => commands::verify(args, &config).await,
        Commands::Config(args) => commands::config(args, &manager, &config).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; always to stderr so stdout stays parseable
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("bos_artifacts=warn"),
        1 => EnvFilter::new("bos_artifacts=info"),
        _ => EnvFilter::new("bos_artifacts=debug"),
    };

    match format {
        LogFormat::Text => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .without_time()
            .init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init(),
    }
}
