//! Query command - look up a prebuilt binary on the mirror
//!
//! stdout carries only the JSON result so callers can pipe it; everything
//! else goes to stderr.

use crate::cli::args::QueryArgs;
use crate::config::Config;
use crate::error::{ArtifactError, ArtifactResult};
use crate::mirror::{create_client, query};
use console::style;
use std::time::Duration;

/// Execute the query command
pub async fn execute(args: QueryArgs, config: &Config) -> ArtifactResult<()> {
    let mirror = args.mirror.as_deref().unwrap_or(&config.mirror.url);
    let client = create_client(mirror, Duration::from_secs(config.mirror.timeout_secs));

    if !args.quiet {
        eprintln!(
            "Querying {} for {} {} ({})...",
            client.base(),
            args.name,
            args.version,
            args.config_hash
        );
    }

    let hit = query(client.as_ref(), &args.name, &args.version, &args.config_hash)
        .await
        .ok_or_else(|| ArtifactError::NotAvailable {
            name: args.name.clone(),
            version: args.version.clone(),
            config_hash: args.config_hash.clone(),
        })?;

    println!("{}", serde_json::to_string_pretty(&hit)?);
    if !args.quiet {
        eprintln!("{} Binary available: {}", style("✓").green(), hit.url);
    }
    Ok(())
}
