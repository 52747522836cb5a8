//! Install command - download, verify and install a prebuilt binary

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::InstallArgs;
use crate::config::Config;
use crate::error::{ArtifactError, ArtifactResult};
use crate::mirror::{create_client, install, query, Installer, MirrorHit};
use crate::ui::{self, format_size, TaskSpinner, UiContext};
use std::time::Duration;

/// Execute the install command
pub async fn execute(args: InstallArgs, config: &Config) -> ArtifactResult<()> {
    let ctx = UiContext::detect();
    let mirror = args.mirror.as_deref().unwrap_or(&config.mirror.url);
    let client = create_client(mirror, Duration::from_secs(config.mirror.timeout_secs));
    let cache_dir = args.cache_dir.clone().unwrap_or_else(|| config.mirror.cache_dir());
    let installer = Installer::new(client.as_ref(), cache_dir);

    if args.list {
        let builds = installer.available(&args.package).await?;
        if builds.is_empty() {
            ui::step_warn(&ctx, &format!("No packages found for {}", args.package));
            return Ok(());
        }
        ui::section(&ctx, &format!("Available packages for {}:", args.package));
        for build in builds {
            ui::key_value(
                &ctx,
                &build.version,
                &format!("{}  {}", build.config_hash, format_size(build.size)),
            );
        }
        return Ok(());
    }

    let version = args
        .version
        .clone()
        .ok_or_else(|| ArtifactError::User("--version required".to_string()))?;
    let prefix = args.prefix.clone().unwrap_or_else(|| config.mirror.prefix.clone());

    ui::intro(&ctx, &format!("Install {} {}", args.package, version));
    ui::key_value(&ctx, "Mirror", client.base());
    ui::key_value(&ctx, "Prefix", &prefix.display().to_string());

    let config_hash = match &args.config_hash {
        Some(hash) => hash.clone(),
        None => installer
            .available(&args.package)
            .await?
            .into_iter()
            .find(|b| b.version == version)
            .map(|b| b.config_hash)
            .ok_or_else(|| not_available(&args.package, &version, "any"))?,
    };

    let hit = query(client.as_ref(), &args.package, &version, &config_hash)
        .await
        .ok_or_else(|| not_available(&args.package, &version, &config_hash))?;
    check_file_hash(&hit, args.file_hash.as_deref())?;

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Downloading {}...", hit.filename));
    let archive = match installer.fetch(&args.package, &hit).await {
        Ok(archive) => {
            spinner.stop(&format!("Package verified ({})", format_size(hit.size)));
            archive
        }
        Err(e) => {
            spinner.stop_error("Download failed");
            return Err(e);
        }
    };

    if args.download_only {
        ui::outro_success(
            &ctx,
            &format!("Package downloaded to: {}", archive.display()),
        );
        return Ok(());
    }

    let target = prefix.clone();
    let report = tokio::task::spawn_blocking(move || install(&archive, &target))
        .await
        .map_err(|e| ArtifactError::Internal(format!("install task failed: {}", e)))??;

    ui::step_ok_detail(
        &ctx,
        &format!("Installed {} files", report.files),
        &prefix.display().to_string(),
    );
    ui::outro_success(
        &ctx,
        &format!("Successfully installed {} {}", args.package, version),
    );

    AuditLog::new(config)
        .log(
            AuditEvent::Install,
            &serde_json::json!({
                "name": args.package,
                "version": version,
                "config_hash": hit.config_hash,
                "content_hash": report.content_hash,
                "prefix": prefix.display().to_string(),
                "files": report.files,
            }),
        )
        .await;

    Ok(())
}

fn not_available(name: &str, version: &str, config_hash: &str) -> ArtifactError {
    ArtifactError::NotAvailable {
        name: name.to_string(),
        version: version.to_string(),
        config_hash: config_hash.to_string(),
    }
}

/// `--file-hash` pins the build by a prefix of its content hash
fn check_file_hash(hit: &MirrorHit, expected: Option<&str>) -> ArtifactResult<()> {
    match expected {
        Some(prefix) if !hit.content_hash.starts_with(prefix) => Err(ArtifactError::User(format!(
            "{} has content hash {}, expected {}",
            hit.filename, hit.content_hash, prefix
        ))),
        _ => Ok(()),
    }
}
