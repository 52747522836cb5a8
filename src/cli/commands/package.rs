//! Package command - archive a build output for the mirror

use super::identity::deriver;
use crate::archive::{package, ArtifactMetadata};
use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::PackageArgs;
use crate::config::Config;
use crate::error::{ArtifactError, ArtifactResult};
use crate::identity::{IdentityDeriver, TargetDescriptor};
use crate::ui::{self, format_size, TaskSpinner, UiContext};

/// Execute the package command
pub async fn execute(args: PackageArgs, config: &Config) -> ArtifactResult<()> {
    let ctx = UiContext::detect();

    let (config_hash, target) = match (&args.config_hash, &args.descriptor) {
        (Some(hash), _) => (hash.clone(), args.target.clone()),
        (None, Some(path)) => {
            let descriptor = TargetDescriptor::load(path).await?;
            let hash = deriver(config).config_hash(&descriptor).await;
            let target = if args.target.is_empty() {
                descriptor.target
            } else {
                args.target.clone()
            };
            (hash, target)
        }
        (None, None) => {
            return Err(ArtifactError::User(
                "Either --config-hash or --descriptor is required".to_string(),
            ))
        }
    };

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Hashing {}...", args.output_dir.display()));

    let output = args.output_dir.clone();
    let dest = args.dest.clone();
    let name = args.name.clone();
    let version = args.version.clone();
    let result = tokio::task::spawn_blocking(move || {
        let metadata = ArtifactMetadata {
            target,
            name,
            version,
            config_hash,
            content_hash: IdentityDeriver::content_hash(&output)?,
        };
        package(&output, &dest, &metadata)
    })
    .await
    .map_err(|e| ArtifactError::Internal(format!("packaging task failed: {}", e)))?;

    let packaged = match result {
        Ok(packaged) => packaged,
        Err(e) => {
            spinner.stop_error("Packaging failed");
            return Err(e);
        }
    };
    spinner.stop(&format!("Packaged {}", packaged.metadata.filename()));

    ui::key_value(&ctx, "Archive", &packaged.archive.display().to_string());
    ui::key_value(&ctx, "Size", &format_size(packaged.size));
    ui::key_value(&ctx, "SHA256", &packaged.sha256);
    ui::key_value(&ctx, "Config hash", &packaged.metadata.config_hash);
    ui::key_value(&ctx, "Content hash", &packaged.metadata.content_hash);

    AuditLog::new(config)
        .log(
            AuditEvent::Package,
            &serde_json::json!({
                "name": packaged.metadata.name,
                "version": packaged.metadata.version,
                "config_hash": packaged.metadata.config_hash,
                "content_hash": packaged.metadata.content_hash,
                "archive": packaged.archive.display().to_string(),
                "sha256": packaged.sha256,
            }),
        )
        .await;

    Ok(())
}
