//! Publish command - lay out archives as a mirror and upload them

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::PublishArgs;
use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::{ArtifactError, ArtifactResult};
use crate::mirror::{create_transport, stage, StageOptions, StagedMirror, TransportKind, UploadTransport};
use crate::ui::{self, TaskSpinner, UiContext};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Execute the publish command
pub async fn execute(args: PublishArgs, config: &Config) -> ArtifactResult<()> {
    let ctx = UiContext::detect();
    let kind = args.transport.unwrap_or_else(|| TransportKind::detect(&args.dest));
    let transport = create_transport(kind, BuildEnv::from_host(&config.env));

    ui::intro(&ctx, "Publish binaries");
    ui::key_value(&ctx, "Source", &args.source.display().to_string());
    ui::key_value(&ctx, "Destination", &args.dest);
    ui::key_value(&ctx, "Transport", transport.name());

    // Staged outside the source so the index never lists itself
    let staging =
        std::env::temp_dir().join(format!("bos-artifacts-publish-{}", uuid::Uuid::new_v4()));
    let result = stage_and_upload(&ctx, &args, transport.as_ref(), &staging).await;

    if staging.exists() {
        if let Err(e) = tokio::fs::remove_dir_all(&staging).await {
            warn!("Failed to remove staging dir {}: {}", staging.display(), e);
        }
    }
    let staged = result?;

    if args.dry_run {
        ui::outro_warn(
            &ctx,
            &format!("Dry run: {} packages would be published", staged.index.total),
        );
        return Ok(());
    }

    ui::outro_success(
        &ctx,
        &format!("Published {} packages to {}", staged.index.total, args.dest),
    );

    AuditLog::new(config)
        .log(
            AuditEvent::Publish,
            &serde_json::json!({
                "source": args.source.display().to_string(),
                "dest": args.dest,
                "transport": transport.name(),
                "packages": staged.index.total,
                "index_only": args.index_only,
            }),
        )
        .await;

    Ok(())
}

async fn stage_and_upload(
    ctx: &UiContext,
    args: &PublishArgs,
    transport: &dyn UploadTransport,
    staging: &Path,
) -> ArtifactResult<StagedMirror> {
    let source: PathBuf = args.source.clone();
    let target = staging.to_path_buf();
    let options = StageOptions {
        index_only: args.index_only,
    };
    let staged = tokio::task::spawn_blocking(move || stage(&source, &target, options))
        .await
        .map_err(|e| ArtifactError::Internal(format!("staging task failed: {}", e)))??;

    for (shard, count) in &staged.shards {
        ui::step_info(ctx, &format!("{}/: {} packages", shard, count));
    }
    for skipped in &staged.skipped {
        ui::step_warn_hint(
            ctx,
            &format!("Skipped {}", skipped.display()),
            "expected <name>-<version>-<confighash>-bin.tar.gz",
        );
    }

    if args.dry_run {
        return Ok(staged);
    }

    let mut spinner = TaskSpinner::new(ctx);
    spinner.start(&format!("Uploading via {}...", transport.name()));
    match transport.upload(staging, &args.dest).await {
        Ok(()) => {
            spinner.stop("Upload complete");
            Ok(staged)
        }
        Err(e) => {
            spinner.stop_error("Upload failed");
            Err(e)
        }
    }
}
