//! Source mirror commands - fetch-sources and verify-mirror

use crate::cli::args::{FetchSourcesArgs, VerifyMirrorArgs};
use crate::config::Config;
use crate::error::{ArtifactError, ArtifactResult};
use crate::fetch::{
    self, load_sources, mirror_rel_path, url_basename, DownloadStats, FetchOptions, FetchOutcome,
    HttpDownloader, ManifestEntry, MirrorCheck, ProgressFn, SourceEntry, SourceFetcher,
};
use crate::fsutil::write_atomic;
use crate::ui::{self, DownloadProgress, UiContext};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Entries shown before asking to proceed
const SAMPLE_SIZE: usize = 5;

/// Missing or failed entries listed in the summary
const LIST_LIMIT: usize = 10;

/// Execute the fetch-sources command
pub async fn fetch_sources(args: FetchSourcesArgs, config: &Config) -> ArtifactResult<()> {
    let ctx = UiContext::detect().with_auto_yes(args.yes);
    let sources = load_sources(&args.sources).await?;

    let mut options = FetchOptions::from(&config.fetch);
    if let Some(jobs) = args.jobs {
        options.jobs = jobs;
    }
    if let Some(rate) = args.rate_limit {
        options.rate_limit = rate;
    }
    let timeout = Duration::from_secs(args.timeout.unwrap_or(config.fetch.timeout_secs));

    ui::intro(&ctx, "Source downloader");
    ui::key_value(&ctx, "Output directory", &args.dest.display().to_string());
    ui::key_value(&ctx, "Workers", &options.jobs.to_string());
    ui::key_value(&ctx, "Rate limit", &format!("{} req/sec", options.rate_limit));
    ui::key_value(&ctx, "Timeout", &format!("{}s", timeout.as_secs()));

    if sources.is_empty() {
        return Err(ArtifactError::User(format!(
            "No sources listed in {}",
            args.sources.display()
        )));
    }

    ui::section(&ctx, &format!("Found {} source files to download", sources.len()));
    print_sample(&ctx, &sources, &args.dest, if args.dry_run { sources.len() } else { SAMPLE_SIZE });

    if args.dry_run {
        ui::outro_warn(&ctx, "Dry run: nothing downloaded");
        return Ok(());
    }

    if !ui::confirm(&ctx, "Proceed with download?", false).await? {
        ui::outro_warn(&ctx, "Cancelled.");
        return Ok(());
    }

    let total = sources.len() as u64;
    let progress = Arc::new(DownloadProgress::new(&ctx, total));
    let on_done: ProgressFn = {
        let progress = Arc::clone(&progress);
        Arc::new(move |entry: &ManifestEntry, outcome: &FetchOutcome, stats: &DownloadStats| {
            progress.on_done(&entry.path, outcome.is_success(), &stats.position());
        })
    };

    let downloader = Arc::new(HttpDownloader::new(timeout));
    let fetcher = SourceFetcher::new(downloader, &args.dest, options);
    let report = fetcher.run(sources, Some(on_done)).await?;
    progress.finish();

    ui::note(&ctx, "Summary", &report.stats.summary());
    ui::key_value(&ctx, "Manifest", &report.manifest.display().to_string());

    if report.all_succeeded() {
        ui::outro_success(&ctx, "All sources downloaded");
        Ok(())
    } else {
        for entry in report.entries.iter().filter(|e| !e.success).take(LIST_LIMIT) {
            ui::step_error_detail(&ctx, &entry.path, &entry.url);
        }
        Err(ArtifactError::DownloadsFailed {
            failed: report.stats.failed(),
            total,
        })
    }
}

fn print_sample(ctx: &UiContext, sources: &[SourceEntry], dest: &Path, limit: usize) {
    for source in sources.iter().take(limit) {
        let digest = if source.sha256.is_empty() {
            "unpinned".to_string()
        } else if fetch::is_unstable_url(&source.url) {
            "unstable, not verified".to_string()
        } else {
            format!("{}...", source.sha256.chars().take(16).collect::<String>())
        };
        ui::step_info(
            ctx,
            &format!(
                "{} -> {} ({})",
                source.url,
                dest.join(mirror_rel_path(&source.package, &source.url)).display(),
                digest
            ),
        );
    }
    if sources.len() > limit {
        ui::remark(ctx, &format!("... and {} more", sources.len() - limit));
    }
}

/// Execute the verify-mirror command
pub async fn verify_mirror(args: VerifyMirrorArgs) -> ArtifactResult<()> {
    let ctx = UiContext::detect();
    let sources = load_sources(&args.sources).await?;

    ui::intro(&ctx, "Mirror verification");
    ui::key_value(&ctx, "Mirror", &args.mirror_dir.display().to_string());
    ui::key_value(&ctx, "Check checksums", &args.check_checksums.to_string());

    let root = args.mirror_dir.clone();
    let check_checksums = args.check_checksums;
    let check =
        tokio::task::spawn_blocking(move || fetch::verify_mirror(&root, &sources, check_checksums))
            .await
            .map_err(|e| ArtifactError::Internal(format!("verify task failed: {}", e)))??;

    ui::section(&ctx, "Verification summary");
    ui::key_value_status(&ctx, "Found", &check.found.to_string(), true);
    ui::key_value_status(
        &ctx,
        "Missing",
        &check.missing.len().to_string(),
        check.missing.is_empty(),
    );
    if args.check_checksums {
        ui::key_value_status(
            &ctx,
            "Checksum failures",
            &check.checksum_failures.len().to_string(),
            check.checksum_failures.is_empty(),
        );
    }
    ui::key_value(&ctx, "Completeness", &format!("{:.1}%", check.completeness()));

    list_entries(&ctx, "Missing files", &check.missing);
    list_entries(&ctx, "Checksum failures", &check.checksum_failures);

    if let Some(path) = &args.report {
        let report = report_json(&args.mirror_dir, args.check_checksums, &check);
        write_atomic(path, serde_json::to_string_pretty(&report)?.as_bytes())?;
        ui::step_ok_detail(&ctx, "Detailed report written", &path.display().to_string());
    }

    if check.is_complete() {
        ui::outro_success(&ctx, "Mirror complete");
        Ok(())
    } else {
        Err(ArtifactError::MirrorIncomplete {
            missing: check.missing.len(),
            checksum_failures: check.checksum_failures.len(),
        })
    }
}

fn list_entries(ctx: &UiContext, title: &str, entries: &[SourceEntry]) {
    if entries.is_empty() {
        return;
    }
    ui::section(ctx, &format!("{} (first {}):", title, LIST_LIMIT.min(entries.len())));
    for entry in entries.iter().take(LIST_LIMIT) {
        ui::step_error_detail(ctx, url_basename(&entry.url), &entry.package);
    }
    if entries.len() > LIST_LIMIT {
        ui::remark(ctx, &format!("... and {} more", entries.len() - LIST_LIMIT));
    }
}

fn report_json(mirror_dir: &Path, check_checksums: bool, check: &MirrorCheck) -> serde_json::Value {
    serde_json::json!({
        "mirror_dir": mirror_dir.display().to_string(),
        "check_checksums": check_checksums,
        "summary": {
            "found": check.found,
            "missing": check.missing.len(),
            "checksum_failures": check.checksum_failures.len(),
            "total": check.found + check.missing.len(),
            "completeness_percent": check.completeness(),
        },
        "missing_files": check.missing.iter().map(|s| serde_json::json!({
            "package": s.package,
            "url": s.url,
            "filename": url_basename(&s.url),
        })).collect::<Vec<_>>(),
        "checksum_failures": check.checksum_failures.iter().map(|s| serde_json::json!({
            "package": s.package,
            "filename": url_basename(&s.url),
            "expected_sha256": s.sha256,
        })).collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_counts_and_lists() {
        let missing = SourceEntry {
            package: "zlib".to_string(),
            url: "https://zlib.net/zlib-1.3.1.tar.gz".to_string(),
            sha256: "abc".to_string(),
        };
        let check = MirrorCheck {
            found: 3,
            missing: vec![missing],
            checksum_failures: vec![],
        };

        let report = report_json(Path::new("/srv/sources"), true, &check);
        assert_eq!(report["summary"]["total"], 4);
        assert_eq!(report["summary"]["completeness_percent"], 75.0);
        assert_eq!(report["missing_files"][0]["filename"], "zlib-1.3.1.tar.gz");
        assert_eq!(report["checksum_failures"], serde_json::json!([]));
    }
}
