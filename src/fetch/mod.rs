//! Source tarball mirroring
//!
//! Downloads `(package, url, sha256)` entries into a sharded directory
//! (`<first letter>/<package>-<basename>`) with a fixed number of workers
//! sharing one rate limiter. Each download lands in `<file>.tmp`, is
//! verified, and only then renamed into place. `MANIFEST.json` is written
//! after every worker has finished.

mod rate;

pub use rate::{retry_delay, RateLimiter};

use crate::config::schema::FetchConfig;
use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::write_atomic;
use crate::hash::sha256_file;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Written at the root of the destination after a run
pub const MANIFEST_FILE: &str = "MANIFEST.json";

/// One source to mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceEntry {
    pub package: String,
    pub url: String,
    /// Expected digest; empty means unchecked
    #[serde(default)]
    pub sha256: String,
}

/// Read a JSON list of sources, dropping repeated URLs
pub async fn load_sources(path: &Path) -> ArtifactResult<Vec<SourceEntry>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ArtifactError::io(format!("reading {}", path.display()), e))?;
    let entries: Vec<SourceEntry> = serde_json::from_str(&text)?;

    let mut seen = HashSet::new();
    Ok(entries
        .into_iter()
        .filter(|e| seen.insert(e.url.clone()))
        .collect())
}

/// Branch snapshot archives change under the same URL, so their digests
/// cannot be pinned
pub fn is_unstable_url(url: &str) -> bool {
    url.contains("/archive/") && url.contains("/refs/heads/")
}

/// Last path segment of a URL, ignoring query and fragment
pub fn url_basename(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.rsplit('/').next().unwrap_or(path)
}

/// Mirror-relative destination for a source
pub fn mirror_rel_path(package: &str, url: &str) -> PathBuf {
    let base = url_basename(url);
    let prefix = format!("{}-", package.to_lowercase());
    let filename = if base.to_lowercase().starts_with(&prefix) {
        base.to_string()
    } else {
        format!("{}-{}", package, base)
    };

    let shard = package
        .chars()
        .next()
        .map(|c| c.to_lowercase().to_string())
        .unwrap_or_else(|| "other".to_string());
    PathBuf::from(shard).join(filename)
}

/// Retrieves one URL into a local file
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Write the body of `url` to `dest`, returning the byte count
    async fn download(&self, url: &str, dest: &Path) -> ArtifactResult<u64>;
}

/// Downloads over HTTP(S)
pub struct HttpDownloader {
    agent: ureq::Agent,
}

impl HttpDownloader {
    pub fn new(timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl Downloader for HttpDownloader {
    async fn download(&self, url: &str, dest: &Path) -> ArtifactResult<u64> {
        let agent = self.agent.clone();
        let url = url.to_string();
        let dest = dest.to_path_buf();
        debug!("GET {} -> {}", url, dest.display());

        tokio::task::spawn_blocking(move || {
            let mut response = agent
                .get(url.as_str())
                .call()
                .map_err(|e| ArtifactError::http(&url, e))?;
            let mut reader = response.body_mut().as_reader();
            let mut file = File::create(&dest)
                .map_err(|e| ArtifactError::io(format!("creating {}", dest.display()), e))?;
            io::copy(&mut reader, &mut file).map_err(|e| ArtifactError::http(&url, e))
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("download task failed: {}", e)))?
    }
}

/// Worker pool settings
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub jobs: usize,
    pub rate_limit: f64,
    pub attempts: u32,
    pub backoff: Duration,
}

impl From<&FetchConfig> for FetchOptions {
    fn from(config: &FetchConfig) -> Self {
        Self {
            jobs: config.max_concurrent,
            rate_limit: config.rate_limit,
            attempts: config.retries,
            backoff: Duration::from_secs(1),
        }
    }
}

/// Running totals, updated by every worker
#[derive(Debug, Default)]
pub struct DownloadStats {
    total: AtomicU64,
    downloaded: AtomicU64,
    cached: AtomicU64,
    failed: AtomicU64,
    bytes: AtomicU64,
}

impl DownloadStats {
    pub fn total(&self) -> u64 {
        self.total.load(Ordering::Relaxed)
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded.load(Ordering::Relaxed)
    }

    pub fn cached(&self) -> u64 {
        self.cached.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn bytes(&self) -> u64 {
        self.bytes.load(Ordering::Relaxed)
    }

    /// Entries finished in any way
    pub fn completed(&self) -> u64 {
        self.downloaded() + self.cached() + self.failed()
    }

    /// `completed/total`, for per-entry progress lines
    pub fn position(&self) -> String {
        format!("{}/{}", self.completed(), self.total())
    }

    /// One-line summary of the totals
    pub fn summary(&self) -> String {
        format!(
            "Downloaded: {}/{}, Cached: {}, Failed: {}, Size: {:.2} MB",
            self.downloaded(),
            self.total(),
            self.cached(),
            self.failed(),
            self.bytes() as f64 / 1024.0 / 1024.0
        )
    }

    fn record(&self, outcome: &FetchOutcome) {
        match outcome {
            FetchOutcome::Downloaded(bytes) => {
                self.downloaded.fetch_add(1, Ordering::Relaxed);
                self.bytes.fetch_add(*bytes, Ordering::Relaxed);
            }
            FetchOutcome::Cached => {
                self.cached.fetch_add(1, Ordering::Relaxed);
            }
            FetchOutcome::Failed(_) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}

/// How a single entry ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Downloaded(u64),
    Cached,
    Failed(String),
}

impl FetchOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }
}

/// One line of `MANIFEST.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub target: String,
    pub url: String,
    pub sha256: String,
    pub path: String,
    pub success: bool,
}

/// Called after each entry finishes
pub type ProgressFn = Arc<dyn Fn(&ManifestEntry, &FetchOutcome, &DownloadStats) + Send + Sync>;

/// Result of a whole run
#[derive(Debug)]
pub struct FetchReport {
    pub entries: Vec<ManifestEntry>,
    pub stats: Arc<DownloadStats>,
    pub manifest: PathBuf,
}

impl FetchReport {
    pub fn all_succeeded(&self) -> bool {
        self.stats.failed() == 0
    }
}

/// Bulk downloader into a sharded source mirror
#[derive(Clone)]
pub struct SourceFetcher {
    downloader: Arc<dyn Downloader>,
    limiter: Arc<RateLimiter>,
    options: FetchOptions,
    dest: PathBuf,
}

impl SourceFetcher {
    pub fn new(downloader: Arc<dyn Downloader>, dest: impl Into<PathBuf>, options: FetchOptions) -> Self {
        Self {
            downloader,
            limiter: Arc::new(RateLimiter::new(options.rate_limit)),
            options,
            dest: dest.into(),
        }
    }

    /// Download every entry and write the manifest.
    ///
    /// Individual failures are recorded, never propagated; only failing to
    /// create the destination or write the manifest is an error.
    pub async fn run(&self, sources: Vec<SourceEntry>, progress: Option<ProgressFn>) -> ArtifactResult<FetchReport> {
        tokio::fs::create_dir_all(&self.dest)
            .await
            .map_err(|e| ArtifactError::io(format!("creating {}", self.dest.display()), e))?;

        let stats = Arc::new(DownloadStats::default());
        stats.total.store(sources.len() as u64, Ordering::Relaxed);
        info!(
            "Fetching {} sources into {} ({} workers, {} req/s)",
            sources.len(),
            self.dest.display(),
            self.options.jobs.max(1),
            self.limiter.rate()
        );
        let queue = Arc::new(Mutex::new(VecDeque::from(sources)));

        let workers = (0..self.options.jobs.max(1)).map(|id| {
            let fetcher = self.clone();
            let queue = Arc::clone(&queue);
            let stats = Arc::clone(&stats);
            let progress = progress.clone();
            tokio::spawn(async move { fetcher.worker(id, queue, stats, progress).await })
        });

        let mut entries = Vec::new();
        for joined in futures_util::future::join_all(workers).await {
            match joined {
                Ok(done) => entries.extend(done),
                Err(e) => warn!("Download worker panicked: {}", e),
            }
        }

        let manifest = self.dest.join(MANIFEST_FILE);
        write_atomic(&manifest, serde_json::to_string_pretty(&entries)?.as_bytes())?;
        info!("{}", stats.summary());

        Ok(FetchReport {
            entries,
            stats,
            manifest,
        })
    }

    async fn worker(
        &self,
        id: usize,
        queue: Arc<Mutex<VecDeque<SourceEntry>>>,
        stats: Arc<DownloadStats>,
        progress: Option<ProgressFn>,
    ) -> Vec<ManifestEntry> {
        let mut done = Vec::new();
        loop {
            let Some(source) = queue.lock().await.pop_front() else {
                debug!("Worker {} idle", id);
                return done;
            };

            let rel = mirror_rel_path(&source.package, &source.url);
            let outcome = self.fetch_one(&source, &self.dest.join(&rel)).await;
            stats.record(&outcome);

            let entry = ManifestEntry {
                target: source.package,
                url: source.url,
                sha256: source.sha256,
                path: rel.display().to_string(),
                success: outcome.is_success(),
            };
            if let Some(progress) = &progress {
                progress(&entry, &outcome, &stats);
            }
            done.push(entry);
        }
    }

    async fn fetch_one(&self, source: &SourceEntry, dest: &Path) -> FetchOutcome {
        let expected = if is_unstable_url(&source.url) {
            if !source.sha256.is_empty() {
                debug!("Unstable URL, skipping verification: {}", source.url);
            }
            ""
        } else {
            source.sha256.as_str()
        };

        if tokio::fs::try_exists(dest).await.unwrap_or(false) {
            match verify(dest, expected).await {
                Ok(true) => return FetchOutcome::Cached,
                _ => {
                    warn!("Checksum mismatch for cached {}, re-downloading", dest.display());
                    if let Err(e) = tokio::fs::remove_file(dest).await {
                        return FetchOutcome::Failed(e.to_string());
                    }
                }
            }
        }

        if let Some(parent) = dest.parent() {
            if let Err(e) = tokio::fs::create_dir_all(parent).await {
                return FetchOutcome::Failed(e.to_string());
            }
        }

        self.limiter.acquire().await;

        let attempts = self.options.attempts.max(1);
        let mut last = None;
        for attempt in 0..attempts {
            info!(
                "Downloading {} -> {} (attempt {}/{})",
                source.url,
                dest.display(),
                attempt + 1,
                attempts
            );
            match self.attempt(&source.url, dest, expected).await {
                Ok(bytes) => return FetchOutcome::Downloaded(bytes),
                Err(e) => {
                    warn!("Download failed (attempt {}/{}): {}", attempt + 1, attempts, e);
                    let retryable = e.is_retryable();
                    last = Some(e);
                    if !retryable {
                        break;
                    }
                    if attempt + 1 < attempts {
                        tokio::time::sleep(retry_delay(attempt, self.options.backoff)).await;
                    }
                }
            }
        }

        let reason = match last {
            Some(e) if !e.is_retryable() => e.to_string(),
            _ => ArtifactError::DownloadExhausted {
                url: source.url.clone(),
                attempts,
            }
            .to_string(),
        };
        FetchOutcome::Failed(reason)
    }

    async fn attempt(&self, url: &str, dest: &Path, expected: &str) -> ArtifactResult<u64> {
        let mut name = dest.as_os_str().to_owned();
        name.push(".tmp");
        let tmp = PathBuf::from(name);

        let result = async {
            let bytes = self.downloader.download(url, &tmp).await?;
            if !expected.is_empty() {
                let actual = digest(&tmp).await?;
                if actual != expected {
                    return Err(ArtifactError::ChecksumMismatch {
                        path: dest.to_path_buf(),
                        expected: expected.to_string(),
                        actual,
                    });
                }
            }
            tokio::fs::rename(&tmp, dest)
                .await
                .map_err(|e| ArtifactError::io(format!("renaming into {}", dest.display()), e))?;
            Ok(bytes)
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

async fn digest(path: &Path) -> ArtifactResult<String> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || sha256_file(&path))
        .await
        .map_err(|e| ArtifactError::Internal(format!("hash task failed: {}", e)))?
}

/// An empty expectation always verifies
async fn verify(path: &Path, expected: &str) -> ArtifactResult<bool> {
    if expected.is_empty() {
        return Ok(true);
    }
    Ok(digest(path).await? == expected)
}

/// Outcome of checking a source mirror against a source list
#[derive(Debug, Default)]
pub struct MirrorCheck {
    pub found: usize,
    pub missing: Vec<SourceEntry>,
    pub checksum_failures: Vec<SourceEntry>,
}

impl MirrorCheck {
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.checksum_failures.is_empty()
    }

    /// Share of entries present, in percent
    pub fn completeness(&self) -> f64 {
        let total = self.found + self.missing.len();
        if total == 0 {
            return 100.0;
        }
        self.found as f64 * 100.0 / total as f64
    }
}

/// Locate every source in `root`, optionally checking digests
pub fn verify_mirror(root: &Path, sources: &[SourceEntry], check_checksums: bool) -> ArtifactResult<MirrorCheck> {
    if !root.is_dir() {
        return Err(ArtifactError::PathNotFound(root.to_path_buf()));
    }

    let mut check = MirrorCheck::default();
    for source in sources {
        let Some(path) = locate(root, source) else {
            debug!("Missing: {} ({})", url_basename(&source.url), source.package);
            check.missing.push(source.clone());
            continue;
        };

        check.found += 1;
        let checkable = !source.sha256.is_empty() && !is_unstable_url(&source.url);
        if check_checksums && checkable && sha256_file(&path)? != source.sha256 {
            warn!("Checksum failed: {}", path.display());
            check.checksum_failures.push(source.clone());
        }
    }
    Ok(check)
}

/// Look in the downloader's layout, then the shard of the bare filename,
/// then `other/`, then the root, then anywhere below it
fn locate(root: &Path, source: &SourceEntry) -> Option<PathBuf> {
    let laid_out = root.join(mirror_rel_path(&source.package, &source.url));
    if laid_out.is_file() {
        return Some(laid_out);
    }

    let filename = url_basename(&source.url);
    if filename.is_empty() {
        return None;
    }
    let shard = filename.chars().next().map(|c| c.to_lowercase().to_string());
    let candidates = shard
        .into_iter()
        .map(|s| root.join(s).join(filename))
        .chain([root.join("other").join(filename), root.join(filename)]);
    for candidate in candidates {
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(Result::ok)
        .find(|e| e.file_type().is_file() && e.file_name() == filename)
        .map(|e| e.into_path())
}
