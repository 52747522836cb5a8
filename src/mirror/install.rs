//! Installing a prebuilt artifact from the mirror
//!
//! Download archive and sidecar into the cache, check the archive digest
//! against the sidecar, unpack into a private staging directory, check the
//! unpacked tree against the recorded content hash, then copy into the
//! prefix. Nothing touches the prefix until both checks pass.

use super::client::{MirrorClient, MirrorHit};
use super::BuildRef;
use crate::archive::{extract, read_metadata, sidecar_path, Sidecar, SIDECAR_SUFFIX};
use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::copy_tree;
use crate::hash::{sha256_file, walk_tree, EntryKind, TreeHasher, METADATA_FILE};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What an install did
#[derive(Debug, Clone)]
pub struct InstallReport {
    pub archive: PathBuf,
    pub content_hash: String,
    pub files: usize,
}

/// Fetches artifacts into a cache directory and installs them
pub struct Installer<'a> {
    client: &'a dyn MirrorClient,
    cache_dir: PathBuf,
}

impl<'a> Installer<'a> {
    pub fn new(client: &'a dyn MirrorClient, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            client,
            cache_dir: cache_dir.into(),
        }
    }

    /// Download a build and its sidecar, verifying the archive digest.
    ///
    /// A digest mismatch removes the cached archive and fails; a missing
    /// sidecar only warns.
    pub async fn fetch(&self, name: &str, hit: &MirrorHit) -> ArtifactResult<PathBuf> {
        let rel = hit.rel_path(name);
        let archive = self.cache_dir.join(&hit.filename);

        info!("Downloading {}", self.client.url_for(&rel));
        self.client.download(&rel, &archive).await?;

        let sidecar = sidecar_path(&archive);
        let sidecar_rel = format!("{}{}", rel, SIDECAR_SUFFIX);
        if let Err(e) = self.client.download(&sidecar_rel, &sidecar).await {
            warn!("No checksum sidecar for {}: {}", hit.filename, e);
            return Ok(archive);
        }

        verify_archive(&archive)?;
        Ok(archive)
    }

    /// Builds of one package, newest version first
    pub async fn available(&self, name: &str) -> ArtifactResult<Vec<BuildRef>> {
        let index = self.client.fetch_index().await?;
        let mut builds = index.builds(name).to_vec();
        builds.sort_by(|a, b| compare_versions(&b.version, &a.version));
        Ok(builds)
    }
}

/// Check an archive against the first token of its sidecar
pub fn verify_archive(archive: &Path) -> ArtifactResult<()> {
    let expected = Sidecar::read(&sidecar_path(archive))?.sha256;
    let actual = sha256_file(archive)?;
    if expected != actual {
        let _ = fs::remove_file(archive);
        return Err(ArtifactError::ChecksumMismatch {
            path: archive.to_path_buf(),
            expected,
            actual,
        });
    }
    debug!("Checksum verified: {}", archive.display());
    Ok(())
}

/// Unpack, verify content and copy into `prefix`
pub fn install(archive: &Path, prefix: &Path) -> ArtifactResult<InstallReport> {
    let metadata = read_metadata(archive)?;
    let parent = archive.parent().unwrap_or_else(|| Path::new("."));
    let staging = parent.join(format!(".staging-{}", uuid::Uuid::new_v4()));

    let result = extract(archive, &staging)
        .and_then(|()| verify_content(&staging, &metadata.content_hash))
        .and_then(|()| {
            info!("Installing {} into {}", metadata.name, prefix.display());
            copy_tree(&staging, prefix, &[Path::new(METADATA_FILE)])
        });

    if let Err(e) = fs::remove_dir_all(&staging) {
        warn!("Failed to remove staging dir {}: {}", staging.display(), e);
    }

    Ok(InstallReport {
        archive: archive.to_path_buf(),
        content_hash: metadata.content_hash,
        files: result?,
    })
}

/// Compare an unpacked artifact against its recorded content hash.
///
/// Tree outputs use the packaging hash, which skips the root metadata
/// file. A single-file output was hashed as bare bytes, so that shape is
/// accepted too.
fn verify_content(staging: &Path, expected: &str) -> ArtifactResult<()> {
    let actual = TreeHasher::packaging().hash(staging)?;
    if actual == expected {
        return Ok(());
    }

    let entries: Vec<_> = walk_tree(staging)?
        .into_iter()
        .filter(|e| e.rel != Path::new(METADATA_FILE))
        .collect();
    if let [only] = entries.as_slice() {
        if only.kind == EntryKind::File && sha256_file(&only.path)? == expected {
            return Ok(());
        }
    }

    Err(ArtifactError::ChecksumMismatch {
        path: staging.to_path_buf(),
        expected: expected.to_string(),
        actual,
    })
}

/// Semantic version order where both parse, string order otherwise
fn compare_versions(a: &str, b: &str) -> std::cmp::Ordering {
    match (semver::Version::parse(a), semver::Version::parse(b)) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => a.cmp(b),
    }
}
