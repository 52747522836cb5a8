//! Binary mirror: sharded layout, index, publish and lookup
//!
//! A mirror is a directory (served over HTTP or read locally) holding
//! `index.json` and one shard directory per lowercased first letter of the
//! package name. The index is rebuilt wholesale on every publish.

pub mod client;
pub mod install;
pub mod transport;

pub use client::{create_client, query, HttpMirror, LocalMirror, MirrorClient, MirrorHit};
pub use install::{install, InstallReport, Installer};
pub use transport::{create_transport, TransportKind, UploadTransport};

use crate::archive::{sidecar_path, ArtifactName, Sidecar, ARCHIVE_SUFFIX};
use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::write_atomic;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Index filename at the mirror root
pub const INDEX_FILE: &str = "index.json";

/// Shard for names that do not start with a usable character
pub const OTHER_SHARD: &str = "other";

/// Content hash recorded when an archive has no readable sidecar
const UNKNOWN_CONTENT_HASH: &str = "unknown";

/// One archive as listed in `packages`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexEntry {
    pub name: String,
    pub version: String,
    pub config_hash: String,
    pub content_hash: String,
    pub filename: String,
    pub size: u64,
}

/// One archive as listed under `by_name[name]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub version: String,
    pub config_hash: String,
    pub content_hash: String,
    pub filename: String,
    pub size: u64,
}

impl From<&IndexEntry> for BuildRef {
    fn from(entry: &IndexEntry) -> Self {
        Self {
            version: entry.version.clone(),
            config_hash: entry.config_hash.clone(),
            content_hash: entry.content_hash.clone(),
            filename: entry.filename.clone(),
            size: entry.size,
        }
    }
}

/// The whole mirror index
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorIndex {
    pub packages: Vec<IndexEntry>,
    pub by_name: BTreeMap<String, Vec<BuildRef>>,
    pub total: usize,
}

impl MirrorIndex {
    /// Build an index from entries, sorted by (name, version)
    pub fn build(mut entries: Vec<IndexEntry>) -> Self {
        entries.sort_by(|a, b| (&a.name, &a.version).cmp(&(&b.name, &b.version)));

        let mut by_name: BTreeMap<String, Vec<BuildRef>> = BTreeMap::new();
        for entry in &entries {
            by_name
                .entry(entry.name.clone())
                .or_default()
                .push(BuildRef::from(entry));
        }

        Self {
            total: entries.len(),
            packages: entries,
            by_name,
        }
    }

    /// Find the build matching both version and config hash
    pub fn find(&self, name: &str, version: &str, config_hash: &str) -> Option<&BuildRef> {
        self.by_name
            .get(name)?
            .iter()
            .find(|b| b.version == version && b.config_hash == config_hash)
    }

    /// All builds of one package
    pub fn builds(&self, name: &str) -> &[BuildRef] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Serialize as pretty JSON
    pub fn to_json(&self) -> ArtifactResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Shard directory for a package name
pub fn shard_for(name: &str) -> String {
    name.chars()
        .next()
        .map(|c| c.to_lowercase().collect())
        .unwrap_or_else(|| OTHER_SHARD.to_string())
}

/// Mirror-relative path of an archive
pub fn shard_path(name: &str, filename: &str) -> String {
    format!("{}/{}", shard_for(name), filename)
}

/// Every `*-bin.tar.gz` below `source`, sorted
pub fn find_archives(source: &Path) -> ArtifactResult<Vec<PathBuf>> {
    if !source.is_dir() {
        return Err(ArtifactError::PathNotFound(source.to_path_buf()));
    }
    let mut archives = Vec::new();
    for entry in WalkDir::new(source).follow_links(false) {
        let entry = entry.map_err(|e| ArtifactError::Walk {
            path: source.to_path_buf(),
            reason: e.to_string(),
        })?;
        if entry.file_type().is_file()
            && entry.file_name().to_string_lossy().ends_with(ARCHIVE_SUFFIX)
        {
            archives.push(entry.into_path());
        }
    }
    archives.sort();
    Ok(archives)
}

/// Describe one archive for the index.
///
/// The config hash comes from the filename; the content hash is read back
/// from the sidecar comment.
pub fn describe_archive(archive: &Path) -> ArtifactResult<IndexEntry> {
    let filename = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let parsed = ArtifactName::parse(&filename)?;

    let content_hash = Sidecar::read(&sidecar_path(archive))
        .ok()
        .and_then(|s| s.content_hash)
        .unwrap_or_else(|| UNKNOWN_CONTENT_HASH.to_string());

    let size = fs::metadata(archive)
        .map_err(|e| ArtifactError::io(format!("reading {}", archive.display()), e))?
        .len();

    Ok(IndexEntry {
        name: parsed.name,
        version: parsed.version,
        config_hash: parsed.config_hash,
        content_hash,
        filename,
        size,
    })
}

/// Options for staging a publish
#[derive(Debug, Clone, Copy, Default)]
pub struct StageOptions {
    /// Only write the index, leave archives where they are
    pub index_only: bool,
}

/// Outcome of staging a publish
#[derive(Debug, Clone, Default)]
pub struct StagedMirror {
    pub index: MirrorIndex,
    /// Shard name to number of archives placed there
    pub shards: BTreeMap<String, usize>,
    /// Archives whose filename could not be parsed
    pub skipped: Vec<PathBuf>,
}

/// Lay out `source` archives as a mirror tree under `staging`.
///
/// Unparseable filenames are skipped with a warning. The index is written
/// after every archive and sidecar has been placed.
pub fn stage(source: &Path, staging: &Path, options: StageOptions) -> ArtifactResult<StagedMirror> {
    let archives = find_archives(source)?;
    info!("Found {} binary packages in {}", archives.len(), source.display());

    let mut staged = StagedMirror::default();
    let mut entries = Vec::with_capacity(archives.len());

    for archive in archives {
        let entry = match describe_archive(&archive) {
            Ok(entry) => entry,
            Err(ArtifactError::ArtifactName(name)) => {
                warn!("Skipping unparseable archive name: {}", name);
                staged.skipped.push(archive);
                continue;
            }
            Err(e) => return Err(e),
        };

        let shard = shard_for(&entry.name);
        if !options.index_only {
            place(&archive, &staging.join(&shard))?;
        }
        *staged.shards.entry(shard).or_default() += 1;
        entries.push(entry);
    }

    staged.index = MirrorIndex::build(entries);
    write_atomic(&staging.join(INDEX_FILE), staged.index.to_json()?.as_bytes())?;
    info!(
        "Generated index: {} packages, {} unique names",
        staged.index.total,
        staged.index.by_name.len()
    );
    Ok(staged)
}

/// Copy an archive and its sidecar into a shard directory
fn place(archive: &Path, shard_dir: &Path) -> ArtifactResult<()> {
    fs::create_dir_all(shard_dir)
        .map_err(|e| ArtifactError::io(format!("creating {}", shard_dir.display()), e))?;

    let mut files = vec![archive.to_path_buf()];
    let sidecar = sidecar_path(archive);
    if sidecar.exists() {
        files.push(sidecar);
    }

    for file in files {
        let Some(name) = file.file_name() else {
            continue;
        };
        let dest = shard_dir.join(name);
        if dest == file {
            continue;
        }
        debug!("Staging {} -> {}", file.display(), dest.display());
        fs::copy(&file, &dest)
            .map_err(|e| ArtifactError::io(format!("copying {}", file.display()), e))?;
    }
    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::archive::{package, ArtifactMetadata};
    use tempfile::TempDir;

    /// Package a one-file output and return the archive path
    pub(crate) fn make_artifact(dir: &Path, name: &str, version: &str, config_hash: &str) -> PathBuf {
        let out = dir.join(format!("out-{}-{}-{}", name, version, config_hash));
        fs::create_dir_all(out.join("bin")).unwrap();
        fs::write(out.join("bin").join(name), format!("{name} {version}")).unwrap();
        let meta = ArtifactMetadata {
            target: format!("//packages/{name}:{name}"),
            name: name.to_string(),
            version: version.to_string(),
            config_hash: config_hash.to_string(),
            content_hash: crate::hash::TreeHasher::plain().hash(&out).unwrap(),
        };
        package(&out, &dir.join("dist"), &meta).unwrap().archive
    }

    #[test]
    fn shards_by_lowercased_first_letter() {
        assert_eq!(shard_for("Bash"), "b");
        assert_eq!(shard_for("xz-utils"), "x");
        assert_eq!(shard_for(""), OTHER_SHARD);
        assert_eq!(shard_path("tree", "tree-2.1.0-aa-bin.tar.gz"), "t/tree-2.1.0-aa-bin.tar.gz");
    }

    #[test]
    fn index_sorted_and_grouped() {
        let entry = |name: &str, version: &str| IndexEntry {
            name: name.to_string(),
            version: version.to_string(),
            config_hash: "c0ffee".to_string(),
            content_hash: "unknown".to_string(),
            filename: format!("{name}-{version}-c0ffee-bin.tar.gz"),
            size: 1,
        };
        let index = MirrorIndex::build(vec![
            entry("zlib", "1.3"),
            entry("bash", "5.3"),
            entry("bash", "5.2"),
        ]);
        assert_eq!(index.total, 3);
        assert_eq!(index.packages[0].version, "5.2");
        assert_eq!(index.packages[2].name, "zlib");
        assert_eq!(index.builds("bash").len(), 2);
        assert!(index.find("bash", "5.3", "c0ffee").is_some());
        assert!(index.find("bash", "5.3", "beef").is_none());
        assert!(index.builds("missing").is_empty());

        let json: serde_json::Value = serde_json::from_str(&index.to_json().unwrap()).unwrap();
        assert_eq!(json["total"], 3);
        assert!(json["by_name"]["bash"][0].get("name").is_none());
        assert_eq!(json["packages"][0]["name"], "bash");
    }

    #[test]
    fn stage_places_archives_and_sidecars() {
        let temp = TempDir::new().unwrap();
        make_artifact(temp.path(), "bash", "5.3", "abc123");
        make_artifact(temp.path(), "tree", "2.1.0", "cafef00d");
        fs::write(temp.path().join("dist/garbage-bin.tar.gz"), "junk").unwrap();

        let staging = temp.path().join("staging");
        let staged = stage(&temp.path().join("dist"), &staging, StageOptions::default()).unwrap();

        assert_eq!(staged.index.total, 2);
        assert_eq!(staged.skipped.len(), 1);
        assert_eq!(staged.shards.get("b"), Some(&1));
        assert!(staging.join("b/bash-5.3-abc123-bin.tar.gz").exists());
        assert!(staging.join("b/bash-5.3-abc123-bin.tar.gz.sha256").exists());
        assert!(staging.join("t/tree-2.1.0-cafef00d-bin.tar.gz").exists());

        let bash = staged.index.find("bash", "5.3", "abc123").unwrap();
        assert_eq!(bash.content_hash.len(), 64);

        let on_disk: MirrorIndex =
            serde_json::from_str(&fs::read_to_string(staging.join(INDEX_FILE)).unwrap()).unwrap();
        assert_eq!(on_disk, staged.index);
    }

    #[test]
    fn missing_sidecar_records_unknown_content_hash() {
        let temp = TempDir::new().unwrap();
        let archive = make_artifact(temp.path(), "bash", "5.3", "abc123");
        fs::remove_file(sidecar_path(&archive)).unwrap();

        let entry = describe_archive(&archive).unwrap();
        assert_eq!(entry.content_hash, "unknown");
        assert_eq!(entry.config_hash, "abc123");
    }

    #[test]
    fn index_only_leaves_shards_empty() {
        let temp = TempDir::new().unwrap();
        make_artifact(temp.path(), "bash", "5.3", "abc123");
        let staging = temp.path().join("staging");
        let staged = stage(
            &temp.path().join("dist"),
            &staging,
            StageOptions { index_only: true },
        )
        .unwrap();
        assert_eq!(staged.index.total, 1);
        assert!(staging.join(INDEX_FILE).exists());
        assert!(!staging.join("b").exists());
    }
}
