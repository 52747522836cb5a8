//! Mirror access over HTTP or a local directory
//!
//! `query` never fails: a network error, an index without a matching build,
//! or a matching build whose file is gone are all reported as `None`, because
//! the caller's fallback is always to build from source.

use super::{shard_path, MirrorIndex, INDEX_FILE};
use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::{persist, temp_sibling};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Index documents larger than this are rejected
const MAX_INDEX_BYTES: u64 = 64 * 1024 * 1024;

/// Read access to a published mirror
#[async_trait]
pub trait MirrorClient: Send + Sync {
    /// Base location, used to build user-facing URLs
    fn base(&self) -> &str;

    /// Fetch and parse `index.json`
    async fn fetch_index(&self) -> ArtifactResult<MirrorIndex>;

    /// Whether a mirror-relative path exists
    async fn exists(&self, rel: &str) -> ArtifactResult<bool>;

    /// Download a mirror-relative path to `dest`, returning bytes written
    async fn download(&self, rel: &str, dest: &Path) -> ArtifactResult<u64>;

    /// User-facing URL for a mirror-relative path
    fn url_for(&self, rel: &str) -> String {
        format!("{}/{}", self.base().trim_end_matches('/'), rel)
    }
}

/// Pick a client for a mirror location.
///
/// `http://` and `https://` go over the network, anything else (including
/// `file://`) is read as a local directory.
pub fn create_client(location: &str, timeout: Duration) -> Box<dyn MirrorClient> {
    if location.starts_with("http://") || location.starts_with("https://") {
        Box::new(HttpMirror::new(location, timeout))
    } else {
        let path = location.strip_prefix("file://").unwrap_or(location);
        Box::new(LocalMirror::new(path))
    }
}

/// Mirror served over HTTP(S)
pub struct HttpMirror {
    base: String,
    agent: ureq::Agent,
}

impl HttpMirror {
    /// Create a client rooted at `<base>`; the binaries live under `<base>/binaries`
    pub fn new(base: &str, timeout: Duration) -> Self {
        let config = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build();
        Self {
            base: format!("{}/binaries", base.trim_end_matches('/')),
            agent: ureq::Agent::new_with_config(config),
        }
    }
}

#[async_trait]
impl MirrorClient for HttpMirror {
    fn base(&self) -> &str {
        &self.base
    }

    async fn fetch_index(&self) -> ArtifactResult<MirrorIndex> {
        let url = self.url_for(INDEX_FILE);
        let agent = self.agent.clone();
        debug!("GET {}", url);

        let body = tokio::task::spawn_blocking(move || -> ArtifactResult<String> {
            let mut response = agent
                .get(url.as_str())
                .call()
                .map_err(|e| ArtifactError::http(&url, e))?;
            response
                .body_mut()
                .with_config()
                .limit(MAX_INDEX_BYTES)
                .read_to_string()
                .map_err(|e| ArtifactError::http(&url, e))
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("index task failed: {}", e)))??;

        Ok(serde_json::from_str(&body)?)
    }

    async fn exists(&self, rel: &str) -> ArtifactResult<bool> {
        let url = self.url_for(rel);
        let agent = self.agent.clone();
        debug!("HEAD {}", url);

        tokio::task::spawn_blocking(move || match agent.head(url.as_str()).call() {
            Ok(response) => Ok(response.status().is_success()),
            Err(ureq::Error::StatusCode(_)) => Ok(false),
            Err(e) => Err(ArtifactError::http(&url, e)),
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("presence task failed: {}", e)))?
    }

    async fn download(&self, rel: &str, dest: &Path) -> ArtifactResult<u64> {
        let url = self.url_for(rel);
        let agent = self.agent.clone();
        let dest = dest.to_path_buf();
        debug!("GET {} -> {}", url, dest.display());

        tokio::task::spawn_blocking(move || {
            let mut response = agent
                .get(url.as_str())
                .call()
                .map_err(|e| ArtifactError::http(&url, e))?;
            let mut reader = response.body_mut().as_reader();
            copy_to_file(&mut reader, &dest)
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("download task failed: {}", e)))?
    }
}

/// Mirror read straight from a directory
pub struct LocalMirror {
    root: PathBuf,
    base: String,
}

impl LocalMirror {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            base: root.display().to_string(),
            root,
        }
    }
}

#[async_trait]
impl MirrorClient for LocalMirror {
    fn base(&self) -> &str {
        &self.base
    }

    async fn fetch_index(&self) -> ArtifactResult<MirrorIndex> {
        let path = self.root.join(INDEX_FILE);
        let text = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| ArtifactError::io(format!("reading {}", path.display()), e))?;
        Ok(serde_json::from_str(&text)?)
    }

    async fn exists(&self, rel: &str) -> ArtifactResult<bool> {
        Ok(tokio::fs::try_exists(self.root.join(rel))
            .await
            .unwrap_or(false))
    }

    async fn download(&self, rel: &str, dest: &Path) -> ArtifactResult<u64> {
        let src = self.root.join(rel);
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || {
            let mut file = File::open(&src)
                .map_err(|e| ArtifactError::io(format!("opening {}", src.display()), e))?;
            copy_to_file(&mut file, &dest)
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("copy task failed: {}", e)))?
    }
}

/// Stream into a temporary sibling and rename into place
fn copy_to_file(reader: &mut dyn io::Read, dest: &Path) -> ArtifactResult<u64> {
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| ArtifactError::io(format!("creating {}", parent.display()), e))?;
    }
    let tmp = temp_sibling(dest);
    let written = File::create(&tmp)
        .and_then(|mut file| io::copy(reader, &mut file))
        .map_err(|e| {
            let _ = fs::remove_file(&tmp);
            ArtifactError::io(format!("writing {}", dest.display()), e)
        })?;
    persist(&tmp, dest)?;
    Ok(written)
}

/// A build found on the mirror
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MirrorHit {
    pub url: String,
    pub filename: String,
    pub version: String,
    pub config_hash: String,
    pub content_hash: String,
    pub size: u64,
}

impl MirrorHit {
    /// Mirror-relative path of the archive
    pub fn rel_path(&self, name: &str) -> String {
        shard_path(name, &self.filename)
    }
}

/// Look up a build by name, version and config hash.
///
/// The index must list the build; the presence check only confirms that
/// entry and never substitutes for it.
pub async fn query(
    client: &dyn MirrorClient,
    name: &str,
    version: &str,
    config_hash: &str,
) -> Option<MirrorHit> {
    let index = match client.fetch_index().await {
        Ok(index) => index,
        Err(e) => {
            debug!("Mirror index unavailable: {}", e);
            return None;
        }
    };

    let Some(build) = index.find(name, version, config_hash) else {
        debug!("No {} {} ({}) in mirror index", name, version, config_hash);
        return None;
    };

    let rel = shard_path(name, &build.filename);
    match client.exists(&rel).await {
        Ok(true) => Some(MirrorHit {
            url: client.url_for(&rel),
            filename: build.filename.clone(),
            version: build.version.clone(),
            config_hash: build.config_hash.clone(),
            content_hash: build.content_hash.clone(),
            size: build.size,
        }),
        Ok(false) => {
            debug!("Indexed file missing from mirror: {}", rel);
            None
        }
        Err(e) => {
            debug!("Presence check failed for {}: {}", rel, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::tests::make_artifact;
    use crate::mirror::{stage, StageOptions};
    use tempfile::TempDir;

    fn published(temp: &TempDir) -> PathBuf {
        make_artifact(temp.path(), "bash", "5.3", "abc123");
        make_artifact(temp.path(), "tree", "2.0.4", "cafef00d");
        let mirror = temp.path().join("mirror");
        stage(&temp.path().join("dist"), &mirror, StageOptions::default()).unwrap();
        mirror
    }

    #[tokio::test]
    async fn hit_when_indexed_and_present() {
        let temp = TempDir::new().unwrap();
        let mirror = LocalMirror::new(published(&temp));

        let hit = query(&mirror, "bash", "5.3", "abc123").await.unwrap();
        assert_eq!(hit.filename, "bash-5.3-abc123-bin.tar.gz");
        assert!(hit.url.ends_with("/b/bash-5.3-abc123-bin.tar.gz"));
        assert_eq!(hit.content_hash.len(), 64);
        assert!(hit.size > 0);
    }

    #[tokio::test]
    async fn unindexed_file_on_disk_is_not_available() {
        let temp = TempDir::new().unwrap();
        let root = published(&temp);

        // Same name on disk, but the index only lists tree 2.0.4
        let stray = make_artifact(temp.path(), "tree", "2.1.0", "cafef00d");
        fs::copy(&stray, root.join("t/tree-2.1.0-cafef00d-bin.tar.gz")).unwrap();

        let mirror = LocalMirror::new(root);
        assert!(query(&mirror, "tree", "2.1.0", "cafef00d").await.is_none());
    }

    #[tokio::test]
    async fn indexed_but_missing_file_is_not_available() {
        let temp = TempDir::new().unwrap();
        let root = published(&temp);
        fs::remove_file(root.join("b/bash-5.3-abc123-bin.tar.gz")).unwrap();

        let mirror = LocalMirror::new(root);
        assert!(query(&mirror, "bash", "5.3", "abc123").await.is_none());
    }

    #[tokio::test]
    async fn config_hash_must_match() {
        let temp = TempDir::new().unwrap();
        let mirror = LocalMirror::new(published(&temp));
        assert!(query(&mirror, "bash", "5.3", "ffffffff").await.is_none());
    }

    #[tokio::test]
    async fn unreachable_mirror_is_not_available() {
        let temp = TempDir::new().unwrap();
        let mirror = LocalMirror::new(temp.path().join("nowhere"));
        assert!(query(&mirror, "bash", "5.3", "abc123").await.is_none());

        let http = HttpMirror::new("http://127.0.0.1:9", Duration::from_millis(200));
        assert!(query(&http, "bash", "5.3", "abc123").await.is_none());
    }

    #[tokio::test]
    async fn local_download_copies_file() {
        let temp = TempDir::new().unwrap();
        let mirror = LocalMirror::new(published(&temp));
        let dest = temp.path().join("cache/bash.tar.gz");
        let written = mirror
            .download("b/bash-5.3-abc123-bin.tar.gz", &dest)
            .await
            .unwrap();
        assert_eq!(written, fs::metadata(&dest).unwrap().len());
    }

    #[test]
    fn client_selection_by_scheme() {
        let http = create_client("https://mirror.buckos.org", Duration::from_secs(5));
        assert_eq!(http.base(), "https://mirror.buckos.org/binaries");
        assert_eq!(
            http.url_for("b/bash-5.3-abc-bin.tar.gz"),
            "https://mirror.buckos.org/binaries/b/bash-5.3-abc-bin.tar.gz"
        );

        let local = create_client("file:///srv/mirror/binaries", Duration::from_secs(5));
        assert_eq!(local.base(), "/srv/mirror/binaries");
    }
}
