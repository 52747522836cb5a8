//! Upload transports for a staged mirror tree
//!
//! Every transport pushes the shard directories first and `index.json`
//! last, so a reader of the destination never sees an index entry for an
//! archive that has not arrived yet.

use super::INDEX_FILE;
use crate::env::BuildEnv;
use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::{copy_tree, write_atomic};
use async_trait::async_trait;
use clap::ValueEnum;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::{debug, info};

/// How a staged mirror reaches its destination
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum TransportKind {
    /// Copy into a local directory
    Local,
    /// `scp -r` to `user@host:path`
    Scp,
    /// `rsync -avzL` to a remote or `rsync://` destination
    Rsync,
}

impl TransportKind {
    /// Guess from the destination string
    pub fn detect(dest: &str) -> Self {
        if dest.starts_with("rsync://") {
            return Self::Rsync;
        }
        // user@host:path, but not a local path that merely contains a colon
        match dest.split_once(':') {
            Some((host, _)) if !host.is_empty() && !host.contains('/') => Self::Scp,
            _ => Self::Local,
        }
    }
}

/// Pushes a staged mirror tree to its destination
#[async_trait]
pub trait UploadTransport: Send + Sync {
    /// Transport name for messages
    fn name(&self) -> &'static str;

    /// Upload everything under `staging` into `dest`
    async fn upload(&self, staging: &Path, dest: &str) -> ArtifactResult<()>;
}

/// Create the transport for a kind
pub fn create_transport(kind: TransportKind, env: BuildEnv) -> Box<dyn UploadTransport> {
    match kind {
        TransportKind::Local => Box::new(LocalTransport),
        TransportKind::Scp => Box::new(ScpTransport { env }),
        TransportKind::Rsync => Box::new(RsyncTransport { env }),
    }
}

/// Plain directory copy
pub struct LocalTransport;

#[async_trait]
impl UploadTransport for LocalTransport {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn upload(&self, staging: &Path, dest: &str) -> ArtifactResult<()> {
        let staging = staging.to_path_buf();
        let dest = PathBuf::from(dest);

        tokio::task::spawn_blocking(move || {
            let copied = copy_tree(&staging, &dest, &[Path::new(INDEX_FILE)])?;
            debug!("Copied {} files to {}", copied, dest.display());

            let index_path = staging.join(INDEX_FILE);
            let index = std::fs::read(&index_path)
                .map_err(|e| ArtifactError::io(format!("reading {}", index_path.display()), e))?;
            write_atomic(&dest.join(INDEX_FILE), &index)
        })
        .await
        .map_err(|e| ArtifactError::Internal(format!("copy task failed: {}", e)))?
    }
}

/// `scp -r` per shard, then the index
pub struct ScpTransport {
    env: BuildEnv,
}

#[async_trait]
impl UploadTransport for ScpTransport {
    fn name(&self) -> &'static str {
        "scp"
    }

    async fn upload(&self, staging: &Path, dest: &str) -> ArtifactResult<()> {
        let shards = shard_dirs(staging).await?;
        let dest = format!("{}/", dest.trim_end_matches('/'));

        if !shards.is_empty() {
            let mut args = vec!["-r".to_string()];
            args.extend(shards.iter().map(|s| s.display().to_string()));
            args.push(dest.clone());
            run(&self.env, "scp", &args).await?;
        }

        let index = staging.join(INDEX_FILE).display().to_string();
        run(&self.env, "scp", &[index, dest]).await
    }
}

/// `rsync -avzL` with the index excluded, then the index alone
pub struct RsyncTransport {
    env: BuildEnv,
}

#[async_trait]
impl UploadTransport for RsyncTransport {
    fn name(&self) -> &'static str {
        "rsync"
    }

    async fn upload(&self, staging: &Path, dest: &str) -> ArtifactResult<()> {
        let src = format!("{}/", staging.display());
        let dest = format!("{}/", dest.trim_end_matches('/'));

        let tree = [
            "-avzL".to_string(),
            "--progress".to_string(),
            "--exclude".to_string(),
            INDEX_FILE.to_string(),
            src,
            dest.clone(),
        ];
        run(&self.env, "rsync", &tree).await?;

        let index = [
            "-avzL".to_string(),
            staging.join(INDEX_FILE).display().to_string(),
            dest,
        ];
        run(&self.env, "rsync", &index).await
    }
}

async fn shard_dirs(staging: &Path) -> ArtifactResult<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut entries = tokio::fs::read_dir(staging)
        .await
        .map_err(|e| ArtifactError::io(format!("listing {}", staging.display()), e))?;
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| ArtifactError::io(format!("listing {}", staging.display()), e))?
    {
        if entry.path().is_dir() {
            dirs.push(entry.path());
        }
    }
    dirs.sort();
    Ok(dirs)
}

async fn run(env: &BuildEnv, program: &str, args: &[String]) -> ArtifactResult<()> {
    info!("Executing: {} {}", program, args.join(" "));

    let output = env
        .command(program)
        .args(args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| ArtifactError::command_failed(program, e))?;

    if output.status.success() {
        Ok(())
    } else {
        Err(ArtifactError::command_exec(
            format!("{} {}", program, args.join(" ")),
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mirror::tests::make_artifact;
    use crate::mirror::{stage, StageOptions};
    use tempfile::TempDir;

    #[test]
    fn detects_transport_from_destination() {
        assert_eq!(TransportKind::detect("/srv/mirror/binaries"), TransportKind::Local);
        assert_eq!(TransportKind::detect("./out:v2"), TransportKind::Local);
        assert_eq!(
            TransportKind::detect("deploy@mirror.buckos.org:/srv/binaries"),
            TransportKind::Scp
        );
        assert_eq!(
            TransportKind::detect("rsync://mirror.buckos.org/binaries"),
            TransportKind::Rsync
        );
    }

    #[tokio::test]
    async fn local_upload_places_tree_and_index() {
        let temp = TempDir::new().unwrap();
        make_artifact(temp.path(), "bash", "5.3", "abc123");
        let staging = temp.path().join("staging");
        stage(&temp.path().join("dist"), &staging, StageOptions::default()).unwrap();

        let dest = temp.path().join("www/binaries");
        let transport = create_transport(TransportKind::Local, BuildEnv::default());
        transport
            .upload(&staging, &dest.display().to_string())
            .await
            .unwrap();

        assert_eq!(transport.name(), "local");
        assert!(dest.join("b/bash-5.3-abc123-bin.tar.gz").exists());
        assert!(dest.join("b/bash-5.3-abc123-bin.tar.gz.sha256").exists());
        assert_eq!(
            std::fs::read(dest.join(INDEX_FILE)).unwrap(),
            std::fs::read(staging.join(INDEX_FILE)).unwrap()
        );
    }
}
