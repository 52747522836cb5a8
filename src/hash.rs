//! Deterministic content hashing of files and directory trees
//!
//! A tree hash is a single running SHA-256 over every non-directory entry in
//! canonical order: directories sorted by their relative path, entries within
//! each directory sorted by name. Each entry contributes its relative path,
//! then either its bytes (regular file) or its raw link target (symlink).
//! Symlinks are never followed, so a dangling or relative link hashes by the
//! string it stores, not by what it points at.

use crate::error::{ArtifactError, ArtifactResult};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Metadata file the archiver writes at the root of every artifact
pub const METADATA_FILE: &str = "METADATA.json";

const CHUNK: usize = 64 * 1024;

/// What a tree entry is, without ever resolving links
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink(PathBuf),
}

/// One entry of a walked tree
#[derive(Debug, Clone)]
pub struct TreeEntry {
    /// Path relative to the walk root, `/`-separated
    pub rel: PathBuf,
    /// Absolute (or root-joined) path on disk
    pub path: PathBuf,
    pub kind: EntryKind,
}

/// Walk `root` in canonical hash order.
///
/// Every directory (root excluded) is yielded before its own non-directory
/// children. Special files (sockets, fifos, devices) are not part of a build
/// output and are skipped.
pub fn walk_tree(root: &Path) -> ArtifactResult<Vec<TreeEntry>> {
    let mut dirs: Vec<PathBuf> = vec![PathBuf::new()];
    let mut leaves: HashMap<PathBuf, Vec<TreeEntry>> = HashMap::new();

    for entry in WalkDir::new(root).follow_links(false).min_depth(1) {
        let entry = entry.map_err(|e| ArtifactError::Walk {
            path: root.to_path_buf(),
            reason: e.to_string(),
        })?;
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| ArtifactError::Internal(e.to_string()))?
            .to_path_buf();
        let file_type = entry.file_type();

        if file_type.is_dir() {
            dirs.push(rel);
            continue;
        }

        let kind = if file_type.is_symlink() {
            let target = fs::read_link(entry.path()).map_err(|e| {
                ArtifactError::io(format!("reading link {}", entry.path().display()), e)
            })?;
            EntryKind::Symlink(target)
        } else if file_type.is_file() {
            EntryKind::File
        } else {
            continue;
        };

        let parent = rel.parent().map(Path::to_path_buf).unwrap_or_default();
        leaves.entry(parent).or_default().push(TreeEntry {
            rel,
            path: entry.path().to_path_buf(),
            kind,
        });
    }

    dirs.sort_by_key(|d| path_bytes(d));

    let mut ordered = Vec::new();
    for dir in dirs {
        let mut children = leaves.remove(&dir).unwrap_or_default();
        children.sort_by_key(|e| path_bytes(&e.rel));
        if !dir.as_os_str().is_empty() {
            ordered.push(TreeEntry {
                path: root.join(&dir),
                rel: dir,
                kind: EntryKind::Dir,
            });
        }
        ordered.extend(children);
    }
    Ok(ordered)
}

/// Streaming tree hasher.
///
/// Two variants exist and they are not interchangeable. `plain()` covers
/// everything and is what identity derivation and provenance use.
/// `packaging()` skips a root-level `METADATA.json`, so an unpacked artifact
/// re-hashes to the content hash recorded before the metadata was added.
#[derive(Debug, Clone, Copy, Default)]
pub struct TreeHasher {
    exclude_root_metadata: bool,
}

impl TreeHasher {
    /// Hash every entry
    pub fn plain() -> Self {
        Self {
            exclude_root_metadata: false,
        }
    }

    /// Hash every entry except `METADATA.json` at the tree root
    pub fn packaging() -> Self {
        Self {
            exclude_root_metadata: true,
        }
    }

    /// Hash a file or directory, returning 64 hex chars
    pub fn hash(&self, path: &Path) -> ArtifactResult<String> {
        let meta = fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ArtifactError::PathNotFound(path.to_path_buf()),
            _ => ArtifactError::io(format!("reading {}", path.display()), e),
        })?;

        if !meta.is_dir() {
            return sha256_file(path);
        }

        let mut hasher = Sha256::new();
        for entry in walk_tree(path)? {
            if self.exclude_root_metadata && entry.rel == Path::new(METADATA_FILE) {
                continue;
            }
            match &entry.kind {
                EntryKind::Dir => continue,
                EntryKind::File => {
                    hasher.update(path_bytes(&entry.rel));
                    update_from_file(&mut hasher, &entry.path)?;
                }
                EntryKind::Symlink(target) => {
                    hasher.update(path_bytes(&entry.rel));
                    hasher.update(path_bytes(target));
                }
            }
        }
        Ok(hex::encode(hasher.finalize()))
    }
}

/// SHA-256 of a single file's bytes
pub fn sha256_file(path: &Path) -> ArtifactResult<String> {
    let mut hasher = Sha256::new();
    update_from_file(&mut hasher, path)?;
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-256 of a byte slice
pub fn sha256_hex(bytes: impl AsRef<[u8]>) -> String {
    hex::encode(Sha256::digest(bytes.as_ref()))
}

fn update_from_file(hasher: &mut Sha256, path: &Path) -> ArtifactResult<()> {
    let mut file =
        File::open(path).map_err(|e| ArtifactError::io(format!("opening {}", path.display()), e))?;
    let mut buf = vec![0u8; CHUNK];
    loop {
        let n = file
            .read(&mut buf)
            .map_err(|e| ArtifactError::io(format!("reading {}", path.display()), e))?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(())
}

/// Raw bytes of a path as stored by the filesystem
#[cfg(unix)]
pub(crate) fn path_bytes(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
pub(crate) fn path_bytes(path: &Path) -> Vec<u8> {
    path.to_string_lossy().replace('\\', "/").into_bytes()
}
