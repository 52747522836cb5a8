//! Filesystem helpers shared by the archiver, mirror and stamper
//!
//! Anything a reader may observe is written to a uniquely named sibling and
//! renamed into place, so a crash never leaves a half-written file at the
//! final path.

use crate::error::{ArtifactError, ArtifactResult};
use crate::hash::{walk_tree, EntryKind};
use std::fs;
use std::path::{Path, PathBuf};

/// Unique temporary sibling of `path` in the same directory
pub fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, uuid::Uuid::new_v4()))
}

/// Write `content` to `path` via a temporary sibling and rename
pub fn write_atomic(path: &Path, content: &[u8]) -> ArtifactResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| ArtifactError::io(format!("creating {}", parent.display()), e))?;
    }

    let tmp = temp_sibling(path);
    fs::write(&tmp, content)
        .map_err(|e| ArtifactError::io(format!("writing {}", tmp.display()), e))?;
    persist(&tmp, path)
}

/// Rename a finished temporary file into place, removing it on failure
pub fn persist(tmp: &Path, path: &Path) -> ArtifactResult<()> {
    fs::rename(tmp, path).map_err(|e| {
        let _ = fs::remove_file(tmp);
        ArtifactError::io(format!("renaming into {}", path.display()), e)
    })
}

/// Copy a tree, recreating symlinks as links rather than copying their targets.
///
/// Entries whose relative path is in `skip` are left out.
pub fn copy_tree(src: &Path, dest: &Path, skip: &[&Path]) -> ArtifactResult<usize> {
    fs::create_dir_all(dest)
        .map_err(|e| ArtifactError::io(format!("creating {}", dest.display()), e))?;

    let mut copied = 0;
    for entry in walk_tree(src)? {
        if skip.iter().any(|s| entry.rel == *s) {
            continue;
        }
        let target = dest.join(&entry.rel);
        match &entry.kind {
            EntryKind::Dir => {
                fs::create_dir_all(&target)
                    .map_err(|e| ArtifactError::io(format!("creating {}", target.display()), e))?;
            }
            EntryKind::File => {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        ArtifactError::io(format!("creating {}", parent.display()), e)
                    })?;
                }
                // fs::copy writes through an existing link at the destination
                if fs::symlink_metadata(&target).is_ok_and(|m| m.file_type().is_symlink()) {
                    fs::remove_file(&target).map_err(|e| {
                        ArtifactError::io(format!("replacing {}", target.display()), e)
                    })?;
                }
                fs::copy(&entry.path, &target).map_err(|e| {
                    ArtifactError::io(format!("copying {}", entry.path.display()), e)
                })?;
                copied += 1;
            }
            EntryKind::Symlink(link) => {
                if fs::symlink_metadata(&target).is_ok() {
                    fs::remove_file(&target).map_err(|e| {
                        ArtifactError::io(format!("replacing {}", target.display()), e)
                    })?;
                }
                symlink(link, &target)?;
                copied += 1;
            }
        }
    }
    Ok(copied)
}

/// Replace `dest` with a fresh copy of `src`
pub fn replace_tree(src: &Path, dest: &Path) -> ArtifactResult<usize> {
    if fs::symlink_metadata(dest).is_ok() {
        fs::remove_dir_all(dest)
            .map_err(|e| ArtifactError::io(format!("removing {}", dest.display()), e))?;
    }
    copy_tree(src, dest, &[])
}

#[cfg(unix)]
fn symlink(link: &Path, at: &Path) -> ArtifactResult<()> {
    std::os::unix::fs::symlink(link, at)
        .map_err(|e| ArtifactError::io(format!("linking {}", at.display()), e))
}

#[cfg(not(unix))]
fn symlink(_link: &Path, at: &Path) -> ArtifactResult<()> {
    Err(ArtifactError::User(format!(
        "symlinks are not supported on this platform: {}",
        at.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink as unix_symlink;
    use tempfile::TempDir;

    #[test]
    fn write_atomic_leaves_no_temp_files() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested/index.json");
        write_atomic(&path, b"{}").unwrap();
        write_atomic(&path, b"{\"total\":0}").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "{\"total\":0}");
        let names: Vec<_> = fs::read_dir(path.parent().unwrap())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names.len(), 1);
    }

    #[test]
    fn copy_tree_preserves_symlinks() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(src.join("lib/libz.so.1"), "z").unwrap();
        unix_symlink("libz.so.1", src.join("lib/libz.so")).unwrap();
        unix_symlink("../missing", src.join("dangling")).unwrap();
        fs::create_dir_all(src.join("empty")).unwrap();

        let dest = temp.path().join("dest");
        let copied = copy_tree(&src, &dest, &[]).unwrap();

        assert_eq!(copied, 3);
        assert_eq!(
            fs::read_link(dest.join("lib/libz.so")).unwrap(),
            PathBuf::from("libz.so.1")
        );
        assert_eq!(fs::read_link(dest.join("dangling")).unwrap(), PathBuf::from("../missing"));
        assert!(dest.join("empty").is_dir());
    }

    #[test]
    fn copy_tree_skips_listed_entries() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("METADATA.json"), "{}").unwrap();
        fs::write(src.join("bin"), "x").unwrap();

        let dest = temp.path().join("dest");
        copy_tree(&src, &dest, &[Path::new("METADATA.json")]).unwrap();
        assert!(!dest.join("METADATA.json").exists());
        assert!(dest.join("bin").exists());
    }

    #[test]
    fn replace_tree_drops_stale_entries() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dest = temp.path().join("dest");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&dest).unwrap();
        fs::write(src.join("new"), "1").unwrap();
        fs::write(dest.join("stale"), "0").unwrap();

        replace_tree(&src, &dest).unwrap();
        assert!(dest.join("new").exists());
        assert!(!dest.join("stale").exists());
    }
}
