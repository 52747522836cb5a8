//! Artifact packaging
//!
//! An artifact is `<name>-<version>-<confighash>-bin.tar.gz`: a deterministic
//! gzipped tar holding the build output at its root plus a generated
//! `METADATA.json`, and a `<archive>.sha256` sidecar whose first line is
//! `<sha256>  <filename>` followed by `#`-prefixed metadata comments.
//!
//! Naming depends only on name, version and config hash, so two builds with
//! the same config hash land on the same file. That is the cache hit.

use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::{persist, temp_sibling, write_atomic};
use crate::hash::{sha256_file, walk_tree, EntryKind, METADATA_FILE};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use tar::{Builder, EntryType, Header};
use tracing::{debug, info};

/// Suffix shared by every artifact filename
pub const ARCHIVE_SUFFIX: &str = "-bin.tar.gz";

/// Suffix of the checksum sidecar, appended to the archive filename
pub const SIDECAR_SUFFIX: &str = ".sha256";

/// Identity of one packaged build
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub target: String,
    pub name: String,
    pub version: String,
    pub config_hash: String,
    pub content_hash: String,
}

impl ArtifactMetadata {
    /// Archive filename for this identity
    pub fn filename(&self) -> String {
        archive_filename(&self.name, &self.version, &self.config_hash)
    }
}

/// `name-version-confighash-bin.tar.gz`
pub fn archive_filename(name: &str, version: &str, config_hash: &str) -> String {
    format!("{}-{}-{}{}", name, version, config_hash, ARCHIVE_SUFFIX)
}

/// Name, version and config hash recovered from an artifact filename
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactName {
    pub name: String,
    pub version: String,
    pub config_hash: String,
}

impl ArtifactName {
    /// Parse by splitting the last two `-` off the stem, so names may contain
    /// dashes but versions and hashes may not.
    pub fn parse(filename: &str) -> ArtifactResult<Self> {
        let stem = filename
            .strip_suffix(ARCHIVE_SUFFIX)
            .ok_or_else(|| ArtifactError::ArtifactName(filename.to_string()))?;

        let mut parts = stem.rsplitn(3, '-');
        let (Some(config_hash), Some(version), Some(name)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return Err(ArtifactError::ArtifactName(filename.to_string()));
        };

        if name.is_empty() || version.is_empty() || config_hash.is_empty() {
            return Err(ArtifactError::ArtifactName(filename.to_string()));
        }

        Ok(Self {
            name: name.to_string(),
            version: version.to_string(),
            config_hash: config_hash.to_string(),
        })
    }
}

/// Parsed `.sha256` sidecar
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sidecar {
    pub sha256: String,
    pub filename: String,
    pub config_hash: Option<String>,
    pub content_hash: Option<String>,
    pub package: Option<String>,
    pub version: Option<String>,
    pub target: Option<String>,
}

impl Sidecar {
    fn for_artifact(sha256: &str, meta: &ArtifactMetadata) -> Self {
        Self {
            sha256: sha256.to_string(),
            filename: meta.filename(),
            config_hash: Some(meta.config_hash.clone()),
            content_hash: Some(meta.content_hash.clone()),
            package: Some(meta.name.clone()),
            version: Some(meta.version.clone()),
            target: Some(meta.target.clone()),
        }
    }

    /// Render in `sha256sum` compatible form with trailing comments
    pub fn render(&self) -> String {
        let mut out = format!("{}  {}\n", self.sha256, self.filename);
        let comments = [
            ("Config Hash", &self.config_hash),
            ("Content Hash", &self.content_hash),
            ("Package", &self.package),
            ("Version", &self.version),
            ("Target", &self.target),
        ];
        for (label, value) in comments {
            if let Some(value) = value {
                out.push_str(&format!("# {}: {}\n", label, value));
            }
        }
        out
    }

    /// Parse sidecar text. Only the first line is required.
    pub fn parse(text: &str) -> Option<Self> {
        let mut lines = text.lines();
        let first = lines.next()?;
        let mut fields = first.split_whitespace();
        let sha256 = fields.next()?.to_string();
        let filename = fields.next().unwrap_or_default().to_string();

        let mut sidecar = Self {
            sha256,
            filename,
            ..Self::default()
        };
        for line in lines {
            let Some(comment) = line.strip_prefix('#') else {
                continue;
            };
            let Some((label, value)) = comment.split_once(':') else {
                continue;
            };
            let value = Some(value.trim().to_string());
            match label.trim() {
                "Config Hash" => sidecar.config_hash = value,
                "Content Hash" => sidecar.content_hash = value,
                "Package" => sidecar.package = value,
                "Version" => sidecar.version = value,
                "Target" => sidecar.target = value,
                _ => {}
            }
        }
        Some(sidecar)
    }

    /// Read and parse a sidecar file
    pub fn read(path: &Path) -> ArtifactResult<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| ArtifactError::io(format!("reading {}", path.display()), e))?;
        Self::parse(&text)
            .ok_or_else(|| ArtifactError::User(format!("Malformed sidecar: {}", path.display())))
    }
}

/// Sidecar path for an archive
pub fn sidecar_path(archive: &Path) -> PathBuf {
    let mut name = archive.as_os_str().to_os_string();
    name.push(SIDECAR_SUFFIX);
    PathBuf::from(name)
}

/// Result of packaging one output
#[derive(Debug, Clone)]
pub struct PackagedArtifact {
    pub archive: PathBuf,
    pub sidecar: PathBuf,
    pub sha256: String,
    pub size: u64,
    pub metadata: ArtifactMetadata,
}

/// Package `output` into `dest_dir`.
///
/// The archive is complete and renamed into place before the sidecar is
/// written, so a sidecar never describes a partial archive.
pub fn package(
    output: &Path,
    dest_dir: &Path,
    metadata: &ArtifactMetadata,
) -> ArtifactResult<PackagedArtifact> {
    if !output.exists() {
        return Err(ArtifactError::PathNotFound(output.to_path_buf()));
    }
    if output.join(METADATA_FILE).exists() {
        return Err(ArtifactError::ReservedEntry {
            name: METADATA_FILE.to_string(),
            path: output.to_path_buf(),
        });
    }

    fs::create_dir_all(dest_dir)
        .map_err(|e| ArtifactError::io(format!("creating {}", dest_dir.display()), e))?;

    let archive = dest_dir.join(metadata.filename());
    let tmp = temp_sibling(&archive);
    info!("Packaging {} into {}", output.display(), archive.display());

    write_archive(output, &tmp, metadata).map_err(|source| {
        let _ = fs::remove_file(&tmp);
        ArtifactError::Archive {
            path: archive.clone(),
            source,
        }
    })?;
    persist(&tmp, &archive)?;

    let sha256 = sha256_file(&archive)?;
    let size = fs::metadata(&archive)
        .map_err(|e| ArtifactError::io(format!("reading {}", archive.display()), e))?
        .len();

    let sidecar = sidecar_path(&archive);
    write_atomic(
        &sidecar,
        Sidecar::for_artifact(&sha256, metadata).render().as_bytes(),
    )?;
    debug!("Wrote sidecar {}", sidecar.display());

    Ok(PackagedArtifact {
        archive,
        sidecar,
        sha256,
        size,
        metadata: metadata.clone(),
    })
}

fn write_archive(output: &Path, tmp: &Path, metadata: &ArtifactMetadata) -> io::Result<()> {
    let file = File::create(tmp)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = Builder::new(encoder);
    builder.follow_symlinks(false);

    let meta = fs::symlink_metadata(output)?;
    if meta.is_dir() {
        let entries = walk_tree(output).map_err(io::Error::other)?;
        for entry in entries {
            append_entry(&mut builder, &entry.rel, &entry.path, &entry.kind)?;
        }
    } else {
        let name = output
            .file_name()
            .map(PathBuf::from)
            .ok_or_else(|| io::Error::other("output has no file name"))?;
        append_entry(&mut builder, &name, output, &EntryKind::File)?;
    }

    let json = serde_json::to_vec_pretty(metadata).map_err(io::Error::other)?;
    let mut header = canonical_header(EntryType::Regular, 0o644);
    header.set_size(json.len() as u64);
    builder.append_data(&mut header, METADATA_FILE, json.as_slice())?;

    let encoder = builder.into_inner()?;
    let writer = encoder.finish()?;
    let file = writer.into_inner().map_err(|e| e.into_error())?;
    file.sync_all()
}

fn append_entry<W: io::Write>(
    builder: &mut Builder<W>,
    rel: &Path,
    path: &Path,
    kind: &EntryKind,
) -> io::Result<()> {
    match kind {
        EntryKind::Dir => {
            let mut header = canonical_header(EntryType::Directory, 0o755);
            header.set_size(0);
            builder.append_data(&mut header, rel, io::empty())
        }
        EntryKind::File => {
            let meta = fs::symlink_metadata(path)?;
            let mode = if is_executable(&meta) { 0o755 } else { 0o644 };
            let mut header = canonical_header(EntryType::Regular, mode);
            header.set_size(meta.len());
            builder.append_data(&mut header, rel, File::open(path)?)
        }
        EntryKind::Symlink(target) => {
            let mut header = canonical_header(EntryType::Symlink, 0o777);
            header.set_size(0);
            builder.append_link(&mut header, rel, target)
        }
    }
}

fn canonical_header(kind: EntryType, mode: u32) -> Header {
    let mut header = Header::new_gnu();
    header.set_entry_type(kind);
    header.set_mode(mode);
    header.set_mtime(0);
    header.set_uid(0);
    header.set_gid(0);
    header
}

#[cfg(unix)]
fn is_executable(meta: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_meta: &fs::Metadata) -> bool {
    false
}

/// Unpack an artifact into `dest`
pub fn extract(archive: &Path, dest: &Path) -> ArtifactResult<()> {
    let to_err = |source: io::Error| ArtifactError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    fs::create_dir_all(dest)
        .map_err(|e| ArtifactError::io(format!("creating {}", dest.display()), e))?;
    let file = File::open(archive).map_err(to_err)?;
    let mut unpacker = tar::Archive::new(GzDecoder::new(file));
    unpacker.set_preserve_permissions(true);
    unpacker.unpack(dest).map_err(to_err)
}

/// Read the embedded `METADATA.json` without unpacking the whole archive
pub fn read_metadata(archive: &Path) -> ArtifactResult<ArtifactMetadata> {
    let to_err = |source: io::Error| ArtifactError::Archive {
        path: archive.to_path_buf(),
        source,
    };
    let file = File::open(archive).map_err(to_err)?;
    let mut unpacker = tar::Archive::new(GzDecoder::new(file));
    for entry in unpacker.entries().map_err(to_err)? {
        let entry = entry.map_err(to_err)?;
        if entry.path().map_err(to_err)?.as_ref() == Path::new(METADATA_FILE) {
            return Ok(serde_json::from_reader(entry)?);
        }
    }
    Err(to_err(io::Error::new(
        io::ErrorKind::NotFound,
        format!("{} missing from archive", METADATA_FILE),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::TreeHasher;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    const CONFIG_HASH: &str = "abc1234567890def";

    fn bash_output(root: &Path) -> PathBuf {
        let out = root.join("out");
        fs::create_dir_all(out.join("bin")).unwrap();
        fs::write(out.join("bin/bash"), "\x7fELF-bash").unwrap();
        symlink("bash", out.join("bin/sh")).unwrap();
        out
    }

    fn bash_meta(content_hash: String) -> ArtifactMetadata {
        ArtifactMetadata {
            target: "//packages/linux/core/bash:bash".to_string(),
            name: "bash".to_string(),
            version: "5.3".to_string(),
            config_hash: CONFIG_HASH.to_string(),
            content_hash,
        }
    }

    #[test]
    fn filename_and_sidecar_first_line() {
        let temp = TempDir::new().unwrap();
        let out = bash_output(temp.path());
        let meta = bash_meta(TreeHasher::plain().hash(&out).unwrap());

        let packaged = package(&out, &temp.path().join("dist"), &meta).unwrap();
        let filename = "bash-5.3-abc1234567890def-bin.tar.gz";
        assert_eq!(packaged.archive.file_name().unwrap(), filename);

        let text = fs::read_to_string(&packaged.sidecar).unwrap();
        let first = text.lines().next().unwrap();
        assert_eq!(first, format!("{}  {}", packaged.sha256, filename));
        assert_eq!(packaged.sha256.len(), 64);
        assert!(text.contains(&format!("# Content Hash: {}", meta.content_hash)));
        assert!(text.contains("# Target: //packages/linux/core/bash:bash"));
    }

    #[test]
    fn archives_are_deterministic() {
        let temp = TempDir::new().unwrap();
        let out = bash_output(temp.path());
        let meta = bash_meta(TreeHasher::plain().hash(&out).unwrap());

        let first = package(&out, &temp.path().join("a"), &meta).unwrap();
        let second = package(&out, &temp.path().join("b"), &meta).unwrap();
        assert_eq!(first.sha256, second.sha256);
    }

    #[test]
    fn unpacked_archive_rehashes_to_content_hash() {
        let temp = TempDir::new().unwrap();
        let out = bash_output(temp.path());
        let content_hash = TreeHasher::plain().hash(&out).unwrap();
        let packaged = package(&out, &temp.path().join("dist"), &bash_meta(content_hash.clone()))
            .unwrap();

        let staging = temp.path().join("staging");
        extract(&packaged.archive, &staging).unwrap();

        assert_eq!(TreeHasher::packaging().hash(&staging).unwrap(), content_hash);
        assert_ne!(TreeHasher::plain().hash(&staging).unwrap(), content_hash);
        assert_eq!(fs::read_link(staging.join("bin/sh")).unwrap(), PathBuf::from("bash"));
        assert_eq!(read_metadata(&packaged.archive).unwrap().content_hash, content_hash);
    }

    #[test]
    fn rejects_output_with_metadata_file() {
        let temp = TempDir::new().unwrap();
        let out = bash_output(temp.path());
        fs::write(out.join(METADATA_FILE), "{}").unwrap();
        let err = package(&out, &temp.path().join("dist"), &bash_meta(String::new())).unwrap_err();
        assert!(matches!(err, ArtifactError::ReservedEntry { .. }));
        assert!(!temp.path().join("dist").join(bash_meta(String::new()).filename()).exists());
    }

    #[test]
    fn parses_names_with_dashes() {
        let parsed = ArtifactName::parse("xz-utils-5.6.2-0123456789abcdef-bin.tar.gz").unwrap();
        assert_eq!(parsed.name, "xz-utils");
        assert_eq!(parsed.version, "5.6.2");
        assert_eq!(parsed.config_hash, "0123456789abcdef");
    }

    #[test]
    fn rejects_unparseable_names() {
        assert!(ArtifactName::parse("bash-5.3.tar.gz").is_err());
        assert!(ArtifactName::parse("bash-bin.tar.gz").is_err());
        assert!(ArtifactName::parse("-5.3-abc-bin.tar.gz").is_err());
    }

    #[test]
    fn sidecar_parse_tolerates_missing_comments() {
        let sidecar = Sidecar::parse("deadbeef  foo-1-abc-bin.tar.gz\n").unwrap();
        assert_eq!(sidecar.sha256, "deadbeef");
        assert_eq!(sidecar.content_hash, None);

        let full = Sidecar {
            sha256: "00".to_string(),
            filename: "f".to_string(),
            content_hash: Some("11".to_string()),
            ..Sidecar::default()
        };
        assert_eq!(Sidecar::parse(&full.render()).unwrap(), full);
        assert!(Sidecar::parse("").is_none());
    }
}
