//! ELF detection and section editing

use crate::env::BuildEnv;
use crate::error::{ArtifactError, ArtifactResult};
use async_trait::async_trait;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tracing::debug;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";

/// Whether a file starts with the ELF magic
pub fn is_elf(path: &Path) -> bool {
    let mut magic = [0u8; 4];
    File::open(path)
        .and_then(|mut f| f.read_exact(&mut magic))
        .is_ok_and(|()| &magic == ELF_MAGIC)
}

/// Adds and reads named sections of ELF files
#[async_trait]
pub trait ElfEditor: Send + Sync {
    /// Add `section` holding the bytes of `payload`, non-loaded and read-only
    async fn add_section(&self, file: &Path, section: &str, payload: &Path) -> ArtifactResult<()>;

    /// Contents of `section`, or `None` if the file has no such section
    async fn dump_section(&self, file: &Path, section: &str) -> ArtifactResult<Option<Vec<u8>>>;
}

/// `objcopy` from binutils
pub struct ObjcopyEditor {
    program: PathBuf,
    env: BuildEnv,
}

impl ObjcopyEditor {
    /// Resolve `objcopy` against the environment's PATH; `None` if absent
    pub fn locate(objcopy: &str, env: BuildEnv) -> Option<Self> {
        let program = env.which(objcopy)?;
        debug!("Using {}", program.display());
        Some(Self { program, env })
    }

    async fn run(&self, args: &[String]) -> ArtifactResult<std::process::Output> {
        let command_line = format!("{} {}", self.program.display(), args.join(" "));
        debug!("Executing: {}", command_line);

        self.env
            .command(&self.program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ArtifactError::command_failed(command_line, e))
    }
}

#[async_trait]
impl ElfEditor for ObjcopyEditor {
    async fn add_section(&self, file: &Path, section: &str, payload: &Path) -> ArtifactResult<()> {
        let args = [
            "--add-section".to_string(),
            format!("{}={}", section, payload.display()),
            "--set-section-flags".to_string(),
            format!("{}=noload,readonly", section),
            file.display().to_string(),
        ];
        let output = self.run(&args).await?;
        if output.status.success() {
            Ok(())
        } else {
            Err(ArtifactError::command_exec(
                "objcopy --add-section",
                String::from_utf8_lossy(&output.stderr).trim(),
            ))
        }
    }

    async fn dump_section(&self, file: &Path, section: &str) -> ArtifactResult<Option<Vec<u8>>> {
        // objcopy always writes an output file; point it at scratch space so
        // the inspected binary is left alone
        let scratch = std::env::temp_dir().join(format!("bos-artifacts-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&scratch)
            .map_err(|e| ArtifactError::io(format!("creating {}", scratch.display()), e))?;
        let dumped = scratch.join("section");

        let args = [
            "--dump-section".to_string(),
            format!("{}={}", section, dumped.display()),
            file.display().to_string(),
            scratch.join("copy").display().to_string(),
        ];
        let result = match self.run(&args).await {
            Ok(output) => dumped_section(
                output.status.success(),
                &String::from_utf8_lossy(&output.stderr),
                &dumped,
            ),
            Err(e) => Err(e),
        };

        let _ = std::fs::remove_dir_all(&scratch);
        result
    }
}

/// Interpret one `objcopy --dump-section` run.
///
/// A missing section is not an error: binutils reports it on stderr, and
/// depending on the version exits 0 without writing the dump file.
fn dumped_section(success: bool, stderr: &str, dumped: &Path) -> ArtifactResult<Option<Vec<u8>>> {
    if stderr.contains("can't dump section") || stderr.contains("does not exist") {
        return Ok(None);
    }
    if !success {
        return Err(ArtifactError::command_exec("objcopy --dump-section", stderr.trim()));
    }
    match std::fs::read(dumped) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ArtifactError::io(format!("reading {}", dumped.display()), e)),
    }
}
