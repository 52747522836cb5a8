//! Build provenance stamping
//!
//! A stamped output carries three things:
//!
//! - `.buckos-provenance.jsonl`: the package's own record on the first line,
//!   then every ancestor record gathered from the direct dependencies'
//!   ledgers, one per `name|version`.
//! - `.buckos-subgraph-hash`: the dependency-closure graph hash on its own.
//! - A non-loaded, read-only ELF section in every binary holding exactly the
//!   first ledger line.
//!
//! The ELF step is best effort. Without an editor it is skipped; a binary the
//! editor rejects is logged and left as is.

mod elf;
mod record;

pub use elf::{is_elf, ElfEditor, ObjcopyEditor};
pub use record::{canonical_json, BuildInfo, PackageInfo, ProvenanceRecord, SourceInfo, BOS_PROV};

use crate::error::{ArtifactError, ArtifactResult};
use crate::fsutil::{replace_tree, write_atomic};
use crate::hash::{walk_tree, EntryKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Newline-delimited provenance ledger beside an output
pub const LEDGER_FILE: &str = ".buckos-provenance.jsonl";

/// One-line dependency-closure hash beside an output
pub const SUBGRAPH_FILE: &str = ".buckos-subgraph-hash";

/// Ledger lines for a package: its own record, then each ancestor once.
///
/// Dependency lines are copied verbatim. Blank lines, lines that are not
/// JSON objects, and dependencies without a ledger are skipped.
pub fn aggregate_ledger(own: &ProvenanceRecord, dep_dirs: &[PathBuf]) -> ArtifactResult<Vec<String>> {
    let mut seen = HashSet::from([own.key()]);
    let mut lines = vec![own.to_line()];

    for dir in dep_dirs {
        let ledger = dir.join(LEDGER_FILE);
        if !ledger.is_file() {
            debug!("No ledger in {}", dir.display());
            continue;
        }
        let text = std::fs::read_to_string(&ledger)
            .map_err(|e| ArtifactError::io(format!("reading {}", ledger.display()), e))?;

        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let Ok(record) = ProvenanceRecord::parse(line) else {
                debug!("Skipping unreadable ledger line in {}", ledger.display());
                continue;
            };
            if seen.insert(record.key()) {
                lines.push(line.to_string());
            }
        }
    }
    Ok(lines)
}

/// Regular ELF files in a tree, never following symlinks
pub fn find_elfs(root: &Path) -> ArtifactResult<Vec<PathBuf>> {
    Ok(walk_tree(root)?
        .into_iter()
        .filter(|e| e.kind == EntryKind::File && is_elf(&e.path))
        .map(|e| e.path)
        .collect())
}

/// What a stamp run produced
#[derive(Debug)]
pub struct StampReport {
    pub output: PathBuf,
    pub record: ProvenanceRecord,
    pub ledger_lines: usize,
    /// `None` when no ELF editor was available
    pub stamped: Option<usize>,
    pub failed: usize,
}

/// Inputs to a single stamp
#[derive(Debug, Clone, Default)]
pub struct StampRequest {
    pub package: PackageInfo,
    /// Record build time and host (non-reproducible)
    pub slsa: bool,
    pub dep_dirs: Vec<PathBuf>,
}

/// Writes provenance into a copy of a build output
pub struct Stamper {
    editor: Option<Box<dyn ElfEditor>>,
    section: String,
}

impl Stamper {
    /// `editor` is `None` when no ELF tool is installed; stamping then
    /// writes the ledger and sidecar only
    pub fn new(editor: Option<Box<dyn ElfEditor>>, section: impl Into<String>) -> Self {
        Self {
            editor,
            section: section.into(),
        }
    }

    /// Copy `input` to a fresh `output` and stamp the copy.
    ///
    /// `input` is only read. Binaries are stamped before the ledger and
    /// subgraph sidecar are written, so the sidecars only ever describe a
    /// finished tree.
    pub async fn stamp(&self, input: &Path, output: &Path, request: &StampRequest) -> ArtifactResult<StampReport> {
        if !input.is_dir() {
            return Err(ArtifactError::PathNotFound(input.to_path_buf()));
        }
        replace_tree(input, output)?;

        let build = request.slsa.then(BuildInfo::capture);
        let record = ProvenanceRecord::new(&request.package, build.as_ref());
        let own_line = record.to_line();

        let (stamped, failed) = match &self.editor {
            Some(editor) => {
                let (ok, failed) = self.stamp_elfs(editor.as_ref(), output, &own_line).await?;
                info!("stamped {} ELF binaries", ok);
                (Some(ok), failed)
            }
            None => {
                warn!("stamp: objcopy not found, skipping ELF stamping");
                (None, 0)
            }
        };

        let lines = aggregate_ledger(&record, &request.dep_dirs)?;
        let mut ledger = lines.join("\n");
        ledger.push('\n');
        write_atomic(&output.join(LEDGER_FILE), ledger.as_bytes())?;
        write_atomic(
            &output.join(SUBGRAPH_FILE),
            format!("{}\n", request.package.graph_hash).as_bytes(),
        )?;

        Ok(StampReport {
            output: output.to_path_buf(),
            record,
            ledger_lines: lines.len(),
            stamped,
            failed,
        })
    }

    async fn stamp_elfs(&self, editor: &dyn ElfEditor, output: &Path, own_line: &str) -> ArtifactResult<(usize, usize)> {
        let elfs = find_elfs(output)?;
        let payload = std::env::temp_dir().join(format!("bos-stamp-{}.json", uuid::Uuid::new_v4()));
        std::fs::write(&payload, format!("{}\n", own_line))
            .map_err(|e| ArtifactError::io(format!("writing {}", payload.display()), e))?;

        let mut stamped = 0;
        let mut failed = 0;
        for elf in &elfs {
            match editor.add_section(elf, &self.section, &payload).await {
                Ok(()) => stamped += 1,
                Err(e) => {
                    let rel = elf.strip_prefix(output).unwrap_or(elf);
                    warn!("stamp: objcopy failed for {}: {}", rel.display(), e);
                    failed += 1;
                }
            }
        }

        let _ = std::fs::remove_file(&payload);
        Ok((stamped, failed))
    }
}

/// Findings from checking a stamped output
#[derive(Debug, Default)]
pub struct Verification {
    pub record: Option<ProvenanceRecord>,
    pub ledger_lines: usize,
    /// `None` when no ELF editor was available to read sections
    pub elfs_checked: Option<usize>,
    pub problems: Vec<String>,
}

impl Verification {
    pub fn is_valid(&self) -> bool {
        self.problems.is_empty()
    }
}

/// Check a stamped output: the first ledger record's seal, unique ancestor
/// keys, the subgraph sidecar, and each binary's embedded record
pub async fn verify(output: &Path, editor: Option<&dyn ElfEditor>, section: &str) -> ArtifactResult<Verification> {
    if !output.is_dir() {
        return Err(ArtifactError::PathNotFound(output.to_path_buf()));
    }
    let mut report = Verification::default();

    let ledger_path = output.join(LEDGER_FILE);
    let Ok(ledger) = std::fs::read_to_string(&ledger_path) else {
        report.problems.push(format!("{} missing", LEDGER_FILE));
        return Ok(report);
    };
    let lines: Vec<&str> = ledger.lines().filter(|l| !l.trim().is_empty()).collect();
    report.ledger_lines = lines.len();

    let record = match lines.first().map(|l| ProvenanceRecord::parse(l)) {
        Some(Ok(record)) => record,
        Some(Err(e)) => {
            report.problems.push(format!("first ledger line unreadable: {}", e));
            return Ok(report);
        }
        None => {
            report.problems.push(format!("{} is empty", LEDGER_FILE));
            return Ok(report);
        }
    };

    if !record.verify() {
        report.problems.push("BOS_PROV hash invalid".to_string());
    }

    let mut keys = HashSet::new();
    for line in &lines {
        if let Ok(r) = ProvenanceRecord::parse(line) {
            if !keys.insert(r.key()) {
                report.problems.push(format!("duplicate ledger entry {}", r.key()));
            }
        }
    }

    match std::fs::read_to_string(output.join(SUBGRAPH_FILE)) {
        Ok(text) => {
            let graph = record.get("graphHash").unwrap_or("");
            if text.trim_end_matches('\n') != graph {
                report
                    .problems
                    .push(format!("{} does not match graphHash", SUBGRAPH_FILE));
            }
        }
        Err(_) => report.problems.push(format!("{} missing", SUBGRAPH_FILE)),
    }

    if let Some(editor) = editor {
        let mut checked = 0;
        for elf in find_elfs(output)? {
            checked += 1;
            let rel = elf.strip_prefix(output).unwrap_or(&elf).display().to_string();
            match editor.dump_section(&elf, section).await? {
                None => report.problems.push(format!("{}: no {} section", rel, section)),
                Some(bytes) => {
                    let text = String::from_utf8_lossy(&bytes);
                    let embedded = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
                    match ProvenanceRecord::parse(embedded) {
                        Ok(r) if r == record => {}
                        Ok(_) => report.problems.push(format!("{}: embedded record differs from ledger", rel)),
                        Err(_) => report.problems.push(format!("{}: embedded record is not valid JSON", rel)),
                    }
                }
            }
        }
        report.elfs_checked = Some(checked);
    } else {
        warn!("objcopy not found, skipping ELF section checks");
    }

    report.record = Some(record);
    Ok(report)
}
