//! Provenance commands - stamp and verify

use crate::audit::{AuditEvent, AuditLog};
use crate::cli::args::{StampArgs, VerifyArgs};
use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::{ArtifactError, ArtifactResult};
use crate::provenance::{self, ElfEditor, ObjcopyEditor, PackageInfo, SourceInfo, StampRequest, Stamper};
use crate::ui::{self, UiContext};
use std::path::PathBuf;

/// Execute the stamp command
pub async fn stamp(args: StampArgs, config: &Config) -> ArtifactResult<()> {
    let editor = locate_editor(config, args.objcopy.as_deref(), &args.hermetic_path);
    let stamper = Stamper::new(
        editor.map(|e| Box::new(e) as Box<dyn ElfEditor>),
        config.provenance.section.clone(),
    );

    let request = StampRequest {
        package: PackageInfo {
            name: args.name.clone(),
            version: args.version.clone(),
            kind: args.kind,
            target: args.target,
            source_url: args.source_url,
            source: match args.vendor {
                Some(label) => SourceInfo::Vendor(label),
                None => SourceInfo::Sha256(args.source_sha256),
            },
            graph_hash: args.graph_hash,
            use_flags: args.use_flags,
        },
        slsa: args.slsa,
        dep_dirs: args.dep_dirs,
    };

    let report = stamper.stamp(&args.input, &args.output, &request).await?;
    println!("stamped: {} {} (build {})", args.name, args.version, args.build_id);

    AuditLog::new(config)
        .log(
            AuditEvent::Stamp,
            &serde_json::json!({
                "name": args.name,
                "version": args.version,
                "build_id": args.build_id,
                "output": report.output.display().to_string(),
                "bos_prov": report.record.bos_prov(),
                "ledger_lines": report.ledger_lines,
                "elf_stamped": report.stamped,
                "elf_failed": report.failed,
            }),
        )
        .await;

    Ok(())
}

/// Execute the verify command
pub async fn verify(args: VerifyArgs, config: &Config) -> ArtifactResult<()> {
    let ctx = UiContext::detect();
    let editor = locate_editor(config, args.objcopy.as_deref(), &args.hermetic_path);
    if editor.is_none() {
        ui::step_warn_hint(
            &ctx,
            "objcopy not found, embedded records not checked",
            "Install binutils or pass --objcopy",
        );
    }

    let report = provenance::verify(
        &args.output,
        editor.as_ref().map(|e| e as &dyn ElfEditor),
        &config.provenance.section,
    )
    .await?;

    if let Some(record) = &report.record {
        ui::key_value(&ctx, "Package", &record.key());
    }
    ui::key_value(&ctx, "Ledger records", &report.ledger_lines.to_string());
    if let Some(checked) = report.elfs_checked {
        ui::key_value(&ctx, "ELF binaries checked", &checked.to_string());
    }

    if report.is_valid() {
        ui::step_ok(&ctx, "Provenance verified");
        return Ok(());
    }

    for problem in &report.problems {
        ui::step_error(&ctx, problem);
    }
    Err(ArtifactError::ProvenanceInvalid {
        path: args.output,
        reason: format!("{} problem(s) found", report.problems.len()),
    })
}

fn locate_editor(config: &Config, objcopy: Option<&str>, hermetic_path: &[PathBuf]) -> Option<ObjcopyEditor> {
    let env = BuildEnv::from_host(&config.env).with_hermetic_path(hermetic_path);
    ObjcopyEditor::locate(objcopy.unwrap_or(&config.provenance.objcopy), env)
}
