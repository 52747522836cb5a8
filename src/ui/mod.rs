//! Terminal output for the CLI
//!
//! Uses `cliclack` for prompts and log lines and `indicatif` for the bulk
//! download bar. Everything falls back to plain `[OK]`/`[WARN]` lines when
//! stdout is not a terminal or when running in CI.
//!
//! # Example
//!
//! ```rust,ignore
//! use bos_artifacts::ui::{self, TaskSpinner, UiContext};
//!
//! let ctx = UiContext::detect().with_auto_yes(args.yes);
//!
//! ui::intro(&ctx, "Publish binaries");
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Uploading via rsync...");
//! // ... do work ...
//! spinner.stop("Upload complete");
//!
//! ui::step_warn_hint(&ctx, "Skipped bash.tar.gz", "expected <name>-<version>-<confighash>-bin.tar.gz");
//!
//! if ui::confirm(&ctx, "Proceed with download?", false).await? {
//!     // ...
//! }
//!
//! ui::outro_success(&ctx, "Published 12 packages");
//! ```

mod context;
mod output;
mod progress;
mod prompts;
mod theme;

pub use context::UiContext;
pub use output::{
    format_size, intro, key_value, key_value_status, note, outro_success, outro_warn, remark,
    section, step_error, step_error_detail, step_info, step_ok, step_ok_detail, step_warn,
    step_warn_hint,
};
pub use progress::{DownloadProgress, TaskSpinner};
pub use prompts::confirm;
pub use theme::{init_theme, ArtifactTheme};
