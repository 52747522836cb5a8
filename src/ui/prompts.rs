//! Yes/no prompts that never block a headless run

use super::context::UiContext;
use crate::error::{ArtifactError, ArtifactResult};

/// Ask a yes/no question.
///
/// `--yes` answers yes without asking. Without a terminal the question is
/// not shown and `default` is the answer.
pub async fn confirm(ctx: &UiContext, message: &str, default: bool) -> ArtifactResult<bool> {
    match (ctx.auto_yes(), ctx.is_interactive()) {
        (true, _) => {
            println!("  {} (auto-approved)", message);
            Ok(true)
        }
        (false, false) => Ok(default),
        (false, true) => ask(message.to_string(), default).await,
    }
}

async fn ask(message: String, default: bool) -> ArtifactResult<bool> {
    // cliclack reads stdin synchronously
    let answer = tokio::task::spawn_blocking(move || {
        cliclack::confirm(message).initial_value(default).interact()
    })
    .await
    .map_err(|e| ArtifactError::Internal(format!("prompt task failed: {}", e)))?;

    answer.map_err(|e| ArtifactError::User(format!("Prompt failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn auto_yes_overrides_default() {
        let ctx = UiContext::non_interactive().with_auto_yes(true);
        assert!(confirm(&ctx, "Proceed with download?", false).await.unwrap());
    }

    #[tokio::test]
    async fn headless_takes_default() {
        let ctx = UiContext::non_interactive();
        assert!(confirm(&ctx, "Proceed with download?", true).await.unwrap());
        assert!(!confirm(&ctx, "Proceed with download?", false).await.unwrap());
    }
}
