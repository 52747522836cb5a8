//! Completions command - print a shell completion script

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::ArtifactResult;
use clap::CommandFactory;

/// Execute the completions command
pub async fn execute(args: &CompletionsArgs) -> ArtifactResult<()> {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(args.shell, &mut cmd, name, &mut std::io::stdout());
    Ok(())
}
