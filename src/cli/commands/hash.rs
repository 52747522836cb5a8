//! Hash command - print the tree hash of a path

use crate::cli::args::HashArgs;
use crate::error::{ArtifactError, ArtifactResult};
use crate::hash::TreeHasher;

/// Execute the hash command
pub async fn execute(args: HashArgs) -> ArtifactResult<()> {
    let hasher = if args.packaging {
        TreeHasher::packaging()
    } else {
        TreeHasher::plain()
    };

    let path = args.path;
    let digest = tokio::task::spawn_blocking(move || hasher.hash(&path))
        .await
        .map_err(|e| ArtifactError::Internal(format!("hash task failed: {}", e)))??;

    println!("{}", digest);
    Ok(())
}
