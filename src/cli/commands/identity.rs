//! Config-hash command - derive a target's config hash

use crate::cli::args::ConfigHashArgs;
use crate::config::Config;
use crate::env::BuildEnv;
use crate::error::ArtifactResult;
use crate::identity::{HostInspector, IdentityDeriver, TargetDescriptor};

/// Execute the config-hash command
pub async fn execute(args: ConfigHashArgs, config: &Config) -> ArtifactResult<()> {
    let target = TargetDescriptor::load(&args.descriptor).await?;
    let fingerprint = deriver(config).fingerprint(&target).await;

    if args.explain {
        for part in fingerprint.parts() {
            eprintln!("{}", part);
        }
    }
    println!("{}", fingerprint.hash());
    Ok(())
}

/// Deriver probing this host under the configured environment
pub(crate) fn deriver(config: &Config) -> IdentityDeriver {
    let env = BuildEnv::from_host(&config.env);
    let inspector = HostInspector::new(env, config.identity.compiler.clone());
    IdentityDeriver::new(Box::new(inspector), config.identity.clone())
}
