//! Build identity: config hash and content hash
//!
//! The config hash fingerprints everything that shapes a build (platform,
//! compiler, flags, declared environment, dependency set) without looking at
//! the bytes it produced. The content hash is the tree hash of the output.

use crate::config::schema::IdentityConfig;
use crate::env::BuildEnv;
use crate::error::{ArtifactError, ArtifactResult};
use crate::hash::{sha256_hex, TreeHasher};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::process::Stdio;
use tracing::{debug, warn};

/// Length of a config hash in hex chars
pub const CONFIG_HASH_LEN: usize = 16;

/// Length of the dependency-set digest folded into a config hash
const DEPS_HASH_LEN: usize = 8;

/// Everything the orchestrator knows about one target
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetDescriptor {
    /// Fully qualified target label
    pub target: String,

    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Declared build-time environment; empty values are significant
    pub env: BTreeMap<String, String>,

    /// Flags resolved for this target
    pub use_flags: Vec<String>,

    /// Identities of the dependency closure
    pub deps: Vec<String>,
}

impl TargetDescriptor {
    /// Load a descriptor from a JSON file
    pub async fn load(path: &Path) -> ArtifactResult<Self> {
        let text = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| ArtifactError::io(format!("reading {}", path.display()), e))?;
        serde_json::from_str(&text).map_err(|e| ArtifactError::DescriptorInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Host facts that feed the config hash
#[async_trait]
pub trait BuildInspector: Send + Sync {
    /// Machine architecture, e.g. `x86_64`
    async fn platform(&self) -> ArtifactResult<String>;

    /// Compiler label and first line of its version banner
    async fn compiler(&self) -> ArtifactResult<(String, String)>;
}

/// Inspector that asks the host via `uname` and the configured compiler
pub struct HostInspector {
    env: BuildEnv,
    compiler: String,
}

impl HostInspector {
    pub fn new(env: BuildEnv, compiler: impl Into<String>) -> Self {
        Self {
            env,
            compiler: compiler.into(),
        }
    }

    async fn first_line(&self, program: &str, args: &[&str]) -> ArtifactResult<String> {
        debug!("Executing: {} {:?}", program, args);

        let output = self
            .env
            .command(program)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| ArtifactError::command_failed(program, e))?;

        if !output.status.success() {
            return Err(ArtifactError::command_exec(
                format!("{} {}", program, args.join(" ")),
                String::from_utf8_lossy(&output.stderr).trim(),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .unwrap_or_default()
            .trim()
            .to_string())
    }
}

#[async_trait]
impl BuildInspector for HostInspector {
    async fn platform(&self) -> ArtifactResult<String> {
        self.first_line("uname", &["-m"]).await
    }

    async fn compiler(&self) -> ArtifactResult<(String, String)> {
        let label = Path::new(&self.compiler)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.compiler.clone());
        let banner = self.first_line(&self.compiler, &["--version"]).await?;
        Ok((label, banner))
    }
}

/// Ordered `key:value` parts whose joined digest is the config hash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigFingerprint {
    parts: Vec<String>,
}

impl ConfigFingerprint {
    /// The parts in hashing order
    pub fn parts(&self) -> &[String] {
        &self.parts
    }

    /// The string that gets hashed
    pub fn joined(&self) -> String {
        self.parts.join("|")
    }

    /// 16-hex config hash
    pub fn hash(&self) -> String {
        let mut digest = sha256_hex(self.joined());
        digest.truncate(CONFIG_HASH_LEN);
        digest
    }
}

/// Derives config and content hashes for targets
pub struct IdentityDeriver {
    inspector: Box<dyn BuildInspector>,
    identity: IdentityConfig,
}

impl IdentityDeriver {
    pub fn new(inspector: Box<dyn BuildInspector>, identity: IdentityConfig) -> Self {
        Self { inspector, identity }
    }

    /// Collect the config-hash parts for a target.
    ///
    /// A lookup that fails leaves its part out; the hash becomes less
    /// specific rather than the derivation failing.
    pub async fn fingerprint(&self, target: &TargetDescriptor) -> ConfigFingerprint {
        let mut parts = vec![format!("compat:{}", self.identity.compat)];

        match self.inspector.platform().await {
            Ok(platform) => parts.push(format!("platform:{}", platform)),
            Err(e) => warn!("Platform lookup failed, omitting from config hash: {}", e),
        }

        let global_flags = sorted(&self.identity.use_flags);
        if !global_flags.is_empty() {
            parts.push(format!("use:{}", global_flags.join(",")));
        }

        match self.inspector.compiler().await {
            Ok((label, banner)) => parts.push(format!("{}:{}", label, banner)),
            Err(e) => warn!("Compiler lookup failed, omitting from config hash: {}", e),
        }

        for (key, value) in &target.env {
            parts.push(format!("env.{}:{}", key, value));
        }

        let target_flags = sorted(&target.use_flags);
        if !target_flags.is_empty() {
            parts.push(format!("target_use:{}", target_flags.join(",")));
        }

        if self.identity.include_deps {
            parts.push(format!("deps:{}", deps_digest(&target.deps)));
        }

        ConfigFingerprint { parts }
    }

    /// 16-hex config hash for a target
    pub async fn config_hash(&self, target: &TargetDescriptor) -> String {
        self.fingerprint(target).await.hash()
    }

    /// Tree hash of a build output
    pub fn content_hash(output: &Path) -> ArtifactResult<String> {
        TreeHasher::plain().hash(output)
    }
}

fn sorted(flags: &[String]) -> Vec<String> {
    let mut flags = flags.to_vec();
    flags.sort();
    flags.dedup();
    flags
}

/// Short digest of the dependency set, one identity per line
fn deps_digest(deps: &[String]) -> String {
    let mut listing = sorted(deps).join("\n");
    if !listing.is_empty() {
        listing.push('\n');
    }
    let mut digest = sha256_hex(listing);
    digest.truncate(DEPS_HASH_LEN);
    digest
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Inspector with fixed answers; `None` simulates a missing tool
    pub(crate) struct FixedInspector {
        pub platform: Option<&'static str>,
        pub compiler: Option<(&'static str, &'static str)>,
    }

    impl Default for FixedInspector {
        fn default() -> Self {
            Self {
                platform: Some("x86_64"),
                compiler: Some(("gcc", "gcc (GCC) 14.2.0")),
            }
        }
    }

    #[async_trait]
    impl BuildInspector for FixedInspector {
        async fn platform(&self) -> ArtifactResult<String> {
            self.platform
                .map(str::to_string)
                .ok_or_else(|| ArtifactError::command_exec("uname -m", "not found"))
        }

        async fn compiler(&self) -> ArtifactResult<(String, String)> {
            self.compiler
                .map(|(l, b)| (l.to_string(), b.to_string()))
                .ok_or_else(|| ArtifactError::command_exec("gcc --version", "not found"))
        }
    }

    fn deriver(inspector: FixedInspector, use_flags: &[&str]) -> IdentityDeriver {
        let identity = IdentityConfig {
            use_flags: use_flags.iter().map(|s| s.to_string()).collect(),
            ..IdentityConfig::default()
        };
        IdentityDeriver::new(Box::new(inspector), identity)
    }

    fn bash() -> TargetDescriptor {
        TargetDescriptor {
            target: "//packages/linux/core/bash:bash".to_string(),
            name: "bash".to_string(),
            version: "5.3".to_string(),
            env: BTreeMap::from([
                ("CFLAGS".to_string(), "-O2".to_string()),
                ("AR".to_string(), String::new()),
            ]),
            use_flags: vec!["readline".to_string(), "nls".to_string()],
            deps: vec!["ncurses-6.5".to_string(), "readline-8.2".to_string()],
        }
    }

    #[tokio::test]
    async fn parts_follow_fixed_order() {
        let fp = deriver(FixedInspector::default(), &["ssl", "ipv6"])
            .fingerprint(&bash())
            .await;
        let parts = fp.parts();
        assert_eq!(parts[0], "compat:buckos");
        assert_eq!(parts[1], "platform:x86_64");
        assert_eq!(parts[2], "use:ipv6,ssl");
        assert_eq!(parts[3], "gcc:gcc (GCC) 14.2.0");
        assert_eq!(parts[4], "env.AR:");
        assert_eq!(parts[5], "env.CFLAGS:-O2");
        assert_eq!(parts[6], "target_use:nls,readline");
        assert!(parts[7].starts_with("deps:"));
        assert_eq!(parts[7].len(), "deps:".len() + 8);
        assert_eq!(fp.hash().len(), CONFIG_HASH_LEN);
        assert_eq!(fp.hash(), sha256_hex(fp.joined())[..16]);
    }

    #[tokio::test]
    async fn toggling_a_flag_changes_only_that_flag() {
        let mut target = bash();
        let d = deriver(FixedInspector::default(), &[]);
        let before = d.fingerprint(&target).await;

        target.use_flags.push("static".to_string());
        let after = d.fingerprint(&target).await;

        assert_ne!(before.hash(), after.hash());
        let flags = after
            .parts()
            .iter()
            .find(|p| p.starts_with("target_use:"))
            .unwrap();
        assert_eq!(flags, "target_use:nls,readline,static");
        assert_eq!(before.parts().len(), after.parts().len());
    }

    #[tokio::test]
    async fn empty_env_value_differs_from_absent() {
        let d = deriver(FixedInspector::default(), &[]);
        let mut with_empty = bash();
        let mut absent = bash();
        with_empty.env.insert("LDFLAGS".to_string(), String::new());
        absent.env.remove("LDFLAGS");
        assert_ne!(d.config_hash(&with_empty).await, d.config_hash(&absent).await);
    }

    #[tokio::test]
    async fn failing_lookup_is_omitted() {
        let inspector = FixedInspector {
            compiler: None,
            ..FixedInspector::default()
        };
        let fp = deriver(inspector, &[]).fingerprint(&bash()).await;
        assert!(fp.parts().iter().all(|p| !p.starts_with("gcc:")));
        assert_eq!(fp.hash().len(), CONFIG_HASH_LEN);
    }

    #[tokio::test]
    async fn deps_can_be_suppressed() {
        let identity = IdentityConfig {
            include_deps: false,
            ..IdentityConfig::default()
        };
        let d = IdentityDeriver::new(Box::new(FixedInspector::default()), identity);
        let fp = d.fingerprint(&bash()).await;
        assert!(fp.parts().iter().all(|p| !p.starts_with("deps:")));
    }

    #[test]
    fn deps_digest_ignores_order() {
        let a = deps_digest(&["b".to_string(), "a".to_string()]);
        let b = deps_digest(&["a".to_string(), "b".to_string()]);
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
    }

    #[tokio::test]
    async fn descriptor_loads_with_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("bash.json");
        std::fs::write(&path, r#"{"name":"bash","version":"5.3"}"#).unwrap();
        let target = TargetDescriptor::load(&path).await.unwrap();
        assert_eq!(target.name, "bash");
        assert!(target.env.is_empty());

        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(
            TargetDescriptor::load(&path).await,
            Err(ArtifactError::DescriptorInvalid { .. })
        ));
    }
}
