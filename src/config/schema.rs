//! Configuration schema for bos-artifacts
//!
//! Configuration is stored at `~/.config/bos-artifacts/config.toml`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Config-hash derivation settings
    pub identity: IdentityConfig,

    /// Binary mirror settings
    pub mirror: MirrorConfig,

    /// Source download settings
    pub fetch: FetchConfig,

    /// Provenance stamping settings
    pub provenance: ProvenanceConfig,

    /// Subprocess environment
    pub env: EnvConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Record package/publish/install/stamp events
    pub audit_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            audit_log: true,
        }
    }
}

/// Inputs to the config hash that come from the host rather than the target
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Compatibility tag, first component of every config hash
    pub compat: String,

    /// Global USE flags applied to every target
    pub use_flags: Vec<String>,

    /// Compiler whose `--version` banner is folded into the hash
    pub compiler: String,

    /// Fold the dependency set into the hash
    pub include_deps: bool,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            compat: "buckos".to_string(),
            use_flags: vec![],
            compiler: "gcc".to_string(),
            include_deps: true,
        }
    }
}

/// Binary mirror configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Mirror base URL (the index lives at `<url>/binaries/index.json`)
    pub url: String,

    /// Timeout for index and presence checks, in seconds
    pub timeout_secs: u64,

    /// Where installed archives are cached (defaults to the user cache dir)
    pub cache_dir: Option<PathBuf>,

    /// Install prefix
    pub prefix: PathBuf,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            url: "https://mirror.buckos.org".to_string(),
            timeout_secs: 5,
            cache_dir: None,
            prefix: PathBuf::from("/usr"),
        }
    }
}

impl MirrorConfig {
    /// Resolve the archive cache directory
    pub fn cache_dir(&self) -> PathBuf {
        self.cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("buckos-binaries")
        })
    }
}

/// Source download configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Number of download workers
    pub max_concurrent: usize,

    /// Requests per second across all workers
    pub rate_limit: f64,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Attempts per download, including the first
    pub retries: u32,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            rate_limit: 5.0,
            timeout_secs: 30,
            retries: 3,
        }
    }
}

/// Provenance stamping configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvenanceConfig {
    /// ELF editing tool (name or path)
    pub objcopy: String,

    /// Section receiving the provenance record
    pub section: String,
}

impl Default for ProvenanceConfig {
    fn default() -> Self {
        Self {
            objcopy: "objcopy".to_string(),
            section: ".note.package".to_string(),
        }
    }
}

/// Environment handed to every subprocess
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvConfig {
    /// Host variables copied through when set
    pub passthrough: Vec<String>,

    /// Fixed values that always win over the host
    pub pins: BTreeMap<String, String>,
}

impl Default for EnvConfig {
    fn default() -> Self {
        let passthrough = [
            "HOME",
            "USER",
            "LOGNAME",
            "TMPDIR",
            "TEMP",
            "TMP",
            "TERM",
            "PATH",
            "BUCK_SCRATCH_PATH",
        ];
        let pins = [
            ("LC_ALL", "C"),
            ("LANG", "C"),
            ("SOURCE_DATE_EPOCH", "315576000"),
            ("CCACHE_DISABLE", "1"),
            ("RUSTC_WRAPPER", ""),
            ("CARGO_BUILD_RUSTC_WRAPPER", ""),
        ];
        Self {
            passthrough: passthrough.iter().map(|s| s.to_string()).collect(),
            pins: pins
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = Config::default();
        let toml = toml::to_string_pretty(&config).unwrap();
        assert!(toml.contains("[general]"));
        assert!(toml.contains("[mirror]"));
        assert!(toml.contains("SOURCE_DATE_EPOCH"));
    }

    #[test]
    fn config_deserializes_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.identity.compat, "buckos");
        assert_eq!(config.fetch.max_concurrent, 4);
        assert_eq!(config.mirror.timeout_secs, 5);
    }

    #[test]
    fn config_deserializes_partial() {
        let toml = r#"
            [fetch]
            rate_limit = 1.5
        "#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.fetch.rate_limit, 1.5);
        assert_eq!(config.fetch.retries, 3); // default preserved
        assert_eq!(config.provenance.section, ".note.package");
    }

    #[test]
    fn cache_dir_override() {
        let mut mirror = MirrorConfig::default();
        assert!(mirror.cache_dir().ends_with("buckos-binaries"));
        mirror.cache_dir = Some(PathBuf::from("/tmp/bins"));
        assert_eq!(mirror.cache_dir(), PathBuf::from("/tmp/bins"));
    }
}
