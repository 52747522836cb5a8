//! CLI argument definitions using clap derive

use crate::mirror::TransportKind;
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// bos-artifacts - content-addressed build artifacts and provenance
///
/// Hashes build outputs, packages them into mirrorable archives,
/// publishes and installs prebuilt binaries, mirrors upstream sources
/// and stamps provenance into finished outputs.
#[derive(Parser, Debug)]
#[command(name = "bos-artifacts")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "BOS_ARTIFACTS_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format (overrides general.log_format)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Print the tree hash of a file or directory
    Hash(HashArgs),

    /// Derive the config hash of a target
    ConfigHash(ConfigHashArgs),

    /// Package a build output into a mirrorable archive
    Package(PackageArgs),

    /// Publish archives to a binary mirror
    Publish(PublishArgs),

    /// Check whether a prebuilt binary is on the mirror
    Query(QueryArgs),

    /// Download, verify and install a prebuilt binary
    Install(InstallArgs),

    /// Download upstream sources into a local mirror
    FetchSources(FetchSourcesArgs),

    /// Check a source mirror against a source list
    VerifyMirror(VerifyMirrorArgs),

    /// Stamp provenance into a copy of a build output
    Stamp(StampArgs),

    /// Verify the provenance of a stamped output
    Verify(VerifyArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Arguments for the hash command
#[derive(Parser, Debug)]
pub struct HashArgs {
    /// File or directory to hash
    pub path: PathBuf,

    /// Skip a root-level METADATA.json, as the archiver does
    #[arg(long)]
    pub packaging: bool,
}

/// Arguments for the config-hash command
#[derive(Parser, Debug)]
pub struct ConfigHashArgs {
    /// Target descriptor (JSON)
    #[arg(short, long)]
    pub descriptor: PathBuf,

    /// Print every part that went into the hash
    #[arg(long)]
    pub explain: bool,
}

/// Arguments for the package command
#[derive(Parser, Debug)]
#[command(disable_version_flag = true)]
pub struct PackageArgs {
    /// Build output directory
    #[arg(short, long)]
    pub output_dir: PathBuf,

    /// Package name
    #[arg(short, long)]
    pub name: String,

    /// Package version
    #[arg(long)]
    pub version: String,

    /// Build target label
    #[arg(short, long, default_value = "")]
    pub target: String,

    /// Precomputed config hash
    #[arg(long, conflicts_with = "descriptor")]
    pub config_hash: Option<String>,

    /// Derive the config hash from a target descriptor
    #[arg(long, required_unless_present = "config_hash")]
    pub descriptor: Option<PathBuf>,

    /// Directory receiving the archive and its sidecar
    #[arg(short, long, default_value = ".")]
    pub dest: PathBuf,
}

/// Arguments for the publish command
#[derive(Parser, Debug)]
pub struct PublishArgs {
    /// Directory searched for archives
    #[arg(short, long)]
    pub source: PathBuf,

    /// Mirror destination: local path, user@host:path or rsync:// URL
    #[arg(short, long)]
    pub dest: String,

    /// Upload transport (detected from the destination when omitted)
    #[arg(long)]
    pub transport: Option<TransportKind>,

    /// Stage and report without uploading
    #[arg(long)]
    pub dry_run: bool,

    /// Only regenerate the index
    #[arg(long)]
    pub index_only: bool,
}

/// Arguments for the query command
#[derive(Parser, Debug)]
#[command(disable_version_flag = true)]
pub struct QueryArgs {
    /// Package name
    pub name: String,

    /// Package version
    pub version: String,

    /// Config hash
    pub config_hash: String,

    /// Mirror URL or local mirror directory
    #[arg(short, long, env = "BUCKOS_BINARY_MIRROR")]
    pub mirror: Option<String>,

    /// Suppress diagnostics
    #[arg(short, long)]
    pub quiet: bool,
}

/// Arguments for the install command
#[derive(Parser, Debug)]
#[command(disable_version_flag = true)]
pub struct InstallArgs {
    /// Package name
    pub package: String,

    /// Package version
    #[arg(long, required_unless_present = "list")]
    pub version: Option<String>,

    /// Config hash (newest build of the version when omitted)
    #[arg(long)]
    pub config_hash: Option<String>,

    /// Required content hash prefix
    #[arg(short, long)]
    pub file_hash: Option<String>,

    /// Mirror URL or local mirror directory
    #[arg(short, long, env = "BUCKOS_BINARY_MIRROR")]
    pub mirror: Option<String>,

    /// Install prefix
    #[arg(short, long)]
    pub prefix: Option<PathBuf>,

    /// Download cache directory
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,

    /// Download and verify, but do not install
    #[arg(short, long)]
    pub download_only: bool,

    /// List available builds of the package
    #[arg(short, long)]
    pub list: bool,
}

/// Arguments for the fetch-sources command
#[derive(Parser, Debug)]
pub struct FetchSourcesArgs {
    /// JSON list of {package, url, sha256}
    #[arg(short, long)]
    pub sources: PathBuf,

    /// Mirror directory
    #[arg(short, long, default_value = "downloads")]
    pub dest: PathBuf,

    /// Concurrent downloads (default: fetch.max_concurrent)
    #[arg(short, long)]
    pub jobs: Option<usize>,

    /// Requests per second (default: fetch.rate_limit)
    #[arg(short, long)]
    pub rate_limit: Option<f64>,

    /// Per-request timeout in seconds (default: fetch.timeout_secs)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Skip the confirmation prompt
    #[arg(short, long)]
    pub yes: bool,

    /// List what would be downloaded and exit
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the verify-mirror command
#[derive(Parser, Debug)]
pub struct VerifyMirrorArgs {
    /// JSON list of {package, url, sha256}
    #[arg(short, long)]
    pub sources: PathBuf,

    /// Mirror directory to check
    #[arg(short, long)]
    pub mirror_dir: PathBuf,

    /// Verify SHA-256 digests (slower)
    #[arg(short = 'C', long)]
    pub check_checksums: bool,

    /// Write a JSON report
    #[arg(short, long)]
    pub report: Option<PathBuf>,
}

/// Arguments for the stamp command
#[derive(Parser, Debug)]
#[command(disable_version_flag = true)]
pub struct StampArgs {
    /// Build output to stamp (left untouched)
    #[arg(long)]
    pub input: PathBuf,

    /// Stamped copy (replaced if present)
    #[arg(long)]
    pub output: PathBuf,

    /// Package name
    #[arg(long)]
    pub name: String,

    /// Package version
    #[arg(long)]
    pub version: String,

    /// Build identifier
    #[arg(long)]
    pub build_id: String,

    /// Package type (autotools, cmake, ...)
    #[arg(long = "type", default_value = "")]
    pub kind: String,

    /// Build target label
    #[arg(long, default_value = "")]
    pub target: String,

    /// Upstream source URL
    #[arg(long, default_value = "")]
    pub source_url: String,

    /// Upstream source digest
    #[arg(long, default_value = "", conflicts_with = "vendor")]
    pub source_sha256: String,

    /// Vendored source label, recorded instead of a digest
    #[arg(long)]
    pub vendor: Option<String>,

    /// Dependency-closure hash
    #[arg(long, default_value = "")]
    pub graph_hash: String,

    /// USE flag (repeatable)
    #[arg(long = "use-flag")]
    pub use_flags: Vec<String>,

    /// Record build time and host
    #[arg(long)]
    pub slsa: bool,

    /// Dependency output carrying a ledger (repeatable)
    #[arg(long = "dep-dir")]
    pub dep_dirs: Vec<PathBuf>,

    /// ELF editing tool (default: provenance.objcopy)
    #[arg(long)]
    pub objcopy: Option<String>,

    /// Replace PATH with these directories (repeatable)
    #[arg(long = "hermetic-path")]
    pub hermetic_path: Vec<PathBuf>,
}

/// Arguments for the verify command
#[derive(Parser, Debug)]
pub struct VerifyArgs {
    /// Stamped output directory
    pub output: PathBuf,

    /// ELF editing tool (default: provenance.objcopy)
    #[arg(long)]
    pub objcopy: Option<String>,

    /// Replace PATH with these directories (repeatable)
    #[arg(long = "hermetic-path")]
    pub hermetic_path: Vec<PathBuf>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Initialize default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., fetch.rate_limit)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Arguments for the completions command
#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    pub shell: clap_complete::Shell,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

impl LogFormat {
    /// Parse a `general.log_format` value, defaulting to text
    pub fn from_config(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}
