//! Error types for bos-artifacts
//!
//! All modules use `ArtifactResult<T>` as their return type.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for artifact operations
pub type ArtifactResult<T> = Result<T, ArtifactError>;

/// All errors that can occur while hashing, packaging, publishing or stamping
#[derive(Error, Debug)]
pub enum ArtifactError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Input errors
    #[error("Invalid target descriptor {path}: {reason}")]
    DescriptorInvalid { path: PathBuf, reason: String },

    #[error("Not an artifact filename: {0}")]
    ArtifactName(String),

    #[error("Output already contains {name} at its root: {path}")]
    ReservedEntry { name: String, path: PathBuf },

    // Integrity errors
    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Provenance verification failed for {path}: {reason}")]
    ProvenanceInvalid { path: PathBuf, reason: String },

    #[error("Source mirror incomplete: {missing} missing, {checksum_failures} checksum failures")]
    MirrorIncomplete {
        missing: usize,
        checksum_failures: usize,
    },

    // Lookup errors
    #[error("{name} {version} ({config_hash}) not available on mirror")]
    NotAvailable {
        name: String,
        version: String,
        config_hash: String,
    },

    // Network errors
    #[error("HTTP request failed: {url}: {reason}")]
    Http { url: String, reason: String },

    #[error("Download failed after {attempts} attempts: {url}")]
    DownloadExhausted { url: String, attempts: u32 },

    #[error("{failed} of {total} downloads failed")]
    DownloadsFailed { failed: u64, total: u64 },

    // Archive errors
    #[error("Archive error for {path}: {source}")]
    Archive {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    #[error("Failed to walk {path}: {reason}")]
    Walk { path: PathBuf, reason: String },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl ArtifactError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an HTTP error
    pub fn http(url: impl Into<String>, reason: impl ToString) -> Self {
        Self::Http {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Http { .. } | Self::Io { .. } | Self::ChecksumMismatch { .. })
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: bos-artifacts config init --force"),
            Self::ArtifactName(_) => Some("Expected <name>-<version>-<confighash>-bin.tar.gz"),
            Self::ReservedEntry { .. } => {
                Some("METADATA.json is generated by the archiver; remove it from the output")
            }
            Self::ChecksumMismatch { .. } => {
                Some("The file may be truncated or stale; delete it and download again")
            }
            Self::NotAvailable { .. } => Some("Build from source, or publish this build first"),
            Self::DownloadsFailed { .. } => {
                Some("Rerun the same command; verified files are kept and skipped")
            }
            Self::MirrorIncomplete { .. } => Some("Run: bos-artifacts fetch-sources"),
            Self::ProvenanceInvalid { .. } => Some("Re-stamp the output from its unstamped input"),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = ArtifactError::ArtifactName("bash.tar.gz".to_string());
        assert!(err.to_string().contains("Not an artifact filename"));
    }

    #[test]
    fn error_hint() {
        let err = ArtifactError::ArtifactName("x".to_string());
        assert_eq!(
            err.hint(),
            Some("Expected <name>-<version>-<confighash>-bin.tar.gz")
        );
    }

    #[test]
    fn not_available_message() {
        let err = ArtifactError::NotAvailable {
            name: "tree".to_string(),
            version: "2.1.0".to_string(),
            config_hash: "cafef00d".to_string(),
        };
        assert_eq!(err.to_string(), "tree 2.1.0 (cafef00d) not available on mirror");
        assert!(err.hint().is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_retryable() {
        assert!(ArtifactError::http("https://example.org", "timeout").is_retryable());
        assert!(!ArtifactError::User("bad input".to_string()).is_retryable());
    }
}
