//! Audit trail of artifact operations
//!
//! Each `package`, `publish`, `install` and `stamp` that completes appends
//! one JSON object to `audit.log` in the state directory:
//!
//! ```text
//! {"timestamp":"2026-03-01T12:00:00.041Z","event":"install","data":{"name":"bash",...}}
//! ```
//!
//! The trail is advisory. A failed write is a warning and never fails the
//! operation that produced it.

use crate::config::{schema::Config, ConfigManager};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Operations that leave an audit record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditEvent {
    Package,
    Publish,
    Install,
    Stamp,
}

#[derive(Serialize)]
struct Entry<'a> {
    timestamp: DateTime<Utc>,
    event: AuditEvent,
    data: &'a serde_json::Value,
}

/// Append-only JSON-lines log
pub struct AuditLog {
    enabled: bool,
    path: PathBuf,
}

impl AuditLog {
    /// Log to the state directory, unless `general.audit_log` is off
    pub fn new(config: &Config) -> Self {
        Self::at(ConfigManager::audit_log_path(), config.general.audit_log)
    }

    pub(crate) fn at(path: impl Into<PathBuf>, enabled: bool) -> Self {
        Self {
            enabled,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn log(&self, event: AuditEvent, data: &serde_json::Value) {
        if !self.enabled {
            return;
        }

        let entry = Entry {
            timestamp: Utc::now(),
            event,
            data,
        };
        let line = match serde_json::to_string(&entry) {
            Ok(json) => json + "\n",
            Err(e) => {
                warn!("Failed to serialize audit event: {}", e);
                return;
            }
        };

        match self.append(&line).await {
            Ok(()) => debug!("Audit: {:?} -> {}", event, self.path.display()),
            Err(e) => warn!("Failed to write audit log {}: {}", self.path.display(), e),
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await
    }
}
