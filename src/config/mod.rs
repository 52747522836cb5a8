//! Configuration management for bos-artifacts

pub mod schema;

pub use schema::Config;

use crate::error::{ArtifactError, ArtifactResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, reads and edits `config.toml`
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::with_path(Self::default_config_path())
    }

    /// Use `path` instead of the per-user location (`--config`)
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `<config dir>/bos-artifacts/config.toml`
    pub fn default_config_path() -> PathBuf {
        app_dir(dirs::config_dir()).join("config.toml")
    }

    /// Per-user state, `$XDG_STATE_HOME/bos-artifacts` on Linux
    pub fn state_dir() -> PathBuf {
        app_dir(dirs::state_dir().or_else(dirs::data_local_dir))
    }

    pub fn audit_log_path() -> PathBuf {
        Self::state_dir().join("audit.log")
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Read the config file; a missing file means all defaults
    pub async fn load(&self) -> ArtifactResult<Config> {
        match self.read_text().await? {
            Some(text) => parse(&self.config_path, &text),
            None => {
                debug!("No config at {}, using defaults", self.config_path.display());
                Ok(Config::default())
            }
        }
    }

    /// Overwrite the file with the whole of `config`
    pub async fn save(&self, config: &Config) -> ArtifactResult<()> {
        self.write_text(&toml::to_string_pretty(config)?).await?;
        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Change one `section.field`, leaving the rest of the file as written
    pub async fn set_value(&self, key: &str, value: &str) -> ArtifactResult<()> {
        let current = self.read_text().await?.unwrap_or_default();
        let updated = set_toml_value(&current, key, value).map_err(|reason| {
            ArtifactError::ConfigInvalid {
                path: self.config_path.clone(),
                reason,
            }
        })?;

        // The edit must still deserialize, e.g. a string where a number belongs
        parse(&self.config_path, &updated)?;
        self.write_text(&updated).await
    }

    async fn read_text(&self) -> ArtifactResult<Option<String>> {
        match fs::read_to_string(&self.config_path).await {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ArtifactError::io(
                format!("reading {}", self.config_path.display()),
                e,
            )),
        }
    }

    async fn write_text(&self, text: &str) -> ArtifactResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArtifactError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        fs::write(&self.config_path, text)
            .await
            .map_err(|e| ArtifactError::io(format!("writing {}", self.config_path.display()), e))
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

fn app_dir(base: Option<PathBuf>) -> PathBuf {
    base.unwrap_or_else(|| PathBuf::from(".")).join("bos-artifacts")
}

fn parse(path: &Path, text: &str) -> ArtifactResult<Config> {
    toml::from_str(text).map_err(|e| ArtifactError::ConfigInvalid {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Write `value` at `section.key`, parsing it as a TOML value when possible
fn set_toml_value(document: &str, key: &str, value: &str) -> Result<String, String> {
    let mut doc: toml_edit::DocumentMut = document
        .parse()
        .map_err(|e: toml_edit::TomlError| e.to_string())?;

    let (section, field) = key
        .split_once('.')
        .ok_or_else(|| format!("key must be <section>.<field>, got '{key}'"))?;

    let parsed = value
        .parse::<toml_edit::Value>()
        .unwrap_or_else(|_| toml_edit::Value::from(value));

    let table = doc
        .entry(section)
        .or_insert(toml_edit::table())
        .as_table_mut()
        .ok_or_else(|| format!("'{section}' is not a table"))?;
    table[field] = toml_edit::value(parsed);

    Ok(doc.to_string())
}
