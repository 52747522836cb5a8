//! Subprocess environment
//!
//! Every external tool (compiler version checks, objcopy, scp, rsync) runs with a
//! cleared environment built from a passthrough whitelist plus fixed pins.
//! The value is built once and threaded through; the process environment is
//! never read after construction and never written.

use crate::config::schema::EnvConfig;
use std::collections::BTreeMap;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Immutable environment handed to every subprocess
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildEnv {
    vars: BTreeMap<String, String>,
}

impl BuildEnv {
    /// Build from the current process environment
    pub fn from_host(config: &EnvConfig) -> Self {
        Self::from_lookup(config, |key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable lookup
    pub fn from_lookup<F>(config: &EnvConfig, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut vars = BTreeMap::new();
        for key in &config.passthrough {
            if let Some(value) = lookup(key) {
                vars.insert(key.clone(), value);
            }
        }
        for (key, value) in &config.pins {
            vars.insert(key.clone(), value.clone());
        }
        Self { vars }
    }

    /// Replace PATH with exactly the given directories.
    ///
    /// `lib` and `lib64` directories next to each bin directory become
    /// `LD_LIBRARY_PATH`, so dynamically linked tools in a hermetic
    /// toolchain still find their libraries.
    pub fn with_hermetic_path(mut self, dirs: &[PathBuf]) -> Self {
        if dirs.is_empty() {
            return self;
        }
        let dirs: Vec<PathBuf> = dirs.iter().map(|d| absolute(d)).collect();
        self.vars.insert("PATH".to_string(), join_paths(&dirs));

        let lib_dirs: Vec<PathBuf> = dirs
            .iter()
            .filter_map(|d| d.parent())
            .flat_map(|parent| [parent.join("lib"), parent.join("lib64")])
            .filter(|d| d.is_dir())
            .collect();
        if !lib_dirs.is_empty() {
            self.vars
                .insert("LD_LIBRARY_PATH".to_string(), join_paths(&lib_dirs));
        }
        self
    }

    /// Look up a variable
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Iterate over all variables in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Create a command that runs under this environment only
    pub fn command(&self, program: impl AsRef<OsStr>) -> Command {
        let mut cmd = Command::new(program);
        cmd.env_clear().envs(&self.vars);
        cmd
    }

    /// Resolve a program against this environment's PATH
    pub fn which(&self, program: &str) -> Option<PathBuf> {
        let cwd = std::env::current_dir().ok()?;
        which::which_in(program, self.get("PATH"), cwd).ok()
    }
}

fn join_paths(dirs: &[PathBuf]) -> String {
    dirs.iter()
        .map(|d| d.display().to_string())
        .collect::<Vec<_>>()
        .join(":")
}

fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup(key: &str) -> Option<String> {
        match key {
            "HOME" => Some("/home/builder".to_string()),
            "LANG" => Some("en_US.UTF-8".to_string()),
            "PATH" => Some("/usr/bin".to_string()),
            _ => None,
        }
    }

    #[test]
    fn passthrough_and_pins() {
        let env = BuildEnv::from_lookup(&EnvConfig::default(), lookup);
        assert_eq!(env.get("HOME"), Some("/home/builder"));
        assert_eq!(env.get("SOURCE_DATE_EPOCH"), Some("315576000"));
        assert_eq!(env.get("RUSTC_WRAPPER"), Some(""));
        assert_eq!(env.get("USER"), None);
    }

    #[test]
    fn pins_override_host() {
        let env = BuildEnv::from_lookup(&EnvConfig::default(), lookup);
        assert_eq!(env.get("LANG"), Some("C"));
    }

    #[test]
    fn unlisted_host_vars_are_dropped() {
        let env = BuildEnv::from_lookup(&EnvConfig::default(), |key| {
            (key == "LD_LIBRARY_PATH").then(|| "/opt/lib".to_string())
        });
        assert_eq!(env.get("LD_LIBRARY_PATH"), None);
    }

    #[test]
    fn hermetic_path_replaces_host_path() {
        let env = BuildEnv::from_lookup(&EnvConfig::default(), lookup)
            .with_hermetic_path(&[PathBuf::from("/tc/bin"), PathBuf::from("/tc/sbin")]);
        assert_eq!(env.get("PATH"), Some("/tc/bin:/tc/sbin"));

        let unchanged = BuildEnv::from_lookup(&EnvConfig::default(), lookup).with_hermetic_path(&[]);
        assert_eq!(unchanged.get("PATH"), Some("/usr/bin"));
    }

    #[test]
    fn hermetic_path_exposes_sibling_libs() {
        let temp = tempfile::TempDir::new().unwrap();
        let bin = temp.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::create_dir_all(temp.path().join("lib64")).unwrap();

        let env = BuildEnv::default().with_hermetic_path(&[bin]);
        let expected = temp.path().join("lib64").display().to_string();
        assert_eq!(env.get("LD_LIBRARY_PATH"), Some(expected.as_str()));

        let bare = BuildEnv::default().with_hermetic_path(&[PathBuf::from("/nonexistent/bin")]);
        assert_eq!(bare.get("LD_LIBRARY_PATH"), None);
    }
}
