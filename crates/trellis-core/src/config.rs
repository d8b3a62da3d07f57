//! Trellis configuration (trellis.yaml)
//!
//! Every field is optional; defaults place all state under ~/.trellis/:
//! ```yaml
//! bundles_dir: /srv/app/bundles
//! state_dir: /var/lib/trellis
//! admin_capability: trellis.manage
//! capability_timeout_ms: 2000
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default administrative capability required for enable/disable
pub const DEFAULT_ADMIN_CAPABILITY: &str = "trellis.manage";

/// Default per-check capability timeout in milliseconds
pub const DEFAULT_CAPABILITY_TIMEOUT_MS: u64 = 2000;

/// Resolved Trellis configuration
#[derive(Debug, Clone)]
pub struct TrellisConfig {
    /// Root directory scanned for bundle subdirectories
    pub bundles_dir: PathBuf,

    /// Directory holding the lifecycle ledger and capability grants
    pub state_dir: PathBuf,

    /// Capability an actor must hold to call enable/disable
    pub admin_capability: String,

    /// Upper bound on each capability-check call
    pub capability_timeout_ms: u64,
}

/// Raw on-disk form with all fields optional
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    bundles_dir: Option<PathBuf>,
    #[serde(default)]
    state_dir: Option<PathBuf>,
    #[serde(default)]
    admin_capability: Option<String>,
    #[serde(default)]
    capability_timeout_ms: Option<u64>,
}

impl TrellisConfig {
    /// Load configuration from an explicit path, or fall back to
    /// ~/.trellis/trellis.yaml, or pure defaults if no file exists.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(Error::manifest_not_found(p.display().to_string()));
                }
                Self::read_file(p)?
            }
            None => {
                let default = Self::home_dir()?.join("trellis.yaml");
                if default.exists() {
                    Self::read_file(&default)?
                } else {
                    ConfigFile::default()
                }
            }
        };

        let home = Self::home_dir()?;
        let config = Self {
            bundles_dir: file.bundles_dir.unwrap_or_else(|| home.join("bundles")),
            state_dir: file.state_dir.unwrap_or(home),
            admin_capability: file
                .admin_capability
                .unwrap_or_else(|| DEFAULT_ADMIN_CAPABILITY.to_string()),
            capability_timeout_ms: file
                .capability_timeout_ms
                .unwrap_or(DEFAULT_CAPABILITY_TIMEOUT_MS),
        };
        debug!(
            "Loaded config: bundles_dir={:?} state_dir={:?}",
            config.bundles_dir, config.state_dir
        );
        Ok(config)
    }

    fn read_file(path: &Path) -> Result<ConfigFile> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml_ng::from_str(&content)?)
    }

    /// The Trellis home directory (~/.trellis)
    pub fn home_dir() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            Error::invalid_manifest("Could not determine home directory".to_string())
        })?;
        Ok(home.join(".trellis"))
    }

    /// Path to the lifecycle ledger
    pub fn ledger_path(&self) -> PathBuf {
        self.state_dir.join("lifecycle_ledger.jsonl")
    }

    /// Path to the capability grants store
    pub fn grants_path(&self) -> PathBuf {
        self.state_dir.join("grants.yaml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.yaml");
        std::fs::write(
            &path,
            r#"
bundles_dir: /srv/bundles
admin_capability: host.admin
capability_timeout_ms: 500
"#,
        )
        .unwrap();

        let config = TrellisConfig::load(Some(&path)).unwrap();
        assert_eq!(config.bundles_dir, PathBuf::from("/srv/bundles"));
        assert_eq!(config.admin_capability, "host.admin");
        assert_eq!(config.capability_timeout_ms, 500);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(TrellisConfig::load(Some(&path)).is_err());
    }

    #[test]
    fn state_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trellis.yaml");
        std::fs::write(&path, format!("state_dir: {}\n", dir.path().display())).unwrap();

        let config = TrellisConfig::load(Some(&path)).unwrap();
        assert_eq!(config.ledger_path(), dir.path().join("lifecycle_ledger.jsonl"));
        assert_eq!(config.grants_path(), dir.path().join("grants.yaml"));
    }
}
