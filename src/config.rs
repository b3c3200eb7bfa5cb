//! CLI configuration file
//!
//! `config.toml` holds the orchestration settings plus the locations of
//! the descriptor catalog and the state file:
//!
//! ```toml
//! catalog = "~/platform/catalog.json"
//! state = "~/.local/state/entitle/state.json"
//!
//! [execution]
//! mode = "ordered"
//! jobs = 4
//! ```

use crate::paths;
use anyhow::{Context, Result};
use entitlement::EntitlementConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct Config {
    /// Descriptor catalog (JSON file or directory of JSON files)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub catalog: Option<String>,
    /// Tenant state and execution reports
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(flatten)]
    pub entitlement: EntitlementConfig,
}

impl Config {
    /// Load from an explicit path or the default location
    ///
    /// A missing default file gives the defaults; a missing explicit file
    /// is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(&paths::expand(&path.to_string_lossy())),
            None => {
                let path = paths::config_file()?;
                if !path.exists() {
                    log::debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                Self::load_from(&path)
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read config {}", path.display()))?;
        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Catalog location: flag, then config, then default
    pub fn catalog_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        match (flag, &self.catalog) {
            (Some(path), _) => Ok(paths::expand(&path.to_string_lossy())),
            (None, Some(configured)) => Ok(paths::expand(configured)),
            (None, None) => paths::catalog_file(),
        }
    }

    /// State location: flag, then config, then default
    pub fn state_path(&self, flag: Option<&Path>) -> Result<PathBuf> {
        match (flag, &self.state) {
            (Some(path), _) => Ok(paths::expand(&path.to_string_lossy())),
            (None, Some(configured)) => Ok(paths::expand(configured)),
            (None, None) => paths::state_file(),
        }
    }
}
