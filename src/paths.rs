//! Path resolution for entitle
//!
//! # Environment Variables
//!
//! - `ENTITLE_CONFIG_DIR` - Override config directory (config.toml, catalog.json)
//! - `ENTITLE_STATE_DIR` - Override state directory (state.json)
//!
//! # Path Resolution Priority
//!
//! 1. The environment variable
//! 2. `XDG_CONFIG_HOME/entitle` or `XDG_STATE_HOME/entitle`
//! 3. `~/.config/entitle` or `~/.local/state/entitle`

use anyhow::{Context, Result};
use std::path::PathBuf;

/// Environment variable for config directory override
pub const ENV_CONFIG_DIR: &str = "ENTITLE_CONFIG_DIR";

/// Environment variable for state directory override
pub const ENV_STATE_DIR: &str = "ENTITLE_STATE_DIR";

const APP_DIR: &str = "entitle";

/// Get the entitle config directory path
pub fn config_dir() -> Result<PathBuf> {
    resolve_dir(
        std::env::var(ENV_CONFIG_DIR).ok(),
        std::env::var("XDG_CONFIG_HOME").ok(),
        &[".config"],
    )
}

/// Get the entitle state directory path
pub fn state_dir() -> Result<PathBuf> {
    resolve_dir(
        std::env::var(ENV_STATE_DIR).ok(),
        std::env::var("XDG_STATE_HOME").ok(),
        &[".local", "state"],
    )
}

fn resolve_dir(
    explicit: Option<String>,
    xdg: Option<String>,
    home_default: &[&str],
) -> Result<PathBuf> {
    if let Some(dir) = explicit {
        let path = expand(&dir);
        log::debug!("Using directory from environment: {}", path.display());
        return Ok(path);
    }

    if let Some(xdg) = xdg {
        return Ok(PathBuf::from(xdg).join(APP_DIR));
    }

    let home = dirs::home_dir().context("Could not determine home directory")?;
    let path = home_default
        .iter()
        .fold(home, |path, part| path.join(part))
        .join(APP_DIR);
    Ok(path)
}

/// Default config file
pub fn config_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Default descriptor catalog
pub fn catalog_file() -> Result<PathBuf> {
    Ok(config_dir()?.join("catalog.json"))
}

/// Default state file
pub fn state_file() -> Result<PathBuf> {
    Ok(state_dir()?.join("state.json"))
}

/// Expand ~ and environment variables in a path string
pub fn expand(path: &str) -> PathBuf {
    let expanded = shellexpand::full(path).unwrap_or(std::borrow::Cow::Borrowed(path));
    PathBuf::from(expanded.as_ref())
}

// ============================================================================
// Tests
// ============================================================================
