//! Default locations and path expansion.
//!
//! Supports absolute paths, relative paths, and "~" home directory expansion.

use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use crate::error::{LayoutError, Result};

const APP_DIR: &str = "winlayout";

/// Expand a leading `~` to the home directory; other paths pass through.
pub fn resolve_path(path: &Path) -> Result<PathBuf> {
    trace!(path = %path.display(), "Resolving path");

    let path_str = path.to_string_lossy();
    if path_str == "~" || path_str.starts_with("~/") {
        let home = home_dir()?;
        let rest = path_str.strip_prefix("~/").unwrap_or("");
        let resolved = if rest.is_empty() {
            home
        } else {
            home.join(rest)
        };
        debug!(
            original = %path.display(),
            resolved = %resolved.display(),
            "Expanded home directory path"
        );
        return Ok(resolved);
    }

    Ok(path.to_path_buf())
}

/// Resolve the user's home directory (cross-platform).
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        LayoutError::ConfigInvalid("Could not determine home directory".to_string())
    })
}

/// Returns the default settings file path.
///
/// Location: `~/.config/winlayout/config.toml`
pub fn default_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir().ok_or_else(|| {
        LayoutError::ConfigInvalid("Could not determine config directory".to_string())
    })?;
    Ok(config_dir.join(APP_DIR).join("config.toml"))
}

/// Returns the default state database path.
///
/// Location: `~/.local/share/winlayout/state.db`
pub fn default_state_path() -> Result<PathBuf> {
    let data_dir = dirs::data_local_dir().ok_or_else(|| {
        LayoutError::Storage("Could not determine local data directory".to_string())
    })?;
    Ok(data_dir.join(APP_DIR).join("state.db"))
}
