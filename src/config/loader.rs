//! Settings loading from YAML or TOML files.

use std::path::Path;

use tracing::{debug, info, instrument, trace};

use super::schema::Settings;
use crate::error::{LayoutError, Result};

/// Configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// YAML format (.yaml, .yml).
    Yaml,
    /// TOML format (.toml).
    Toml,
}

impl ConfigFormat {
    /// Detect format from file extension.
    ///
    /// Returns `None` if the extension is not recognized.
    #[must_use]
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        trace!(extension = %ext, "Detecting config format from extension");
        match ext.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }
}

fn detect_format(path: &Path) -> Result<ConfigFormat> {
    ConfigFormat::from_extension(path).ok_or_else(|| {
        LayoutError::ConfigParse(format!(
            "Unknown config format for '{}': expected .yaml, .yml, or .toml",
            path.display()
        ))
    })
}

/// Load settings from a file, detecting the format from its extension.
///
/// # Errors
///
/// Returns an error if:
/// - The file cannot be read
/// - The format cannot be detected from the extension
/// - The file content cannot be parsed
/// - Validation fails
#[instrument(skip_all, fields(path = %path.as_ref().display()))]
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    info!("Loading settings file");

    let format = detect_format(path)?;
    debug!(format = ?format, "Detected config format");

    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LayoutError::ConfigNotFound {
                path: path.display().to_string(),
            }
        } else {
            LayoutError::Io(e)
        }
    })?;
    debug!(bytes = content.len(), "Read settings file");

    load_settings_from_str(&content, format)
}

/// Load settings from a file if it exists, or fall back to defaults.
///
/// # Errors
///
/// Returns an error only when the file exists but cannot be parsed or
/// fails validation.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    match load_settings(path) {
        Err(LayoutError::ConfigNotFound { path }) => {
            debug!(path, "No settings file, using defaults");
            Ok(Settings::default())
        }
        other => other,
    }
}

/// Parse settings from a string with a specified format.
///
/// # Errors
///
/// Returns an error if parsing or validation fails.
#[instrument(skip(content), fields(format = ?format, content_len = content.len()))]
pub fn load_settings_from_str(content: &str, format: ConfigFormat) -> Result<Settings> {
    trace!("Parsing settings content");

    let settings: Settings = match format {
        ConfigFormat::Yaml => serde_yaml::from_str(content)
            .map_err(|e| LayoutError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| LayoutError::ConfigParse(format!("TOML: {e}")))?
        }
    };

    settings.validate()?;

    info!(
        stabilization_ms = settings.timing.stabilization_delay_ms,
        retry_ms = settings.timing.retry_delay_ms,
        max_attempts = settings.timing.max_attempts,
        slots = settings.capture.slot_count,
        "Settings loaded and validated"
    );

    Ok(settings)
}

/// Save settings to a file. The format follows the file extension.
///
/// # Errors
///
/// Returns an error if the format cannot be detected, serialization fails,
/// or the file cannot be written.
#[instrument(skip(settings), fields(path = %path.as_ref().display()))]
pub fn save_settings<P: AsRef<Path>>(settings: &Settings, path: P) -> Result<()> {
    let path = path.as_ref();
    info!("Saving settings file");

    let format = detect_format(path)?;

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(settings)
            .map_err(|e| LayoutError::ConfigParse(format!("YAML: {e}")))?,
        ConfigFormat::Toml => toml::to_string_pretty(settings)
            .map_err(|e| LayoutError::ConfigParse(format!("TOML: {e}")))?,
    };

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, content)?;

    info!(
        bytes = path.metadata().map(|m| m.len()).unwrap_or(0),
        "Settings saved"
    );
    Ok(())
}
