//! Error types for window layout operations.

use thiserror::Error;

/// Primary error type for snapshot, match, and restore operations.
///
/// Failures are scoped to the smallest affected unit: a single window, a
/// single slot, or a single stabilization cycle. Nothing in here is fatal
/// to the engine.
#[derive(Error, Debug)]
pub enum LayoutError {
    // Collaborator errors
    #[error("{collaborator} unavailable: {reason}")]
    CollaboratorUnavailable {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Window {window_number} of process {pid} not found")]
    WindowNotFound { pid: i32, window_number: u32 },

    #[error("Window {window_number} moved {drift:.1}px since enumeration")]
    ToleranceExceeded { window_number: u32, drift: f64 },

    // Store errors
    #[error("Snapshot encoding failed: {0}")]
    EncodingFailure(String),

    #[error("Invalid slot {index}: slots are 0-{max}")]
    InvalidSlot { index: usize, max: usize },

    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Invalid configuration: {0}")]
    ConfigInvalid(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl LayoutError {
    /// Shorthand for a failed enumerator call.
    pub fn enumerator(reason: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: "window enumerator",
            reason: reason.into(),
        }
    }

    /// Shorthand for a failed window-controller call.
    pub fn controller(reason: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: "window controller",
            reason: reason.into(),
        }
    }

    /// Shorthand for a failed display query.
    pub fn displays(reason: impl Into<String>) -> Self {
        Self::CollaboratorUnavailable {
            collaborator: "display provider",
            reason: reason.into(),
        }
    }

    /// Returns true if the error is recoverable by the user.
    pub const fn is_user_recoverable(&self) -> bool {
        matches!(
            self,
            Self::InvalidSlot { .. }
                | Self::ConfigNotFound { .. }
                | Self::ConfigInvalid(_)
        )
    }

    /// Returns true if the failure came from a collaborator and the current
    /// cycle should simply be skipped.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CollaboratorUnavailable { .. }
                | Self::WindowNotFound { .. }
                | Self::ToleranceExceeded { .. }
        )
    }

    /// Returns a suggestion for how to fix the error.
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Self::InvalidSlot { .. } => Some("Run: winlayout slots"),
            Self::ConfigNotFound { .. } => Some("Omit --config to use built-in defaults"),
            Self::CollaboratorUnavailable { .. } => {
                Some("Check that the desktop description is readable")
            }
            _ => None,
        }
    }
}

/// Convenience type alias for Results using LayoutError.
pub type Result<T> = std::result::Result<T, LayoutError>;

/// Extension trait for adding context to errors.
pub trait ResultExt<T> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| LayoutError::Other(format!("{}: {e}", f().into())))
    }
}
