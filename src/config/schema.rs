//! Settings types for the layout engine.
//!
//! Every field has a default, so an empty file (or no file at all) yields a
//! working configuration. Durations are stored as milliseconds.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::{LayoutError, Result};

/// Upper bound on retry passes per stabilization cycle.
pub const MAX_ATTEMPTS_LIMIT: u32 = 10;

/// Top-level settings.
///
/// # Example TOML
///
/// ```toml
/// notify_on_errors = true
///
/// [timing]
/// stabilization_delay_ms = 3000
/// retry_delay_ms = 3000
/// max_attempts = 2
///
/// [tolerance]
/// size = 10.0
/// position = 5.0
///
/// [capture]
/// slot_count = 5
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Timer durations for the coordination timeline.
    pub timing: TimingConfig,
    /// Coordinate slack used by the matcher and executor.
    pub tolerance: ToleranceConfig,
    /// Snapshot capture behavior.
    pub capture: CaptureConfig,
    /// Surface encoding failures as user-visible notices.
    pub notify_on_errors: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            timing: TimingConfig::default(),
            tolerance: ToleranceConfig::default(),
            capture: CaptureConfig::default(),
            notify_on_errors: true,
        }
    }
}

impl Settings {
    /// Validate value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::ConfigInvalid`] describing the first bad value.
    pub fn validate(&self) -> Result<()> {
        trace!("Validating settings");
        let t = &self.timing;

        if t.poll_interval_ms == 0 {
            return Err(LayoutError::ConfigInvalid(
                "timing.poll_interval_ms must be greater than 0".to_string(),
            ));
        }
        if t.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(LayoutError::ConfigInvalid(format!(
                "timing.max_attempts must be at most {MAX_ATTEMPTS_LIMIT}, got {}",
                t.max_attempts
            )));
        }
        if t.fallback_window_ms <= t.restore_delay_ms {
            return Err(LayoutError::ConfigInvalid(format!(
                "timing.fallback_window_ms ({}) must exceed timing.restore_delay_ms ({})",
                t.fallback_window_ms, t.restore_delay_ms
            )));
        }
        if t.retry_delay_ms == 0 {
            return Err(LayoutError::ConfigInvalid(
                "timing.retry_delay_ms must be greater than 0".to_string(),
            ));
        }
        if t.capture_interval_ms == 0 {
            return Err(LayoutError::ConfigInvalid(
                "timing.capture_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.capture.slot_count == 0 {
            return Err(LayoutError::ConfigInvalid(
                "capture.slot_count must be at least 1".to_string(),
            ));
        }
        for (name, value) in [
            ("tolerance.size", self.tolerance.size),
            ("tolerance.position", self.tolerance.position),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(LayoutError::ConfigInvalid(format!(
                    "{name} must be a non-negative number, got {value}"
                )));
            }
        }

        debug!("Settings validated");
        Ok(())
    }
}

/// Timer durations. See the stabilization detector for how they interact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Quiet period after the last topology signal before the layout is
    /// considered settled.
    pub stabilization_delay_ms: u64,
    /// How often a pending cycle checks whether it has settled.
    pub poll_interval_ms: u64,
    /// Extra wait between settling and the restoration pass.
    pub restore_delay_ms: u64,
    /// Watchdog armed on settling; forces a pass if none has run by then.
    pub fallback_window_ms: u64,
    /// Post-restoration window in which duplicate signals are absorbed.
    pub cooldown_ms: u64,
    /// Delay before retrying a pass that restored nothing.
    pub retry_delay_ms: u64,
    /// Retry passes allowed per cycle.
    pub max_attempts: u32,
    /// Period of automatic captures into slot 0.
    pub capture_interval_ms: u64,
    /// Delay before the first automatic capture after start.
    pub initial_capture_delay_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            stabilization_delay_ms: 3_000,
            poll_interval_ms: 500,
            restore_delay_ms: 1_000,
            fallback_window_ms: 10_000,
            cooldown_ms: 5_000,
            retry_delay_ms: 3_000,
            max_attempts: 2,
            capture_interval_ms: 30_000,
            initial_capture_delay_ms: 5_000,
        }
    }
}

impl TimingConfig {
    pub const fn stabilization_delay(&self) -> Duration {
        Duration::from_millis(self.stabilization_delay_ms)
    }

    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub const fn restore_delay(&self) -> Duration {
        Duration::from_millis(self.restore_delay_ms)
    }

    pub const fn fallback_window(&self) -> Duration {
        Duration::from_millis(self.fallback_window_ms)
    }

    pub const fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub const fn capture_interval(&self) -> Duration {
        Duration::from_millis(self.capture_interval_ms)
    }

    pub const fn initial_capture_delay(&self) -> Duration {
        Duration::from_millis(self.initial_capture_delay_ms)
    }
}

/// Coordinate slack, in points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToleranceConfig {
    /// Allowed width/height difference for a size-based match.
    pub size: f64,
    /// Allowed drift between enumeration and the pre-move re-check.
    pub position: f64,
}

impl Default for ToleranceConfig {
    fn default() -> Self {
        Self {
            size: 10.0,
            position: 5.0,
        }
    }
}

/// Snapshot capture behavior.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Number of user-directed slots (1..=slot_count). Slot 0 is automatic.
    pub slot_count: usize,
    /// Run periodic captures into slot 0.
    pub auto_capture: bool,
    /// Hash window titles into identities when the enumerator exposes them.
    pub capture_titles: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            slot_count: 5,
            auto_capture: true,
            capture_titles: true,
        }
    }
}
