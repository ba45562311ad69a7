//! Snapshot capture: live enumeration → privacy-preserving records.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, instrument, trace, warn};

use crate::error::Result;
use crate::identity::IdentityHasher;
use crate::platform::{DisplayId, DisplayInfo, WindowEnumerator, WindowInfo, display_for_frame};
use crate::store::{DisplayBucket, SlotWindows, SnapshotSlot, WindowRecord};

/// Minimum connected displays for an automatic capture.
pub const AUTO_CAPTURE_MIN_DISPLAYS: usize = 2;

/// Length of the digest prefix used in fallback window keys.
const KEY_HASH_PREFIX: usize = 12;

/// Why a capture did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Automatic capture with fewer than two displays connected.
    SingleDisplay,
    /// The pause gate is active.
    Paused,
    /// A stabilization cycle is in flight.
    CycleInFlight,
    /// The enumerator or display query failed.
    CollaboratorUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::SingleDisplay => "only one display connected",
            Self::Paused => "paused",
            Self::CycleInFlight => "display change in progress",
            Self::CollaboratorUnavailable => "window query failed",
        };
        f.write_str(text)
    }
}

/// Result of a capture into a slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaptureOutcome {
    Captured {
        windows: usize,
        displays: usize,
        /// External-display buckets kept from the previous capture because
        /// the fresh one came back empty.
        restored_from_backup: usize,
    },
    Skipped {
        reason: SkipReason,
    },
}

/// Builds window records from a live enumeration.
#[derive(Debug, Clone)]
pub struct SnapshotCapture {
    hasher: IdentityHasher,
    capture_titles: bool,
}

impl SnapshotCapture {
    #[must_use]
    pub const fn new(hasher: IdentityHasher, capture_titles: bool) -> Self {
        Self {
            hasher,
            capture_titles,
        }
    }

    #[must_use]
    pub const fn hasher(&self) -> &IdentityHasher {
        &self.hasher
    }

    /// Enumerate and bucket every normal-layer window by display.
    ///
    /// Every connected display gets a bucket, possibly empty.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorUnavailable` if enumeration fails.
    pub fn capture_current_windows<E: WindowEnumerator + ?Sized>(
        &self,
        displays: &[DisplayInfo],
        enumerator: &E,
    ) -> Result<SlotWindows> {
        let windows = enumerator.enumerate()?;
        Ok(self.build(displays, &windows))
    }

    /// Bucket an already-enumerated window list.
    #[must_use]
    pub fn build(&self, displays: &[DisplayInfo], windows: &[WindowInfo]) -> SlotWindows {
        let mut result: SlotWindows = displays.iter().map(|d| (d.id, DisplayBucket::new())).collect();
        let mut ordinals: HashMap<(DisplayId, String), usize> = HashMap::new();

        for window in windows.iter().filter(|w| w.is_normal_layer()) {
            let Some(display) = display_for_frame(displays, &window.frame) else {
                trace!(number = ?window.window_number, "Window on no display, skipped");
                continue;
            };

            let title = if self.capture_titles {
                window.title.as_deref()
            } else {
                None
            };
            let identity = self.hasher.identity(&window.owner_name, title);

            let key = if let Some(number) = window.window_number {
                format!("wn:{number}")
            } else {
                let prefix: String = identity.app_name_hash.chars().take(KEY_HASH_PREFIX).collect();
                let ordinal = ordinals.entry((display, prefix.clone())).or_insert(0);
                *ordinal += 1;
                format!("{prefix}:{ordinal}")
            };

            result.entry(display).or_default().insert(
                key,
                WindowRecord {
                    identity,
                    size: window.frame.size(),
                    frame: window.frame,
                    source_window_number: window.window_number,
                },
            );
        }

        result
    }

    /// Capture into a slot, replacing its window map.
    ///
    /// Automatic captures need at least two displays. If a fresh bucket for
    /// an external display is empty while the previous capture had windows
    /// there, the previous bucket is kept.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorUnavailable` if enumeration fails; the slot is
    /// left unchanged.
    #[instrument(skip_all, fields(slot = slot.id, displays = displays.len()))]
    pub fn capture_into<E: WindowEnumerator + ?Sized>(
        &self,
        slot: &mut SnapshotSlot,
        displays: &[DisplayInfo],
        enumerator: &E,
        now: DateTime<Utc>,
    ) -> Result<CaptureOutcome> {
        if slot.is_auto() && displays.len() < AUTO_CAPTURE_MIN_DISPLAYS {
            info!("Skipping automatic capture with a single display");
            return Ok(CaptureOutcome::Skipped {
                reason: SkipReason::SingleDisplay,
            });
        }

        let fresh = self.capture_current_windows(displays, enumerator)?;
        let restored_from_backup = Self::apply(slot, fresh, displays, now);

        let outcome = CaptureOutcome::Captured {
            windows: slot.window_count(),
            displays: slot.windows.len(),
            restored_from_backup,
        };
        debug!(?outcome, "Capture applied");
        Ok(outcome)
    }

    /// Replace the slot's windows with `fresh`, applying the backup rule.
    /// Returns the number of buckets taken from the backup.
    fn apply(
        slot: &mut SnapshotSlot,
        mut fresh: SlotWindows,
        displays: &[DisplayInfo],
        now: DateTime<Utc>,
    ) -> usize {
        let backup = std::mem::take(&mut slot.windows);
        let mut restored = 0;

        for external in displays.iter().filter(|d| !d.is_main) {
            let fresh_empty = fresh.get(&external.id).is_none_or(DisplayBucket::is_empty);
            if !fresh_empty {
                continue;
            }
            if let Some(previous) = backup.get(&external.id).filter(|b| !b.is_empty()) {
                warn!(
                    display = external.id,
                    windows = previous.len(),
                    "External display captured empty, keeping previous windows"
                );
                fresh.insert(external.id, previous.clone());
                restored += 1;
            }
        }

        slot.replace_windows(fresh, now);
        restored
    }
}
