//! Persisted snapshot types.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::geometry::{Rect, Size};
use crate::identity::WindowIdentity;
use crate::platform::DisplayId;

/// Slot reserved for automatic capture.
pub const AUTO_SLOT: usize = 0;

/// One saved window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowRecord {
    pub identity: WindowIdentity,
    pub size: Size,
    pub frame: Rect,
    /// Window number at capture time. Exact, but only valid while the
    /// owning process lives.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_window_number: Option<u32>,
}

/// Window records for one display, keyed by window key.
pub type DisplayBucket = BTreeMap<String, WindowRecord>;

/// Every display bucket of one slot.
pub type SlotWindows = BTreeMap<DisplayId, DisplayBucket>;

/// An independent bucket of saved window layouts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotSlot {
    pub id: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub windows: SlotWindows,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl SnapshotSlot {
    /// An empty slot with no timestamps.
    #[must_use]
    pub fn new(id: usize) -> Self {
        Self {
            id,
            name: None,
            windows: SlotWindows::new(),
            created_at: None,
            updated_at: None,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn is_auto(&self) -> bool {
        self.id == AUTO_SLOT
    }

    /// Total saved windows across every display.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.values().map(BTreeMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window_count() == 0
    }

    /// Replace the whole window map. Never merges.
    pub fn replace_windows(&mut self, windows: SlotWindows, now: DateTime<Utc>) {
        self.windows = windows;
        self.created_at.get_or_insert(now);
        self.updated_at = Some(now);
    }

    /// Reset to empty, keeping the name.
    pub fn clear(&mut self) {
        self.windows.clear();
        self.created_at = None;
        self.updated_at = None;
        self.metadata.clear();
    }

    #[must_use]
    pub fn info(&self) -> SlotInfo {
        SlotInfo {
            index: self.id,
            name: self.name.clone(),
            window_count: self.window_count(),
            display_count: self.windows.values().filter(|b| !b.is_empty()).count(),
            updated_at: self.updated_at,
        }
    }
}

/// Summary of a slot for listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotInfo {
    pub index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub window_count: usize,
    pub display_count: usize,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Previous generation: slot index string → display → key → record.
pub type LegacyLayouts = BTreeMap<String, SlotWindows>;
