//! Versioned, slot-based snapshot persistence.
//!
//! [`SnapshotStore`] encodes slots onto a [`KeyValueStore`], migrates older
//! generations on load, and enforces privacy mode.

mod kv;
mod migrate;
mod schema;

pub use kv::{KeyValueStore, MemoryKvStore, SqliteKvStore};
pub use migrate::{Compatibility, LAYOUTS_KEY, LEGACY_CHAIN, SLOTS_KEY, WINDOWS_KEY};
pub use schema::{
    AUTO_SLOT, DisplayBucket, SlotInfo, SlotWindows, SnapshotSlot, WindowRecord,
};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};

use crate::error::{LayoutError, Result};

/// Installation salt, hex encoded. Survives privacy purges.
pub const SALT_KEY: &str = "snapshot.salt";
/// Slot restored on topology change.
pub const ACTIVE_SLOT_KEY: &str = "snapshot.activeSlot";
/// Persisted privacy flag.
pub const PRIVACY_KEY: &str = "settings.privacyMode";

const SNAPSHOT_PREFIX: &str = "snapshot.";

/// Slot persistence over a key-value backend.
pub struct SnapshotStore {
    kv: Box<dyn KeyValueStore>,
    slot_count: usize,
    privacy: bool,
}

impl std::fmt::Debug for SnapshotStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotStore")
            .field("slot_count", &self.slot_count)
            .field("privacy", &self.privacy)
            .finish_non_exhaustive()
    }
}

impl SnapshotStore {
    /// Wrap a backend. `slot_count` is the number of user slots; slot 0 is
    /// always present in addition.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted privacy flag cannot be read.
    pub fn new(kv: Box<dyn KeyValueStore>, slot_count: usize) -> Result<Self> {
        let privacy = read_privacy(kv.as_ref())?;
        debug!(slot_count, privacy, "Snapshot store opened");
        Ok(Self {
            kv,
            slot_count,
            privacy,
        })
    }

    /// Store backed by a fresh [`MemoryKvStore`].
    #[must_use]
    pub fn in_memory(slot_count: usize) -> Self {
        Self {
            kv: Box::new(MemoryKvStore::new()),
            slot_count,
            privacy: false,
        }
    }

    #[must_use]
    pub const fn slot_count(&self) -> usize {
        self.slot_count
    }

    /// Direct access to the backend, for the salt and for tests.
    pub fn kv_mut(&mut self) -> &mut dyn KeyValueStore {
        self.kv.as_mut()
    }

    /// Check a slot index.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`] when out of range.
    pub fn check_slot(&self, index: usize) -> Result<()> {
        if index > self.slot_count {
            return Err(LayoutError::InvalidSlot {
                index,
                max: self.slot_count,
            });
        }
        Ok(())
    }

    // === Slots ===

    /// Persist every slot. A no-op while privacy mode is on.
    ///
    /// The payload is fully encoded before anything is written, so an
    /// encoding failure leaves the stored bytes untouched.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::EncodingFailure`] or a storage error.
    #[instrument(skip(self, slots), fields(slots = slots.len()))]
    pub fn save_slots(&mut self, slots: &[SnapshotSlot]) -> Result<()> {
        if self.refresh_privacy()? {
            debug!("Privacy mode on, not persisting slots");
            return Ok(());
        }

        let bytes = serde_json::to_vec(slots)
            .map_err(|e| LayoutError::EncodingFailure(format!("{SLOTS_KEY}: {e}")))?;
        self.kv.set(SLOTS_KEY, &bytes)?;
        debug!(bytes = bytes.len(), "Slots saved");
        Ok(())
    }

    /// Persist one slot. Every other slot is taken from what is stored now,
    /// not from the caller, so slots purged or rewritten elsewhere stay that
    /// way. Returns the full set as written, or `None` in privacy mode.
    ///
    /// Unreadable stored slots are replaced.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`], an encoding error, or a storage
    /// error.
    #[instrument(skip(self, slot), fields(slot = slot.id))]
    pub fn save_slot(&mut self, slot: &SnapshotSlot) -> Result<Option<Vec<SnapshotSlot>>> {
        self.check_slot(slot.id)?;
        if self.refresh_privacy()? {
            debug!("Privacy mode on, not persisting slot");
            return Ok(None);
        }

        let mut slots = match self.load_or_default() {
            Ok(slots) => slots,
            Err(LayoutError::EncodingFailure(msg)) => {
                warn!(error = %msg, "Stored slots unreadable, replacing them");
                let mut slots = Vec::new();
                self.ensure_slots(&mut slots);
                slots
            }
            Err(e) => return Err(e),
        };
        if let Some(stored) = slots.iter_mut().find(|s| s.id == slot.id) {
            *stored = slot.clone();
        }
        self.save_slots(&slots)?;
        Ok(Some(slots))
    }

    /// Load slots, migrating older generations when the current key is
    /// absent. Returns `None` when nothing usable is stored.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::EncodingFailure`] if the current payload cannot
    /// be decoded. The stored bytes are left as they were.
    #[instrument(skip(self))]
    pub fn load_slots(&mut self) -> Result<Option<Vec<SnapshotSlot>>> {
        if let Some(bytes) = self.kv.get(SLOTS_KEY)? {
            let decoded = migrate::decode_slots(&bytes)?;
            if decoded.migrated {
                info!(slots = decoded.slots.len(), "Rewriting slots in current format");
                self.save_slots(&decoded.slots)?;
            }
            return Ok(Some(decoded.slots));
        }

        for (key, compat) in LEGACY_CHAIN {
            let Some(bytes) = self.kv.get(key)? else {
                continue;
            };
            match compat {
                Compatibility::Migrate => match migrate::decode_layouts_bytes(&bytes) {
                    Ok(slots) => {
                        info!(from = key, slots = slots.len(), "Migrating legacy snapshot data");
                        self.save_slots(&slots)?;
                        self.drop_legacy()?;
                        return Ok(Some(slots));
                    }
                    Err(e) => {
                        warn!(key, error = %e, "Legacy snapshot data unreadable, trying older");
                    }
                },
                Compatibility::Discard => {
                    warn!(key, "Discarding snapshot data that cannot be re-salted");
                    self.kv.remove(key)?;
                }
            }
        }

        debug!("No stored slots");
        Ok(None)
    }

    /// Load slots and pad them to cover every valid index.
    ///
    /// # Errors
    ///
    /// Same as [`SnapshotStore::load_slots`].
    pub fn load_or_default(&mut self) -> Result<Vec<SnapshotSlot>> {
        let mut slots = self.load_slots()?.unwrap_or_default();
        self.ensure_slots(&mut slots);
        Ok(slots)
    }

    /// Insert empty slots for any missing index up to `slot_count`, and sort.
    pub fn ensure_slots(&self, slots: &mut Vec<SnapshotSlot>) {
        for id in 0..=self.slot_count {
            if !slots.iter().any(|s| s.id == id) {
                slots.push(SnapshotSlot::new(id));
            }
        }
        slots.sort_by_key(|s| s.id);
    }

    /// Remove every stored slot, current and legacy.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip(self))]
    pub fn clear(&mut self) -> Result<()> {
        self.kv.remove(SLOTS_KEY)?;
        self.drop_legacy()?;
        info!("All slots cleared");
        Ok(())
    }

    /// Reset one slot to empty.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`], an encoding error, or a storage
    /// error.
    #[instrument(skip(self))]
    pub fn clear_slot(&mut self, index: usize) -> Result<()> {
        self.check_slot(index)?;
        let mut slots = self.load_or_default()?;
        if let Some(slot) = slots.iter_mut().find(|s| s.id == index) {
            slot.clear();
        }
        self.save_slots(&slots)?;
        info!(slot = index, "Slot cleared");
        Ok(())
    }

    /// `(window count, last update)` for one slot.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`] or a load error.
    pub fn slot_info(&mut self, index: usize) -> Result<(usize, Option<DateTime<Utc>>)> {
        self.check_slot(index)?;
        let slots = self.load_slots()?.unwrap_or_default();
        Ok(slots
            .iter()
            .find(|s| s.id == index)
            .map_or((0, None), |s| (s.window_count(), s.updated_at)))
    }

    /// Summaries of every valid slot.
    ///
    /// # Errors
    ///
    /// Returns a load error.
    pub fn list_slot_info(&mut self) -> Result<Vec<SlotInfo>> {
        Ok(self
            .load_or_default()?
            .iter()
            .map(SnapshotSlot::info)
            .collect())
    }

    // === Active Slot ===

    /// Slot restored on topology change (default 0).
    ///
    /// # Errors
    ///
    /// Returns a storage error. An unparseable value reads as 0.
    pub fn active_slot(&self) -> Result<usize> {
        let Some(raw) = self.kv.get(ACTIVE_SLOT_KEY)? else {
            return Ok(AUTO_SLOT);
        };
        let parsed = std::str::from_utf8(&raw)
            .ok()
            .and_then(|s| s.trim().parse::<usize>().ok())
            .filter(|&i| i <= self.slot_count);
        if parsed.is_none() {
            warn!("Stored active slot is invalid, using slot 0");
        }
        Ok(parsed.unwrap_or(AUTO_SLOT))
    }

    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`] or a storage error.
    pub fn set_active_slot(&mut self, index: usize) -> Result<()> {
        self.check_slot(index)?;
        self.kv.set(ACTIVE_SLOT_KEY, index.to_string().as_bytes())?;
        info!(slot = index, "Active slot set");
        Ok(())
    }

    // === Privacy ===

    /// Privacy flag as of the last read or write through this store.
    #[must_use]
    pub const fn privacy_mode(&self) -> bool {
        self.privacy
    }

    /// Re-read the privacy flag from the backend. Another process sharing the
    /// database may have changed it.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn refresh_privacy(&mut self) -> Result<bool> {
        let enabled = read_privacy(self.kv.as_ref())?;
        if enabled != self.privacy {
            info!(enabled, "Privacy mode changed by another writer");
            self.privacy = enabled;
        }
        Ok(enabled)
    }

    /// Toggle privacy mode. Enabling it purges every stored snapshot key
    /// except the salt, immediately. Returns the number of keys purged.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    #[instrument(skip(self))]
    pub fn set_privacy_mode(&mut self, enabled: bool) -> Result<usize> {
        let flag: &[u8] = if enabled { b"true" } else { b"false" };
        self.kv.set(PRIVACY_KEY, flag)?;
        self.privacy = enabled;

        if !enabled {
            info!("Privacy mode disabled");
            return Ok(0);
        }

        let mut purged = 0;
        for key in self.kv.keys_with_prefix(SNAPSHOT_PREFIX)? {
            if key == SALT_KEY {
                continue;
            }
            if self.kv.remove(&key)? {
                purged += 1;
            }
        }
        info!(purged, "Privacy mode enabled, snapshot data purged");
        Ok(purged)
    }

    fn drop_legacy(&mut self) -> Result<()> {
        for (key, _) in LEGACY_CHAIN {
            if self.kv.remove(key)? {
                debug!(key, "Removed legacy key");
            }
        }
        Ok(())
    }
}

fn read_privacy(kv: &dyn KeyValueStore) -> Result<bool> {
    Ok(kv.get(PRIVACY_KEY)?.is_some_and(|v| v.as_slice() == b"true"))
}
