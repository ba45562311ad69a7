//! Format detection and migration of older snapshot generations.
//!
//! There is no version field. The generation is inferred from which key is
//! present and the shape of its payload:
//!
//! | Key | Shape | Generation |
//! |---|---|---|
//! | `snapshot.slots` | array of slots | current |
//! | `snapshot.slots` | object of slot index → buckets | previous, written under the new key |
//! | `snapshot.layouts` | object of slot index → buckets | previous |
//! | `snapshot.windows` | flat map with unsalted `appHash` | first, discarded |

use serde_json::Value;
use tracing::{debug, warn};

use super::schema::{LegacyLayouts, SnapshotSlot};
use crate::error::{LayoutError, Result};

/// Current-format key.
pub const SLOTS_KEY: &str = "snapshot.slots";
/// Previous generation: salted, but no slot metadata.
pub const LAYOUTS_KEY: &str = "snapshot.layouts";
/// First generation: unsalted digests.
pub const WINDOWS_KEY: &str = "snapshot.windows";

/// What to do with an older generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compatibility {
    /// Invariants can be rebuilt; convert and rewrite.
    Migrate,
    /// Invariants cannot be rebuilt; drop the data.
    Discard,
}

/// Older generations, newest first.
pub const LEGACY_CHAIN: &[(&str, Compatibility)] = &[
    (LAYOUTS_KEY, Compatibility::Migrate),
    (WINDOWS_KEY, Compatibility::Discard),
];

/// Decoded payload and whether it came from an older shape.
#[derive(Debug)]
pub struct Decoded {
    pub slots: Vec<SnapshotSlot>,
    pub migrated: bool,
}

/// Decode whatever sits under [`SLOTS_KEY`].
///
/// # Errors
///
/// Returns [`LayoutError::EncodingFailure`] if the payload is not JSON or
/// matches neither known shape.
pub fn decode_slots(bytes: &[u8]) -> Result<Decoded> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| LayoutError::EncodingFailure(format!("{SLOTS_KEY}: {e}")))?;

    match value {
        Value::Array(_) => {
            let slots: Vec<SnapshotSlot> = serde_json::from_value(value)
                .map_err(|e| LayoutError::EncodingFailure(format!("{SLOTS_KEY}: {e}")))?;
            Ok(Decoded {
                slots,
                migrated: false,
            })
        }
        Value::Object(_) => {
            debug!("Slot payload has the previous object shape");
            let slots = decode_layouts(value)?;
            Ok(Decoded {
                slots,
                migrated: true,
            })
        }
        other => Err(LayoutError::EncodingFailure(format!(
            "{SLOTS_KEY}: unexpected {} payload",
            json_kind(&other)
        ))),
    }
}

/// Decode a previous-generation layout map into slots.
///
/// # Errors
///
/// Returns [`LayoutError::EncodingFailure`] if the payload does not have
/// the previous-generation shape.
pub fn decode_layouts_bytes(bytes: &[u8]) -> Result<Vec<SnapshotSlot>> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| LayoutError::EncodingFailure(format!("{LAYOUTS_KEY}: {e}")))?;
    decode_layouts(value)
}

fn decode_layouts(value: Value) -> Result<Vec<SnapshotSlot>> {
    let layouts: LegacyLayouts = serde_json::from_value(value)
        .map_err(|e| LayoutError::EncodingFailure(format!("legacy layouts: {e}")))?;

    let mut slots = Vec::with_capacity(layouts.len());
    for (index, windows) in layouts {
        let Ok(id) = index.parse::<usize>() else {
            warn!(index, "Skipping legacy layout with non-numeric slot index");
            continue;
        };
        let mut slot = SnapshotSlot::new(id);
        slot.windows = windows;
        slot.metadata
            .insert("migratedFrom".to_string(), LAYOUTS_KEY.to_string());
        slots.push(slot);
    }
    slots.sort_by_key(|s| s.id);
    Ok(slots)
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
