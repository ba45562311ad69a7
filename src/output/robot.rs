//! Robot mode JSON output implementation.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, instrument, trace, warn};

use crate::capture::CaptureOutcome;
use crate::config::Settings;
use crate::engine::Outcome;
use crate::error::LayoutError;
use crate::restore::RestoreReport;

use super::{Output, RobotFormat, SlotListing, VersionInfo};

/// JSON output implementation for agents and scripting.
pub struct RobotOutput {
    format: RobotFormat,
}

impl RobotOutput {
    #[instrument]
    pub fn new(format: RobotFormat) -> Self {
        debug!(?format, "Creating RobotOutput");
        Self { format }
    }

    fn encode<T: Serialize + ?Sized>(data: &T, pretty: bool) -> Option<String> {
        let encoded = if pretty {
            serde_json::to_string_pretty(data)
        } else {
            serde_json::to_string(data)
        };
        match encoded {
            Ok(json) => {
                trace!(json_len = json.len(), "JSON serialized");
                Some(json)
            }
            Err(e) => {
                warn!(error = %e, "Output serialization failed");
                None
            }
        }
    }

    /// Output any serializable data as JSON to stdout.
    fn output_json<T: Serialize + ?Sized>(&self, data: &T) {
        if let Some(json) = Self::encode(data, self.format == RobotFormat::Json) {
            println!("{json}");
        }
    }

    /// Output single-line JSON (for streaming events).
    fn output_json_line<T: Serialize>(data: &T) {
        if let Some(json) = Self::encode(data, false) {
            println!("{json}");
        }
    }

    fn output_json_pretty_stderr<T: Serialize>(data: &T) {
        if let Some(json) = Self::encode(data, true) {
            eprintln!("{json}");
        }
    }
}

impl Output for RobotOutput {
    fn success(&self, message: &str) {
        self.output_json(&serde_json::json!({
            "success": true,
            "message": message
        }));
    }

    #[instrument(skip(self))]
    fn error(&self, error: &LayoutError) {
        debug!(error = %error, "Robot: error");
        Self::output_json_pretty_stderr(&serde_json::json!({
            "error": true,
            "message": error.to_string(),
            "suggestion": error.suggestion(),
            "recoverable": error.is_user_recoverable(),
        }));
    }

    fn warning(&self, message: &str) {
        Self::output_json_pretty_stderr(&serde_json::json!({
            "warning": true,
            "message": message
        }));
    }

    fn info(&self, message: &str) {
        self.output_json(&serde_json::json!({ "info": message }));
    }

    fn slot_list(&self, listing: &SlotListing, include_empty: bool) {
        if include_empty {
            self.output_json(listing);
        } else {
            let slots: Vec<_> = listing
                .slots
                .iter()
                .filter(|s| s.window_count > 0)
                .collect();
            self.output_json(&serde_json::json!({
                "active_slot": listing.active_slot,
                "privacy_mode": listing.privacy_mode,
                "slots": slots,
            }));
        }
    }

    fn capture_result(&self, slot: usize, outcome: &CaptureOutcome) {
        self.output_json(&serde_json::json!({
            "slot": slot,
            "capture": outcome,
        }));
    }

    fn restore_report(&self, slot: usize, report: Option<&RestoreReport>) {
        match report {
            Some(report) => self.output_json(report),
            None => self.output_json(&serde_json::json!({
                "slot_index": slot,
                "skipped": true,
            })),
        }
    }

    fn cleared(&self, slot: Option<usize>) {
        let cleared = slot.map_or_else(|| serde_json::json!("all"), |s| serde_json::json!(s));
        self.output_json(&serde_json::json!({ "cleared": cleared, "ok": true }));
    }

    fn active_slot(&self, slot: usize, changed: bool) {
        self.output_json(&serde_json::json!({ "active_slot": slot, "changed": changed }));
    }

    fn privacy(&self, enabled: bool, purged: usize) {
        self.output_json(&serde_json::json!({
            "privacy_mode": enabled,
            "purged_keys": purged,
        }));
    }

    fn outcome(&self, outcome: &Outcome) {
        Self::output_json_line(outcome);
    }

    fn settings(&self, settings: &Settings, path: &Path, exists: bool) {
        self.output_json(&serde_json::json!({
            "path": path.display().to_string(),
            "exists": exists,
            "settings": settings,
        }));
    }

    fn path(&self, path: &Path) {
        self.output_json(&serde_json::json!({ "path": path.display().to_string() }));
    }

    fn version_info(&self, info: &VersionInfo) {
        self.output_json(info);
    }
}
