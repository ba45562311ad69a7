//! Human-friendly output implementation using console styles.

use std::path::Path;

use tracing::{debug, instrument};

use crate::capture::CaptureOutcome;
use crate::config::Settings;
use crate::engine::Outcome;
use crate::error::LayoutError;
use crate::restore::RestoreReport;
use crate::store::{AUTO_SLOT, SlotInfo};
use crate::theme::LayoutTheme;

use super::{Output, SlotListing, VersionInfo};

/// Styled terminal output implementation for human users.
pub struct HumanOutput {
    theme: LayoutTheme,
}

impl HumanOutput {
    #[instrument(skip(theme))]
    pub fn new(theme: LayoutTheme) -> Self {
        debug!("Creating HumanOutput");
        Self { theme }
    }

    fn label(&self, name: &str) -> String {
        self.theme.label.apply_to(format!("  {name:<10}")).to_string()
    }

    fn slot_row(&self, info: &SlotInfo, active: usize) {
        let marker = if info.index == active {
            self.theme.active_marker.apply_to("*").to_string()
        } else {
            " ".to_string()
        };
        let updated = info.updated_at.map_or_else(
            || "never".to_string(),
            |t| t.format("%Y-%m-%d %H:%M:%S").to_string(),
        );
        let name = match (&info.name, info.index) {
            (Some(name), _) => name.clone(),
            (None, AUTO_SLOT) => "auto".to_string(),
            (None, _) => String::new(),
        };
        println!(
            "{marker} {:>4}  {:>7}  {:>8}  {:<19}  {}",
            self.theme.slot_index.apply_to(info.index),
            info.window_count,
            info.display_count,
            self.theme.muted.apply_to(updated),
            name
        );
    }

    fn describe(outcome: &Outcome) -> String {
        match outcome {
            Outcome::CycleStarted { cycle_id, slot } => {
                format!("Display change detected (cycle {cycle_id}, slot {slot})")
            }
            Outcome::SignalAbsorbed => "Display change ignored during cooldown".to_string(),
            Outcome::Stabilized { .. } => "Displays settled".to_string(),
            Outcome::RestorationFinished { report, attempt } => format!(
                "Restored {} of {} windows in slot {} (attempt {attempt}, {} already in place)",
                report.restored_count, report.saved, report.slot_index, report.unchanged
            ),
            Outcome::RestorationSkipped { slot, reason } => {
                format!("Restoration of slot {slot} skipped: {reason}")
            }
            Outcome::RetryScheduled { attempt, delay_ms } => {
                format!("Nothing restored, retry {attempt} in {delay_ms} ms")
            }
            Outcome::RetriesExhausted { .. } => "Gave up restoring windows".to_string(),
            Outcome::CaptureFinished {
                slot,
                windows,
                displays,
            } => format!("Saved {windows} windows on {displays} displays to slot {slot}"),
            Outcome::CaptureSkipped { slot, reason } => {
                format!("Capture into slot {slot} skipped: {reason}")
            }
            Outcome::PrivacyChanged { enabled: true, purged } => {
                format!("Privacy mode on ({purged} stored entries removed)")
            }
            Outcome::PrivacyChanged { enabled: false, .. } => "Privacy mode off".to_string(),
            Outcome::Notice { message } => message.clone(),
        }
    }
}

impl Output for HumanOutput {
    fn success(&self, message: &str) {
        println!("{} {message}", self.theme.success.apply_to("[OK]"));
    }

    #[instrument(skip(self))]
    fn error(&self, error: &LayoutError) {
        debug!(
            error = %error,
            recoverable = error.is_user_recoverable(),
            "Outputting error"
        );
        eprintln!("{}: {error}", self.theme.error.apply_to("Error"));
        if let Some(suggestion) = error.suggestion() {
            eprintln!("{}: {suggestion}", self.theme.warning.apply_to("Hint"));
        }
    }

    fn warning(&self, message: &str) {
        eprintln!("{} {message}", self.theme.warning.apply_to("[WARN]"));
    }

    fn info(&self, message: &str) {
        println!("{} {message}", self.theme.accent.apply_to("[INFO]"));
    }

    fn slot_list(&self, listing: &SlotListing, include_empty: bool) {
        println!("{}", self.theme.header.apply_to("SLOTS"));
        if listing.privacy_mode {
            println!(
                "{}",
                self.theme
                    .warning
                    .apply_to("Privacy mode is on: layouts are not saved")
            );
        }
        println!(
            "  {:>4}  {:>7}  {:>8}  {:<19}  {}",
            "slot", "windows", "displays", "updated", "name"
        );

        let mut shown = 0;
        for info in &listing.slots {
            if include_empty || info.window_count > 0 || info.index == listing.active_slot {
                self.slot_row(info, listing.active_slot);
                shown += 1;
            }
        }
        if shown == 0 {
            println!("{}", self.theme.muted.apply_to("  (no saved layouts)"));
        }
    }

    fn capture_result(&self, slot: usize, outcome: &CaptureOutcome) {
        match outcome {
            CaptureOutcome::Captured {
                windows,
                displays,
                restored_from_backup,
            } => {
                self.success(&format!(
                    "Saved {windows} windows on {displays} displays to slot {slot}"
                ));
                if *restored_from_backup > 0 {
                    self.info(&format!(
                        "Kept previous windows for {restored_from_backup} display(s) that came back empty"
                    ));
                }
            }
            CaptureOutcome::Skipped { reason } => {
                self.warning(&format!("Capture into slot {slot} skipped: {reason}"));
            }
        }
    }

    fn restore_report(&self, slot: usize, report: Option<&RestoreReport>) {
        let Some(report) = report else {
            self.warning(&format!("Restoration of slot {slot} skipped: paused"));
            return;
        };
        if report.saved == 0 {
            self.info(&format!("Slot {slot} has no windows for connected displays"));
            return;
        }
        self.success(&format!(
            "Restored {} of {} windows from slot {slot}",
            report.restored_count, report.saved
        ));
        println!("{}{}", self.label("In place"), report.unchanged);
        println!("{}{}", self.label("Unmatched"), report.unmatched.len());
        for (rule, count) in &report.rules {
            println!("{}{count}", self.label(&format!("by {rule}")));
        }
        for skipped in &report.skipped {
            self.warning(&format!("{}: {}", skipped.key, skipped.reason));
        }
    }

    fn cleared(&self, slot: Option<usize>) {
        match slot {
            Some(slot) => self.success(&format!("Slot {slot} cleared")),
            None => self.success("All slots cleared"),
        }
    }

    fn active_slot(&self, slot: usize, changed: bool) {
        if changed {
            self.success(&format!("Active slot set to {slot}"));
        } else {
            println!("{}{}", self.label("Active"), self.theme.value.apply_to(slot));
        }
    }

    fn privacy(&self, enabled: bool, purged: usize) {
        if enabled {
            self.success(&format!(
                "Privacy mode on ({purged} stored entries removed)"
            ));
        } else {
            self.success("Privacy mode off");
        }
    }

    fn outcome(&self, outcome: &Outcome) {
        let text = Self::describe(outcome);
        match outcome {
            Outcome::RestorationSkipped { .. }
            | Outcome::RetriesExhausted { .. }
            | Outcome::CaptureSkipped { .. }
            | Outcome::Notice { .. } => self.warning(&text),
            Outcome::RestorationFinished { .. } | Outcome::CaptureFinished { .. } => {
                self.success(&text);
            }
            _ => self.info(&text),
        }
    }

    fn settings(&self, settings: &Settings, path: &Path, exists: bool) {
        let source = if exists { "" } else { " (not found, using defaults)" };
        println!(
            "{} {}{}",
            self.theme.header.apply_to("SETTINGS"),
            self.theme.muted.apply_to(path.display()),
            self.theme.muted.apply_to(source)
        );
        match toml::to_string_pretty(settings) {
            Ok(text) => print!("{text}"),
            Err(e) => self.warning(&format!("Cannot render settings: {e}")),
        }
    }

    fn path(&self, path: &Path) {
        println!("{}", path.display());
    }

    fn version_info(&self, info: &VersionInfo) {
        println!(
            "{} {}",
            self.theme.accent.apply_to("winlayout"),
            self.theme.value.apply_to(info.version)
        );
        let dirty = if info.git_dirty { " (dirty)" } else { "" };
        println!("{}{}{}", self.label("Git SHA"), info.git_sha, self.theme.warning.apply_to(dirty));
        println!("{}{}", self.label("Built"), self.theme.muted.apply_to(info.build_timestamp));
        println!("{}{}", self.label("Rust"), self.theme.muted.apply_to(info.rustc_version));
        println!("{}{}", self.label("Target"), self.theme.muted.apply_to(info.target));
    }
}
