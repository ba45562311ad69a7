//! Output mode abstraction for robot and human output.

use std::path::Path;

use serde::Serialize;

use crate::capture::CaptureOutcome;
use crate::cli::Cli;
use crate::config::Settings;
use crate::engine::Outcome;
use crate::error::LayoutError;
use crate::restore::RestoreReport;
use crate::store::SlotInfo;
use crate::theme::LayoutTheme;

pub mod human;
pub mod robot;

pub use human::HumanOutput;
pub use robot::RobotOutput;

/// Everything `slots` reports.
#[derive(Debug, Clone, Serialize)]
pub struct SlotListing {
    pub active_slot: usize,
    pub privacy_mode: bool,
    pub slots: Vec<SlotInfo>,
}

/// Build metadata shown by `version`.
#[derive(Debug, Clone, Serialize)]
pub struct VersionInfo {
    pub version: &'static str,
    pub git_sha: &'static str,
    pub git_dirty: bool,
    pub build_timestamp: &'static str,
    pub rustc_version: &'static str,
    pub target: &'static str,
}

/// Robot mode JSON formatting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotFormat {
    /// Pretty-printed JSON (default for --robot).
    Json,
    /// Single-line JSON (--format=json-compact).
    JsonCompact,
}

/// Determines how command output is rendered.
#[derive(Debug)]
pub enum OutputMode {
    /// JSON output for agents and scripting.
    Robot(RobotFormat),
    /// Styled terminal output for human users.
    Human(LayoutTheme),
}

impl OutputMode {
    /// Create OutputMode from CLI arguments.
    #[must_use]
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.use_json() {
            let format = if cli.use_compact_json() {
                RobotFormat::JsonCompact
            } else {
                RobotFormat::Json
            };
            Self::Robot(format)
        } else if cli.no_color {
            Self::Human(LayoutTheme::plain())
        } else {
            Self::Human(LayoutTheme::default())
        }
    }

    /// Convert into the appropriate Output implementation.
    #[must_use]
    pub fn into_output(self) -> Box<dyn Output> {
        match self {
            Self::Robot(format) => Box::new(RobotOutput::new(format)),
            Self::Human(theme) => Box::new(HumanOutput::new(theme)),
        }
    }
}

/// Trait for all output operations.
///
/// Commands call these methods without knowing the output mode.
pub trait Output: Send + Sync {
    // Basic messages
    fn success(&self, message: &str);
    fn error(&self, error: &LayoutError);
    fn warning(&self, message: &str);
    fn info(&self, message: &str);

    // Slot operations
    fn slot_list(&self, listing: &SlotListing, include_empty: bool);
    fn capture_result(&self, slot: usize, outcome: &CaptureOutcome);
    /// `None` means the pass did not run.
    fn restore_report(&self, slot: usize, report: Option<&RestoreReport>);
    fn cleared(&self, slot: Option<usize>);
    fn active_slot(&self, slot: usize, changed: bool);
    fn privacy(&self, enabled: bool, purged: usize);

    // Engine events (one line each)
    fn outcome(&self, outcome: &Outcome);

    // Settings and metadata
    fn settings(&self, settings: &Settings, path: &Path, exists: bool);
    fn path(&self, path: &Path);
    fn version_info(&self, info: &VersionInfo);
}
