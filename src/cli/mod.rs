//! CLI argument definitions and command dispatch.

use std::path::PathBuf;
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::engine::EngineEvent;
use crate::error::{LayoutError, Result};

/// Window layout keeper - saves window positions and puts them back after
/// displays are reconnected.
///
/// Robot Mode: Use --robot or --format=json for machine-parseable output.
#[derive(Parser, Debug)]
#[command(name = "winlayout", version, about, long_about = None)]
#[command(propagate_version = true)]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Output format (text for humans, json for agents/scripts)
    #[arg(
        long,
        short = 'f',
        default_value = "text",
        global = true,
        env = "WINLAYOUT_FORMAT"
    )]
    pub format: OutputFormat,

    /// Robot mode: equivalent to --format=json
    #[arg(long, global = true)]
    pub robot: bool,

    /// Verbose output (-v debug, -vv matcher diagnostics)
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress non-essential output)
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Desktop description (JSON with displays and windows)
    #[arg(long, short = 'd', global = true, env = "WINLAYOUT_DESKTOP")]
    pub desktop: Option<PathBuf>,

    /// Snapshot database [default: platform data dir]
    #[arg(long, global = true, env = "WINLAYOUT_STORE")]
    pub store: Option<PathBuf>,

    /// Settings file, TOML or YAML [default: platform config dir]
    #[arg(long, short = 'c', global = true, env = "WINLAYOUT_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text with optional color
    #[default]
    Text,
    /// JSON output for scripts and agents
    Json,
    /// Compact JSON (single line)
    JsonCompact,
}

impl Cli {
    /// Returns true if output should be JSON (robot mode or explicit --format=json).
    pub const fn use_json(&self) -> bool {
        self.robot || matches!(self.format, OutputFormat::Json | OutputFormat::JsonCompact)
    }

    /// Returns true if output should be compact JSON.
    pub const fn use_compact_json(&self) -> bool {
        matches!(self.format, OutputFormat::JsonCompact)
    }
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    // === Slots ===
    /// List snapshot slots
    #[command(visible_alias = "ls")]
    Slots(SlotsArgs),

    /// Capture the current window layout into a slot
    Save(SaveArgs),

    /// Move windows back to a slot's saved layout
    Restore(RestoreArgs),

    /// Clear one slot, or every slot
    Clear(ClearArgs),

    /// Show or set the slot restored after display changes
    ActiveSlot(ActiveSlotArgs),

    /// Turn privacy mode on or off (on purges saved layouts)
    Privacy(PrivacyArgs),

    // === Engine ===
    /// Run the engine, reading events from stdin
    Watch(WatchArgs),

    // === Configuration ===
    /// Show current settings
    Config(ConfigArgs),

    // === Utilities ===
    /// Show version and build information
    Version,

    /// Generate shell completions
    Completions(CompletionsArgs),
}

// === Argument Structs ===

#[derive(Parser, Debug)]
pub struct SlotsArgs {
    /// Include empty slots
    #[arg(long, short = 'a')]
    pub all: bool,
}

#[derive(Parser, Debug)]
pub struct SaveArgs {
    /// Slot index (0 is the automatic slot)
    pub slot: usize,
}

#[derive(Parser, Debug)]
pub struct RestoreArgs {
    /// Slot index [default: active slot]
    pub slot: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ClearArgs {
    /// Slot index; omit to clear every slot
    pub slot: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct ActiveSlotArgs {
    /// New active slot; omit to show the current one
    pub slot: Option<usize>,
}

#[derive(Parser, Debug)]
pub struct PrivacyArgs {
    pub state: Toggle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub const fn enabled(self) -> bool {
        matches!(self, Self::On)
    }
}

#[derive(Parser, Debug)]
pub struct WatchArgs {
    /// Disable periodic captures into slot 0
    #[arg(long)]
    pub no_auto_capture: bool,
}

#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Show configuration file path only
    #[arg(long)]
    pub path: bool,

    /// Write the default settings to the configuration path
    #[arg(long)]
    pub init: bool,

    /// Overwrite an existing file with --init
    #[arg(long, requires = "init")]
    pub force: bool,
}

#[derive(Parser, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: clap_complete::Shell,
}

// === Watch Input ===

/// Parse one line of `watch` input into an engine event.
///
/// Blank lines and `#` comments yield `Ok(None)`.
///
/// ```text
/// topology | wake | sleep | capture N | restore N | pause [SECS] | resume | privacy on|off | quit
/// ```
///
/// # Errors
///
/// Returns [`LayoutError::Other`] for an unknown command or a bad argument.
pub fn parse_watch_line(line: &str) -> Result<Option<EngineEvent>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Ok(None);
    }

    let mut words = line.split_whitespace();
    let command = words.next().unwrap_or_default().to_ascii_lowercase();
    let arg = words.next();
    if words.next().is_some() {
        return Err(LayoutError::Other(format!("Too many arguments: '{line}'")));
    }

    let slot = |arg: Option<&str>| -> Result<usize> {
        let raw = arg.ok_or_else(|| LayoutError::Other(format!("'{command}' needs a slot")))?;
        raw.parse()
            .map_err(|_| LayoutError::Other(format!("Invalid slot '{raw}'")))
    };

    let event = match command.as_str() {
        "topology" | "changed" => EngineEvent::TopologyChanged,
        "wake" => EngineEvent::SystemDidWake,
        "sleep" => EngineEvent::SystemWillSleep,
        "capture" | "save" => EngineEvent::CaptureNow { slot: slot(arg)? },
        "restore" => EngineEvent::RestoreNow { slot: slot(arg)? },
        "pause" => {
            let until = arg
                .map(|raw| {
                    raw.parse::<u64>()
                        .map(Duration::from_secs)
                        .map_err(|_| LayoutError::Other(format!("Invalid seconds '{raw}'")))
                })
                .transpose()?;
            EngineEvent::SetPaused { until }
        }
        "resume" => EngineEvent::Resume,
        "privacy" => {
            let enabled = match arg {
                Some("on") => true,
                Some("off") => false,
                _ => {
                    return Err(LayoutError::Other(
                        "'privacy' needs 'on' or 'off'".to_string(),
                    ));
                }
            };
            EngineEvent::SetPrivacy { enabled }
        }
        "quit" | "exit" => EngineEvent::Shutdown,
        other => return Err(LayoutError::Other(format!("Unknown command '{other}'"))),
    };
    Ok(Some(event))
}
