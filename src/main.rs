//! winlayout - keeps window layouts across display changes.
//!
//! Provides both human-friendly and agent-friendly (robot mode) interfaces.
#![forbid(unsafe_code)]

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;
use tracing::{debug, warn};

use winlayout::cli::{self, Cli, Commands};
use winlayout::config::{self, Settings};
use winlayout::engine::{Engine, EngineEvent};
use winlayout::error::{LayoutError, Result, ResultExt};
use winlayout::logging::init_logging;
use winlayout::output::{Output, OutputMode, SlotListing, VersionInfo};
use winlayout::pause::PauseSwitch;
use winlayout::platform::file::FileDesktop;
use winlayout::store::{SnapshotStore, SqliteKvStore};

/// Build information embedded at compile time.
mod build_info {
    pub const VERSION: &str = env!("CARGO_PKG_VERSION");

    pub fn git_sha() -> &'static str {
        option_env!("VERGEN_GIT_SHA").unwrap_or("unknown")
    }

    pub fn git_dirty() -> &'static str {
        option_env!("VERGEN_GIT_DIRTY").unwrap_or("false")
    }

    pub fn build_timestamp() -> &'static str {
        option_env!("VERGEN_BUILD_TIMESTAMP").unwrap_or("unknown")
    }

    pub fn rustc_semver() -> &'static str {
        option_env!("VERGEN_RUSTC_SEMVER").unwrap_or("unknown")
    }

    pub fn target() -> &'static str {
        option_env!("VERGEN_CARGO_TARGET_TRIPLE").unwrap_or("unknown")
    }
}

fn main() {
    let cli = Cli::parse();

    // Handle no-color flag or non-TTY
    if cli.no_color || !io::stdout().is_terminal() {
        console::set_colors_enabled(false);
    }
    if cli.no_color || !io::stderr().is_terminal() {
        console::set_colors_enabled_stderr(false);
    }

    init_logging(cli.use_json(), cli.verbose, cli.quiet);
    let output = OutputMode::from_cli(&cli).into_output();

    if let Err(e) = run(&cli, output.as_ref()) {
        output.error(&e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli, out: &dyn Output) -> Result<()> {
    match &cli.command {
        None => {
            print_quick_start(cli);
            Ok(())
        }
        Some(Commands::Slots(args)) => cmd_slots(cli, args, out),
        Some(Commands::Save(args)) => cmd_save(cli, args, out),
        Some(Commands::Restore(args)) => cmd_restore(cli, args, out),
        Some(Commands::Clear(args)) => cmd_clear(cli, args, out),
        Some(Commands::ActiveSlot(args)) => cmd_active_slot(cli, args, out),
        Some(Commands::Privacy(args)) => cmd_privacy(cli, args, out),
        Some(Commands::Watch(args)) => cmd_watch(cli, args, out),
        Some(Commands::Config(args)) => cmd_config(cli, args, out),
        Some(Commands::Version) => {
            cmd_version(out);
            Ok(())
        }
        Some(Commands::Completions(args)) => {
            cmd_completions(args);
            Ok(())
        }
    }
}

// === Quick Start (Robot Mode Optimized) ===

fn print_quick_start(cli: &Cli) {
    if cli.use_json() {
        print_robot_quick_start();
    } else {
        print_human_quick_start();
    }
}

#[derive(Serialize)]
struct RobotQuickStart {
    tool: &'static str,
    version: &'static str,
    description: &'static str,
    slots: RobotSlots,
    engine: RobotEngine,
    output_modes: OutputModes,
    desktop: &'static str,
}

#[derive(Serialize)]
struct RobotSlots {
    list: &'static str,
    save: &'static str,
    restore: &'static str,
    clear: &'static str,
    active_slot: &'static str,
    privacy: &'static str,
}

#[derive(Serialize)]
struct RobotEngine {
    watch: &'static str,
    input: &'static str,
}

#[derive(Serialize)]
struct OutputModes {
    human: &'static str,
    robot: &'static str,
    compact: &'static str,
}

fn print_robot_quick_start() {
    let help = RobotQuickStart {
        tool: "winlayout",
        version: build_info::VERSION,
        description: "Saves window layouts and restores them after display changes",
        slots: RobotSlots {
            list: "winlayout slots --robot",
            save: "winlayout save <SLOT>",
            restore: "winlayout restore [SLOT]",
            clear: "winlayout clear [SLOT]",
            active_slot: "winlayout active-slot [SLOT]",
            privacy: "winlayout privacy <on|off>",
        },
        engine: RobotEngine {
            watch: "winlayout watch --robot",
            input: "topology | wake | sleep | capture N | restore N | pause [SECS] | resume | quit",
        },
        output_modes: OutputModes {
            human: "--format=text (default)",
            robot: "--robot or --format=json",
            compact: "--format=json-compact",
        },
        desktop: "Pass --desktop FILE (JSON with displays and windows) to commands that read windows",
    };

    match serde_json::to_string_pretty(&help) {
        Ok(json) => println!("{json}"),
        Err(e) => warn!(error = %e, "Quick start serialization failed"),
    }
}

fn print_human_quick_start() {
    println!(
        "{} {} - window layout keeper\n",
        console::style("winlayout").bold().cyan(),
        build_info::VERSION
    );

    println!("{}", console::style("QUICK START").bold().underlined());
    println!();
    println!("  {}  List slots", console::style("winlayout slots").green());
    println!("  {}  Save current layout", console::style("winlayout -d desk.json save 1").green());
    println!("  {}  Restore a slot", console::style("winlayout -d desk.json restore 1").green());
    println!("  {}  Restore slot 1 on display changes", console::style("winlayout active-slot 1").green());
    println!("  {}  Run the engine", console::style("winlayout -d desk.json watch").green());
    println!();

    println!("{}", console::style("ROBOT MODE (for agents)").bold().underlined());
    println!();
    println!("  {}  JSON output", console::style("winlayout --robot <command>").cyan());
    println!("  {}  Quick-start JSON", console::style("winlayout --robot").cyan());
    println!();

    println!("Run {} for full help", console::style("winlayout --help").yellow());
}

// === Shared Setup ===

fn config_path(cli: &Cli) -> Result<PathBuf> {
    match &cli.config {
        Some(path) => config::resolve_path(path),
        None => config::default_config_path(),
    }
}

/// Settings plus where they came from. An explicit `--config` must exist.
fn load_settings(cli: &Cli) -> Result<(Settings, PathBuf, bool)> {
    let path = config_path(cli)?;
    if cli.config.is_some() {
        return Ok((config::load_settings(&path)?, path, true));
    }
    let exists = path.exists();
    Ok((config::load_settings_or_default(&path)?, path, exists))
}

fn open_store(cli: &Cli, settings: &Settings) -> Result<SnapshotStore> {
    let kv = match &cli.store {
        Some(path) => SqliteKvStore::open(config::resolve_path(path)?)?,
        None => SqliteKvStore::open_default()?,
    };
    SnapshotStore::new(Box::new(kv), settings.capture.slot_count)
}

fn open_desktop(cli: &Cli) -> Result<Arc<FileDesktop>> {
    let path = cli
        .desktop
        .as_deref()
        .ok_or_else(|| LayoutError::displays("no desktop description given, pass --desktop FILE"))?;
    Ok(Arc::new(FileDesktop::new(config::resolve_path(path)?)))
}

fn open_engine(cli: &Cli, settings: Settings) -> Result<Engine> {
    let desktop = open_desktop(cli)?;
    let store = open_store(cli, &settings)?;
    Engine::new(settings, desktop, store, PauseSwitch::new())
}

// === Command Implementations ===

fn cmd_slots(cli: &Cli, args: &cli::SlotsArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut store = open_store(cli, &settings)?;
    let listing = SlotListing {
        active_slot: store.active_slot()?,
        privacy_mode: store.privacy_mode(),
        slots: store.list_slot_info()?,
    };
    out.slot_list(&listing, args.all);
    Ok(())
}

fn cmd_save(cli: &Cli, args: &cli::SaveArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut engine = open_engine(cli, settings)?;
    let outcome = engine.capture_slot(args.slot, Instant::now())?;
    out.capture_result(args.slot, &outcome);
    Ok(())
}

fn cmd_restore(cli: &Cli, args: &cli::RestoreArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut engine = open_engine(cli, settings)?;
    let slot = match args.slot {
        Some(slot) => slot,
        None => engine.store().active_slot()?,
    };
    let report = engine.restore_slot(slot, Instant::now())?;
    out.restore_report(slot, report.as_ref());
    Ok(())
}

fn cmd_clear(cli: &Cli, args: &cli::ClearArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut store = open_store(cli, &settings)?;
    match args.slot {
        Some(slot) => store.clear_slot(slot)?,
        None => store.clear()?,
    }
    out.cleared(args.slot);
    Ok(())
}

fn cmd_active_slot(cli: &Cli, args: &cli::ActiveSlotArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut store = open_store(cli, &settings)?;
    match args.slot {
        Some(slot) => {
            store.set_active_slot(slot)?;
            out.active_slot(slot, true);
        }
        None => out.active_slot(store.active_slot()?, false),
    }
    Ok(())
}

fn cmd_privacy(cli: &Cli, args: &cli::PrivacyArgs, out: &dyn Output) -> Result<()> {
    let (settings, ..) = load_settings(cli)?;
    let mut store = open_store(cli, &settings)?;
    let enabled = args.state.enabled();
    let purged = store.set_privacy_mode(enabled)?;
    out.privacy(enabled, purged);
    Ok(())
}

fn cmd_watch(cli: &Cli, args: &cli::WatchArgs, out: &dyn Output) -> Result<()> {
    let (mut settings, ..) = load_settings(cli)?;
    if args.no_auto_capture {
        settings.capture.auto_capture = false;
    }
    let engine = open_engine(cli, settings)?;

    if !cli.quiet && !cli.use_json() {
        out.info("Reading events from stdin (Ctrl+D to stop)...");
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(watch(engine, OutputMode::from_cli(cli).into_output()))
}

async fn watch(engine: Engine, output: Box<dyn Output>) -> Result<()> {
    let mut outcomes = engine.subscribe();
    let (handle, task) = engine.spawn();

    let printer = tokio::spawn(async move {
        loop {
            match outcomes.recv().await {
                Ok(outcome) => output.outcome(&outcome),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Output fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match cli::parse_watch_line(&line) {
            Ok(Some(event)) => {
                let stop = event == EngineEvent::Shutdown;
                handle.send(event).await?;
                if stop {
                    break;
                }
            }
            Ok(None) => {}
            Err(e) => warn!(error = %e, "Ignoring input line"),
        }
    }

    if handle.shutdown().await.is_err() {
        debug!("Engine already stopped");
    }
    drop(handle);

    task.await.with_context(|| "Engine task failed")?;
    printer.await.with_context(|| "Output task failed")?;
    Ok(())
}

fn cmd_config(cli: &Cli, args: &cli::ConfigArgs, out: &dyn Output) -> Result<()> {
    if args.path {
        out.path(&config_path(cli)?);
        return Ok(());
    }

    if args.init {
        let path = config_path(cli)?;
        if path.exists() && !args.force {
            return Err(LayoutError::Other(format!(
                "{} already exists (use --force to overwrite)",
                path.display()
            )));
        }
        config::save_settings(&Settings::default(), &path)?;
        out.success(&format!("Wrote default settings to {}", path.display()));
        return Ok(());
    }

    let (settings, path, exists) = load_settings(cli)?;
    out.settings(&settings, &path, exists);
    Ok(())
}

fn cmd_version(out: &dyn Output) {
    out.version_info(&VersionInfo {
        version: build_info::VERSION,
        git_sha: build_info::git_sha(),
        git_dirty: build_info::git_dirty() == "true",
        build_timestamp: build_info::build_timestamp(),
        rustc_version: build_info::rustc_semver(),
        target: build_info::target(),
    });
}

fn cmd_completions(args: &cli::CompletionsArgs) {
    use clap::CommandFactory;
    clap_complete::generate(args.shell, &mut Cli::command(), "winlayout", &mut io::stdout());
}
