//! Fixture builders shared by integration and CLI tests.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::TempDir;

use winlayout::config::Settings;
use winlayout::engine::Engine;
use winlayout::geometry::Rect;
use winlayout::pause::PauseSwitch;
use winlayout::platform::file::DesktopDocument;
use winlayout::platform::mock::MockDesktop;
use winlayout::platform::{DisplayId, DisplayInfo, NORMAL_LAYER, WindowInfo};
use winlayout::store::{SnapshotStore, SqliteKvStore};

pub const MAIN: DisplayId = 1;
pub const EXTERNAL: DisplayId = 2;

pub const APP1: u32 = 1;
pub const APP2: u32 = 2;
pub const APP3: u32 = 3;

/// App1's saved frame on the external display.
pub fn app1_home() -> Rect {
    Rect::new(100.0, 100.0, 800.0, 600.0)
}

pub fn app2_home() -> Rect {
    Rect::new(2600.0, 50.0, 600.0, 400.0)
}

pub fn app3_home() -> Rect {
    Rect::new(2700.0, 100.0, 500.0, 500.0)
}

/// Two displays, App1 on the external one, App2 and App3 on main.
pub fn scenario_desktop() -> Arc<MockDesktop> {
    let desktop = MockDesktop::dual_display();
    desktop.add_window("App1", 101, APP1, app1_home());
    desktop.add_window("App2", 102, APP2, app2_home());
    desktop.add_window("App3", 103, APP3, app3_home());
    Arc::new(desktop)
}

/// Default settings without periodic captures, so only the timers a test
/// arms itself are pending.
pub fn manual_settings() -> Settings {
    let mut settings = Settings::default();
    settings.capture.auto_capture = false;
    settings
}

pub fn engine_with(desktop: &Arc<MockDesktop>, store: SnapshotStore, settings: Settings) -> Engine {
    Engine::new(settings, desktop.clone(), store, PauseSwitch::new()).expect("engine")
}

pub fn memory_engine(desktop: &Arc<MockDesktop>) -> Engine {
    engine_with(desktop, SnapshotStore::in_memory(5), manual_settings())
}

/// A temporary directory holding a SQLite state file, a desktop document,
/// and a settings file.
pub struct Workspace {
    pub dir: TempDir,
}

impl Workspace {
    #[must_use]
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let ws = Self { dir };
        std::fs::write(ws.config_path(), "[capture]\nslot_count = 5\n").expect("write config");
        ws
    }

    pub fn state_path(&self) -> PathBuf {
        self.dir.path().join("state.db")
    }

    pub fn desktop_path(&self) -> PathBuf {
        self.dir.path().join("desktop.json")
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    pub fn open_store(&self, slot_count: usize) -> SnapshotStore {
        let kv = SqliteKvStore::open(self.state_path()).expect("open sqlite store");
        SnapshotStore::new(Box::new(kv), slot_count).expect("open snapshot store")
    }

    pub fn write_desktop(&self, doc: &DesktopDocument) {
        write_json(&self.desktop_path(), doc);
    }

    pub fn read_desktop(&self) -> DesktopDocument {
        let content = std::fs::read_to_string(self.desktop_path()).expect("read desktop");
        serde_json::from_str(&content).expect("parse desktop")
    }

    /// Global flags pointing the CLI at this workspace.
    pub fn args(&self) -> Vec<String> {
        vec![
            "--desktop".to_string(),
            self.desktop_path().display().to_string(),
            "--store".to_string(),
            self.state_path().display().to_string(),
            "--config".to_string(),
            self.config_path().display().to_string(),
        ]
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new()
    }
}

fn write_json(path: &Path, doc: &DesktopDocument) {
    let content = serde_json::to_string_pretty(doc).expect("encode desktop");
    std::fs::write(path, content).expect("write desktop");
}

fn window(owner: &str, pid: i32, number: u32, frame: Rect) -> WindowInfo {
    WindowInfo {
        owner_name: owner.to_string(),
        owner_pid: pid,
        window_number: Some(number),
        frame,
        layer: NORMAL_LAYER,
        title: None,
    }
}

/// The dual-display scenario as a desktop document.
pub fn scenario_document() -> DesktopDocument {
    DesktopDocument {
        displays: vec![
            DisplayInfo {
                id: MAIN,
                frame: Rect::new(2560.0, 0.0, 1440.0, 900.0),
                is_main: true,
            },
            DisplayInfo {
                id: EXTERNAL,
                frame: Rect::new(0.0, 0.0, 2560.0, 1440.0),
                is_main: false,
            },
        ],
        windows: vec![
            window("App1", 101, APP1, app1_home()),
            window("App2", 102, APP2, app2_home()),
            window("App3", 103, APP3, app3_home()),
        ],
    }
}
