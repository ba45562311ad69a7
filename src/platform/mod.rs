//! Collaborator boundary for the windowing system.
//!
//! The engine never talks to a native API directly. It consumes three
//! capability-shaped traits, which lets tests drive it with
//! [`mock::MockDesktop`] and the CLI drive it with [`file::FileDesktop`].

pub mod file;
pub mod mock;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::geometry::{Point, Rect};

/// Window layer consumed by the engine. Anything else is an overlay
/// (menu bar, dock, notification) and is ignored.
pub const NORMAL_LAYER: i32 = 0;

/// Stable identifier for a physical display.
pub type DisplayId = u32;

/// A connected display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: DisplayId,
    /// Bounds in global coordinates.
    pub frame: Rect,
    /// Whether this is the primary (built-in) display.
    #[serde(default)]
    pub is_main: bool,
}

/// One on-screen window as reported by the enumerator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub owner_name: String,
    pub owner_pid: i32,
    /// Session-scoped window number; only meaningful for the owning
    /// process's lifetime.
    #[serde(default)]
    pub window_number: Option<u32>,
    pub frame: Rect,
    #[serde(default)]
    pub layer: i32,
    /// Window title, when accessible.
    #[serde(default)]
    pub title: Option<String>,
}

impl WindowInfo {
    pub const fn is_normal_layer(&self) -> bool {
        self.layer == NORMAL_LAYER
    }
}

/// Reports connected displays. The live screen count is the length of the
/// returned list.
pub trait DisplayProvider: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::error::LayoutError::CollaboratorUnavailable`] when the
    /// query fails.
    fn displays(&self) -> Result<Vec<DisplayInfo>>;
}

/// Synchronous, side-effect-free query for on-screen windows.
pub trait WindowEnumerator: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::error::LayoutError::CollaboratorUnavailable`] when the
    /// query fails. Callers skip the current operation and do not retry.
    fn enumerate(&self) -> Result<Vec<WindowInfo>>;
}

/// Read and set a window's frame, addressed by `(pid, window_number)`.
pub trait WindowController: Send + Sync {
    /// # Errors
    ///
    /// Returns [`crate::error::LayoutError::WindowNotFound`] if the window is gone,
    /// or [`crate::error::LayoutError::CollaboratorUnavailable`] if the query fails.
    fn frame(&self, pid: i32, window_number: u32) -> Result<Rect>;

    /// # Errors
    ///
    /// Same as [`WindowController::frame`].
    fn set_frame(&self, pid: i32, window_number: u32, frame: Rect) -> Result<()>;
}

/// Everything the engine needs from the windowing system.
pub trait Desktop: DisplayProvider + WindowEnumerator + WindowController {}

impl<T: DisplayProvider + WindowEnumerator + WindowController> Desktop for T {}

/// Find the display that owns a frame: the one containing its origin, else
/// the one with the largest overlap, else the main display.
pub fn display_for_frame(displays: &[DisplayInfo], frame: &Rect) -> Option<DisplayId> {
    let origin: Point = frame.origin();
    if let Some(d) = displays.iter().find(|d| d.frame.contains(origin)) {
        return Some(d.id);
    }

    let best = displays
        .iter()
        .map(|d| (d.id, d.frame.overlap_area(frame)))
        .filter(|(_, area)| *area > 0.0)
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((id, _)) = best {
        return Some(id);
    }

    displays
        .iter()
        .find(|d| d.is_main)
        .or_else(|| displays.first())
        .map(|d| d.id)
}
