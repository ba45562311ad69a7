//! Mock desktop for testing without a windowing system.
//!
//! Holds displays and windows in memory, records every controller call,
//! and supports error injection and scripted window movement.
//!
//! # Example
//!
//! ```rust
//! use winlayout::geometry::Rect;
//! use winlayout::platform::mock::{MockDesktop, Operation};
//! use winlayout::platform::WindowController;
//!
//! let desktop = MockDesktop::single_display();
//! desktop.add_window("Editor", 100, 7, Rect::new(10.0, 10.0, 800.0, 600.0));
//!
//! desktop.set_frame(100, 7, Rect::new(50.0, 50.0, 800.0, 600.0)).unwrap();
//!
//! desktop.assert_contains(&Operation::SetFrame {
//!     pid: 100,
//!     window_number: 7,
//!     frame: Rect::new(50.0, 50.0, 800.0, 600.0),
//! });
//! ```

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use super::{DisplayId, DisplayInfo, DisplayProvider, WindowController, WindowEnumerator, WindowInfo};
use crate::error::{LayoutError, Result};
use crate::geometry::{Point, Rect};

/// Recorded controller call for assertions.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    ReadFrame {
        pid: i32,
        window_number: u32,
    },
    SetFrame {
        pid: i32,
        window_number: u32,
        frame: Rect,
    },
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-memory desktop implementing every collaborator trait.
#[derive(Default)]
pub struct MockDesktop {
    displays: Mutex<Vec<DisplayInfo>>,
    /// Displays removed by [`MockDesktop::disconnect`], kept for reconnect.
    parked: Mutex<HashMap<DisplayId, DisplayInfo>>,
    windows: Mutex<Vec<WindowInfo>>,
    operation_log: Mutex<Vec<Operation>>,
    /// Offset applied to controller reads, simulating movement after
    /// enumeration.
    drift: Mutex<HashMap<u32, Point>>,
    failing_windows: Mutex<HashSet<u32>>,
    fail_enumeration: AtomicBool,
    fail_controller: AtomicBool,
    enumerate_calls: AtomicUsize,
}

impl MockDesktop {
    /// Create an empty desktop with no displays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A single 1440x900 main display at the origin.
    #[must_use]
    pub fn single_display() -> Self {
        let desktop = Self::new();
        desktop.add_display(1, Rect::new(0.0, 0.0, 1440.0, 900.0), true);
        desktop
    }

    /// An external 2560x1440 display (id 2) at the origin and a 1440x900
    /// main display (id 1) to its right.
    #[must_use]
    pub fn dual_display() -> Self {
        let desktop = Self::new();
        desktop.add_display(1, Rect::new(2560.0, 0.0, 1440.0, 900.0), true);
        desktop.add_display(2, Rect::new(0.0, 0.0, 2560.0, 1440.0), false);
        desktop
    }

    // === Scene Setup ===

    pub fn add_display(&self, id: DisplayId, frame: Rect, is_main: bool) {
        debug!(id, is_main, "Adding mock display");
        lock(&self.displays).push(DisplayInfo { id, frame, is_main });
    }

    /// Add a normal-layer window with no title.
    pub fn add_window(&self, owner: &str, pid: i32, window_number: u32, frame: Rect) {
        self.push_window(WindowInfo {
            owner_name: owner.to_string(),
            owner_pid: pid,
            window_number: Some(window_number),
            frame,
            layer: super::NORMAL_LAYER,
            title: None,
        });
    }

    pub fn push_window(&self, window: WindowInfo) {
        trace!(owner = %window.owner_name, number = ?window.window_number, "Adding mock window");
        lock(&self.windows).push(window);
    }

    /// Remove a window, as if its owner closed it.
    pub fn close_window(&self, window_number: u32) {
        lock(&self.windows).retain(|w| w.window_number != Some(window_number));
    }

    /// Remove every window.
    pub fn clear_windows(&self) {
        lock(&self.windows).clear();
    }

    /// Move a window without recording a controller operation, as if the
    /// user or the OS moved it.
    pub fn move_window(&self, window_number: u32, frame: Rect) {
        if let Some(w) = lock(&self.windows)
            .iter_mut()
            .find(|w| w.window_number == Some(window_number))
        {
            w.frame = frame;
        }
    }

    /// Disconnect a display. Windows on it are moved to the main display's
    /// origin, which is what the OS does.
    pub fn disconnect(&self, id: DisplayId) {
        let mut displays = lock(&self.displays);
        let Some(idx) = displays.iter().position(|d| d.id == id) else {
            return;
        };
        let removed = displays.remove(idx);
        let fallback = displays
            .iter()
            .find(|d| d.is_main)
            .or_else(|| displays.first())
            .map(|d| d.frame.origin());
        drop(displays);

        if let Some(origin) = fallback {
            for w in lock(&self.windows).iter_mut() {
                if removed.frame.contains(w.frame.origin()) {
                    w.frame.x = origin.x;
                    w.frame.y = origin.y;
                }
            }
        }
        debug!(id, "Disconnected mock display");
        lock(&self.parked).insert(id, removed);
    }

    /// Reconnect a display previously removed with [`MockDesktop::disconnect`].
    pub fn reconnect(&self, id: DisplayId) {
        if let Some(display) = lock(&self.parked).remove(&id) {
            debug!(id, "Reconnected mock display");
            lock(&self.displays).push(display);
        }
    }

    // === Error Injection ===

    pub fn fail_enumeration(&self, fail: bool) {
        self.fail_enumeration.store(fail, Ordering::SeqCst);
    }

    pub fn fail_controller(&self, fail: bool) {
        self.fail_controller.store(fail, Ordering::SeqCst);
    }

    /// Make controller calls for one window fail.
    pub fn fail_window(&self, window_number: u32) {
        lock(&self.failing_windows).insert(window_number);
    }

    /// Offset what the controller reports for a window, so it looks like it
    /// moved after enumeration.
    pub fn drift_window(&self, window_number: u32, offset: Point) {
        lock(&self.drift).insert(window_number, offset);
    }

    // === Inspection ===

    /// Current frame of a window, bypassing the operation log.
    #[must_use]
    pub fn window_frame(&self, window_number: u32) -> Option<Rect> {
        lock(&self.windows)
            .iter()
            .find(|w| w.window_number == Some(window_number))
            .map(|w| w.frame)
    }

    #[must_use]
    pub fn operations(&self) -> Vec<Operation> {
        lock(&self.operation_log).clone()
    }

    /// Number of `SetFrame` calls that reached the desktop.
    #[must_use]
    pub fn move_count(&self) -> usize {
        lock(&self.operation_log)
            .iter()
            .filter(|op| matches!(op, Operation::SetFrame { .. }))
            .count()
    }

    #[must_use]
    pub fn enumerate_calls(&self) -> usize {
        self.enumerate_calls.load(Ordering::SeqCst)
    }

    pub fn clear_operations(&self) {
        lock(&self.operation_log).clear();
    }

    /// # Panics
    ///
    /// Panics if the operation was not recorded.
    pub fn assert_contains(&self, expected: &Operation) {
        let ops = self.operations();
        assert!(
            ops.contains(expected),
            "Expected operation {expected:?} not found in: {ops:#?}",
        );
    }

    /// # Panics
    ///
    /// Panics if any window was moved.
    pub fn assert_no_moves(&self) {
        let moves = self.move_count();
        assert!(moves == 0, "Expected no moves, found {moves}: {:#?}", self.operations());
    }

    // === Internal Helpers ===

    fn record_op(&self, op: Operation) {
        trace!(?op, "Recording operation");
        lock(&self.operation_log).push(op);
    }

    fn check_controller(&self, window_number: u32) -> Result<()> {
        if self.fail_controller.load(Ordering::SeqCst) {
            return Err(LayoutError::controller("mock controller disabled"));
        }
        if lock(&self.failing_windows).contains(&window_number) {
            return Err(LayoutError::controller(format!(
                "mock window {window_number} configured to fail"
            )));
        }
        Ok(())
    }
}

impl DisplayProvider for MockDesktop {
    fn displays(&self) -> Result<Vec<DisplayInfo>> {
        Ok(lock(&self.displays).clone())
    }
}

impl WindowEnumerator for MockDesktop {
    fn enumerate(&self) -> Result<Vec<WindowInfo>> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_enumeration.load(Ordering::SeqCst) {
            return Err(LayoutError::enumerator("mock enumeration disabled"));
        }
        Ok(lock(&self.windows).clone())
    }
}

impl WindowController for MockDesktop {
    fn frame(&self, pid: i32, window_number: u32) -> Result<Rect> {
        self.record_op(Operation::ReadFrame { pid, window_number });
        self.check_controller(window_number)?;

        let mut frame = lock(&self.windows)
            .iter()
            .find(|w| w.owner_pid == pid && w.window_number == Some(window_number))
            .map(|w| w.frame)
            .ok_or(LayoutError::WindowNotFound { pid, window_number })?;

        if let Some(offset) = lock(&self.drift).get(&window_number) {
            frame.x += offset.x;
            frame.y += offset.y;
        }
        Ok(frame)
    }

    fn set_frame(&self, pid: i32, window_number: u32, frame: Rect) -> Result<()> {
        self.check_controller(window_number)?;
        self.record_op(Operation::SetFrame {
            pid,
            window_number,
            frame,
        });

        let mut windows = lock(&self.windows);
        let window = windows
            .iter_mut()
            .find(|w| w.owner_pid == pid && w.window_number == Some(window_number))
            .ok_or(LayoutError::WindowNotFound { pid, window_number })?;
        window.frame = frame;
        lock(&self.drift).remove(&window_number);
        Ok(())
    }
}
