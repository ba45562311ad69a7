//! Process-wide pause gate.
//!
//! The engine consults a [`PauseState`] at the entry of every operation that
//! would call a collaborator. It never owns the flag: whoever holds a
//! [`PauseSwitch`] can flip it, and the engine sees the change on its next
//! check.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::time::Instant;
use tracing::info;

/// Read-only view of the pause flag.
pub trait PauseState: Send + Sync {
    /// Whether operations are suspended at `now`. An expired pause reads as
    /// not paused.
    fn is_paused(&self, now: Instant) -> bool;

    /// When the current pause ends on its own, if it does.
    fn expiry(&self) -> Option<Instant>;
}

#[derive(Debug, Default, Clone, Copy)]
struct Inner {
    paused: bool,
    until: Option<Instant>,
}

/// Shared, clonable pause flag with optional expiry.
#[derive(Debug, Default, Clone)]
pub struct PauseSwitch {
    inner: Arc<Mutex<Inner>>,
}

impl PauseSwitch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Inner {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, value: Inner) {
        *self.inner.lock().unwrap_or_else(PoisonError::into_inner) = value;
    }

    /// Pause indefinitely, or until `until`.
    pub fn pause(&self, until: Option<Instant>) {
        info!(timed = until.is_some(), "Paused");
        self.write(Inner {
            paused: true,
            until,
        });
    }

    pub fn resume(&self) {
        info!("Resumed");
        self.write(Inner::default());
    }
}

impl PauseState for PauseSwitch {
    fn is_paused(&self, now: Instant) -> bool {
        let inner = self.read();
        inner.paused && inner.until.is_none_or(|until| now < until)
    }

    fn expiry(&self) -> Option<Instant> {
        let inner = self.read();
        if inner.paused { inner.until } else { None }
    }
}
