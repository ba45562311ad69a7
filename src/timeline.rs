//! Timer bookkeeping for the coordination timeline.
//!
//! Each timer category holds at most one deadline. Scheduling a category
//! replaces its pending deadline, and cancelling removes it, so a cancelled
//! timer can never fire.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use tracing::trace;

/// Timer categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimerKind {
    /// Pending cycle checks whether it has settled.
    StabilizationPoll,
    /// Settled cycle waits before its first pass.
    RestoreDelay,
    /// Watchdog forcing a pass if none has run.
    Fallback,
    /// Delay before another pass.
    Retry,
    /// End of the post-restoration cooldown.
    Cooldown,
    /// First automatic capture after start.
    InitialCapture,
    /// Periodic automatic capture.
    PeriodicCapture,
}

impl TimerKind {
    /// Timers owned by a stabilization cycle.
    pub const CYCLE: [Self; 5] = [
        Self::StabilizationPoll,
        Self::RestoreDelay,
        Self::Fallback,
        Self::Retry,
        Self::Cooldown,
    ];

    /// Timers that trigger captures.
    pub const CAPTURE: [Self; 2] = [Self::InitialCapture, Self::PeriodicCapture];
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::StabilizationPoll => "stabilization-poll",
            Self::RestoreDelay => "restore-delay",
            Self::Fallback => "fallback",
            Self::Retry => "retry",
            Self::Cooldown => "cooldown",
            Self::InitialCapture => "initial-capture",
            Self::PeriodicCapture => "periodic-capture",
        };
        f.write_str(text)
    }
}

/// Pending deadlines, one per category.
#[derive(Debug, Default, Clone)]
pub struct TimerSet {
    deadlines: BTreeMap<TimerKind, Instant>,
}

impl TimerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm `kind` to fire `delay` after `now`, replacing any pending instance.
    pub fn schedule(&mut self, kind: TimerKind, now: Instant, delay: Duration) {
        let at = now + delay;
        if self.deadlines.insert(kind, at).is_some() {
            trace!(%kind, delay_ms = delay.as_millis(), "Timer re-armed");
        } else {
            trace!(%kind, delay_ms = delay.as_millis(), "Timer armed");
        }
    }

    /// Disarm `kind`. Returns whether it was pending.
    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        let was = self.deadlines.remove(&kind).is_some();
        if was {
            trace!(%kind, "Timer cancelled");
        }
        was
    }

    pub fn cancel_all(&mut self, kinds: &[TimerKind]) {
        for kind in kinds {
            self.cancel(*kind);
        }
    }

    #[must_use]
    pub fn is_pending(&self, kind: TimerKind) -> bool {
        self.deadlines.contains_key(&kind)
    }

    #[must_use]
    pub fn deadline(&self, kind: TimerKind) -> Option<Instant> {
        self.deadlines.get(&kind).copied()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.deadlines.values().min().copied()
    }

    /// Remove and return the earliest timer due at `now`. Ties resolve in
    /// category order.
    pub fn pop_due(&mut self, now: Instant) -> Option<TimerKind> {
        let kind = self
            .deadlines
            .iter()
            .filter(|(_, at)| **at <= now)
            .min_by_key(|(kind, at)| (**at, **kind))
            .map(|(kind, _)| *kind)?;
        self.deadlines.remove(&kind);
        Some(kind)
    }

    #[must_use]
    pub fn pending(&self) -> Vec<TimerKind> {
        self.deadlines.keys().copied().collect()
    }
}
