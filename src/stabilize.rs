//! Display stabilization detector.
//!
//! Debounces noisy topology signals into one restoration cycle:
//!
//! ```text
//! Idle → Pending(event_time) → Stable → RestorationScheduled → CooldownActive → Idle
//! ```
//!
//! The detector owns no clock and no tasks. It arms and cancels timers in a
//! [`TimerSet`] that belongs to the coordination timeline, and the timeline
//! calls back into it when they fire.

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::TimingConfig;
use crate::restore::{RestorationSession, RestoreReport, RetryDecision, next_step};
use crate::timeline::{TimerKind, TimerSet};

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectorState {
    Idle,
    /// Waiting for signals to stop. `event_time` is the latest signal.
    Pending {
        event_time: Instant,
    },
    /// Settled; restoration is about to be scheduled.
    Stable,
    /// A pass is due, running, or waiting to retry.
    RestorationScheduled,
    /// Absorbing signals caused by our own window moves.
    CooldownActive,
}

impl DetectorState {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Pending { .. } => "pending",
            Self::Stable => "stable",
            Self::RestorationScheduled => "restoration_scheduled",
            Self::CooldownActive => "cooldown",
        }
    }
}

/// What a topology signal did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalOutcome {
    /// A fresh cycle began; any previous cycle's timers were cancelled.
    Started { cycle_id: Uuid },
    /// The pending cycle's debounce window restarted.
    Restarted { cycle_id: Uuid },
    /// Swallowed by cooldown.
    Absorbed,
}

/// What a poll tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    /// Not pending; the poll does nothing and is not re-armed.
    Inactive,
    /// Still within the debounce window.
    Waiting,
    /// Paused; bookkeeping continues but the state does not advance.
    Held,
    Stabilized { cycle_id: Uuid },
}

#[derive(Debug, Clone)]
struct Cycle {
    id: Uuid,
    session: RestorationSession,
    passes: u32,
}

/// The stabilization state machine.
#[derive(Debug)]
pub struct StabilizationDetector {
    timing: TimingConfig,
    state: DetectorState,
    cycle: Option<Cycle>,
    screen_count: usize,
}

impl StabilizationDetector {
    #[must_use]
    pub const fn new(timing: TimingConfig, screen_count: usize) -> Self {
        Self {
            timing,
            state: DetectorState::Idle,
            cycle: None,
            screen_count,
        }
    }

    #[must_use]
    pub const fn state(&self) -> DetectorState {
        self.state
    }

    /// Id of the cycle in flight, if any.
    #[must_use]
    pub fn cycle_id(&self) -> Option<Uuid> {
        self.cycle.as_ref().map(|c| c.id)
    }

    /// Session of the cycle in flight, if any.
    #[must_use]
    pub fn session(&self) -> Option<&RestorationSession> {
        self.cycle.as_ref().map(|c| &c.session)
    }

    /// Whether a cycle is between its first signal and its final pass.
    #[must_use]
    pub const fn in_flight(&self) -> bool {
        matches!(
            self.state,
            DetectorState::Pending { .. } | DetectorState::Stable | DetectorState::RestorationScheduled
        )
    }

    #[must_use]
    pub const fn screen_count(&self) -> usize {
        self.screen_count
    }

    /// Handle a topology signal.
    pub fn signal(
        &mut self,
        now: Instant,
        screen_count: usize,
        slot_index: usize,
        timers: &mut TimerSet,
    ) -> SignalOutcome {
        let previous = std::mem::replace(&mut self.screen_count, screen_count);

        match self.state {
            DetectorState::CooldownActive if screen_count <= previous => {
                debug!(screen_count, "Signal absorbed by cooldown");
                return SignalOutcome::Absorbed;
            }
            DetectorState::CooldownActive => {
                info!(previous, screen_count, "Display added, cutting cooldown short");
            }
            DetectorState::Pending { .. } => {
                if let Some(cycle) = &self.cycle {
                    debug!(cycle = %cycle.id, "Debounce restarted");
                    self.state = DetectorState::Pending { event_time: now };
                    return SignalOutcome::Restarted { cycle_id: cycle.id };
                }
            }
            DetectorState::Idle | DetectorState::Stable | DetectorState::RestorationScheduled => {}
        }

        timers.cancel_all(&TimerKind::CYCLE);
        let id = Uuid::new_v4();
        self.cycle = Some(Cycle {
            id,
            session: RestorationSession::new(id, slot_index, &self.timing),
            passes: 0,
        });
        self.state = DetectorState::Pending { event_time: now };
        timers.schedule(TimerKind::StabilizationPoll, now, self.timing.poll_interval());
        info!(cycle = %id, slot = slot_index, screen_count, "Stabilization cycle started");
        SignalOutcome::Started { cycle_id: id }
    }

    /// Poll tick: settle once no signal has arrived for the stabilization
    /// delay.
    pub fn poll(&mut self, now: Instant, paused: bool, timers: &mut TimerSet) -> PollOutcome {
        let DetectorState::Pending { event_time } = self.state else {
            return PollOutcome::Inactive;
        };
        let Some(cycle_id) = self.cycle_id() else {
            self.state = DetectorState::Idle;
            return PollOutcome::Inactive;
        };

        if paused {
            timers.schedule(TimerKind::StabilizationPoll, now, self.timing.poll_interval());
            return PollOutcome::Held;
        }

        let quiet = now.saturating_duration_since(event_time);
        if quiet < self.timing.stabilization_delay() {
            timers.schedule(TimerKind::StabilizationPoll, now, self.timing.poll_interval());
            return PollOutcome::Waiting;
        }

        self.state = DetectorState::Stable;
        info!(cycle = %cycle_id, quiet_ms = quiet.as_millis(), "Displays stable");
        timers.schedule(TimerKind::Fallback, now, self.timing.fallback_window());
        timers.schedule(TimerKind::RestoreDelay, now, self.timing.restore_delay());
        self.state = DetectorState::RestorationScheduled;
        PollOutcome::Stabilized { cycle_id }
    }

    /// Restore-delay elapsed. Returns the session to run a pass with, or
    /// `None` if paused (the fallback watchdog will force it later).
    pub fn restore_due(&self, paused: bool) -> Option<RestorationSession> {
        if self.state != DetectorState::RestorationScheduled {
            return None;
        }
        let cycle = self.cycle.as_ref()?;
        if paused {
            debug!(cycle = %cycle.id, "Restoration deferred while paused");
            return None;
        }
        Some(cycle.session.clone())
    }

    /// Fallback watchdog fired. Forces a pass if none has run this cycle;
    /// re-arms itself while paused.
    pub fn fallback_due(
        &mut self,
        now: Instant,
        paused: bool,
        timers: &mut TimerSet,
    ) -> Option<RestorationSession> {
        if self.state != DetectorState::RestorationScheduled {
            return None;
        }
        let cycle = self.cycle.as_ref()?;
        if cycle.passes > 0 {
            return None;
        }
        if paused {
            timers.schedule(TimerKind::Fallback, now, self.timing.fallback_window());
            return None;
        }
        warn!(cycle = %cycle.id, "No restoration ran, forcing one");
        timers.cancel(TimerKind::RestoreDelay);
        Some(cycle.session.clone())
    }

    /// Retry delay elapsed. Re-arms itself while paused.
    pub fn retry_due(
        &mut self,
        now: Instant,
        paused: bool,
        timers: &mut TimerSet,
    ) -> Option<RestorationSession> {
        if self.state != DetectorState::RestorationScheduled {
            return None;
        }
        let cycle = self.cycle.as_ref()?;
        if paused {
            timers.schedule(TimerKind::Retry, now, cycle.session.retry_delay);
            return None;
        }
        Some(cycle.session.clone())
    }

    /// Record a finished pass and decide what follows. A retry keeps the
    /// cycle open and bypasses cooldown; anything else enters cooldown.
    pub fn pass_finished(
        &mut self,
        now: Instant,
        report: &RestoreReport,
        timers: &mut TimerSet,
    ) -> RetryDecision {
        let Some(cycle) = self.cycle.as_mut() else {
            return RetryDecision::Done;
        };
        cycle.passes += 1;
        timers.cancel(TimerKind::Fallback);
        timers.cancel(TimerKind::RestoreDelay);

        let decision = next_step(&cycle.session, report);
        match &decision {
            RetryDecision::Retry { session, delay } => {
                info!(
                    cycle = %cycle.id,
                    attempt = session.attempt,
                    delay_ms = delay.as_millis(),
                    "Nothing restored, retry scheduled"
                );
                cycle.session = session.clone();
                timers.schedule(TimerKind::Retry, now, *delay);
            }
            RetryDecision::Exhausted => {
                warn!(cycle = %cycle.id, attempts = cycle.session.attempt, "Giving up on restoration");
                self.enter_cooldown(now, timers);
            }
            RetryDecision::Done => self.enter_cooldown(now, timers),
        }
        decision
    }

    /// A pass could not run (collaborator unavailable). The cycle ends
    /// without retrying.
    pub fn pass_skipped(&mut self, now: Instant, timers: &mut TimerSet) {
        if let Some(cycle) = &self.cycle {
            info!(cycle = %cycle.id, "Restoration skipped for this cycle");
        }
        self.enter_cooldown(now, timers);
    }

    /// An explicit pass moved windows. Outside a cycle this enters cooldown
    /// so the signals caused by those moves are absorbed; a cycle in flight
    /// is left alone.
    pub fn explicit_pass_finished(&mut self, now: Instant, timers: &mut TimerSet) {
        if matches!(self.state, DetectorState::Idle | DetectorState::CooldownActive) {
            debug!("Explicit restoration moved windows, entering cooldown");
            self.enter_cooldown(now, timers);
        }
    }

    /// Cooldown elapsed.
    pub fn cooldown_elapsed(&mut self) {
        if self.state == DetectorState::CooldownActive {
            debug!("Cooldown over");
            self.state = DetectorState::Idle;
        }
    }

    /// Drop the cycle in flight and all its timers.
    pub fn reset(&mut self, timers: &mut TimerSet) {
        timers.cancel_all(&TimerKind::CYCLE);
        self.cycle = None;
        self.state = DetectorState::Idle;
    }

    fn enter_cooldown(&mut self, now: Instant, timers: &mut TimerSet) {
        timers.cancel_all(&TimerKind::CYCLE);
        self.cycle = None;
        self.state = DetectorState::CooldownActive;
        timers.schedule(TimerKind::Cooldown, now, self.timing.cooldown());
    }
}
