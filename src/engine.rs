//! Coordination timeline.
//!
//! One [`Engine`] owns every piece of mutable state: the detector, the timer
//! set, the in-memory slots and the store. Platform notifications arrive as
//! [`EngineEvent`]s on a single channel and timers fire from the same loop,
//! so nothing is ever touched from two places at once. Collaborator calls are
//! made synchronously from inside the loop, one at a time.
//!
//! The synchronous core ([`Engine::handle`], [`Engine::fire_due`]) takes the
//! current instant as an argument and can be driven directly. [`Engine::run`]
//! wraps it in a tokio event loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::capture::{CaptureOutcome, SkipReason, SnapshotCapture};
use crate::config::Settings;
use crate::error::{LayoutError, Result};
use crate::identity::{IdentityHasher, InstallationSalt};
use crate::pause::{PauseState, PauseSwitch};
use crate::platform::Desktop;
use crate::restore::{RestorationExecutor, RestorationSession, RestoreReport, RetryDecision};
use crate::stabilize::{DetectorState, PollOutcome, SignalOutcome, StabilizationDetector};
use crate::store::{AUTO_SLOT, SnapshotSlot, SnapshotStore};
use crate::timeline::{TimerKind, TimerSet};

const EVENT_BUFFER: usize = 64;
const OUTCOME_BUFFER: usize = 256;

/// Inbound events, typically forwarded from OS notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    /// Display configuration changed.
    TopologyChanged,
    SystemWillSleep,
    /// Treated as a topology change.
    SystemDidWake,
    /// Capture the current layout into a slot.
    CaptureNow { slot: usize },
    /// Run one restoration pass for a slot right away.
    RestoreNow { slot: usize },
    /// Pause indefinitely, or for a duration.
    SetPaused { until: Option<Duration> },
    /// Turn privacy mode on (purging saved layouts) or off.
    SetPrivacy { enabled: bool },
    Resume,
    Shutdown,
}

/// What the engine did, broadcast to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Outcome {
    CycleStarted {
        cycle_id: Uuid,
        slot: usize,
    },
    SignalAbsorbed,
    Stabilized {
        cycle_id: Uuid,
    },
    RestorationFinished {
        report: RestoreReport,
        attempt: u32,
    },
    /// The pass could not run; the cycle ends without retrying.
    RestorationSkipped {
        slot: usize,
        reason: String,
    },
    RetryScheduled {
        attempt: u32,
        delay_ms: u64,
    },
    RetriesExhausted {
        cycle_id: Uuid,
    },
    CaptureFinished {
        slot: usize,
        windows: usize,
        displays: usize,
    },
    CaptureSkipped {
        slot: usize,
        reason: SkipReason,
    },
    PrivacyChanged {
        enabled: bool,
        purged: usize,
    },
    Notice {
        message: String,
    },
}

/// The coordination timeline.
pub struct Engine {
    settings: Settings,
    desktop: Arc<dyn Desktop>,
    store: SnapshotStore,
    slots: Vec<SnapshotSlot>,
    capture: SnapshotCapture,
    executor: RestorationExecutor,
    detector: StabilizationDetector,
    timers: TimerSet,
    pause: Arc<dyn PauseState>,
    switch: PauseSwitch,
    outcomes: broadcast::Sender<Outcome>,
    startup_notice: Option<String>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("state", &self.detector.state())
            .field("timers", &self.timers.pending())
            .field("slots", &self.slots.len())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Build an engine over a desktop and a store.
    ///
    /// The installation salt is loaded (or created) and slots are loaded,
    /// migrating older formats. Slots that fail to decode are left on disk
    /// untouched and the engine starts empty.
    ///
    /// # Errors
    ///
    /// Returns a storage error, or an encoding error if the stored salt is
    /// corrupt.
    pub fn new(
        settings: Settings,
        desktop: Arc<dyn Desktop>,
        mut store: SnapshotStore,
        switch: PauseSwitch,
    ) -> Result<Self> {
        let salt = InstallationSalt::load_or_create(store.kv_mut())?;
        let hasher = IdentityHasher::new(salt);

        let mut startup_notice = None;
        let slots = match store.load_or_default() {
            Ok(slots) => slots,
            Err(LayoutError::EncodingFailure(msg)) => {
                warn!(error = %msg, "Stored slots unreadable, starting empty");
                if settings.notify_on_errors {
                    startup_notice = Some(format!("Saved layouts could not be read: {msg}"));
                }
                let mut slots = Vec::new();
                store.ensure_slots(&mut slots);
                slots
            }
            Err(e) => return Err(e),
        };

        let screen_count = desktop.displays().map_or(0, |d| d.len());
        let (outcomes, _) = broadcast::channel(OUTCOME_BUFFER);

        info!(
            slots = slots.len(),
            screen_count,
            privacy = store.privacy_mode(),
            "Engine ready"
        );

        Ok(Self {
            capture: SnapshotCapture::new(hasher.clone(), settings.capture.capture_titles),
            executor: RestorationExecutor::new(hasher, &settings),
            detector: StabilizationDetector::new(settings.timing.clone(), screen_count),
            timers: TimerSet::new(),
            pause: Arc::new(switch.clone()),
            switch,
            settings,
            desktop,
            store,
            slots,
            outcomes,
            startup_notice,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.outcomes.subscribe()
    }

    #[must_use]
    pub fn slots(&self) -> &[SnapshotSlot] {
        &self.slots
    }

    #[must_use]
    pub const fn store(&self) -> &SnapshotStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SnapshotStore {
        &mut self.store
    }

    #[must_use]
    pub const fn detector_state(&self) -> DetectorState {
        self.detector.state()
    }

    #[must_use]
    pub fn pending_timers(&self) -> Vec<TimerKind> {
        self.timers.pending()
    }

    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    fn emit(&self, outcome: Outcome) {
        if self.outcomes.send(outcome).is_err() {
            debug!("No outcome subscribers");
        }
    }

    /// Arm the automatic capture timer and flush any startup notice.
    pub fn start(&mut self, now: Instant) {
        if let Some(message) = self.startup_notice.take() {
            self.emit(Outcome::Notice { message });
        }
        if self.settings.capture.auto_capture {
            self.timers.schedule(
                TimerKind::InitialCapture,
                now,
                self.settings.timing.initial_capture_delay(),
            );
        }
    }

    /// Handle one inbound event. Returns `false` on shutdown.
    #[instrument(skip(self, now), fields(state = self.detector.state().name()))]
    pub fn handle(&mut self, event: EngineEvent, now: Instant) -> bool {
        debug!(?event, "Event received");
        match event {
            EngineEvent::TopologyChanged => self.topology_changed(now),
            EngineEvent::SystemWillSleep => {
                info!("System going to sleep, capture timers cancelled");
                self.timers.cancel_all(&TimerKind::CAPTURE);
            }
            EngineEvent::SystemDidWake => {
                info!("System woke");
                if self.settings.capture.auto_capture {
                    self.timers.schedule(
                        TimerKind::InitialCapture,
                        now,
                        self.settings.timing.initial_capture_delay(),
                    );
                }
                self.topology_changed(now);
            }
            EngineEvent::CaptureNow { slot } => match self.capture_slot(slot, now) {
                Ok(outcome) => self.emit_capture(slot, outcome),
                Err(e) => self.report_error(&e),
            },
            EngineEvent::RestoreNow { slot } => match self.restore_slot(slot, now) {
                Ok(Some(report)) => {
                    let attempt = report.attempt;
                    self.emit(Outcome::RestorationFinished { report, attempt });
                }
                Ok(None) => self.emit(Outcome::RestorationSkipped {
                    slot,
                    reason: SkipReason::Paused.to_string(),
                }),
                Err(e) => {
                    self.report_error(&e);
                    self.emit(Outcome::RestorationSkipped {
                        slot,
                        reason: e.to_string(),
                    });
                }
            },
            EngineEvent::SetPaused { until } => self.switch.pause(until.map(|d| now + d)),
            EngineEvent::SetPrivacy { enabled } => match self.set_privacy_mode(enabled) {
                Ok(purged) => self.emit(Outcome::PrivacyChanged { enabled, purged }),
                Err(e) => self.report_error(&e),
            },
            EngineEvent::Resume => self.switch.resume(),
            EngineEvent::Shutdown => {
                info!("Shutdown requested");
                return false;
            }
        }
        true
    }

    /// Fire every timer due at `now`, earliest first.
    pub fn fire_due(&mut self, now: Instant) {
        while let Some(kind) = self.timers.pop_due(now) {
            self.fire(kind, now);
        }
    }

    fn fire(&mut self, kind: TimerKind, now: Instant) {
        let paused = self.pause.is_paused(now);
        debug!(%kind, paused, "Timer fired");

        match kind {
            TimerKind::StabilizationPoll => {
                if let PollOutcome::Stabilized { cycle_id } =
                    self.detector.poll(now, paused, &mut self.timers)
                {
                    self.emit(Outcome::Stabilized { cycle_id });
                }
            }
            TimerKind::RestoreDelay => {
                if let Some(session) = self.detector.restore_due(paused) {
                    self.run_pass(&session, now);
                } else if paused {
                    self.defer_until_pause_ends(kind, now);
                }
            }
            TimerKind::Fallback => {
                if let Some(session) = self.detector.fallback_due(now, paused, &mut self.timers) {
                    self.run_pass(&session, now);
                }
            }
            TimerKind::Retry => {
                if let Some(session) = self.detector.retry_due(now, paused, &mut self.timers) {
                    self.run_pass(&session, now);
                }
            }
            TimerKind::Cooldown => self.detector.cooldown_elapsed(),
            TimerKind::InitialCapture | TimerKind::PeriodicCapture => {
                self.timers.schedule(
                    TimerKind::PeriodicCapture,
                    now,
                    self.settings.timing.capture_interval(),
                );
                match self.capture(AUTO_SLOT, now, true) {
                    Ok(outcome) => self.emit_capture(AUTO_SLOT, outcome),
                    Err(e) => self.report_error(&e),
                }
            }
        }
    }

    /// Re-arm `kind` for when a timed pause runs out. Indefinite pauses are
    /// left to the fallback watchdog.
    fn defer_until_pause_ends(&mut self, kind: TimerKind, now: Instant) {
        if self.detector.state() != DetectorState::RestorationScheduled {
            return;
        }
        if let Some(until) = self.pause.expiry() {
            debug!(%kind, "Deferred until pause ends");
            self.timers
                .schedule(kind, now, until.saturating_duration_since(now));
        }
    }

    fn topology_changed(&mut self, now: Instant) {
        let screen_count = match self.desktop.displays() {
            Ok(displays) => displays.len(),
            Err(e) => {
                warn!(error = %e, "Display query failed, keeping last screen count");
                self.detector.screen_count()
            }
        };
        let slot = self.store.active_slot().unwrap_or(AUTO_SLOT);

        match self.detector.signal(now, screen_count, slot, &mut self.timers) {
            SignalOutcome::Started { cycle_id } => {
                self.emit(Outcome::CycleStarted { cycle_id, slot });
            }
            SignalOutcome::Restarted { .. } => {}
            SignalOutcome::Absorbed => self.emit(Outcome::SignalAbsorbed),
        }
    }

    fn run_pass(&mut self, session: &RestorationSession, now: Instant) {
        let Some(slot) = self.slots.iter().find(|s| s.id == session.slot_index) else {
            warn!(slot = session.slot_index, "Active slot missing, skipping cycle");
            self.detector.pass_skipped(now, &mut self.timers);
            return;
        };

        match self
            .executor
            .restore_windows_if_needed(session, slot, self.desktop.as_ref())
        {
            Ok(report) => {
                let decision = self.detector.pass_finished(now, &report, &mut self.timers);
                self.emit(Outcome::RestorationFinished {
                    report,
                    attempt: session.attempt,
                });
                match decision {
                    RetryDecision::Retry { session, delay } => {
                        self.emit(Outcome::RetryScheduled {
                            attempt: session.attempt,
                            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        });
                    }
                    RetryDecision::Exhausted => self.emit(Outcome::RetriesExhausted {
                        cycle_id: session.cycle_id,
                    }),
                    RetryDecision::Done => {}
                }
            }
            Err(e) => {
                if e.is_transient() {
                    info!(error = %e, "Restoration pass could not run");
                } else {
                    warn!(error = %e, "Restoration pass failed");
                }
                self.detector.pass_skipped(now, &mut self.timers);
                self.emit(Outcome::RestorationSkipped {
                    slot: session.slot_index,
                    reason: e.to_string(),
                });
            }
        }
    }

    // === Direct operations ===

    /// Capture the current layout into `index` and persist.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`], a collaborator error (slot left
    /// unchanged), or a store error.
    pub fn capture_slot(&mut self, index: usize, now: Instant) -> Result<CaptureOutcome> {
        self.capture(index, now, false)
    }

    fn capture(&mut self, index: usize, now: Instant, automatic: bool) -> Result<CaptureOutcome> {
        self.store.check_slot(index)?;
        if self.pause.is_paused(now) {
            debug!(slot = index, "Capture skipped while paused");
            return Ok(CaptureOutcome::Skipped {
                reason: SkipReason::Paused,
            });
        }
        if automatic && self.detector.in_flight() {
            debug!("Capture skipped, display change in progress");
            return Ok(CaptureOutcome::Skipped {
                reason: SkipReason::CycleInFlight,
            });
        }

        let displays = self.desktop.displays()?;
        let was_private = self.store.privacy_mode();
        self.store.ensure_slots(&mut self.slots);
        let slot = self
            .slots
            .iter_mut()
            .find(|s| s.id == index)
            .ok_or(LayoutError::InvalidSlot {
                index,
                max: self.store.slot_count(),
            })?;

        let outcome =
            self.capture
                .capture_into(slot, &displays, self.desktop.as_ref(), Utc::now())?;
        if matches!(outcome, CaptureOutcome::Captured { .. }) {
            let captured = slot.clone();
            match self.store.save_slot(&captured)? {
                Some(stored) => self.slots = stored,
                None if !was_private => {
                    info!("Privacy mode turned on elsewhere, dropping other slots");
                    self.clear_memory();
                    if let Some(slot) = self.slots.iter_mut().find(|s| s.id == index) {
                        *slot = captured;
                    }
                }
                None => {}
            }
        }
        Ok(outcome)
    }

    /// Turn privacy mode on or off. Enabling it purges the store and the
    /// in-memory slots. Returns the number of stored keys purged.
    ///
    /// # Errors
    ///
    /// Returns a storage error.
    pub fn set_privacy_mode(&mut self, enabled: bool) -> Result<usize> {
        let purged = self.store.set_privacy_mode(enabled)?;
        if enabled {
            self.clear_memory();
        }
        Ok(purged)
    }

    fn clear_memory(&mut self) {
        self.slots.clear();
        self.store.ensure_slots(&mut self.slots);
    }

    /// Run one pass for `index` immediately with a fresh session. Returns
    /// `None` while paused. Does not retry and ignores cooldown.
    ///
    /// # Errors
    ///
    /// Returns [`LayoutError::InvalidSlot`] or a collaborator error.
    pub fn restore_slot(&mut self, index: usize, now: Instant) -> Result<Option<RestoreReport>> {
        self.store.check_slot(index)?;
        if self.pause.is_paused(now) {
            debug!(slot = index, "Restore skipped while paused");
            return Ok(None);
        }
        let session = RestorationSession::new(Uuid::new_v4(), index, &self.settings.timing);
        let empty = SnapshotSlot::new(index);
        let slot = self.slots.iter().find(|s| s.id == index).unwrap_or(&empty);
        let report = self
            .executor
            .restore_windows_if_needed(&session, slot, self.desktop.as_ref())?;
        if report.restored_count > 0 {
            self.detector.explicit_pass_finished(now, &mut self.timers);
        }
        Ok(Some(report))
    }

    fn emit_capture(&self, slot: usize, outcome: CaptureOutcome) {
        match outcome {
            CaptureOutcome::Captured {
                windows, displays, ..
            } => self.emit(Outcome::CaptureFinished {
                slot,
                windows,
                displays,
            }),
            CaptureOutcome::Skipped { reason } => self.emit(Outcome::CaptureSkipped { slot, reason }),
        }
    }

    fn report_error(&self, error: &LayoutError) {
        warn!(error = %error, "Operation failed");
        if self.settings.notify_on_errors && matches!(error, LayoutError::EncodingFailure(_)) {
            self.emit(Outcome::Notice {
                message: error.to_string(),
            });
        }
    }

    // === Event loop ===

    /// Run until [`EngineEvent::Shutdown`] or until every sender is dropped.
    pub async fn run(mut self, mut events: mpsc::Receiver<EngineEvent>) {
        self.start(Instant::now());
        loop {
            let deadline = self.next_deadline();
            tokio::select! {
                event = events.recv() => {
                    let Some(event) = event else {
                        debug!("Event channel closed");
                        break;
                    };
                    if !self.handle(event, Instant::now()) {
                        break;
                    }
                }
                () = wait_for(deadline) => self.fire_due(Instant::now()),
            }
        }
        info!("Engine stopped");
    }

    /// Move the engine onto a tokio task.
    pub fn spawn(self) -> (EngineHandle, JoinHandle<()>) {
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        let handle = EngineHandle {
            events,
            outcomes: self.outcomes.clone(),
        };
        (handle, tokio::spawn(self.run(rx)))
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(at) => sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Sending side of a spawned engine.
#[derive(Debug, Clone)]
pub struct EngineHandle {
    events: mpsc::Sender<EngineEvent>,
    outcomes: broadcast::Sender<Outcome>,
}

impl EngineHandle {
    /// # Errors
    ///
    /// Returns an error if the engine has stopped.
    pub async fn send(&self, event: EngineEvent) -> Result<()> {
        self.events
            .send(event)
            .await
            .map_err(|_| LayoutError::Other("engine has stopped".to_string()))
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Outcome> {
        self.outcomes.subscribe()
    }

    /// # Errors
    ///
    /// Returns an error if the engine has already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.send(EngineEvent::Shutdown).await
    }
}
