//! Restoration executor and retry policy.

use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::{Settings, TimingConfig};
use crate::error::{LayoutError, Result};
use crate::identity::IdentityHasher;
use crate::matcher::{LiveWindow, MatchPair, MatchRule, WindowMatcher};
use crate::platform::Desktop;
use crate::store::{SlotWindows, SnapshotSlot};

/// Per-cycle restoration state, handed from the detector to the executor.
///
/// Created once per stabilization cycle. A retry reuses it with `attempt`
/// incremented; a new cycle creates a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestorationSession {
    pub cycle_id: Uuid,
    pub slot_index: usize,
    pub attempt: u32,
    pub max_attempts: u32,
    #[serde(with = "duration_ms")]
    pub retry_delay: Duration,
}

impl RestorationSession {
    #[must_use]
    pub fn new(cycle_id: Uuid, slot_index: usize, timing: &TimingConfig) -> Self {
        Self {
            cycle_id,
            slot_index,
            attempt: 0,
            max_attempts: timing.max_attempts,
            retry_delay: timing.retry_delay(),
        }
    }

    /// Whether another pass may be scheduled after this one.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        self.attempt < self.max_attempts
    }
}

mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// A matched pair that was not moved.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedWindow {
    pub key: String,
    pub window_number: Option<u32>,
    pub reason: String,
}

/// Result of one restoration pass.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RestoreReport {
    pub slot_index: usize,
    pub attempt: u32,
    /// Saved records on currently connected displays.
    pub saved: usize,
    pub matched: usize,
    /// Windows moved to their saved frame.
    pub restored_count: usize,
    /// Matched windows already at their saved frame.
    pub unchanged: usize,
    pub skipped: Vec<SkippedWindow>,
    pub unmatched: Vec<String>,
    /// Matched pairs per rule, in rule order.
    pub rules: Vec<(MatchRule, usize)>,
}

impl RestoreReport {
    fn empty(session: &RestorationSession) -> Self {
        Self {
            slot_index: session.slot_index,
            attempt: session.attempt,
            saved: 0,
            matched: 0,
            restored_count: 0,
            unchanged: 0,
            skipped: Vec::new(),
            unmatched: Vec::new(),
            rules: Vec::new(),
        }
    }

    /// A pass that moved nothing and found nothing in place while the slot
    /// had windows to restore.
    #[must_use]
    pub const fn restored_nothing(&self) -> bool {
        self.saved > 0 && self.restored_count == 0 && self.unchanged == 0
    }
}

/// What happens after a pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Nothing more to do this cycle.
    Done,
    /// Run another pass after `delay` with this session.
    Retry {
        session: RestorationSession,
        delay: Duration,
    },
    /// Passes kept restoring nothing and the attempt budget is spent.
    Exhausted,
}

/// Decide whether to retry after a pass.
#[must_use]
pub fn next_step(session: &RestorationSession, report: &RestoreReport) -> RetryDecision {
    if !report.restored_nothing() {
        return RetryDecision::Done;
    }
    if !session.can_retry() {
        return RetryDecision::Exhausted;
    }
    let mut next = session.clone();
    next.attempt += 1;
    RetryDecision::Retry {
        delay: next.retry_delay,
        session: next,
    }
}

/// Applies saved frames to live windows.
#[derive(Debug, Clone)]
pub struct RestorationExecutor {
    matcher: WindowMatcher,
    hasher: IdentityHasher,
    position_tolerance: f64,
    with_titles: bool,
}

impl RestorationExecutor {
    #[must_use]
    pub fn new(hasher: IdentityHasher, settings: &Settings) -> Self {
        Self {
            matcher: WindowMatcher::new(settings.tolerance.size),
            hasher,
            position_tolerance: settings.tolerance.position,
            with_titles: settings.capture.capture_titles,
        }
    }

    /// Run one restoration pass for the session's slot.
    ///
    /// Buckets for displays that are not connected are left alone. Each
    /// matched window is re-read through the controller and skipped if it
    /// moved since enumeration. One window failing never stops the rest.
    ///
    /// # Errors
    ///
    /// Returns `CollaboratorUnavailable` if the display query or the
    /// enumeration fails; the pass is skipped.
    #[instrument(skip_all, fields(cycle = %session.cycle_id, slot = session.slot_index, attempt = session.attempt))]
    pub fn restore_windows_if_needed(
        &self,
        session: &RestorationSession,
        slot: &SnapshotSlot,
        desktop: &dyn Desktop,
    ) -> Result<RestoreReport> {
        let mut report = RestoreReport::empty(session);

        let displays = desktop.displays()?;
        let saved: SlotWindows = slot
            .windows
            .iter()
            .filter(|(id, _)| displays.iter().any(|d| d.id == **id))
            .map(|(id, bucket)| (*id, bucket.clone()))
            .collect();
        report.saved = saved.values().map(|b| b.len()).sum();

        if report.saved == 0 {
            debug!("Nothing saved for connected displays");
            return Ok(report);
        }

        let live = LiveWindow::from_enumeration(desktop.enumerate()?, &self.hasher, self.with_titles);
        let matched = self.matcher.match_windows(&saved, &live);
        report.matched = matched.pairs.len();
        report.unmatched = matched.unmatched.into_iter().map(|(_, key)| key).collect();

        let mut rules: Vec<(MatchRule, usize)> = Vec::new();
        for pair in &matched.pairs {
            match rules.iter_mut().find(|(r, _)| *r == pair.rule) {
                Some((_, n)) => *n += 1,
                None => rules.push((pair.rule, 1)),
            }
        }
        rules.sort_by_key(|(r, _)| *r);
        report.rules = rules;

        for pair in &matched.pairs {
            match self.apply(pair, desktop) {
                Ok(true) => report.restored_count += 1,
                Ok(false) => report.unchanged += 1,
                Err(e) => {
                    warn!(
                        key = %pair.key,
                        window_number = ?pair.live.window_number,
                        error = %e,
                        "Window not restored"
                    );
                    report.skipped.push(SkippedWindow {
                        key: pair.key.clone(),
                        window_number: pair.live.window_number,
                        reason: e.to_string(),
                    });
                }
            }
        }

        info!(
            saved = report.saved,
            matched = report.matched,
            restored = report.restored_count,
            unchanged = report.unchanged,
            skipped = report.skipped.len(),
            "Restoration pass finished"
        );
        Ok(report)
    }

    /// Move one window. Returns `Ok(false)` if it is already in place.
    fn apply(&self, pair: &MatchPair, desktop: &dyn Desktop) -> Result<bool> {
        let observed = pair.live.frame;
        if observed.matches(&pair.saved.frame, self.position_tolerance) {
            return Ok(false);
        }

        let pid = pair.live.owner_pid;
        let Some(number) = pair.live.window_number else {
            return Err(LayoutError::controller("window has no addressable number"));
        };

        let current = desktop.frame(pid, number)?;
        let drift = current.origin().distance(observed.origin());
        if !current.origin().within(observed.origin(), self.position_tolerance) {
            return Err(LayoutError::ToleranceExceeded {
                window_number: number,
                drift,
            });
        }

        desktop.set_frame(pid, number, pair.saved.frame)?;
        debug!(key = %pair.key, rule = %pair.rule, "Window restored");
        Ok(true)
    }
}
