//! Deterministic timer driving for the synchronous engine core.

use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::Instant;

use winlayout::engine::{Engine, Outcome};

/// Fire timers in deadline order until none is due before `limit`.
/// Returns the instant of the last timer fired.
pub fn drive(engine: &mut Engine, limit: Instant) -> Option<Instant> {
    let mut last = None;
    while let Some(at) = engine.next_deadline() {
        if at > limit {
            break;
        }
        engine.fire_due(at);
        last = Some(at);
    }
    last
}

/// Drive for `span` after `from`.
pub fn drive_for(engine: &mut Engine, from: Instant, span: Duration) -> Option<Instant> {
    drive(engine, from + span)
}

pub fn drain(rx: &mut broadcast::Receiver<Outcome>) -> Vec<Outcome> {
    let mut out = Vec::new();
    while let Ok(outcome) = rx.try_recv() {
        out.push(outcome);
    }
    out
}

pub fn count(outcomes: &[Outcome], pred: impl Fn(&Outcome) -> bool) -> usize {
    outcomes.iter().filter(|o| pred(o)).count()
}

pub fn passes(outcomes: &[Outcome]) -> usize {
    count(outcomes, |o| matches!(o, Outcome::RestorationFinished { .. }))
}
