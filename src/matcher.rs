//! Saved-record to live-window matching.
//!
//! Matching runs in tiers over the whole slot. Each tier pairs as many
//! records as it can before the next, looser tier sees what is left:
//!
//! 1. exact window number and app digest
//! 2. app digest and title digest
//! 3. app digest and size within tolerance
//! 4. app digest alone
//!
//! Within tiers 2-4, a record with several candidates takes the one whose
//! origin is closest to the saved origin. Records are visited in
//! `(display, window key)` order so results never depend on map iteration
//! order. Each record and each live window is used at most once.

use std::fmt;

use serde::Serialize;
use tracing::trace;

use crate::identity::{IdentityHasher, WindowIdentity};
use crate::logging::DIAGNOSTICS_TARGET;
use crate::platform::{DisplayId, WindowInfo};
use crate::store::{SlotWindows, WindowRecord};

/// Which tier produced a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchRule {
    ExactWindowNumber,
    Title,
    Size,
    AppOnly,
}

impl fmt::Display for MatchRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::ExactWindowNumber => "exact",
            Self::Title => "title",
            Self::Size => "size",
            Self::AppOnly => "app",
        };
        f.write_str(text)
    }
}

/// A live window with its identity computed under the installation salt.
#[derive(Debug, Clone)]
pub struct LiveWindow {
    pub info: WindowInfo,
    pub identity: WindowIdentity,
}

impl LiveWindow {
    /// Hash every normal-layer window in an enumeration.
    pub fn from_enumeration(
        windows: Vec<WindowInfo>,
        hasher: &IdentityHasher,
        with_titles: bool,
    ) -> Vec<Self> {
        windows
            .into_iter()
            .filter(WindowInfo::is_normal_layer)
            .map(|info| {
                let title = if with_titles { info.title.as_deref() } else { None };
                let identity = hasher.identity(&info.owner_name, title);
                Self { info, identity }
            })
            .collect()
    }
}

/// One saved record paired with one live window.
#[derive(Debug, Clone)]
pub struct MatchPair {
    pub display: DisplayId,
    pub key: String,
    pub saved: WindowRecord,
    pub live: WindowInfo,
    pub rule: MatchRule,
    /// Distance between saved and live origins.
    pub distance: f64,
}

/// Pairs plus the records nothing matched.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub pairs: Vec<MatchPair>,
    pub unmatched: Vec<(DisplayId, String)>,
}

struct Entry<'a> {
    display: DisplayId,
    key: &'a str,
    record: &'a WindowRecord,
}

/// Tiered, injective window matcher.
#[derive(Debug, Clone, Copy)]
pub struct WindowMatcher {
    size_tolerance: f64,
}

impl WindowMatcher {
    #[must_use]
    pub const fn new(size_tolerance: f64) -> Self {
        Self { size_tolerance }
    }

    /// Match every record in `saved` against `live`.
    #[must_use]
    pub fn match_windows(&self, saved: &SlotWindows, live: &[LiveWindow]) -> MatchResult {
        // BTreeMaps iterate in (display, key) order.
        let entries: Vec<Entry<'_>> = saved
            .iter()
            .flat_map(|(display, bucket)| {
                bucket.iter().map(move |(key, record)| Entry {
                    display: *display,
                    key: key.as_str(),
                    record,
                })
            })
            .collect();

        let mut saved_used = vec![false; entries.len()];
        let mut live_used = vec![false; live.len()];
        let mut pairs = Vec::new();

        // Tier 1: exact window number.
        for (i, entry) in entries.iter().enumerate() {
            let Some(number) = entry.record.source_window_number else {
                continue;
            };
            let found = live
                .iter()
                .enumerate()
                .find(|(j, w)| {
                    !live_used[*j] && self.accepts(MatchRule::ExactWindowNumber, entry.record, w)
                })
                .map(|(j, _)| j);
            if let Some(j) = found {
                trace!(
                    target: DIAGNOSTICS_TARGET,
                    key = entry.key,
                    display = entry.display,
                    window_number = number,
                    "exact match"
                );
                saved_used[i] = true;
                live_used[j] = true;
                pairs.push(Self::pair(entry, &live[j], MatchRule::ExactWindowNumber));
            }
        }

        // Tiers 2-4: proximity among filtered candidates.
        for rule in [MatchRule::Title, MatchRule::Size, MatchRule::AppOnly] {
            for (i, entry) in entries.iter().enumerate() {
                if saved_used[i] {
                    continue;
                }
                let candidates: Vec<(usize, f64)> = live
                    .iter()
                    .enumerate()
                    .filter(|(j, w)| !live_used[*j] && self.accepts(rule, entry.record, w))
                    .map(|(j, w)| (j, entry.record.frame.origin().distance(w.info.frame.origin())))
                    .collect();

                if candidates.is_empty() {
                    continue;
                }

                trace!(
                    target: DIAGNOSTICS_TARGET,
                    key = entry.key,
                    display = entry.display,
                    %rule,
                    candidates = ?candidates,
                    "candidate set"
                );

                // First minimum wins, so equal distances resolve by
                // enumeration order.
                let mut best = candidates[0];
                for &c in &candidates[1..] {
                    if c.1 < best.1 {
                        best = c;
                    }
                }

                trace!(
                    target: DIAGNOSTICS_TARGET,
                    key = entry.key,
                    %rule,
                    chosen = best.0,
                    distance = best.1,
                    "proximity choice"
                );
                saved_used[i] = true;
                live_used[best.0] = true;
                pairs.push(Self::pair(entry, &live[best.0], rule));
            }
        }

        let unmatched: Vec<(DisplayId, String)> = entries
            .iter()
            .zip(&saved_used)
            .filter(|(_, used)| !**used)
            .map(|(e, _)| (e.display, e.key.to_string()))
            .collect();

        if !unmatched.is_empty() {
            trace!(target: DIAGNOSTICS_TARGET, unmatched = ?unmatched, "no candidates");
        }

        MatchResult { pairs, unmatched }
    }

    fn accepts(&self, rule: MatchRule, saved: &WindowRecord, live: &LiveWindow) -> bool {
        if saved.identity.app_name_hash != live.identity.app_name_hash {
            return false;
        }
        match rule {
            MatchRule::ExactWindowNumber => {
                saved.source_window_number.is_some()
                    && saved.source_window_number == live.info.window_number
            }
            MatchRule::Title => saved.identity.title_matches(&live.identity),
            MatchRule::Size => saved
                .size
                .within(live.info.frame.size(), self.size_tolerance),
            MatchRule::AppOnly => true,
        }
    }

    fn pair(entry: &Entry<'_>, live: &LiveWindow, rule: MatchRule) -> MatchPair {
        MatchPair {
            display: entry.display,
            key: entry.key.to_string(),
            saved: entry.record.clone(),
            live: live.info.clone(),
            rule,
            distance: entry.record.frame.origin().distance(live.info.frame.origin()),
        }
    }
}
