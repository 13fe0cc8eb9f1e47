//! Debounced phase commitment state (spec §3 `PhaseState`).

use chrono::{DateTime, Utc};
use sitelink_core::Phase;

/// Tracks the committed phase and a not-yet-stable candidate.
#[derive(Debug, Clone, Default)]
pub struct PhaseState {
    pub committed: Option<Phase>,
    pub candidate: Option<Phase>,
    pub candidate_since: Option<DateTime<Utc>>,
}

/// Stale-event handling mode (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleMode {
    /// Freeze the committed phase regardless of scheduler output.
    Freeze,
    /// Force-commit to the configured unknown phase.
    Unknown,
}

/// Stale-detection configuration, threaded into both phase engine variants.
#[derive(Debug, Clone)]
pub struct StaleConfig {
    pub stale_secs: f64,
    pub mode: StaleMode,
    pub unknown_phase: Phase,
}

impl StaleConfig {
    /// `stale_secs <= 0.0` disables stale detection entirely (spec §6:
    /// `EDGE_EVENT_STALE_SECONDS` `0 = off`).
    pub fn is_enabled(&self) -> bool {
        self.stale_secs > 0.0
    }

    pub fn is_stale(&self, last_event_age: f64) -> bool {
        self.is_enabled() && last_event_age > self.stale_secs
    }
}
