use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::Phase;

/// Every engine operation produces an Event.
/// Displays poll `StateSnapshot`s at their own cadence; the service layer
/// routes natural `PhaseCompleted` events to the notifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    TimerStarted {
        phase: Phase,
        duration_ms: u64,
        at: DateTime<Utc>,
    },
    TimerPaused {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    TimerResumed {
        phase: Phase,
        remaining_ms: u64,
        at: DateTime<Utc>,
    },
    /// A phase ended, naturally or via skip. The next phase is already
    /// installed (running when `auto_started`, armed idle otherwise) by the
    /// time this event is returned.
    PhaseCompleted {
        phase: Phase,
        next: Phase,
        skipped: bool,
        auto_started: bool,
        at: DateTime<Utc>,
    },
    TimerReset {
        at: DateTime<Utc>,
    },
    StateSnapshot {
        phase: Phase,
        running: bool,
        remaining_ms: u64,
        total_ms: u64,
        progress: f64,
        focus_completions: u32,
        completed_today: u32,
        at: DateTime<Utc>,
    },
}
