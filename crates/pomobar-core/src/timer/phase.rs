use serde::{Deserialize, Serialize};
use std::fmt;

/// The four mutually exclusive timer states.
///
/// `Idle` is both the initial state and the resting state after `reset()`;
/// it is the only phase with no duration and no deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Focus,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Idle => "Idle",
            Phase::Focus => "Focus",
            Phase::ShortBreak => "Short Break",
            Phase::LongBreak => "Long Break",
        }
    }

    pub fn is_break(&self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Select the phase that follows `completed`.
///
/// Every `cycles_per_long_break`-th completed focus phase earns a long
/// break; breaks always hand back to focus. A cadence of zero is treated
/// as one so the modulo below stays defined.
pub(super) fn next_after(completed: Phase, focus_completions: u32, cycles_per_long_break: u32) -> Phase {
    match completed {
        Phase::Focus => {
            let cadence = cycles_per_long_break.max(1);
            if focus_completions > 0 && focus_completions % cadence == 0 {
                Phase::LongBreak
            } else {
                Phase::ShortBreak
            }
        }
        Phase::ShortBreak | Phase::LongBreak => Phase::Focus,
        // Idle has no deadline, so it should never complete; treat it like
        // an ordinary start.
        Phase::Idle => Phase::Focus,
    }
}
