//! Timer engine implementation.
//!
//! The engine is a wall-clock state machine: the active countdown is a
//! deadline in epoch milliseconds, and remaining time is recomputed from
//! that deadline on every sample. It never accumulates ticks, so a missed
//! stretch of sampling (suspend, clock adjustment, scheduling delay) is
//! recovered by the next `recalculate()` call, which fires at most one
//! completion no matter how far past the deadline the clock has moved.
//!
//! The engine has no internal threads. Hosts either call `recalculate()`
//! periodically themselves or wrap the engine in a
//! [`TimerService`](super::TimerService), which runs the sampler.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Focus -> ShortBreak -> Focus -> ... -> LongBreak -> Focus
//! ```
//!
//! Every `cycles_per_long_break`-th naturally completed focus phase is
//! followed by a long break instead of a short one.

use std::sync::Arc;

use chrono::Utc;

use super::phase::{next_after, Phase};
use crate::config::SettingsSource;
use crate::events::Event;

/// Core timer state machine.
///
/// All operations are total: preconditions that do not hold make the
/// operation a no-op rather than an error. Durations are re-resolved from
/// the settings source at every phase start, never cached across a phase.
pub struct TimerEngine {
    settings: Arc<dyn SettingsSource>,
    phase: Phase,
    running: bool,
    /// Absolute completion deadline (ms since epoch) while running.
    /// Cleared on pause and as the first step of completion, which is what
    /// guards against a completion firing twice for one deadline.
    deadline_ms: Option<u64>,
    /// Remaining time in milliseconds, recomputed from the deadline while
    /// running, frozen while paused or armed idle.
    remaining_ms: u64,
    /// Duration the current phase started with; fixed until the next
    /// phase start so a config edit applies on the next transition.
    total_ms: u64,
    focus_completions: u32,
    completed_today: u32,
}

impl TimerEngine {
    pub fn new(settings: Arc<dyn SettingsSource>) -> Self {
        Self {
            settings,
            phase: Phase::Idle,
            running: false,
            deadline_ms: None,
            remaining_ms: 0,
            total_ms: 0,
            focus_completions: 0,
            completed_today: 0,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    pub fn total_ms(&self) -> u64 {
        self.total_ms
    }

    /// 0.0 .. 1.0 progress within the current phase.
    pub fn progress(&self) -> f64 {
        if self.phase == Phase::Idle || self.total_ms == 0 {
            return 0.0;
        }
        (1.0 - self.remaining_ms as f64 / self.total_ms as f64).clamp(0.0, 1.0)
    }

    /// Naturally completed focus phases since process start.
    pub fn focus_completions(&self) -> u32 {
        self.focus_completions
    }

    pub fn completed_today(&self) -> u32 {
        self.completed_today
    }

    /// Build a full state snapshot event.
    pub fn snapshot(&self) -> Event {
        Event::StateSnapshot {
            phase: self.phase,
            running: self.running,
            remaining_ms: self.remaining_ms,
            total_ms: self.total_ms,
            progress: self.progress(),
            focus_completions: self.focus_completions,
            completed_today: self.completed_today,
            at: Utc::now(),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Start `phase`, or the current phase, or focus when idle.
    ///
    /// Starting while already running restarts the countdown from the full
    /// duration; that is how "start" doubles as "restart this phase".
    pub fn start(&mut self, phase: Option<Phase>) -> Event {
        self.start_at(phase, now_ms())
    }

    /// The single control exposed to hotkeys and UI buttons:
    /// running pauses, paused-with-time-left resumes, exhausted starts.
    pub fn toggle_start_pause(&mut self) -> Event {
        self.toggle_at(now_ms())
    }

    /// Freeze the countdown. No-op if not running.
    pub fn pause(&mut self) -> Option<Event> {
        self.pause_at(now_ms())
    }

    /// Continue from the frozen remaining time.
    /// No-op if already running or nothing remains.
    pub fn resume(&mut self) -> Option<Event> {
        self.resume_at(now_ms())
    }

    /// Unconditionally return to `Idle`. Completion counters survive.
    pub fn reset(&mut self) -> Event {
        self.phase = Phase::Idle;
        self.running = false;
        self.deadline_ms = None;
        self.remaining_ms = 0;
        self.total_ms = 0;
        Event::TimerReset { at: Utc::now() }
    }

    /// Force completion of the current phase: no notification, no counter
    /// increment, but the same next-phase selection and auto-start logic
    /// as a natural completion.
    pub fn skip(&mut self) -> Event {
        self.skip_at(now_ms())
    }

    /// Recompute remaining time from the deadline, detecting completion.
    ///
    /// This is the sampler body and the sole recovery hook for
    /// sleep/wake and clock changes. Safe to call arbitrarily often, at
    /// arbitrary times, in any state; with the deadline long elapsed it
    /// fires exactly one completion.
    pub fn recalculate(&mut self) -> Option<Event> {
        self.recalculate_at(now_ms())
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn start_at(&mut self, phase: Option<Phase>, now_ms: u64) -> Event {
        let requested = phase.unwrap_or(self.phase);
        self.begin_at(requested, now_ms)
    }

    fn toggle_at(&mut self, now_ms: u64) -> Event {
        if self.running {
            self.pause_at(now_ms)
                .unwrap_or_else(|| self.snapshot())
        } else if self.remaining_ms > 0 {
            self.resume_at(now_ms)
                .unwrap_or_else(|| self.snapshot())
        } else {
            self.start_at(None, now_ms)
        }
    }

    fn pause_at(&mut self, now_ms: u64) -> Option<Event> {
        if !self.running {
            return None;
        }
        if let Some(deadline) = self.deadline_ms.take() {
            self.remaining_ms = deadline.saturating_sub(now_ms);
        }
        self.running = false;
        Some(Event::TimerPaused {
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            at: Utc::now(),
        })
    }

    fn resume_at(&mut self, now_ms: u64) -> Option<Event> {
        if self.running || self.remaining_ms == 0 {
            return None;
        }
        self.deadline_ms = Some(now_ms.saturating_add(self.remaining_ms));
        self.running = true;
        Some(Event::TimerResumed {
            phase: self.phase,
            remaining_ms: self.remaining_ms,
            at: Utc::now(),
        })
    }

    fn skip_at(&mut self, now_ms: u64) -> Event {
        self.complete_at(now_ms, true)
    }

    fn recalculate_at(&mut self, now_ms: u64) -> Option<Event> {
        let deadline = self.deadline_ms?;
        self.remaining_ms = deadline.saturating_sub(now_ms);
        if self.remaining_ms == 0 {
            return Some(self.complete_at(now_ms, false));
        }
        None
    }

    /// Install `phase` with a fresh duration and deadline.
    fn begin_at(&mut self, phase: Phase, now_ms: u64) -> Event {
        let phase = if phase == Phase::Idle { Phase::Focus } else { phase };
        let total = self.settings.timer_settings().duration_ms(phase);
        self.phase = phase;
        self.total_ms = total;
        self.remaining_ms = total;
        self.deadline_ms = Some(now_ms.saturating_add(total));
        self.running = true;
        Event::TimerStarted {
            phase,
            duration_ms: total,
            at: Utc::now(),
        }
    }

    /// End the current phase and install the next one, running or armed
    /// idle, before returning. Clearing the deadline first means a
    /// re-entrant `recalculate` finds nothing left to complete.
    fn complete_at(&mut self, now_ms: u64, skipped: bool) -> Event {
        let completed = self.phase;
        self.deadline_ms = None;
        self.remaining_ms = 0;
        self.running = false;

        if completed == Phase::Focus && !skipped {
            self.focus_completions += 1;
            self.completed_today += 1;
        }

        let settings = self.settings.timer_settings();
        let next = next_after(completed, self.focus_completions, settings.cycles_per_long_break);
        let auto_started = settings.auto_start_next;
        if auto_started {
            self.begin_at(next, now_ms);
        } else {
            // Armed but idle: show the full upcoming duration, ready for a
            // manual start or resume.
            self.phase = next;
            self.total_ms = settings.duration_ms(next);
            self.remaining_ms = self.total_ms;
        }

        Event::PhaseCompleted {
            phase: completed,
            next,
            skipped,
            auto_started,
            at: Utc::now(),
        }
    }
}

pub(super) fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimerSettings;
    use std::sync::Mutex;

    struct TestSettings(Mutex<TimerSettings>);

    impl TestSettings {
        fn shared(settings: TimerSettings) -> Arc<Self> {
            Arc::new(Self(Mutex::new(settings)))
        }

        fn set(&self, settings: TimerSettings) {
            *self.0.lock().unwrap() = settings;
        }
    }

    impl SettingsSource for TestSettings {
        fn timer_settings(&self) -> TimerSettings {
            self.0.lock().unwrap().clone()
        }
    }

    fn settings(auto_start_next: bool) -> TimerSettings {
        TimerSettings {
            focus_ms: 1_500_000,     // 25 min
            short_break_ms: 300_000, // 5 min
            long_break_ms: 900_000,  // 15 min
            cycles_per_long_break: 4,
            auto_start_next,
        }
    }

    fn engine(auto_start_next: bool) -> TimerEngine {
        TimerEngine::new(TestSettings::shared(settings(auto_start_next)))
    }

    #[test]
    fn start_counts_down_from_the_deadline() {
        let mut e = engine(false);
        let event = e.start_at(None, 0);
        assert!(matches!(event, Event::TimerStarted { phase: Phase::Focus, .. }));
        assert!(e.is_running());
        assert_eq!(e.remaining_ms(), 1_500_000);

        assert!(e.recalculate_at(10_000).is_none());
        assert_eq!(e.remaining_ms(), 1_490_000);

        // How many samples ran in between does not matter, only the deadline.
        for _ in 0..50 {
            e.recalculate_at(10_000);
        }
        assert_eq!(e.remaining_ms(), 1_490_000);

        e.recalculate_at(750_000);
        assert!((e.progress() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn recalculate_without_deadline_is_a_no_op() {
        let mut e = engine(false);
        assert!(e.recalculate_at(5_000).is_none());
        assert_eq!(e.phase(), Phase::Idle);

        e.start_at(None, 0);
        e.pause_at(1_000);
        assert!(e.recalculate_at(2_000_000).is_none());
        assert_eq!(e.remaining_ms(), 1_499_000);
    }

    #[test]
    fn deep_overshoot_fires_exactly_one_completion() {
        let mut e = engine(false);
        e.start_at(None, 0);

        // Ten focus durations pass with nothing sampling.
        let event = e.recalculate_at(15_000_000);
        assert!(matches!(
            event,
            Some(Event::PhaseCompleted { phase: Phase::Focus, skipped: false, .. })
        ));
        assert_eq!(e.focus_completions(), 1);
        assert_eq!(e.phase(), Phase::ShortBreak);
        assert!(!e.is_running());

        // The deadline is gone; a second recovery call finds nothing.
        assert!(e.recalculate_at(15_000_000).is_none());
        assert_eq!(e.focus_completions(), 1);
    }

    #[test]
    fn recalculate_is_idempotent() {
        let mut e = engine(false);
        e.start_at(None, 0);
        e.recalculate_at(5_000);
        let remaining = e.remaining_ms();
        let progress = e.progress();
        for _ in 0..10 {
            assert!(e.recalculate_at(5_000).is_none());
        }
        assert_eq!(e.remaining_ms(), remaining);
        assert_eq!(e.progress(), progress);
    }

    #[test]
    fn long_break_every_fourth_focus_completion() {
        let mut e = engine(false);
        let mut now = 0;
        for i in 1..=8u32 {
            e.start_at(Some(Phase::Focus), now);
            now += 1_500_000;
            let event = e.recalculate_at(now).expect("deadline reached");
            let Event::PhaseCompleted { next, .. } = event else {
                panic!("expected PhaseCompleted");
            };
            if i % 4 == 0 {
                assert_eq!(next, Phase::LongBreak, "completion {i}");
            } else {
                assert_eq!(next, Phase::ShortBreak, "completion {i}");
            }
        }
        assert_eq!(e.focus_completions(), 8);
        assert_eq!(e.completed_today(), 8);
    }

    #[test]
    fn skip_bypasses_counters() {
        let mut e = engine(false);
        e.start_at(Some(Phase::Focus), 0);
        let event = e.skip_at(5_000);
        assert!(matches!(
            event,
            Event::PhaseCompleted {
                phase: Phase::Focus,
                next: Phase::ShortBreak,
                skipped: true,
                ..
            }
        ));
        assert_eq!(e.focus_completions(), 0);
        assert_eq!(e.completed_today(), 0);
    }

    #[test]
    fn skip_while_idle_arms_focus() {
        let mut e = engine(false);
        let event = e.skip_at(0);
        assert!(matches!(
            event,
            Event::PhaseCompleted { phase: Phase::Idle, next: Phase::Focus, skipped: true, .. }
        ));
        assert_eq!(e.phase(), Phase::Focus);
        assert!(!e.is_running());
        assert_eq!(e.remaining_ms(), 1_500_000);
        assert_eq!(e.completed_today(), 0);
    }

    #[test]
    fn pause_freezes_remaining_across_wall_clock_time() {
        let mut e = engine(false);
        e.start_at(None, 0);
        e.pause_at(10_000);
        assert!(!e.is_running());
        assert_eq!(e.remaining_ms(), 1_490_000);

        // 100 s of wall-clock time pass while paused.
        assert!(e.recalculate_at(110_000).is_none());
        assert_eq!(e.remaining_ms(), 1_490_000);

        e.resume_at(110_000);
        assert!(e.is_running());
        assert_eq!(e.remaining_ms(), 1_490_000);
        e.recalculate_at(111_000);
        assert_eq!(e.remaining_ms(), 1_489_000);
    }

    #[test]
    fn pause_and_resume_preconditions() {
        let mut e = engine(false);
        assert!(e.pause_at(0).is_none());

        e.start_at(None, 0);
        assert!(e.resume_at(0).is_none()); // already running

        e.reset();
        assert!(e.resume_at(0).is_none()); // nothing to resume
    }

    #[test]
    fn reset_returns_to_idle_but_keeps_counters() {
        let mut e = engine(false);
        e.start_at(Some(Phase::Focus), 0);
        e.recalculate_at(1_500_000);
        assert_eq!(e.focus_completions(), 1);

        e.reset();
        assert_eq!(e.phase(), Phase::Idle);
        assert!(!e.is_running());
        assert_eq!(e.remaining_ms(), 0);
        assert_eq!(e.progress(), 0.0);
        assert_eq!(e.focus_completions(), 1);
        assert_eq!(e.completed_today(), 1);
    }

    #[test]
    fn toggle_cycles_start_pause_resume() {
        let mut e = engine(false);
        assert!(matches!(e.toggle_at(0), Event::TimerStarted { phase: Phase::Focus, .. }));
        assert!(matches!(e.toggle_at(10_000), Event::TimerPaused { .. }));
        assert!(matches!(e.toggle_at(20_000), Event::TimerResumed { .. }));
        assert_eq!(e.remaining_ms(), 1_490_000);
    }

    #[test]
    fn start_while_running_restarts_from_full_duration() {
        let mut e = engine(false);
        e.start_at(None, 0);
        e.recalculate_at(600_000);
        assert_eq!(e.remaining_ms(), 900_000);

        e.start_at(None, 600_000);
        assert_eq!(e.phase(), Phase::Focus);
        assert_eq!(e.remaining_ms(), 1_500_000);
    }

    #[test]
    fn auto_start_installs_and_runs_the_next_phase() {
        let mut e = engine(true);
        e.start_at(None, 0);
        let event = e.recalculate_at(1_500_000).expect("deadline reached");
        assert!(matches!(event, Event::PhaseCompleted { auto_started: true, .. }));
        assert_eq!(e.phase(), Phase::ShortBreak);
        assert!(e.is_running());
        assert_eq!(e.remaining_ms(), 300_000);

        // The break counts down from its own deadline.
        e.recalculate_at(1_600_000);
        assert_eq!(e.remaining_ms(), 200_000);
    }

    #[test]
    fn duration_changes_apply_at_the_next_phase_start() {
        let source = TestSettings::shared(settings(false));
        let mut e = TimerEngine::new(source.clone());
        e.start_at(Some(Phase::Focus), 0);

        let mut changed = settings(false);
        changed.focus_ms = 600_000;
        source.set(changed);

        // The active phase keeps its original deadline.
        e.recalculate_at(100_000);
        assert_eq!(e.remaining_ms(), 1_400_000);

        e.start_at(Some(Phase::Focus), 200_000);
        assert_eq!(e.remaining_ms(), 600_000);
    }

    #[test]
    fn zero_duration_phase_completes_on_the_next_sample() {
        let source = TestSettings::shared(TimerSettings {
            focus_ms: 0,
            ..settings(false)
        });
        let mut e = TimerEngine::new(source);
        e.start_at(None, 0);
        assert_eq!(e.remaining_ms(), 0);

        let event = e.recalculate_at(0).expect("immediate completion");
        assert!(matches!(
            event,
            Event::PhaseCompleted { phase: Phase::Focus, skipped: false, .. }
        ));
        assert_eq!(e.phase(), Phase::ShortBreak);
    }

    #[test]
    fn snapshot_reflects_state() {
        let mut e = engine(false);
        e.start_at(None, 0);
        e.recalculate_at(750_000);

        let Event::StateSnapshot {
            phase,
            running,
            remaining_ms,
            total_ms,
            progress,
            ..
        } = e.snapshot()
        else {
            panic!("expected StateSnapshot");
        };
        assert_eq!(phase, Phase::Focus);
        assert!(running);
        assert_eq!(remaining_ms, 750_000);
        assert_eq!(total_ms, 1_500_000);
        assert!((progress - 0.5).abs() < 1e-9);
    }
}
