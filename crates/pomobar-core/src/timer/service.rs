//! Sampler lifecycle and side-effect orchestration around [`TimerEngine`].
//!
//! The service is what a host actually holds: it guards the engine with a
//! mutex, runs the periodic sampler task while the timer is running, and
//! dispatches completion notifications after the lock is released so a
//! notifier is free to call back into the service.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::task::AbortHandle;
use tokio::time::MissedTickBehavior;

use super::engine::{now_ms, TimerEngine};
use super::phase::Phase;
use crate::config::SettingsSource;
use crate::events::Event;
use crate::notify::Notifier;

/// Sampling cadence while the timer is running.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Wall-clock gap between samples above which we assume the host was
/// suspended or its clock was adjusted.
const WAKE_GAP_MS: u64 = 2_000;

/// Shared timer service.
///
/// Cloning is cheap; clones share one engine. Operations may be called
/// from any thread. At most one sampler task exists at a time: every
/// transition to running cancels the previous task before spawning a new
/// one, and the task exits on its own when the engine stops running.
///
/// Sampler tasks are spawned onto the ambient Tokio runtime, so mutating
/// operations must run inside one.
#[derive(Clone)]
pub struct TimerService {
    inner: Arc<Inner>,
}

struct Inner {
    engine: Mutex<TimerEngine>,
    notifier: Arc<dyn Notifier>,
    sampler: Mutex<Option<AbortHandle>>,
    /// Epoch ms of the previous sample, for suspend detection.
    last_sample_ms: AtomicU64,
}

impl Inner {
    fn lock_engine(&self) -> MutexGuard<'_, TimerEngine> {
        match self.engine.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Route natural completions to the notifier. Must be called without
    /// the engine lock held.
    fn dispatch(&self, event: &Event) {
        if let Event::PhaseCompleted { phase, next, skipped: false, .. } = event {
            if *phase != Phase::Idle {
                tracing::info!(completed = %phase, next = %next, "phase completed");
                self.notifier.phase_completed(*phase);
            }
        }
    }
}

impl TimerService {
    pub fn new(settings: Arc<dyn SettingsSource>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            inner: Arc::new(Inner {
                engine: Mutex::new(TimerEngine::new(settings)),
                notifier,
                sampler: Mutex::new(None),
                last_sample_ms: AtomicU64::new(0),
            }),
        }
    }

    // ── Commands ─────────────────────────────────────────────────────

    pub fn start(&self, phase: Option<Phase>) -> Event {
        let event = self.inner.lock_engine().start(phase);
        self.react(&event);
        event
    }

    pub fn toggle_start_pause(&self) -> Event {
        let event = self.inner.lock_engine().toggle_start_pause();
        self.react(&event);
        event
    }

    pub fn pause(&self) -> Option<Event> {
        let event = self.inner.lock_engine().pause();
        if let Some(ref event) = event {
            self.react(event);
        }
        event
    }

    pub fn resume(&self) -> Option<Event> {
        let event = self.inner.lock_engine().resume();
        if let Some(ref event) = event {
            self.react(event);
        }
        event
    }

    pub fn reset(&self) -> Event {
        let event = self.inner.lock_engine().reset();
        self.react(&event);
        event
    }

    pub fn skip(&self) -> Event {
        let event = self.inner.lock_engine().skip();
        self.react(&event);
        event
    }

    /// Inbound hook for wake and clock-change signals. Also safe to call
    /// at any other time; see [`TimerEngine::recalculate`].
    pub fn recalculate(&self) -> Option<Event> {
        let event = self.inner.lock_engine().recalculate();
        if let Some(ref event) = event {
            self.react(event);
        }
        event
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn snapshot(&self) -> Event {
        self.inner.lock_engine().snapshot()
    }

    pub fn phase(&self) -> Phase {
        self.inner.lock_engine().phase()
    }

    pub fn is_running(&self) -> bool {
        self.inner.lock_engine().is_running()
    }

    pub fn remaining_ms(&self) -> u64 {
        self.inner.lock_engine().remaining_ms()
    }

    pub fn progress(&self) -> f64 {
        self.inner.lock_engine().progress()
    }

    pub fn focus_completions(&self) -> u32 {
        self.inner.lock_engine().focus_completions()
    }

    pub fn completed_today(&self) -> u32 {
        self.inner.lock_engine().completed_today()
    }

    // ── Internal ─────────────────────────────────────────────────────

    fn react(&self, event: &Event) {
        self.inner.dispatch(event);
        self.sync_sampler();
    }

    /// Track the engine's running flag: cancel any previous sampler, then
    /// spawn a fresh one if the timer is still running.
    fn sync_sampler(&self) {
        let running = self.is_running();
        let mut slot = match self.inner.sampler.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(handle) = slot.take() {
            handle.abort();
        }
        if running {
            *slot = Some(self.spawn_sampler());
        }
    }

    fn spawn_sampler(&self) -> AbortHandle {
        self.inner.last_sample_ms.store(now_ms(), Ordering::Relaxed);
        // The task holds only a weak reference, so dropping the last
        // service handle lets it wind down on the next tick.
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SAMPLE_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else { break };

                let now = now_ms();
                let prev = inner.last_sample_ms.swap(now, Ordering::Relaxed);
                let gap = now.saturating_sub(prev);
                if gap > WAKE_GAP_MS {
                    tracing::info!(
                        gap_ms = gap,
                        "wall clock jumped between samples, recomputing from deadline"
                    );
                }

                let (event, running) = {
                    let mut engine = inner.lock_engine();
                    let event = engine.recalculate();
                    (event, engine.is_running())
                };
                if let Some(event) = event {
                    inner.dispatch(&event);
                }
                if !running {
                    break;
                }
            }
        });
        task.abort_handle()
    }
}
