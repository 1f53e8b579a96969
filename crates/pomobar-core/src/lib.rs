//! # Pomobar Core Library
//!
//! Core logic for Pomobar, a work/break interval timer in the Pomodoro
//! style. The library is UI-agnostic: the CLI binary, or any other host,
//! drives the same engine operations and polls the same state snapshots.
//!
//! ## Architecture
//!
//! - **Timer engine**: a wall-clock state machine. Remaining time is always
//!   recomputed from an absolute deadline, never accumulated from ticks, so
//!   the countdown stays accurate across suspend/resume and clock changes
//! - **Timer service**: wraps the engine with the periodic sampler task and
//!   dispatches completion notifications outside the state lock
//! - **Configuration**: TOML preferences, re-read at every phase start so
//!   edits take effect on the next transition
//!
//! ## Key Components
//!
//! - [`TimerEngine`]: phase state machine and elapsed-time recovery
//! - [`TimerService`]: sampler lifecycle and notifier orchestration
//! - [`Config`]: application configuration management
//! - [`Notifier`]: completion side-effect interface

pub mod config;
pub mod error;
pub mod events;
pub mod notify;
pub mod timer;

pub use config::{Config, SettingsSource, TimerSettings};
pub use error::{ConfigError, CoreError};
pub use events::Event;
pub use notify::{Notifier, NullNotifier};
pub use timer::{Phase, TimerEngine, TimerService};
