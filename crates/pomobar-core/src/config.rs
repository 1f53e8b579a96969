//! TOML-based application configuration.
//!
//! Stores the timer durations, the long-break cadence, the auto-start
//! preference, and notification settings. Configuration is stored at
//! `~/.config/pomobar/config.toml`.
//!
//! The engine does not hold onto these values: it asks its
//! [`SettingsSource`] for a fresh [`TimerSettings`] at every phase start,
//! so an edit takes effect on the next transition.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::ConfigError;
use crate::timer::Phase;

/// Timer durations and cadence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_focus_minutes")]
    pub focus_minutes: u64,
    #[serde(default = "default_short_break_minutes")]
    pub short_break_minutes: u64,
    #[serde(default = "default_long_break_minutes")]
    pub long_break_minutes: u64,
    /// Completed focus phases before a long break replaces the short one.
    #[serde(default = "default_cycles_per_long_break")]
    pub cycles_per_long_break: u32,
    /// Start the next phase immediately when one completes.
    #[serde(default = "default_true")]
    pub auto_start_next: bool,
}

/// Notification preferences, consumed by notifier implementations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_true")]
    pub sound: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/pomobar/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub timer: TimerConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
}

// Default functions
fn default_focus_minutes() -> u64 {
    25
}
fn default_short_break_minutes() -> u64 {
    5
}
fn default_long_break_minutes() -> u64 {
    15
}
fn default_cycles_per_long_break() -> u32 {
    4
}
fn default_true() -> bool {
    true
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            focus_minutes: default_focus_minutes(),
            short_break_minutes: default_short_break_minutes(),
            long_break_minutes: default_long_break_minutes(),
            cycles_per_long_break: default_cycles_per_long_break(),
            auto_start_next: true,
        }
    }
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sound: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timer: TimerConfig::default(),
            notifications: NotificationsConfig::default(),
        }
    }
}

/// Durations resolved to milliseconds, the form the engine consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct TimerSettings {
    pub focus_ms: u64,
    pub short_break_ms: u64,
    pub long_break_ms: u64,
    pub cycles_per_long_break: u32,
    pub auto_start_next: bool,
}

impl TimerSettings {
    /// Duration of `phase`. `Idle` has none.
    pub fn duration_ms(&self, phase: Phase) -> u64 {
        match phase {
            Phase::Focus => self.focus_ms,
            Phase::ShortBreak => self.short_break_ms,
            Phase::LongBreak => self.long_break_ms,
            Phase::Idle => 0,
        }
    }
}

impl Default for TimerSettings {
    fn default() -> Self {
        Config::default().timer_settings()
    }
}

/// Read-only view the engine polls at every phase start.
pub trait SettingsSource: Send + Sync {
    fn timer_settings(&self) -> TimerSettings;
}

impl SettingsSource for Config {
    fn timer_settings(&self) -> TimerSettings {
        TimerSettings {
            focus_ms: minutes_to_ms(self.timer.focus_minutes),
            short_break_ms: minutes_to_ms(self.timer.short_break_minutes),
            long_break_ms: minutes_to_ms(self.timer.long_break_minutes),
            cycles_per_long_break: self.timer.cycles_per_long_break,
            auto_start_next: self.timer.auto_start_next,
        }
    }
}

/// Lets a host share one mutable config between its UI and a running
/// engine: `Arc<RwLock<Config>>` coerces to `Arc<dyn SettingsSource>`.
impl SettingsSource for RwLock<Config> {
    fn timer_settings(&self) -> TimerSettings {
        match self.read() {
            Ok(guard) => guard.timer_settings(),
            Err(poisoned) => poisoned.into_inner().timer_settings(),
        }
    }
}

/// Saturating so absurd minute values cap out instead of overflowing.
fn minutes_to_ms(minutes: u64) -> u64 {
    minutes.saturating_mul(60).saturating_mul(1000)
}

/// Returns `~/.config/pomobar[-dev]/` based on POMOBAR_ENV.
///
/// Set POMOBAR_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if the config directory cannot be created.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("POMOBAR_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("pomobar-dev")
    } else {
        base_dir.join("pomobar")
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::LoadFailed {
        path: dir.clone(),
        message: e.to_string(),
    })?;
    Ok(dir)
}

impl Config {
    fn path() -> Result<PathBuf, ConfigError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or write and return the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed, or
    /// if the default config cannot be written to disk.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                toml::from_str(&content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written.
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(&Self::path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content).map_err(|e| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Load from disk, returning the default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = key.split('.').try_fold(&json, |node, part| node.get(part))?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by dot-separated key and persist it.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is unknown, the value cannot be parsed
    /// as the existing field's type, or the config cannot be saved.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ConfigError> {
        let mut json =
            serde_json::to_value(&*self).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        json_set(&mut json, key, value)?;
        *self = serde_json::from_value(json).map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: e.to_string(),
        })?;
        self.save()
    }
}

fn json_set(root: &mut serde_json::Value, key: &str, value: &str) -> Result<(), ConfigError> {
    let invalid = |message: String| ConfigError::InvalidValue {
        key: key.to_string(),
        message,
    };

    let (parent_path, leaf) = match key.rsplit_once('.') {
        Some((parent, leaf)) => (Some(parent), leaf),
        None => (None, key),
    };
    let parent = match parent_path {
        Some(path) => path
            .split('.')
            .try_fold(root, |node, part| node.get_mut(part))
            .ok_or_else(|| invalid("unknown key".to_string()))?,
        None => root,
    };
    let fields = parent
        .as_object_mut()
        .ok_or_else(|| invalid("unknown key".to_string()))?;
    let existing = fields
        .get(leaf)
        .ok_or_else(|| invalid("unknown key".to_string()))?;

    let new_value = match existing {
        serde_json::Value::Bool(_) => serde_json::Value::Bool(
            value
                .parse()
                .map_err(|_| invalid(format!("expected a boolean, got '{value}'")))?,
        ),
        serde_json::Value::Number(_) => {
            let n: u64 = value
                .parse()
                .map_err(|_| invalid(format!("expected a number, got '{value}'")))?;
            serde_json::Value::Number(n.into())
        }
        _ => serde_json::Value::String(value.to_string()),
    };
    fields.insert(leaf.to_string(), new_value);
    Ok(())
}
