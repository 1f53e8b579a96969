//! Foreground timer: renders a status line and maps keys to engine
//! operations. This is the reference display surface for the engine; it
//! polls snapshots at its own cadence rather than being pushed updates.

use std::io::{self, Write};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use clap::Args;
use crossterm::event::{self, Event as TermEvent, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use pomobar_core::{Config, Notifier, Phase, TimerService};

/// Display refresh and key poll cadence.
const POLL_INTERVAL: Duration = Duration::from_millis(200);

#[derive(Args)]
pub struct RunOpts {
    /// Focus length in minutes (overrides config)
    #[arg(long)]
    focus: Option<u64>,
    /// Short break length in minutes (overrides config)
    #[arg(long)]
    short_break: Option<u64>,
    /// Long break length in minutes (overrides config)
    #[arg(long)]
    long_break: Option<u64>,
    /// Focus phases per long break (overrides config)
    #[arg(long)]
    cycles: Option<u32>,
    /// Start the next phase automatically (overrides config)
    #[arg(long)]
    auto_start: Option<bool>,
    /// Phase to start with
    #[arg(long, value_enum, default_value = "focus")]
    phase: StartPhase,
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum StartPhase {
    Focus,
    ShortBreak,
    LongBreak,
}

impl From<StartPhase> for Phase {
    fn from(phase: StartPhase) -> Self {
        match phase {
            StartPhase::Focus => Phase::Focus,
            StartPhase::ShortBreak => Phase::ShortBreak,
            StartPhase::LongBreak => Phase::LongBreak,
        }
    }
}

/// Prints completion banners to the terminal.
///
/// Raw mode is active while the control loop runs, so lines end with
/// `\r\n` explicitly.
struct TerminalNotifier {
    enabled: bool,
    sound: bool,
}

impl Notifier for TerminalNotifier {
    fn phase_completed(&self, phase: Phase) {
        if !self.enabled {
            return;
        }
        let message = match phase {
            Phase::Focus => "Focus complete. Time for a break.",
            Phase::ShortBreak => "Break over. Back to focus.",
            Phase::LongBreak => "Long break over. Start a fresh session.",
            Phase::Idle => return,
        };
        let bell = if self.sound { "\x07" } else { "" };
        let mut out = io::stdout();
        let _ = write!(out, "{bell}\r\n{message}\r\n");
        let _ = out.flush();
    }
}

pub fn run(opts: RunOpts) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = Config::load_or_default();
    if let Some(minutes) = opts.focus {
        config.timer.focus_minutes = minutes;
    }
    if let Some(minutes) = opts.short_break {
        config.timer.short_break_minutes = minutes;
    }
    if let Some(minutes) = opts.long_break {
        config.timer.long_break_minutes = minutes;
    }
    if let Some(cycles) = opts.cycles {
        config.timer.cycles_per_long_break = cycles;
    }
    if let Some(auto) = opts.auto_start {
        config.timer.auto_start_next = auto;
    }

    let notifier = Arc::new(TerminalNotifier {
        enabled: config.notifications.enabled,
        sound: config.notifications.sound,
    });
    let settings = Arc::new(RwLock::new(config));

    // The sampler task lives on this runtime; the control loop itself
    // stays synchronous on the main thread.
    let runtime = tokio::runtime::Runtime::new()?;
    let _guard = runtime.enter();

    let service = TimerService::new(settings, notifier);
    service.start(Some(opts.phase.into()));

    terminal::enable_raw_mode()?;
    let result = control_loop(&service);
    terminal::disable_raw_mode()?;
    println!();
    result
}

fn control_loop(service: &TimerService) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        render(service)?;
        if !event::poll(POLL_INTERVAL)? {
            continue;
        }
        let TermEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Char(' ') => {
                service.toggle_start_pause();
            }
            KeyCode::Char('s') => {
                service.skip();
            }
            KeyCode::Char('r') => {
                service.reset();
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                return Ok(());
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                return Ok(());
            }
            _ => {}
        }
    }
}

fn render(service: &TimerService) -> io::Result<()> {
    let phase = service.phase();
    let remaining = service.remaining_ms();
    let progress = service.progress();
    let state = if service.is_running() {
        "running"
    } else if phase == Phase::Idle {
        "idle"
    } else {
        "paused"
    };

    let mut out = io::stdout();
    write!(
        out,
        "\r{:<11} {:>8}  [{}] {:>3.0}%  {:<7}  today {:>2}   space pause/resume, s skip, r reset, q quit ",
        phase.label(),
        format_clock(remaining),
        progress_bar(progress, 20),
        progress * 100.0,
        state,
        service.completed_today(),
    )?;
    out.flush()
}

fn format_clock(remaining_ms: u64) -> String {
    let total_secs = remaining_ms.div_ceil(1000);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let secs = total_secs % 60;
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes:02}:{secs:02}")
    }
}

fn progress_bar(progress: f64, width: usize) -> String {
    let filled = ((progress * width as f64).round() as usize).min(width);
    format!("{}{}", "#".repeat(filled), "-".repeat(width - filled))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clock_rounds_up_to_the_displayed_second() {
        assert_eq!(format_clock(0), "00:00");
        assert_eq!(format_clock(1), "00:01");
        assert_eq!(format_clock(1_500_000), "25:00");
        assert_eq!(format_clock(1_499_001), "25:00");
        assert_eq!(format_clock(3_600_000), "1:00:00");
    }

    #[test]
    fn progress_bar_fills_with_progress() {
        assert_eq!(progress_bar(0.0, 10), "----------");
        assert_eq!(progress_bar(0.5, 10), "#####-----");
        assert_eq!(progress_bar(1.0, 10), "##########");
        // Clamped input never overflows the width.
        assert_eq!(progress_bar(1.2, 10), "##########");
    }
}
