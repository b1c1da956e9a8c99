use console::style;
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Resolution of the progress bar
const GAUGE_SCALE: u64 = 1000;

/// Receives live progress for the job being processed
pub trait ProgressDisplay: Send + Sync {
    /// Advance the activity indicator
    fn pulse(&self);

    /// Show `status` with an estimated completion fraction; values above 1 are allowed
    fn show(&self, status: &str, fraction: f64);

    /// Remove the progress display
    fn hide(&self);
}

/// Receives plain status and error lines
pub trait LogSink: Send + Sync {
    fn status(&self, line: &str);

    fn error(&self, line: &str);
}

/// Terminal output: an indicatif gauge plus styled log lines printed above it
pub struct TerminalConsole {
    bar: Mutex<Option<ProgressBar>>,
    draw: bool,
}

impl TerminalConsole {
    /// Create a console; with `draw` false the gauge is never rendered
    pub fn new(draw: bool) -> Self {
        Self {
            bar: Mutex::new(None),
            draw,
        }
    }

    fn bar(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn create_bar(&self) -> ProgressBar {
        let target = if self.draw {
            ProgressDrawTarget::stderr()
        } else {
            ProgressDrawTarget::hidden()
        };
        let bar = ProgressBar::with_draw_target(Some(GAUGE_SCALE), target);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{bar:40.cyan/blue}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        bar
    }

    /// Print a line without tearing the gauge
    fn print(&self, line: String) {
        match self.bar().as_ref() {
            Some(bar) => bar.suspend(|| println!("{}", line)),
            None => println!("{}", line),
        }
    }
}

impl Default for TerminalConsole {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ProgressDisplay for TerminalConsole {
    fn pulse(&self) {
        if let Some(bar) = self.bar().as_ref() {
            bar.tick();
        }
    }

    fn show(&self, status: &str, fraction: f64) {
        let mut guard = self.bar();
        let bar = guard.get_or_insert_with(|| self.create_bar());
        let position = (fraction.clamp(0.0, 1.0) * GAUGE_SCALE as f64).round() as u64;
        bar.set_position(position);
        bar.set_message(style(status).green().bold().to_string());
    }

    fn hide(&self) {
        if let Some(bar) = self.bar().take() {
            bar.finish_and_clear();
        }
    }
}

impl LogSink for TerminalConsole {
    fn status(&self, line: &str) {
        tracing::info!("{}", line);
        self.print(style(line).bold().to_string());
    }

    fn error(&self, line: &str) {
        tracing::error!("{}", line);
        self.print(style(line).red().to_string());
    }
}
