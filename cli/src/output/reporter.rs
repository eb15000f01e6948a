//! `TerminalReporter`: presentation-layer implementation of `ProgressReporter`.
//!
//! Every line goes through one `Mutex` that also owns the active spinner, so
//! progress lines and the spinner never interleave on the terminal.

use std::fmt::Display;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indicatif::ProgressBar;
use owo_colors::OwoColorize as _;

use crate::application::ports::ProgressReporter;
use crate::output::{OutputContext, progress};

/// Terminal progress reporter that wraps an `OutputContext`.
///
/// - `step()` prints `"  → {message}"`
/// - `success()` prints `"  ✓ {message}"` and ends any spinner
/// - `warn()` prints `"  ! {message}"` and ends any spinner
/// - `waiting()` starts a spinner on a TTY, otherwise behaves like `step()`
///
/// All output is suppressed when `ctx.quiet`.
pub struct TerminalReporter<'a> {
    ctx: &'a OutputContext,
    spinner: Mutex<Option<ProgressBar>>,
}

impl<'a> TerminalReporter<'a> {
    /// Create a new `TerminalReporter` wrapping the given output context.
    #[must_use]
    pub fn new(ctx: &'a OutputContext) -> Self {
        Self {
            ctx,
            spinner: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.spinner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn line(&self, guard: &Option<ProgressBar>, symbol: impl Display, message: &str) {
        let line = format!("  {symbol} {message}");
        match guard {
            Some(pb) => pb.println(line),
            None => println!("{line}"),
        }
    }
}

impl ProgressReporter for TerminalReporter<'_> {
    fn step(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let guard = self.lock();
        self.line(&guard, "→".style(self.ctx.styles.info), message);
    }

    fn success(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let mut guard = self.lock();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        self.line(&guard, "✓".style(self.ctx.styles.success), message);
    }

    fn warn(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let mut guard = self.lock();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        self.line(&guard, "!".style(self.ctx.styles.warning), message);
    }

    fn waiting(&self, message: &str) {
        if self.ctx.quiet {
            return;
        }
        let mut guard = self.lock();
        if let Some(pb) = guard.take() {
            pb.finish_and_clear();
        }
        if self.ctx.show_progress() {
            *guard = Some(progress::spinner(message));
        } else {
            self.line(&guard, "→".style(self.ctx.styles.info), message);
        }
    }
}

impl Drop for TerminalReporter<'_> {
    fn drop(&mut self) {
        if let Some(pb) = self.lock().take() {
            pb.finish_and_clear();
        }
    }
}
