//! Bounded fixed-interval polling.
//!
//! Every wait loop in the lifecycle services observes through
//! [`Deadline::bounded`], then calls [`Deadline::tick`]. Neither outlives the
//! deadline, and both return as soon as the cancellation token fires.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::application::ports::Clock;
use crate::domain::PollPolicy;

/// Clock, cancellation and poll policies shared by one invocation.
pub struct WaitContext<'a, C: Clock> {
    pub clock: &'a C,
    pub cancel: &'a CancellationToken,
    /// Instance state waits (running, stopped, terminated).
    pub instance: PollPolicy,
    pub bootstrap: PollPolicy,
}

/// Result of waiting out one poll interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// Slept; observe again.
    Continue,
    /// The deadline had already passed.
    Expired,
    /// The caller cancelled.
    Cancelled,
}

pub struct Deadline<'a, C: Clock> {
    clock: &'a C,
    started: Instant,
    at: Instant,
    interval: Duration,
}

impl<'a, C: Clock> Deadline<'a, C> {
    pub fn start(clock: &'a C, policy: PollPolicy) -> Self {
        let started = clock.now();
        Self {
            clock,
            started,
            at: started + policy.timeout,
            interval: policy.interval,
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_duration_since(self.started)
    }

    /// Run one observation, abandoning it when the caller cancels or the
    /// deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns [`Tick::Cancelled`] or [`Tick::Expired`] when the observation
    /// was abandoned.
    pub async fn bounded<F: Future>(
        &self,
        cancel: &CancellationToken,
        observe: F,
    ) -> Result<F::Output, Tick> {
        let remaining = self.at.saturating_duration_since(self.clock.now());
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Tick::Cancelled),
            out = observe => Ok(out),
            () = self.clock.sleep(remaining) => Err(Tick::Expired),
        }
    }

    /// Sleep for one interval, clamped to the time remaining.
    pub async fn tick(&self, cancel: &CancellationToken) -> Tick {
        if cancel.is_cancelled() {
            return Tick::Cancelled;
        }
        let remaining = self.at.saturating_duration_since(self.clock.now());
        if remaining.is_zero() {
            return Tick::Expired;
        }
        tokio::select! {
            () = cancel.cancelled() => Tick::Cancelled,
            () = self.clock.sleep(self.interval.min(remaining)) => Tick::Continue,
        }
    }
}
