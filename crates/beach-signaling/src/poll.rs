//! Fetch cadence driven by caller-supplied ticks.
//!
//! [`PollScheduler::tick`] accumulates elapsed time and hands out at most one
//! [`FetchTicket`] at a time. The ticket clears the in-flight flag when it is
//! completed or dropped; a ticket that outlives its scheduler does nothing.

use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Poll again on the next regular interval.
    RetryImmediately,
    /// Wait at least this long before the next poll.
    RetryAfter(Duration),
    /// Stop polling until [`PollScheduler::resume`].
    GiveUp,
}

pub trait RetryPolicy: Send + Sync {
    /// `consecutive_failures` counts the failure being reported, so it is at
    /// least 1.
    fn on_failure(&self, consecutive_failures: u32) -> RetryDecision;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysRetry;

impl RetryPolicy for AlwaysRetry {
    fn on_failure(&self, _consecutive_failures: u32) -> RetryDecision {
        RetryDecision::RetryImmediately
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy for ExponentialBackoff {
    fn on_failure(&self, consecutive_failures: u32) -> RetryDecision {
        let exponent = consecutive_failures.saturating_sub(1).min(16);
        let delay = self
            .base
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max);
        RetryDecision::RetryAfter(delay)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct GiveUpAfter(pub u32);

impl RetryPolicy for GiveUpAfter {
    fn on_failure(&self, consecutive_failures: u32) -> RetryDecision {
        if consecutive_failures >= self.0 {
            RetryDecision::GiveUp
        } else {
            RetryDecision::RetryImmediately
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Delivered,
    Empty,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollState {
    pub elapsed: Duration,
    pub interval: Duration,
    /// Accumulated time required before the next fetch; the interval unless a
    /// retry policy asked for a longer pause.
    pub threshold: Duration,
    pub in_flight: bool,
    pub consecutive_failures: u32,
    pub halted: bool,
    pub fetches_issued: u64,
}

impl PollState {
    fn new(interval: Duration) -> Self {
        Self {
            elapsed: Duration::ZERO,
            interval,
            threshold: interval,
            in_flight: false,
            consecutive_failures: 0,
            halted: false,
            fetches_issued: 0,
        }
    }
}

pub struct PollScheduler {
    state: Arc<Mutex<PollState>>,
    policy: Arc<dyn RetryPolicy>,
}

impl PollScheduler {
    pub fn new(interval: Duration) -> Self {
        Self::with_policy(interval, Arc::new(AlwaysRetry))
    }

    pub fn with_policy(interval: Duration, policy: Arc<dyn RetryPolicy>) -> Self {
        Self {
            state: Arc::new(Mutex::new(PollState::new(interval))),
            policy,
        }
    }

    pub fn tick(&self, elapsed: Duration) -> Option<FetchTicket> {
        let mut state = self.state.lock();
        if state.halted {
            return None;
        }
        state.elapsed = state.elapsed.saturating_add(elapsed);
        if state.elapsed < state.threshold {
            return None;
        }
        state.elapsed = Duration::ZERO;
        if state.in_flight {
            tracing::trace!(
                target = "beach_signaling::poll",
                "previous fetch still in flight; skipping poll"
            );
            return None;
        }
        state.in_flight = true;
        state.fetches_issued += 1;
        Some(FetchTicket {
            state: Arc::downgrade(&self.state),
            policy: Arc::clone(&self.policy),
            finished: false,
        })
    }

    pub fn in_flight(&self) -> bool {
        self.state.lock().in_flight
    }

    pub fn is_halted(&self) -> bool {
        self.state.lock().halted
    }

    pub fn snapshot(&self) -> PollState {
        self.state.lock().clone()
    }

    /// Restart polling after the retry policy gave up.
    pub fn resume(&self) {
        let mut state = self.state.lock();
        state.halted = false;
        state.consecutive_failures = 0;
        state.threshold = state.interval;
        state.elapsed = Duration::ZERO;
    }
}

/// Permission for exactly one outstanding fetch.
pub struct FetchTicket {
    state: Weak<Mutex<PollState>>,
    policy: Arc<dyn RetryPolicy>,
    finished: bool,
}

impl FetchTicket {
    /// Record the fetch's terminal outcome. Returns the retry decision taken
    /// for a failure, or `None` for success, empty polls, and completions that
    /// arrive after the scheduler is gone.
    pub fn complete(mut self, outcome: FetchOutcome) -> Option<RetryDecision> {
        self.finish(Some(outcome))
    }

    fn finish(&mut self, outcome: Option<FetchOutcome>) -> Option<RetryDecision> {
        if self.finished {
            return None;
        }
        self.finished = true;
        let Some(state) = self.state.upgrade() else {
            tracing::trace!(
                target = "beach_signaling::poll",
                "fetch completed after teardown; ignoring"
            );
            return None;
        };
        let mut state = state.lock();
        state.in_flight = false;
        match outcome {
            Some(FetchOutcome::Delivered) | Some(FetchOutcome::Empty) => {
                state.consecutive_failures = 0;
                state.threshold = state.interval;
                None
            }
            Some(FetchOutcome::Failed) => {
                state.consecutive_failures = state.consecutive_failures.saturating_add(1);
                let decision = self.policy.on_failure(state.consecutive_failures);
                match decision {
                    RetryDecision::RetryImmediately => state.threshold = state.interval,
                    RetryDecision::RetryAfter(delay) => {
                        state.elapsed = Duration::ZERO;
                        state.threshold = delay.max(state.interval);
                    }
                    RetryDecision::GiveUp => state.halted = true,
                }
                Some(decision)
            }
            None => None,
        }
    }
}

impl Drop for FetchTicket {
    fn drop(&mut self) {
        self.finish(None);
    }
}
