//! Bounded retries for remote writes.

use std::future::Future;
use std::time::Duration;

use crate::model::error::DatabaseResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backoff {
    /// `step × attempt`.
    Linear(Duration),
    /// `min(base × 2^attempt, cap)`.
    Exponential { base: Duration, cap: Duration },
}

impl Backoff {
    /// Wait after the failed attempt number `attempt` (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Backoff::Linear(step) => step.saturating_mul(attempt),
            Backoff::Exponential { base, cap } => {
                let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(cap)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Attempting(u32),
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn linear(max_attempts: u32, step: Duration) -> Self {
        Self::new(max_attempts, Backoff::Linear(step))
    }

    pub fn exponential(max_attempts: u32, base: Duration, cap: Duration) -> Self {
        Self::new(max_attempts, Backoff::Exponential { base, cap })
    }

    pub fn from_config(retry: &crate::config::Retry) -> (Self, Self) {
        (
            Self::linear(retry.max_attempts(), retry.backoff()),
            Self::exponential(retry.max_attempts(), retry.backoff(), retry.backoff_cap()),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Backoff {
        self.backoff
    }

    /// Runs `attempt` until it succeeds or the attempts run out, sleeping
    /// between failures. Permanent errors end the loop at once.
    pub async fn run<T, F, Fut>(&self, operation: &'static str, mut attempt: F) -> DatabaseResult<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = DatabaseResult<T>>,
    {
        let mut retry = Retry::new(*self);
        loop {
            let n = retry.attempt();
            let outcome = attempt(n).await;

            match &outcome {
                Ok(_) => tracing::debug!(operation, attempt = n, "succeeded"),
                Err(e) => tracing::warn!(operation, attempt = n, "attempt {n} failed: {e}"),
            }

            match retry.record(&outcome) {
                Some(delay) => tokio::time::sleep(delay).await,
                None => return outcome,
            }
        }
    }
}

/// `Attempting(1)` → … → `Succeeded` | `Failed`.
#[derive(Debug, Clone)]
pub struct Retry {
    policy: RetryPolicy,
    state: RetryState,
}

impl Retry {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            state: RetryState::Attempting(1),
        }
    }

    pub fn state(&self) -> RetryState {
        self.state
    }

    /// Number of the current (or last) attempt.
    pub fn attempt(&self) -> u32 {
        match self.state {
            RetryState::Attempting(n) => n,
            _ => self.policy.max_attempts,
        }
    }

    /// Records the outcome of the current attempt and returns how long to
    /// wait before the next one; `None` once the machine is done.
    pub fn record<T>(&mut self, outcome: &DatabaseResult<T>) -> Option<Duration> {
        let RetryState::Attempting(n) = self.state else {
            return None;
        };

        match outcome {
            Ok(_) => {
                self.state = RetryState::Succeeded;
                None
            }
            Err(e) if e.is_permanent() || n >= self.policy.max_attempts => {
                self.state = RetryState::Failed;
                None
            }
            Err(_) => {
                self.state = RetryState::Attempting(n + 1);
                Some(self.policy.backoff.delay(n))
            }
        }
    }
}
