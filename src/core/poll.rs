//! Deadline-bounded polling
//!
//! Every wait primitive in the crate is a loop of "check, then [`Poller::wait`]"
//! guarded by [`Poller::expired`]. Time comes from `tokio::time`, so tests can
//! drive waits with a paused clock.

use std::time::Duration;
use tokio::time::Instant;

/// Deadline used when `now + timeout` does not fit in an `Instant`
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Poll interval and deadline for one wait
#[derive(Debug, Clone, Copy)]
pub struct Poller {
    interval: Duration,
    deadline: Instant,
}

impl Poller {
    /// Start a wait of `timeout`, checking every `interval`
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        let now = Instant::now();
        Self {
            interval,
            deadline: now.checked_add(timeout).unwrap_or(now + FAR_FUTURE),
        }
    }

    /// Whether the deadline has passed
    pub fn expired(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline
    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Sleep one interval, never past the deadline
    pub async fn wait(&self) {
        let pause = self.interval.min(self.remaining());
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
}
