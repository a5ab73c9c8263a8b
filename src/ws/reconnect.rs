//! Reconnect backoff and storm throttling.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

const INITIAL_DELAY: Duration = Duration::from_secs(1);
const MAX_RECONNECT_DELAY: Duration = Duration::from_secs(60);
/// Attempts older than this no longer count towards the throttle.
const ATTEMPT_HORIZON: Duration = Duration::from_secs(60);
/// More than this many attempts inside the horizon triggers the throttle.
const MAX_ATTEMPTS_PER_HORIZON: usize = 20;
/// Pause imposed on a throttled caller, regardless of the backoff delay.
pub const THROTTLE_INTERVAL: Duration = Duration::from_secs(60);

/// Backoff state for one connection owner. Not shared between tasks.
#[derive(Debug)]
pub struct ReconnectPolicy {
    delay: Duration,
    attempts: VecDeque<Instant>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconnectPolicy {
    pub fn new() -> Self {
        Self {
            delay: INITIAL_DELAY,
            attempts: VecDeque::new(),
        }
    }

    /// The delay that follows `previous`: doubled, capped at 60s.
    pub fn next_delay(previous: Duration) -> Duration {
        (previous * 2).min(MAX_RECONNECT_DELAY)
    }

    pub fn current_delay(&self) -> Duration {
        self.delay
    }

    /// Move to the next backoff step after a failed attempt.
    pub fn advance(&mut self) -> Duration {
        self.delay = Self::next_delay(self.delay);
        self.delay
    }

    /// Back to the initial delay after a successful connect.
    pub fn reset(&mut self) {
        self.delay = INITIAL_DELAY;
    }

    /// Remember an attempt at `now` and drop attempts older than the horizon.
    pub fn record_attempt(&mut self, now: Instant) {
        self.attempts.push_back(now);
        while let Some(&oldest) = self.attempts.front() {
            if now.saturating_duration_since(oldest) > ATTEMPT_HORIZON {
                self.attempts.pop_front();
            } else {
                break;
            }
        }
    }

    pub fn recent_attempts(&self) -> usize {
        self.attempts.len()
    }

    pub fn should_throttle(&self) -> bool {
        self.attempts.len() > MAX_ATTEMPTS_PER_HORIZON
    }
}
