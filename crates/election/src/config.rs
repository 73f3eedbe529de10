//! Election configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Election configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElectionConfig {
    /// How long a round collects enrollments, and how long a loser waits for
    /// the winner to declare itself
    pub election_timeout: Duration,

    /// Rounds attempted before giving up
    pub max_rounds: u32,

    /// First retry delay
    pub backoff_base: Duration,

    /// Retry delay cap
    pub backoff_max: Duration,

    /// Partition size; a round closes early once this many candidates have
    /// enrolled. 0 means always wait for the deadline.
    pub expected_servers: usize,
}

impl Default for ElectionConfig {
    fn default() -> Self {
        Self {
            election_timeout: Duration::from_secs(5),
            max_rounds: 5,
            backoff_base: Duration::from_millis(100),
            backoff_max: Duration::from_secs(5),
            expected_servers: 0,
        }
    }
}

impl ElectionConfig {
    /// Delay before retry `attempt` (0-based): doubling from `backoff_base`,
    /// capped at `backoff_max`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.backoff_base
            .checked_mul(factor)
            .map_or(self.backoff_max, |delay| delay.min(self.backoff_max))
    }
}
