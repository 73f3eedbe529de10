//! Session configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-deployment reconnect settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Whether disconnected sessions are held at all. When false a
    /// disconnect tears the session down immediately.
    pub enabled: bool,
    /// How long a disconnected session stays warm
    pub timeout: Duration,
    /// Maximum number of messages waiting for a window slot; 0 is unbounded
    pub send_queue_capacity: usize,
    /// Received messages that may go unacknowledged before an ack is forced
    pub max_delayed_acks: u32,
    /// Maximum number of unacknowledged messages in flight
    pub send_window: usize,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timeout: Duration::from_secs(5),
            send_queue_capacity: 5000,
            max_delayed_acks: 16,
            send_window: 32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: ReconnectConfig =
            serde_json::from_str(r#"{"enabled":false,"send_window":5}"#).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.send_window, 5);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.send_queue_capacity, 5000);
        assert_eq!(config.max_delayed_acks, 16);
    }
}
