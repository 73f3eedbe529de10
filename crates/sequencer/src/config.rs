//! Sequencer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Transaction sequencer configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// How long a departed node may hold outstanding transactions before it
    /// is reported as stalling the low watermark
    pub departure_timeout: Duration,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            departure_timeout: Duration::from_secs(120),
        }
    }
}
