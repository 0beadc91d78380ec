//! Engine configuration types.
//!
//! [`EngineConfig`] is deserialized from `config.toml` in the data directory.
//! Every field has a default so a partial (or missing) file is valid.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::task::RetryOption;

/// Process-wide engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Interval between pool heartbeats for deferred workflows.
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,

    /// Buffer size of each task/workflow event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,

    /// Retry settings the CLI gives the tasks it builds.
    #[serde(default)]
    pub default_retry: RetryOption,
}

fn default_heartbeat_interval_ms() -> u64 {
    5000
}

fn default_event_capacity() -> usize {
    64
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            event_capacity: default_event_capacity(),
            default_retry: RetryOption::default(),
        }
    }
}

impl EngineConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms.max(1))
    }
}
