//! Task options: retry policy, execution progress, and caller metadata.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Retry and timeout settings applied to a task's action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryOption {
    /// Total number of attempts, including the first.
    #[serde(default = "default_maximum_attempts")]
    pub maximum_attempts: u32,

    /// Delay before the first retry.
    #[serde(default = "default_attempt_delay_ms")]
    pub attempt_delay_ms: u64,

    /// Per-attempt timeout. `None` means no timeout.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    /// Double the delay after every retry.
    #[serde(default)]
    pub exponential_backoff: bool,
}

fn default_maximum_attempts() -> u32 {
    1
}

fn default_attempt_delay_ms() -> u64 {
    1000
}

impl Default for RetryOption {
    fn default() -> Self {
        Self {
            maximum_attempts: default_maximum_attempts(),
            attempt_delay_ms: default_attempt_delay_ms(),
            timeout_ms: None,
            exponential_backoff: false,
        }
    }
}

/// Progress bookkeeping for a task or workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionState {
    /// Percentage in `0..=100`.
    pub progress: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_executed_time: Option<DateTime<Utc>>,
}

impl ExecutionState {
    /// Record progress, clamped to 100, and stamp the execution time.
    pub fn record(&mut self, percent: u8) {
        self.progress = percent.min(100);
        self.last_executed_time = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskConfig {
    #[serde(default)]
    pub retry: RetryOption,
    #[serde(default)]
    pub execution: ExecutionState,
}

/// Who created the task or workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Caller {
    pub name: String,
    pub address: String,
}

impl Default for Caller {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            address: "Unknown".to_string(),
        }
    }
}

/// Diagnostic metadata attached to tasks and workflows.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default)]
    pub caller: Caller,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_info: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_option_defaults() {
        let opt = RetryOption::default();
        assert_eq!(opt.maximum_attempts, 1);
        assert_eq!(opt.attempt_delay_ms, 1000);
        assert!(opt.timeout_ms.is_none());
        assert!(!opt.exponential_backoff);
    }

    #[test]
    fn test_retry_option_partial_deserialize() {
        let opt: RetryOption = serde_json::from_str(r#"{"maximum_attempts": 3}"#).unwrap();
        assert_eq!(opt.maximum_attempts, 3);
        assert_eq!(opt.attempt_delay_ms, 1000);
    }

    #[test]
    fn test_execution_state_record_clamps() {
        let mut state = ExecutionState::default();
        assert!(state.last_executed_time.is_none());

        state.record(150);
        assert_eq!(state.progress, 100);
        assert!(state.last_executed_time.is_some());
    }

    #[test]
    fn test_metadata_default_caller() {
        let meta = Metadata::default();
        assert_eq!(meta.caller.name, "Unknown");
        assert_eq!(meta.caller.address, "Unknown");
    }
}
