//! Workflow options.

use serde::{Deserialize, Serialize};

use crate::task::ExecutionState;

/// Execution settings for a workflow.
///
/// `jit = true` runs actions inline when the workflow is invoked. `jit = false`
/// queues the workflow for heartbeat processing and resolves actions by name
/// through its action registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowConfig {
    #[serde(default = "default_jit")]
    pub jit: bool,
    #[serde(default)]
    pub execution: ExecutionState,
}

fn default_jit() -> bool {
    true
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            jit: default_jit(),
            execution: ExecutionState::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jit_defaults_to_true() {
        assert!(WorkflowConfig::default().jit);

        let config: WorkflowConfig = serde_json::from_str("{}").unwrap();
        assert!(config.jit);
        assert_eq!(config.execution.progress, 0);
    }
}
