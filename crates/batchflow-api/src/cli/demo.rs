//! The `data-processing` action used by `bflow run`.
//!
//! Simulates a batch job that needs several polls to finish: every call records
//! progress on the task and answers Pending until the configured number of
//! polls is reached, then answers Success.

use std::collections::HashMap;
use std::sync::Mutex;

use serde_json::{Value, json};

use batchflow_core::{Action, ActionResult, Task, Workflow};
use batchflow_types::error::{EngineError, ErrorKind};
use batchflow_types::response::TaskResponse;

pub const ACTION_NAME: &str = "data-processing";

pub struct DataProcessingAction {
    polls: u32,
    seen: Mutex<HashMap<String, u32>>,
}

impl DataProcessingAction {
    pub fn new(polls: u32) -> Self {
        Self {
            polls: polls.max(1),
            seen: Mutex::new(HashMap::new()),
        }
    }

    /// Advance `task` by one poll.
    pub fn step(&self, task: &Task, payload: Option<&Value>) -> TaskResponse {
        let count = {
            let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
            let count = seen.entry(task.id().to_string()).or_insert(0);
            *count += 1;
            *count
        };

        let percent = (u64::from(count.min(self.polls)) * 100 / u64::from(self.polls)) as u8;
        task.progress(percent);

        if count < self.polls {
            tracing::debug!(task_id = %task.id(), count, polls = self.polls, "batch not ready");
            return TaskResponse::pending();
        }

        let rows = payload
            .and_then(|payload| payload.get("rows"))
            .and_then(Value::as_u64)
            .unwrap_or(0);
        TaskResponse::success().with_result(json!({ "rows_processed": rows, "polls": count }))
    }
}

impl Action for DataProcessingAction {
    fn name(&self) -> &str {
        ACTION_NAME
    }

    async fn execute(
        &self,
        task: &Task,
        _workflow: &Workflow,
        payload: Option<&Value>,
    ) -> ActionResult {
        Ok(self.step(task, payload))
    }

    async fn configure(&mut self, config: &Value) -> Result<(), EngineError> {
        match config.get("polls") {
            None => Ok(()),
            Some(polls) => match polls.as_u64() {
                Some(polls) if polls >= 1 => {
                    self.polls = u32::try_from(polls).unwrap_or(u32::MAX);
                    Ok(())
                }
                _ => Err(EngineError::general(
                    ErrorKind::ValidationFailed,
                    format!("'polls' must be a positive integer, got {polls}"),
                )),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use batchflow_core::Invoker;
    use batchflow_core::action::registry::ActionRegistry;

    use super::*;

    fn workflow(task: Task) -> Workflow {
        Workflow::standard_builder(&Invoker::default())
            .task(task)
            .build()
            .unwrap()
    }

    #[test]
    fn reports_pending_until_polled_enough() {
        let action = DataProcessingAction::new(3);
        let task = Task::registered(ACTION_NAME).payload(json!({"rows": 42})).build().unwrap();

        assert!(action.step(&task, task.payload()).is_pending());
        assert_eq!(task.execution().progress, 33);
        assert!(action.step(&task, task.payload()).is_pending());

        let done = action.step(&task, task.payload());
        assert!(done.is_success());
        assert_eq!(done.result.unwrap()["rows_processed"], 42);
        assert_eq!(task.execution().progress, 100);
    }

    #[tokio::test]
    async fn configure_reads_polls() {
        let registry = ActionRegistry::new();
        registry
            .register(DataProcessingAction::new(5), &json!({"polls": 1}))
            .await
            .unwrap();

        let workflow = workflow(Task::registered(ACTION_NAME).build().unwrap());
        let task = &workflow.tasks()[0];
        let action = registry.get(ACTION_NAME).unwrap();

        let response = action.execute(task, &workflow, None).await.unwrap();
        assert!(response.is_success());
    }

    #[tokio::test]
    async fn configure_rejects_zero_polls() {
        let registry = ActionRegistry::new();
        let err = registry
            .register(DataProcessingAction::new(1), &json!({"polls": 0}))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationFailed);
        assert!(registry.is_empty());
    }

    #[test]
    fn tasks_are_counted_separately() {
        let action = DataProcessingAction::new(2);
        let a = Task::registered(ACTION_NAME).build().unwrap();
        let b = Task::registered(ACTION_NAME).build().unwrap();

        assert!(action.step(&a, None).is_pending());
        assert!(action.step(&b, None).is_pending());
        assert!(action.step(&a, None).is_success());
    }
}
