//! Ordered handler chain for workflows.
//!
//! Mirrors [`TaskChain`](crate::task::chain::TaskChain): stages either answer
//! or delegate through [`WorkflowNext::run`], and running past the last stage
//! yields `Success` with a `NoHandler` error attached.

use std::sync::Arc;

use batchflow_types::error::{ErrorKind, WorkflowError};
use batchflow_types::response::WorkflowResponse;
use futures_util::future::BoxFuture;

use super::Workflow;
use super::invoker::Invoker;
use super::stages::{
    WorkflowDependencyExecutionStage, WorkflowEnsureTasksCompletedStage, WorkflowExecutionStage,
    WorkflowValidationStage,
};

/// One step of the workflow pipeline.
pub trait WorkflowStage: Send + Sync {
    fn name(&self) -> &'static str;

    fn handle<'a>(&'a self, workflow: &'a Workflow, next: WorkflowNext<'a>)
    -> BoxFuture<'a, WorkflowResponse>;
}

/// The remainder of a chain, handed to each stage.
pub struct WorkflowNext<'a> {
    stages: &'a [Arc<dyn WorkflowStage>],
}

impl<'a> WorkflowNext<'a> {
    pub fn run(self, workflow: &'a Workflow) -> BoxFuture<'a, WorkflowResponse> {
        match self.stages.split_first() {
            Some((stage, rest)) => stage.handle(workflow, WorkflowNext { stages: rest }),
            None => Box::pin(async move {
                tracing::debug!(workflow_id = %workflow.id(), "workflow chain exhausted");
                WorkflowResponse::success_with_error(WorkflowError::new(
                    ErrorKind::NoHandler,
                    workflow.id(),
                    workflow.name(),
                    format!(
                        "No handler left for workflow {}({})",
                        workflow.name(),
                        workflow.id()
                    ),
                ))
            }),
        }
    }
}

/// An ordered workflow pipeline. Cloning shares the stage list.
#[derive(Clone, Default)]
pub struct WorkflowChain {
    stages: Arc<Vec<Arc<dyn WorkflowStage>>>,
}

impl WorkflowChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, stage: impl WorkflowStage + 'static) -> Self {
        let mut stages: Vec<Arc<dyn WorkflowStage>> = self.stages.iter().cloned().collect();
        stages.push(Arc::new(stage));
        Self {
            stages: Arc::new(stages),
        }
    }

    /// Validation → DependencyExecution → Execution → EnsureTasksCompleted.
    pub fn standard(invoker: Invoker) -> Self {
        Self::new()
            .with(WorkflowValidationStage)
            .with(WorkflowDependencyExecutionStage::new(invoker))
            .with(WorkflowExecutionStage)
            .with(WorkflowEnsureTasksCompletedStage)
    }

    pub fn handle<'a>(&'a self, workflow: &'a Workflow) -> BoxFuture<'a, WorkflowResponse> {
        WorkflowNext {
            stages: self.stages.as_slice(),
        }
        .run(workflow)
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|stage| stage.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for WorkflowChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowChain")
            .field("stages", &self.stage_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use batchflow_types::state::ResponseState;

    use super::*;
    use crate::task::chain::TaskChain;
    use crate::test_support::noop_task;

    #[tokio::test]
    async fn empty_chain_returns_success_with_no_handler_error() {
        let workflow = Workflow::builder(TaskChain::new(), WorkflowChain::new())
            .task(noop_task().build().unwrap())
            .build()
            .unwrap();

        let response = workflow.process().await;

        assert_eq!(response.state, ResponseState::Success);
        assert_eq!(response.error.unwrap().kind(), ErrorKind::NoHandler);
    }

    #[test]
    fn standard_chain_stage_order() {
        let chain = WorkflowChain::standard(Invoker::default());
        assert_eq!(
            chain.stage_names(),
            vec!["validation", "dependency_execution", "execution", "ensure_tasks_completed"]
        );
        assert!(WorkflowChain::new().is_empty());
        assert!(format!("{chain:?}").contains("ensure_tasks_completed"));
    }
}
