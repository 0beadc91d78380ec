//! Entry point that decides how a workflow runs.
//!
//! JIT workflows run their chain right away and the caller gets the outcome.
//! Deferred workflows are handed to the invoker's [`PoolProcessor`] and the
//! caller gets an "accepted" answer while the heartbeat drives them.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use batchflow_types::config::EngineConfig;
use batchflow_types::error::{EngineError, ErrorKind, WorkflowError};
use batchflow_types::response::WorkflowResponse;
use futures_util::FutureExt;
use serde_json::json;
use tracing::{debug, error, info};

use super::Workflow;
use super::pool::PoolProcessor;
use crate::telemetry::panic_message;

/// Outcome of driving a list of dependency workflows.
#[derive(Debug, Clone)]
pub enum DependencyRun {
    /// Every unfinished dependency answered Success.
    Ready,
    /// A dependency is still waiting on work.
    Pending { workflow_id: String },
    /// A dependency failed.
    Failed {
        workflow_id: String,
        error: Option<EngineError>,
    },
}

/// Runs workflows, inline or through a shared pool.
///
/// Clones share the same pool.
#[derive(Debug, Clone)]
pub struct Invoker {
    pool: PoolProcessor,
    heartbeat_interval: Duration,
}

impl Invoker {
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_interval(config.heartbeat_interval())
    }

    pub fn with_interval(heartbeat_interval: Duration) -> Self {
        Self {
            pool: PoolProcessor::new(),
            heartbeat_interval,
        }
    }

    pub fn pool(&self) -> &PoolProcessor {
        &self.pool
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Run `workflow` according to its mode.
    ///
    /// A deferred Success only means "accepted for processing"; watch the
    /// workflow's state or events to learn when it completes.
    pub async fn run(&self, workflow: &Arc<Workflow>) -> WorkflowResponse {
        if workflow.is_jit() {
            info!(workflow_id = %workflow.id(), "Workflow {}({}) has started in JIT mode.", workflow.name(), workflow.id());

            let response = match AssertUnwindSafe(workflow.process()).catch_unwind().await {
                Ok(response) => response,
                Err(panic) => {
                    let message = panic_message(&*panic);
                    error!(workflow_id = %workflow.id(), %message, "Error occurred while running workflow");
                    return WorkflowResponse::failure(WorkflowError::new(
                        ErrorKind::WorkflowFailed,
                        workflow.id(),
                        workflow.name(),
                        format!(
                            "Workflow {}({}) panicked: {message}",
                            workflow.name(),
                            workflow.id()
                        ),
                    ));
                }
            };

            info!(
                workflow_id = %workflow.id(),
                state = %response.state,
                "JIT workflow {}({}) execution has finished.",
                workflow.name(),
                workflow.id()
            );
            return response;
        }

        info!(workflow_id = %workflow.id(), "Workflow {}({}) has started in deferred mode.", workflow.name(), workflow.id());
        if self.pool.enqueue(Arc::clone(workflow), self.heartbeat_interval) {
            WorkflowResponse::success().with_result(json!({
                "accepted": true,
                "workflow_id": workflow.id(),
            }))
        } else {
            // Already held: the heartbeat is still driving it.
            WorkflowResponse::pending()
        }
    }

    /// Run each dependency that has not completed, stopping at the first one
    /// that is not Completed afterwards.
    ///
    /// A deferred dependency is only accepted by [`run`](Self::run), so it
    /// stays Pending until the heartbeat completes it. If the heartbeat's last
    /// pass over it failed, that failure is reported instead.
    pub async fn run_dependencies(&self, dependencies: &[Arc<Workflow>]) -> DependencyRun {
        for dependency in dependencies {
            if dependency.is_completed() {
                continue;
            }

            info!(dependency_id = %dependency.id(), "executing dependency {}({})", dependency.name(), dependency.id());
            let mut response = self.run(dependency).await;
            if !dependency.is_jit() && !response.is_failure() {
                if let Some(last) = dependency.response().filter(|last| last.is_failure()) {
                    response = last;
                }
            }

            if response.is_failure() {
                return DependencyRun::Failed {
                    workflow_id: dependency.id().to_string(),
                    error: response.error,
                };
            }
            if !dependency.is_completed() {
                debug!(dependency_id = %dependency.id(), state = %response.state, "dependency has not completed yet");
                return DependencyRun::Pending {
                    workflow_id: dependency.id().to_string(),
                };
            }
        }
        DependencyRun::Ready
    }

    /// Cancellation is not implemented.
    pub fn cancel(&self, workflow: &Workflow) -> Result<(), EngineError> {
        Err(EngineError::general(
            ErrorKind::NotSupported,
            format!(
                "Cancelling workflow {}({}) is not supported",
                workflow.name(),
                workflow.id()
            ),
        ))
    }
}

impl Default for Invoker {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use batchflow_types::state::WorkflowState;
    use serde_json::Value;

    use super::*;
    use crate::action::registry::ActionRegistry;
    use crate::task::Task;
    use crate::test_support::{PollingAction, deferred_workflow, jit_workflow, noop_task};

    #[test]
    fn interval_comes_from_config() {
        let config = EngineConfig {
            heartbeat_interval_ms: 250,
            ..EngineConfig::default()
        };
        assert_eq!(Invoker::new(&config).heartbeat_interval(), Duration::from_millis(250));
        assert_eq!(Invoker::default().heartbeat_interval(), Duration::from_secs(5));
    }

    #[tokio::test]
    async fn jit_run_returns_chain_response() {
        let invoker = Invoker::default();
        let workflow = Arc::new(jit_workflow("W_1", vec![noop_task().build().unwrap()]));

        let response = invoker.run(&workflow).await;

        assert!(response.is_success());
        assert!(workflow.is_completed());
        assert!(invoker.pool().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn deferred_run_is_accepted_not_completed() {
        let registry = ActionRegistry::new();
        registry.register(PollingAction::new("poll"), &Value::Null).await.unwrap();
        let invoker = Invoker::with_interval(Duration::from_millis(100));
        let workflow = Arc::new(deferred_workflow(
            "W_1",
            registry,
            vec![Task::registered("poll").build().unwrap()],
        ));

        let response = invoker.run(&workflow).await;

        assert!(response.is_success());
        assert_eq!(response.result.unwrap()["accepted"], true);
        assert_eq!(workflow.state(), WorkflowState::InProgress);
        assert!(invoker.pool().contains("W_1"));
        assert!(invoker.pool().heartbeat_running());

        // A second run while queued does not enqueue twice.
        let again = invoker.run(&workflow).await;
        assert!(again.is_pending());
        assert_eq!(invoker.pool().len(), 1);

        invoker.pool().wait_idle().await;
        assert!(workflow.is_completed());
        assert!(invoker.pool().is_empty());
    }

    #[tokio::test]
    async fn clones_share_the_pool() {
        let invoker = Invoker::with_interval(Duration::from_secs(60));
        let clone = invoker.clone();
        let workflow = Arc::new(deferred_workflow(
            "W_1",
            ActionRegistry::new(),
            vec![Task::registered("poll").build().unwrap()],
        ));

        clone.run(&workflow).await;

        assert!(invoker.pool().contains("W_1"));
    }

    #[test]
    fn cancel_is_not_supported() {
        let workflow = jit_workflow("W_1", vec![noop_task().build().unwrap()]);
        let err = Invoker::default().cancel(&workflow).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotSupported);
    }

    #[tokio::test]
    async fn completed_dependencies_are_not_rerun() {
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let dependency = Arc::new(jit_workflow(
            "W_1",
            vec![crate::test_support::counting_task(calls.clone()).build().unwrap()],
        ));
        let invoker = Invoker::default();

        let first = invoker.run_dependencies(&[dependency.clone()]).await;
        assert!(matches!(first, DependencyRun::Ready));
        let second = invoker.run_dependencies(&[dependency]).await;
        assert!(matches!(second, DependencyRun::Ready));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    /// Registered action that always fails.
    struct BrokenAction;

    impl crate::action::Action for BrokenAction {
        fn name(&self) -> &str {
            "broken"
        }

        async fn execute(
            &self,
            _task: &Task,
            _workflow: &Workflow,
            _payload: Option<&Value>,
        ) -> crate::action::ActionResult {
            Err(EngineError::general(ErrorKind::TaskFailed, "source unavailable"))
        }
    }

    /// W_2 (JIT) depends on W_1 (deferred) and shares W_1's invoker.
    fn dependent_pair(
        invoker: &Invoker,
        registry: ActionRegistry,
        action: &str,
        calls: Arc<std::sync::atomic::AtomicU32>,
    ) -> (Arc<Workflow>, Arc<Workflow>) {
        let w1 = Arc::new(
            Workflow::standard_builder(invoker)
                .id("W_1")
                .jit(false)
                .container(registry)
                .task(Task::registered(action).id("T_1").build().unwrap())
                .build()
                .unwrap(),
        );
        let w2 = Arc::new(
            Workflow::standard_builder(invoker)
                .id("W_2")
                .depends_on(w1.clone())
                .task(
                    crate::test_support::counting_task(calls)
                        .id("T_2")
                        .build()
                        .unwrap(),
                )
                .build()
                .unwrap(),
        );
        (w1, w2)
    }

    #[tokio::test(start_paused = true)]
    async fn jit_workflow_waits_for_deferred_dependency() {
        let registry = ActionRegistry::new();
        registry.register(PollingAction::new("poll"), &Value::Null).await.unwrap();
        let invoker = Invoker::with_interval(Duration::from_millis(100));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let (w1, w2) = dependent_pair(&invoker, registry, "poll", calls.clone());

        let response = invoker.run(&w2).await;

        assert!(response.is_pending());
        assert!(!w2.is_completed());
        assert_eq!(w1.state(), WorkflowState::InProgress);
        assert!(invoker.pool().contains("W_1"));
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        // Still queued: re-running W_2 does not get ahead of W_1.
        assert!(invoker.run(&w2).await.is_pending());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        invoker.pool().wait_idle().await;
        assert!(w1.is_completed());

        let response = invoker.run(&w2).await;

        assert!(response.is_success());
        assert!(w2.is_completed());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_deferred_dependency_fails_the_dependent() {
        let registry = ActionRegistry::new();
        registry.register(BrokenAction, &Value::Null).await.unwrap();
        let invoker = Invoker::with_interval(Duration::from_secs(60));
        let calls = Arc::new(std::sync::atomic::AtomicU32::new(0));
        let (w1, w2) = dependent_pair(&invoker, registry, "broken", calls.clone());

        assert!(invoker.run(&w2).await.is_pending());

        let report = invoker.pool().heartbeat().await;
        assert_eq!(report.failed, 1);
        assert!(w1.response().unwrap().is_failure());

        let response = invoker.run(&w2).await;

        let err = response.error.unwrap();
        assert_eq!(err.kind(), ErrorKind::DependencyExecutionFailed);
        assert!(err.has_kind(ErrorKind::ExecutionFailed));
        assert!(!w2.is_completed());
        assert!(!w1.is_completed());
        assert_eq!(calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    }
}
