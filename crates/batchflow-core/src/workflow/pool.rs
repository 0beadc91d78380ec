//! In-memory pool of deferred workflows, advanced by a periodic heartbeat.
//!
//! Each heartbeat re-drives every unfinished workflow through its chain once,
//! one workflow at a time. Stages check current state before acting, so
//! re-driving resumes Waiting tasks without re-running completed ones. A pass
//! that finds nothing in progress evicts completed workflows, and the timer
//! loop stops once the pool is empty.

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use batchflow_types::error::{ErrorKind, WorkflowError};
use futures_util::FutureExt;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info};

use super::Workflow;
use crate::sync::lock;
use crate::telemetry::panic_message;

#[derive(Default)]
struct PoolState {
    /// Insertion order is processing order.
    workflows: Vec<Arc<Workflow>>,
    heartbeat_running: bool,
}

#[derive(Default)]
struct PoolInner {
    state: Mutex<PoolState>,
    idle: Notify,
}

impl PoolInner {
    fn stop_heartbeat(&self) {
        lock(&self.state).heartbeat_running = false;
        self.idle.notify_waiters();
    }
}

/// What one heartbeat pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeartbeatReport {
    /// Workflows that were not Completed when the pass reached them.
    pub in_progress: usize,
    /// Of those, how many answered Failure or panicked.
    pub failed: usize,
    /// Completed workflows removed by cleanup.
    pub evicted: usize,
}

/// Holds deferred workflows until they complete.
///
/// Cloning is cheap and clones share the same pool.
#[derive(Clone, Default)]
pub struct PoolProcessor {
    inner: Arc<PoolInner>,
}

impl PoolProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a workflow. Fails with `WorkflowFailed` if its id is already held.
    pub fn add_workflow(&self, workflow: Arc<Workflow>) -> Result<(), WorkflowError> {
        let mut state = lock(&self.inner.state);
        if state.workflows.iter().any(|held| held.id() == workflow.id()) {
            let err = WorkflowError::new(
                ErrorKind::WorkflowFailed,
                workflow.id(),
                workflow.name(),
                format!("Workflow with ID {} already exists in the pool.", workflow.id()),
            );
            error!(workflow_id = %workflow.id(), "{}", err.message);
            return Err(err);
        }

        info!(workflow_id = %workflow.id(), "Workflow {}({}) added to pool for deferred processing.", workflow.name(), workflow.id());
        state.workflows.push(workflow);
        Ok(())
    }

    /// Add `workflow` unless already held, then make sure the heartbeat runs.
    ///
    /// Returns whether the workflow was newly added.
    pub fn enqueue(&self, workflow: Arc<Workflow>, interval: Duration) -> bool {
        let added = self.add_workflow(workflow).is_ok();
        self.start_heartbeat(interval);
        added
    }

    pub fn contains(&self, id: &str) -> bool {
        lock(&self.inner.state).workflows.iter().any(|held| held.id() == id)
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.state).workflows.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.state).workflows.is_empty()
    }

    /// Held workflow ids in processing order.
    pub fn workflow_ids(&self) -> Vec<String> {
        lock(&self.inner.state)
            .workflows
            .iter()
            .map(|workflow| workflow.id().to_string())
            .collect()
    }

    pub fn heartbeat_running(&self) -> bool {
        lock(&self.inner.state).heartbeat_running
    }

    /// Run one pass over the held workflows.
    pub async fn heartbeat(&self) -> HeartbeatReport {
        let snapshot = lock(&self.inner.state).workflows.clone();
        let mut report = HeartbeatReport::default();

        for workflow in &snapshot {
            if workflow.is_completed() {
                debug!(workflow_id = %workflow.id(), "Workflow {}({}) is already completed.", workflow.name(), workflow.id());
                continue;
            }

            report.in_progress += 1;
            info!(workflow_id = %workflow.id(), "Start processing workflow {}({}).", workflow.name(), workflow.id());

            match AssertUnwindSafe(workflow.process()).catch_unwind().await {
                Ok(response) if response.is_failure() => {
                    report.failed += 1;
                    error!(
                        workflow_id = %workflow.id(),
                        error = ?response.error,
                        "Error occurred during processing workflow {}({}).",
                        workflow.name(),
                        workflow.id()
                    );
                }
                Ok(response) => {
                    debug!(workflow_id = %workflow.id(), state = %response.state, "workflow processed");
                }
                Err(panic) => {
                    report.failed += 1;
                    error!(
                        workflow_id = %workflow.id(),
                        panic = %panic_message(&*panic),
                        "Workflow {}({}) panicked during heartbeat.",
                        workflow.name(),
                        workflow.id()
                    );
                }
            }
        }

        if report.in_progress == 0 {
            info!("No active workflow.");
            report.evicted = self.cleanup_completed();
        }

        report
    }

    fn cleanup_completed(&self) -> usize {
        let mut state = lock(&self.inner.state);
        let before = state.workflows.len();
        state.workflows.retain(|workflow| {
            let completed = workflow.is_completed();
            if completed {
                info!(workflow_id = %workflow.id(), "Workflow {}({}) has completed and was removed from the pool.", workflow.name(), workflow.id());
            }
            !completed
        });
        before - state.workflows.len()
    }

    /// Spawn the heartbeat loop, first tick one `interval` from now.
    ///
    /// Returns `None` if a loop is already running. The loop ends on its own
    /// once the pool is empty.
    pub fn start_heartbeat(&self, interval: Duration) -> Option<HeartbeatHandle> {
        {
            let mut state = lock(&self.inner.state);
            if state.heartbeat_running {
                return None;
            }
            state.heartbeat_running = true;
        }

        info!(interval_ms = interval.as_millis() as u64, "Starting periodic heartbeat.");
        let pool = self.clone();
        let join = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let report = pool.heartbeat().await;
                debug!(?report, "heartbeat finished");

                if pool.finish_if_empty() {
                    info!("No workflows left in the pool. Stopping heartbeat.");
                    break;
                }
            }
            pool.inner.idle.notify_waiters();
        });

        Some(HeartbeatHandle {
            join,
            inner: Arc::clone(&self.inner),
        })
    }

    /// Clear the running flag if nothing is left. Checked under the same lock
    /// `add_workflow` takes, so a concurrent enqueue either lands before the
    /// check or finds the flag cleared and starts a new loop.
    fn finish_if_empty(&self) -> bool {
        let mut state = lock(&self.inner.state);
        if state.workflows.is_empty() {
            state.heartbeat_running = false;
            true
        } else {
            false
        }
    }

    /// Wait until no heartbeat loop is running.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            let mut notified = std::pin::pin!(notified);
            notified.as_mut().enable();

            if !self.heartbeat_running() {
                return;
            }
            notified.await;
        }
    }
}

impl std::fmt::Debug for PoolProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolProcessor")
            .field("workflows", &self.workflow_ids())
            .field("heartbeat_running", &self.heartbeat_running())
            .finish()
    }
}

/// Handle to a spawned heartbeat loop.
pub struct HeartbeatHandle {
    join: JoinHandle<()>,
    inner: Arc<PoolInner>,
}

impl HeartbeatHandle {
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the loop to stop on its own.
    pub async fn wait(self) {
        if let Err(err) = self.join.await {
            if err.is_panic() {
                error!("heartbeat loop panicked");
            }
            self.inner.stop_heartbeat();
        }
    }

    /// Stop the loop now. Held workflows stay in the pool.
    pub fn abort(self) {
        self.join.abort();
        self.inner.stop_heartbeat();
    }
}
