//! Elapsed-time reporting for task and workflow execution.

use std::time::Instant;

/// Logs how long an execution took when dropped, regardless of outcome.
pub(crate) struct ElapsedGuard {
    kind: &'static str,
    id: String,
    name: String,
    started: Instant,
}

impl ElapsedGuard {
    pub(crate) fn start(kind: &'static str, id: &str, name: &str) -> Self {
        Self {
            kind,
            id: id.to_string(),
            name: name.to_string(),
            started: Instant::now(),
        }
    }
}

impl Drop for ElapsedGuard {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        tracing::info!(
            kind = self.kind,
            id = %self.id,
            name = %self.name,
            elapsed_ms,
            "{} {}({}) executed in {elapsed_ms} ms",
            self.kind,
            self.name,
            self.id,
        );
    }
}

/// Best-effort text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
