//! Interface seams to the external collaborators (§1): the worker-side
//! dispatch call and the durable outcome-record sink. HTTP/gRPC wire framing
//! for these is explicitly out of scope for the core — only the trait
//! boundary is defined here, to be implemented by whatever transport wraps
//! the master in a given deployment.

use async_trait::async_trait;
use tracing::info;

use crate::task::ResourceDemand;

/// Outbound call to a worker: "run this task." Bounded by a short timeout
/// (§6, default 5 s) enforced by the caller.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    async fn assign(
        &self,
        task_id: &str,
        worker_addr: &str,
        docker_image: &str,
        demand: ResourceDemand,
    ) -> Result<(), DispatchError>;
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum DispatchError {
    #[error("dispatch to worker failed: {0}")]
    Failed(String),
    #[error("dispatch timed out")]
    Timeout,
}

/// A `Dispatcher` that only logs the call and always succeeds — the default
/// wired into the standalone binary until a real transport (gRPC/HTTP) to
/// the worker fleet is plugged in.
pub struct LoggingDispatcher;

#[async_trait]
impl Dispatcher for LoggingDispatcher {
    async fn assign(
        &self,
        task_id: &str,
        worker_addr: &str,
        docker_image: &str,
        demand: ResourceDemand,
    ) -> Result<(), DispatchError> {
        info!(task = task_id, worker = worker_addr, image = docker_image, ?demand, "assign (no-op transport)");
        Ok(())
    }
}

/// A terminal outcome record (§6 "Persisted outcome record"), handed to the
/// durable store. Fire-and-forget: the ingestor never blocks on this.
#[derive(Debug, Clone)]
pub struct OutcomeRecord {
    pub task_id: String,
    pub task_type: String,
    pub worker_id: String,
    pub submitted_at: std::time::SystemTime,
    pub scheduled_at: Option<std::time::SystemTime>,
    pub completed_at: std::time::SystemTime,
    pub deadline: std::time::SystemTime,
    pub success: bool,
    pub sla_success: bool,
    pub duration_s: f64,
}

/// Sink for persisted outcome records. The core produces these; the durable
/// store implementing this trait is external.
pub trait OutcomeSink: Send + Sync {
    fn record(&self, outcome: OutcomeRecord);
}

/// In-memory `OutcomeSink` for tests and single-process demos.
#[derive(Default)]
pub struct InMemorySink {
    records: parking_lot::Mutex<Vec<OutcomeRecord>>,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<OutcomeRecord> {
        self.records.lock().clone()
    }
}

impl OutcomeSink for InMemorySink {
    fn record(&self, outcome: OutcomeRecord) {
        self.records.lock().push(outcome);
    }
}
