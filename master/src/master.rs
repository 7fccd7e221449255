//! `Master`: the public facade that wires the queue (C1), registry (C2/C9),
//! τ-store (C3), parameter store (C4), scheduler (C5/C6), queue processor
//! (C7), and outcome ingestor (C8) into the external interfaces of §6.
//!
//! Wire framing (HTTP/gRPC), authentication, and the durable store are
//! external collaborators; this type is what such a transport layer would
//! sit in front of.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::info;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::error::Error;
use crate::outcome::{Outcome, OutcomeIngestor};
use crate::params::ParamStore;
use crate::penalty::PenaltyEngine;
use crate::processor::QueueProcessor;
use crate::queue::{QueueError, TaskQueue};
use crate::registry::{RegistryError, WorkerRegistry};
use crate::scheduler::Scheduler;
use crate::success::SuccessStats;
use crate::task::{ResourceDemand, SlaMultiplier, Task, TaskStatus, TaskType};
use crate::tau::TauStore;

/// Inbound submission payload (§6 "Submission").
#[derive(Debug, Clone)]
pub struct TaskSpec {
    pub docker_image: String,
    pub task_type: Option<TaskType>,
    pub cpu: f64,
    pub memory_mb: u64,
    pub gpu: f64,
    pub priority: Option<i32>,
    pub k: Option<f64>,
}

/// `status(task_id)` response (§6).
#[derive(Debug, Clone)]
pub struct TaskStatusView {
    pub state: TaskStatus,
    pub worker_id: Option<String>,
    pub deadline: SystemTime,
    pub submitted_at: SystemTime,
}

/// `list_workers()` entry (§6 "Worker snapshot").
#[derive(Debug, Clone)]
pub struct WorkerSnapshotEntry {
    pub id: String,
    pub addr: String,
    pub total: ResourceDemand,
    pub allocated: ResourceDemand,
    pub available: ResourceDemand,
    pub active: bool,
    pub last_heartbeat: Option<Duration>,
}

/// Worker-initiated connection payload (§6 `connect(info)`).
#[derive(Debug, Clone)]
pub struct ConnectInfo {
    pub id: String,
    pub total: ResourceDemand,
    pub storage_mb: u64,
}

/// The assembled scheduling core. One instance per master process.
pub struct Master {
    queue: Arc<TaskQueue>,
    registry: Arc<WorkerRegistry>,
    tau: Arc<TauStore>,
    params: Arc<ParamStore>,
    ingestor: OutcomeIngestor,
    config: Config,
}

impl Master {
    /// Assemble the core from its components. `sink` is the durable
    /// outcome-record store; `dispatcher` the outbound worker-assign call —
    /// both external collaborators the caller provides.
    pub fn new(
        config: Config,
        params: Arc<ParamStore>,
        sink: Arc<dyn crate::dispatch::OutcomeSink>,
    ) -> (Self, Arc<SuccessStats>, Arc<PenaltyEngine>, Arc<Scheduler>) {
        let queue = Arc::new(TaskQueue::new());
        let registry = Arc::new(WorkerRegistry::new(config.stale_timeout));
        let tau = Arc::new(TauStore::new());
        let success = Arc::new(SuccessStats::new());
        let penalty = Arc::new(PenaltyEngine::new());
        let scheduler = Arc::new(Scheduler::new(params.clone(), tau.clone(), success.clone()));
        let ingestor = OutcomeIngestor::new(
            queue.clone(),
            registry.clone(),
            tau.clone(),
            success.clone(),
            penalty.clone(),
            sink,
        );
        (
            Master {
                queue,
                registry,
                tau,
                params,
                ingestor,
                config,
            },
            success,
            penalty,
            scheduler,
        )
    }

    /// Spawn the queue processor (C7), parameter-file watcher (C4), worker
    /// sweep (C2), and penalty recompute (C8 step 5) as background tasks.
    pub fn spawn_background_tasks<D: Dispatcher + 'static>(
        &self,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<D>,
        penalty: Arc<PenaltyEngine>,
    ) -> Vec<tokio::task::JoinHandle<()>> {
        let processor = QueueProcessor::new(
            self.queue.clone(),
            self.registry.clone(),
            scheduler,
            dispatcher,
            self.config.clone(),
        );
        let processor_handle = tokio::spawn(async move { processor.run().await });

        let reload_handle = ParamStore::spawn_reload_task(self.params.clone());
        let penalty_handle = PenaltyEngine::spawn(penalty, self.params.clone());

        let registry = self.registry.clone();
        let sweep_interval = self.config.scheduler_cycle.max(Duration::from_secs(10));
        let queue = self.queue.clone();
        let sweep_handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(sweep_interval);
            loop {
                ticker.tick().await;
                let expired = registry.sweep();
                for task_id in expired {
                    if let Some(task) = queue.get(&task_id) {
                        if !task.status.is_terminal() {
                            let _ = queue.update_status(&task_id, TaskStatus::Failed);
                        }
                    }
                }
            }
        });

        vec![processor_handle, reload_handle, penalty_handle, sweep_handle]
    }

    // ── Submission / status / cancel (§6) ──────────────────────────────

    pub fn submit(&self, spec: TaskSpec) -> Result<String, Error> {
        if spec.docker_image.is_empty() {
            return Err(Error::InvalidSpec("docker_image must not be empty".into()));
        }
        if spec.cpu < 0.0 || spec.gpu < 0.0 {
            return Err(Error::InvalidSpec("cpu and gpu demand must be non-negative".into()));
        }

        let demand = ResourceDemand::new(spec.cpu, spec.memory_mb, spec.gpu);
        let task_type = spec.task_type.unwrap_or_else(|| TaskType::infer(&demand));
        let k = SlaMultiplier::new(spec.k.unwrap_or(self.config.default_k));
        let priority = spec.priority.unwrap_or(5);
        let submitted_at = SystemTime::now();
        let deadline = Task::compute_deadline(submitted_at, k, self.tau.get(task_type));

        let id = uuid::Uuid::new_v4().to_string();
        let task = Task {
            id: id.clone(),
            task_type,
            demand,
            priority,
            k,
            submitted_at,
            deadline,
            status: TaskStatus::Pending,
            assigned_worker: None,
            docker_image: spec.docker_image,
        };

        match self.queue.enqueue(task) {
            Ok(()) => {
                info!(task = %id, task_type = task_type.as_str(), "task submitted");
                Ok(id)
            }
            Err(QueueError::DuplicateTask(id)) => Err(Error::DuplicateTask(id)),
            Err(e) => Err(Error::InvalidSpec(e.to_string())),
        }
    }

    pub fn status(&self, task_id: &str) -> Result<TaskStatusView, Error> {
        let task = self.queue.get(task_id).ok_or_else(|| Error::NotFound(task_id.to_string()))?;
        Ok(TaskStatusView {
            state: task.status,
            worker_id: task.assigned_worker,
            deadline: task.deadline,
            submitted_at: task.submitted_at,
        })
    }

    pub fn cancel(&self, task_id: &str) -> Result<(), Error> {
        let task = self.queue.get(task_id).ok_or_else(|| Error::NotFound(task_id.to_string()))?;
        self.queue
            .remove(task_id)
            .map_err(|_| Error::NotFound(task_id.to_string()))?;
        if task.status == TaskStatus::Scheduled || task.status == TaskStatus::Running {
            // Cancellation releases the reservation eagerly; the external
            // dispatch layer's abort call (if any) is advisory (§5, open
            // question iii).
            self.registry.release(task_id);
        }
        Ok(())
    }

    // ── Worker lifecycle (§6) ───────────────────────────────────────────

    pub fn authorize(&self, id: &str, addr: &str) -> Result<(), Error> {
        self.registry.authorize(id, addr).map_err(map_registry_err)
    }

    pub fn unauthorize(&self, id: &str) -> Result<(), Error> {
        self.registry.unauthorize(id).map_err(map_registry_err)
    }

    pub fn connect(&self, info: ConnectInfo) -> Result<(), Error> {
        self.registry
            .connect(&info.id, info.total, info.storage_mb)
            .map_err(map_registry_err)
    }

    pub fn heartbeat(&self, id: &str, _running_ids: &[String]) -> Result<(), Error> {
        self.registry.heartbeat(id).map_err(map_registry_err)
    }

    pub fn report_outcome(
        &self,
        outcome_id: String,
        task_id: String,
        worker_id: String,
        success: bool,
        duration: Duration,
        resource_usage: HashMap<String, f64>,
    ) {
        self.ingestor.report(Outcome {
            outcome_id,
            task_id,
            worker_id,
            success,
            duration,
            resource_usage,
        });
    }

    // ── Read-only snapshot (§6) ─────────────────────────────────────────

    pub fn list_workers(&self) -> Vec<WorkerSnapshotEntry> {
        self.registry
            .snapshot()
            .into_iter()
            .map(|v| WorkerSnapshotEntry {
                id: v.worker.id,
                addr: v.worker.addr,
                total: v.worker.total,
                allocated: v.worker.total.saturating_sub(&v.available),
                available: v.available,
                active: true,
                last_heartbeat: v.worker.last_heartbeat.map(|hb| hb.elapsed()),
            })
            .collect()
    }
}

fn map_registry_err(e: RegistryError) -> Error {
    match e {
        RegistryError::Unauthorized(id) => Error::Unauthorized(id),
        RegistryError::NotFound(id) => Error::NotFound(id),
        RegistryError::AlreadyExists(id) => Error::DuplicateTask(id),
        RegistryError::Insufficient { worker, .. } => Error::NotFound(worker),
    }
}
