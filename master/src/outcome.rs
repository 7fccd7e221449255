//! Outcome ingestor (C8): turns a terminal report from a worker into the
//! status transition, reservation release, τ update, SLA label, and
//! (eventually) a penalty-vector recompute.
//!
//! Steps 1–2 (status + release) are the only ones whose failure is reported
//! to the caller; steps 3–5 are best-effort and must never block the
//! ingestor's return (§4.8).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{error, warn};

use crate::dispatch::{OutcomeRecord, OutcomeSink};
use crate::penalty::PenaltyEngine;
use crate::queue::TaskQueue;
use crate::registry::WorkerRegistry;
use crate::success::SuccessStats;
use crate::task::TaskStatus;
use crate::tau::TauStore;

/// A terminal report from a worker, as described in §6
/// `report_outcome(task_id, worker_id, success, duration_s, resource_usage_map)`.
pub struct Outcome {
    pub outcome_id: String,
    pub task_id: String,
    pub worker_id: String,
    pub success: bool,
    pub duration: Duration,
    /// Resource usage rates reported by the worker (keys `"cpu"`, `"memory"`,
    /// `"gpu"`), used to derive the energy and overload signals fed into the
    /// penalty recompute.
    pub resource_usage: HashMap<String, f64>,
}

pub struct OutcomeIngestor {
    queue: Arc<TaskQueue>,
    registry: Arc<WorkerRegistry>,
    tau: Arc<TauStore>,
    success_stats: Arc<SuccessStats>,
    penalty: Arc<PenaltyEngine>,
    sink: Arc<dyn OutcomeSink>,
}

impl OutcomeIngestor {
    pub fn new(
        queue: Arc<TaskQueue>,
        registry: Arc<WorkerRegistry>,
        tau: Arc<TauStore>,
        success_stats: Arc<SuccessStats>,
        penalty: Arc<PenaltyEngine>,
        sink: Arc<dyn OutcomeSink>,
    ) -> Self {
        Self {
            queue,
            registry,
            tau,
            success_stats,
            penalty,
            sink,
        }
    }

    pub fn report(&self, outcome: Outcome) {
        let Some(task) = self.queue.get(&outcome.task_id) else {
            error!(task = %outcome.task_id, "report_outcome for unknown task");
            return;
        };

        let new_status = if outcome.success {
            TaskStatus::Completed
        } else {
            TaskStatus::Failed
        };
        if let Err(e) = self.queue.mark_terminal(&outcome.task_id, new_status) {
            error!(task = %outcome.task_id, error = %e, "failed to transition task status");
        }

        self.registry.release(&outcome.task_id);

        // Step 3: only fold the observation into τ if the reporting worker
        // matches the assignment — a mismatched worker-id is ignored rather
        // than trusted, since it cannot be attributed to this task's run.
        let worker_matches = task.assigned_worker.as_deref() == Some(outcome.worker_id.as_str());
        if worker_matches {
            self.tau.update(task.task_type, &outcome.outcome_id, outcome.duration);
        } else {
            warn!(
                task = %outcome.task_id,
                reported_worker = %outcome.worker_id,
                assigned_worker = ?task.assigned_worker,
                "outcome worker-id does not match assignment — skipping τ update"
            );
        }

        let completed_at = SystemTime::now();
        let sla_success = task.sla_success(completed_at, outcome.success);

        self.success_stats
            .record(&outcome.worker_id, task.task_type, outcome.success);

        // Step 5: fold this outcome into the rolling penalty stats and ask
        // the background task to recompute. `overloaded` is approximated as
        // "usage ran hotter than what was reserved" on any dimension, since
        // the core has no continuous telemetry feed to sample load from.
        let overloaded = outcome.resource_usage.get("cpu").copied().unwrap_or(0.0) > task.demand.cpu
            || outcome.resource_usage.get("memory").copied().unwrap_or(0.0) > task.demand.memory_mb as f64
            || outcome.resource_usage.get("gpu").copied().unwrap_or(0.0) > task.demand.gpu;
        let energy = outcome.resource_usage.values().sum::<f64>() * outcome.duration.as_secs_f64();
        self.penalty
            .record_outcome(&outcome.worker_id, sla_success, outcome.duration, overloaded, energy);
        self.penalty.trigger();

        self.sink.record(OutcomeRecord {
            task_id: task.id.clone(),
            task_type: task.task_type.as_str().to_string(),
            worker_id: outcome.worker_id,
            submitted_at: task.submitted_at,
            scheduled_at: None,
            completed_at,
            deadline: task.deadline,
            success: outcome.success,
            sla_success,
            duration_s: outcome.duration.as_secs_f64(),
        });
    }
}
