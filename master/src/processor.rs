//! Queue processor (C7): the long-running loop that turns `PENDING` tasks
//! into reservations and outbound dispatch calls.
//!
//! Wakes on `wait_for_tasks()` or the scheduler cycle timer, whichever comes
//! first; sleeps the full cycle when the queue is non-empty but nothing is
//! feasible, so a heartbeat alone never triggers a spin (§4.7 backpressure).

use std::sync::Arc;
use std::time::SystemTime;

use tracing::{info, warn};

use crate::config::Config;
use crate::dispatch::{DispatchError, Dispatcher};
use crate::queue::TaskQueue;
use crate::registry::{RegistryError, WorkerRegistry};
use crate::scheduler::Scheduler;
use crate::task::{Task, TaskStatus};

/// Sort key mirroring the queue's internal ordering, so the processor visits
/// pending tasks in the same priority-deadline-FIFO order it dequeues them.
fn priority_order(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| {
        b.priority
            .cmp(&a.priority)
            .then_with(|| a.deadline.cmp(&b.deadline))
            .then_with(|| a.submitted_at.cmp(&b.submitted_at))
    });
}

pub struct QueueProcessor<D: Dispatcher> {
    queue: Arc<TaskQueue>,
    registry: Arc<WorkerRegistry>,
    scheduler: Arc<Scheduler>,
    dispatcher: Arc<D>,
    config: Config,
}

impl<D: Dispatcher> QueueProcessor<D> {
    pub fn new(
        queue: Arc<TaskQueue>,
        registry: Arc<WorkerRegistry>,
        scheduler: Arc<Scheduler>,
        dispatcher: Arc<D>,
        config: Config,
    ) -> Self {
        Self {
            queue,
            registry,
            scheduler,
            dispatcher,
            config,
        }
    }

    /// Run forever. Intended to be spawned as its own task.
    pub async fn run(&self) {
        loop {
            tokio::select! {
                _ = self.queue.wait_for_tasks() => {}
                _ = tokio::time::sleep(self.config.scheduler_cycle) => {}
            }
            self.run_cycle().await;
        }
    }

    /// One pass over up to `batch_size` pending tasks. Exposed separately
    /// from [`run`](Self::run) so tests can drive it deterministically.
    pub async fn run_cycle(&self) {
        let mut pending = self.queue.peek_pending();
        priority_order(&mut pending);
        pending.truncate(self.config.batch_size);

        if pending.is_empty() {
            return;
        }

        for task in &pending {
            self.try_place(task).await;
        }
    }

    async fn try_place(&self, task: &Task) {
        let workers = self.registry.snapshot();
        let worker_id = match self.scheduler.select(task, &workers, SystemTime::now()) {
            Ok(id) => id,
            Err(_) => return, // leave PENDING; next cycle (or C6) already consulted
        };

        let reserved = self.reserve_with_retry(task, &worker_id).await;
        let Some(worker_id) = reserved else {
            return; // lost the race twice; defer to next cycle
        };

        let worker = match self.registry.get(&worker_id) {
            Some(w) => w,
            None => {
                self.registry.release(&task.id);
                return;
            }
        };

        let _ = self.queue.mark_scheduled(&task.id);
        self.registry.record_assignment(&worker_id);

        let outcome = tokio::time::timeout(
            self.config.dispatch_timeout,
            self.dispatcher.assign(&task.id, &worker.addr, &task.docker_image, task.demand),
        )
        .await
        .unwrap_or(Err(DispatchError::Timeout));

        match outcome {
            Ok(()) => {
                info!(task = %task.id, worker = %worker_id, "dispatched");
            }
            Err(e) => {
                warn!(task = %task.id, worker = %worker_id, error = %e, "dispatch failed");
                self.registry.release(&task.id);
                let _ = self.queue.update_status(&task.id, TaskStatus::Failed);
            }
        }
    }

    /// Reserve on `worker_id`; on `Insufficient` (lost race), re-read the
    /// snapshot and retry once against the next-best candidate (§4.7).
    async fn reserve_with_retry(&self, task: &Task, worker_id: &str) -> Option<String> {
        match self
            .registry
            .reserve(&task.id, worker_id, task.demand, self.config.reservation_ttl)
        {
            Ok(()) => return Some(worker_id.to_string()),
            Err(RegistryError::Insufficient { .. }) => {}
            Err(_) => return None,
        }

        let workers = self.registry.snapshot();
        let retry_id = self.scheduler.select(task, &workers, SystemTime::now()).ok()?;
        self.registry
            .reserve(&task.id, &retry_id, task.demand, self.config.reservation_ttl)
            .ok()?;
        Some(retry_id)
    }
}
