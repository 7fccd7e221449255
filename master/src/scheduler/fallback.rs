//! Round-robin fallback selection (C6), consulted when RTS reports *no-fit*.
//!
//! Stateless rotation over `ACTIVE`, feasible workers sorted by id. The
//! cursor (last-selected id) is the only state carried between calls.

use parking_lot::Mutex;

use crate::registry::WorkerView;
use crate::scheduler::error::{NoFitReason, SchedulerError};
use crate::task::Task;

/// Holds the rotation cursor across calls.
#[derive(Default)]
pub struct RoundRobin {
    last_selected: Mutex<Option<String>>,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select(&self, task: &Task, workers: &[WorkerView]) -> Result<String, SchedulerError> {
        let mut feasible: Vec<&str> = workers
            .iter()
            .filter(|w| w.available.covers(&task.demand))
            .map(|w| w.worker.id.as_str())
            .collect();

        if feasible.is_empty() {
            return Err(SchedulerError::NoFit(NoFitReason::NoFeasibleWorker));
        }
        feasible.sort_unstable();

        let mut cursor = self.last_selected.lock();
        let next_index = match cursor.as_deref() {
            Some(last) => match feasible.iter().position(|id| *id == last) {
                Some(pos) => (pos + 1) % feasible.len(),
                None => 0,
            },
            None => 0,
        };
        let chosen = feasible[next_index].to_string();
        *cursor = Some(chosen.clone());
        Ok(chosen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Liveness, Worker};
    use crate::task::{ResourceDemand, SlaMultiplier, TaskStatus, TaskType};
    use std::time::SystemTime;

    fn worker(id: &str) -> WorkerView {
        let total = ResourceDemand::new(4.0, 8192, 0.0);
        WorkerView {
            worker: Worker {
                id: id.to_string(),
                addr: "addr".into(),
                total,
                storage_mb: 0,
                liveness: Liveness::Active,
                last_heartbeat: None,
                last_assigned: None,
            },
            available: total,
            load: 0.0,
        }
    }

    fn task() -> Task {
        Task {
            id: "t".into(),
            task_type: TaskType::CpuLight,
            demand: ResourceDemand::new(1.0, 1024, 0.0),
            priority: 5,
            k: SlaMultiplier::default(),
            submitted_at: SystemTime::UNIX_EPOCH,
            deadline: SystemTime::UNIX_EPOCH,
            status: TaskStatus::Pending,
            assigned_worker: None,
            docker_image: "img".into(),
        }
    }

    #[test]
    fn rotates_across_calls() {
        let rr = RoundRobin::new();
        let workers = vec![worker("a"), worker("b"), worker("c")];
        let t = task();
        assert_eq!(rr.select(&t, &workers).unwrap(), "a");
        assert_eq!(rr.select(&t, &workers).unwrap(), "b");
        assert_eq!(rr.select(&t, &workers).unwrap(), "c");
        assert_eq!(rr.select(&t, &workers).unwrap(), "a");
    }

    #[test]
    fn no_feasible_worker_is_no_fit() {
        let rr = RoundRobin::new();
        let mut w = worker("a");
        w.available = ResourceDemand::default();
        let err = rr.select(&task(), &[w]).unwrap_err();
        assert_eq!(err, SchedulerError::NoFit(NoFitReason::NoFeasibleWorker));
    }

    #[test]
    fn cursor_skips_workers_that_disappeared() {
        let rr = RoundRobin::new();
        assert_eq!(rr.select(&task(), &[worker("b")]).unwrap(), "b");
        // "b" is gone on the next call; cursor lookup fails, restart at 0.
        assert_eq!(rr.select(&task(), &[worker("a"), worker("c")]).unwrap(), "a");
    }
}
