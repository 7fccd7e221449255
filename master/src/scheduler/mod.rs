//! Worker selection: combines the RTS scheduler (C5) and round-robin
//! fallback (C6) into the single capability the queue processor calls.
//!
//! Modeled as a data-driven choice between two selection strategies rather
//! than a trait object, since there are exactly two and the processor always
//! tries them in the same order.

pub mod error;
pub mod fallback;
pub mod rts;

pub use error::{NoFitReason, SchedulerError};

use std::sync::Arc;
use std::time::SystemTime;

use crate::params::ParamStore;
use crate::registry::WorkerView;
use crate::success::SuccessStats;
use crate::task::Task;
use crate::tau::TauStore;

use fallback::RoundRobin;

pub struct Scheduler {
    params: Arc<ParamStore>,
    tau: Arc<TauStore>,
    success: Arc<SuccessStats>,
    fallback: RoundRobin,
}

impl Scheduler {
    pub fn new(params: Arc<ParamStore>, tau: Arc<TauStore>, success: Arc<SuccessStats>) -> Self {
        Self {
            params,
            tau,
            success,
            fallback: RoundRobin::new(),
        }
    }

    /// Select a worker for `task` out of `workers` (an `ACTIVE`-worker
    /// snapshot). Tries RTS first; on no-fit, consults the round-robin
    /// fallback before giving up.
    pub fn select(
        &self,
        task: &Task,
        workers: &[WorkerView],
        now: SystemTime,
    ) -> Result<String, SchedulerError> {
        let params = self.params.current();
        match rts::select(task, workers, &params, &self.tau, &self.success, now) {
            Ok(id) => Ok(id),
            Err(_) => self.fallback.select(task, workers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Liveness, Worker};
    use crate::task::{ResourceDemand, SlaMultiplier, TaskStatus, TaskType};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn params_store() -> Arc<ParamStore> {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(b"alpha: 1.0\nbeta: 1.0\n").unwrap();
        let store = ParamStore::load(f.path()).unwrap();
        std::mem::forget(f);
        Arc::new(store)
    }

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
            deadline: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(60),
            status: TaskStatus::Pending,
            assigned_worker: None,
            docker_image: "img".into(),
        }
    }

    #[test]
    fn selects_via_rts_when_feasible() {
        let scheduler = Scheduler::new(params_store(), Arc::new(TauStore::new()), Arc::new(SuccessStats::new()));
        let workers = vec![worker("w1")];
        let id = scheduler.select(&task(), &workers, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(id, "w1");
    }

    #[test]
    fn no_feasible_worker_is_no_fit_even_after_fallback() {
        let scheduler = Scheduler::new(params_store(), Arc::new(TauStore::new()), Arc::new(SuccessStats::new()));
        let err = scheduler.select(&task(), &[], SystemTime::UNIX_EPOCH).unwrap_err();
        assert_eq!(err, SchedulerError::NoFit(NoFitReason::NoFeasibleWorker));
    }
}
