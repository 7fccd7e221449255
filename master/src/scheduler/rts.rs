//! RTS (deadline-aware multi-objective) worker selection (C5).
//!
//! Given a task and a snapshot of `ACTIVE` workers, filters to those with
//! sufficient available capacity, scores each by the risk formula, and
//! returns the minimum-risk candidate.

use std::time::SystemTime;

use crate::params::Params;
use crate::registry::WorkerView;
use crate::scheduler::error::{NoFitReason, SchedulerError};
use crate::success::SuccessStats;
use crate::task::Task;
use crate::tau::TauStore;

/// `risk = α·exp(−β·slack) + θ_load·load(w) + θ_penalty·penalty(w)
///         − θ_affinity·affinity(type, w) − θ_success·history_success_rate(w, type)`
///
/// Lower is better.
pub fn select(
    task: &Task,
    workers: &[WorkerView],
    params: &Params,
    tau: &TauStore,
    success: &SuccessStats,
    now: SystemTime,
) -> Result<String, SchedulerError> {
    if workers.is_empty() {
        return Err(SchedulerError::NoFit(NoFitReason::NoWorkers));
    }

    let feasible: Vec<&WorkerView> = workers
        .iter()
        .filter(|w| w.available.covers(&task.demand))
        .collect();

    if feasible.is_empty() {
        return Err(SchedulerError::NoFit(NoFitReason::NoFeasibleWorker));
    }

    let tau_secs = tau.get(task.task_type).as_secs_f64();
    let slack = task
        .deadline
        .duration_since(now)
        .map(|d| (d.as_secs_f64() - tau_secs).max(0.0))
        .unwrap_or(0.0);

    let mut best: Option<(&WorkerView, f64)> = None;
    for w in feasible {
        let risk = params.alpha * (-params.beta * slack).exp()
            + params.theta_load * w.load
            + params.theta_penalty * params.penalty(&w.worker.id)
            - params.theta_affinity * params.affinity(task.task_type, &w.worker.id)
            - params.theta_success * success.rate(&w.worker.id, task.task_type);

        best = Some(match best {
            None => (w, risk),
            Some((cur, cur_risk)) => {
                if risk < cur_risk
                    || (risk == cur_risk && tie_break_wins(w, cur))
                {
                    (w, risk)
                } else {
                    (cur, cur_risk)
                }
            }
        });
    }

    Ok(best.expect("feasible is non-empty").0.worker.id.clone())
}

/// Ties broken by earlier `last_assigned` time, then by worker id.
fn tie_break_wins(candidate: &WorkerView, current: &WorkerView) -> bool {
    match (candidate.worker.last_assigned, current.worker.last_assigned) {
        (Some(a), Some(b)) if a != b => a < b,
        (Some(_), None) => true,
        (None, Some(_)) => false,
        _ => candidate.worker.id < current.worker.id,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{Liveness, Worker};
    use crate::task::{ResourceDemand, SlaMultiplier, TaskStatus, TaskType};
    use std::time::Duration;

    fn worker(id: &str, total: ResourceDemand, available: ResourceDemand) -> WorkerView {
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
            available,
            load: 0.0,
        }
    }

    fn task(demand: ResourceDemand, deadline_secs: u64) -> Task {
        Task {
            id: "t1".into(),
            task_type: TaskType::CpuLight,
            demand,
            priority: 5,
            k: SlaMultiplier::default(),
            submitted_at: SystemTime::UNIX_EPOCH,
            deadline: SystemTime::UNIX_EPOCH + Duration::from_secs(deadline_secs),
            status: TaskStatus::Pending,
            assigned_worker: None,
            docker_image: "img".into(),
        }
    }

    #[test]
    fn no_workers_is_no_fit() {
        let params = Params::default();
        let tau = TauStore::new();
        let success = SuccessStats::new();
        let t = task(ResourceDemand::new(1.0, 1024, 0.0), 60);
        let err = select(&t, &[], &params, &tau, &success, SystemTime::UNIX_EPOCH).unwrap_err();
        assert_eq!(err, SchedulerError::NoFit(NoFitReason::NoWorkers));
    }

    #[test]
    fn infeasible_workers_is_no_fit() {
        let params = Params::default();
        let tau = TauStore::new();
        let success = SuccessStats::new();
        let t = task(ResourceDemand::new(8.0, 1024, 0.0), 60);
        let workers = vec![worker(
            "w1",
            ResourceDemand::new(4.0, 8192, 0.0),
            ResourceDemand::new(4.0, 8192, 0.0),
        )];
        let err = select(&t, &workers, &params, &tau, &success, SystemTime::UNIX_EPOCH).unwrap_err();
        assert_eq!(err, SchedulerError::NoFit(NoFitReason::NoFeasibleWorker));
    }

    #[test]
    fn e2_tie_broken_by_lex_smaller_id() {
        // E2: two identical workers, tie must resolve to the lexicographically
        // smaller id ("W1" < "W2").
        let params = Params::default();
        let tau = TauStore::new();
        let success = SuccessStats::new();
        let t = task(ResourceDemand::new(2.0, 2048, 0.0), 1060);
        let workers = vec![
            worker(
                "W2",
                ResourceDemand::new(4.0, 8192, 0.0),
                ResourceDemand::new(4.0, 8192, 0.0),
            ),
            worker(
                "W1",
                ResourceDemand::new(4.0, 8192, 0.0),
                ResourceDemand::new(4.0, 8192, 0.0),
            ),
        ];
        let chosen = select(&t, &workers, &params, &tau, &success, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(chosen, "W1");
    }

    #[test]
    fn lower_load_wins_when_otherwise_equal() {
        let mut params = Params::default();
        params.theta_load = 10.0;
        let tau = TauStore::new();
        let success = SuccessStats::new();
        let t = task(ResourceDemand::new(1.0, 1024, 0.0), 60);

        let mut busy = worker(
            "busy",
            ResourceDemand::new(4.0, 8192, 0.0),
            ResourceDemand::new(4.0, 8192, 0.0),
        );
        busy.load = 0.9;
        let mut idle = worker(
            "idle",
            ResourceDemand::new(4.0, 8192, 0.0),
            ResourceDemand::new(4.0, 8192, 0.0),
        );
        idle.load = 0.1;

        let chosen = select(&t, &[busy, idle], &params, &tau, &success, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(chosen, "idle");
    }

    #[test]
    fn affinity_reduces_risk_and_can_flip_choice() {
        let mut params = Params::default();
        params.theta_affinity = 5.0;
        params.set_affinity_for_test(TaskType::CpuLight, "preferred", 1.0);
        let tau = TauStore::new();
        let success = SuccessStats::new();
        let t = task(ResourceDemand::new(1.0, 1024, 0.0), 60);

        let preferred = worker(
            "preferred",
            ResourceDemand::new(4.0, 8192, 0.0),
            ResourceDemand::new(4.0, 8192, 0.0),
        );
        let other = worker(
            "other",
            ResourceDemand::new(4.0, 8192, 0.0),
            ResourceDemand::new(4.0, 8192, 0.0),
        );

        let chosen = select(&t, &[other, preferred], &params, &tau, &success, SystemTime::UNIX_EPOCH).unwrap();
        assert_eq!(chosen, "preferred");
    }
}
