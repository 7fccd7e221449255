//! Per-(worker, task-type) historical success rate, read by the RTS
//! scheduler's risk formula (`history_success_rate`) and updated by the
//! outcome ingestor on every terminal outcome.
//!
//! Modeled the same way as the τ-store: a small keyed table guarded by a
//! single lock, since updates are infrequent relative to reads.

use dashmap::DashMap;

use crate::task::TaskType;

#[derive(Debug, Clone, Copy, Default)]
struct Tally {
    successes: u64,
    total: u64,
}

/// Historical success-rate table, keyed by `(worker_id, task_type)`.
pub struct SuccessStats {
    tallies: DashMap<(String, TaskType), Tally>,
}

impl Default for SuccessStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SuccessStats {
    pub fn new() -> Self {
        Self {
            tallies: DashMap::new(),
        }
    }

    /// Success fraction in `[0, 1]`. Defaults to `0.0` for a worker/type pair
    /// with no recorded outcomes, matching the affinity/penalty default.
    pub fn rate(&self, worker_id: &str, task_type: TaskType) -> f64 {
        match self.tallies.get(&(worker_id.to_string(), task_type)) {
            Some(t) if t.total > 0 => t.successes as f64 / t.total as f64,
            _ => 0.0,
        }
    }

    pub fn record(&self, worker_id: &str, task_type: TaskType, success: bool) {
        let mut entry = self
            .tallies
            .entry((worker_id.to_string(), task_type))
            .or_default();
        entry.total += 1;
        if success {
            entry.successes += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_pair_defaults_to_zero() {
        let stats = SuccessStats::new();
        assert_eq!(stats.rate("w1", TaskType::CpuLight), 0.0);
    }

    #[test]
    fn rate_tracks_success_fraction() {
        let stats = SuccessStats::new();
        stats.record("w1", TaskType::CpuLight, true);
        stats.record("w1", TaskType::CpuLight, true);
        stats.record("w1", TaskType::CpuLight, false);
        assert!((stats.rate("w1", TaskType::CpuLight) - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn types_and_workers_are_independent() {
        let stats = SuccessStats::new();
        stats.record("w1", TaskType::CpuLight, true);
        assert_eq!(stats.rate("w1", TaskType::CpuHeavy), 0.0);
        assert_eq!(stats.rate("w2", TaskType::CpuLight), 0.0);
    }
}
