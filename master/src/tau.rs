//! Expected-runtime estimator (C3): an exponential moving average of observed
//! task durations, kept per [`TaskType`](crate::task::TaskType).
//!
//! Seeded with the per-type defaults from §4.2 and updated by the outcome
//! ingestor as tasks complete. Replayed outcomes (the same outcome id
//! reported twice) must not double-count, so the store tracks the set of
//! outcome ids it has folded in.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::RwLock;

use crate::task::TaskType;

/// EMA smoothing factor, λ, applied to every update: `τ ← (1−λ)·τ + λ·observed`.
pub const LAMBDA: f64 = 0.2;

fn default_tau(task_type: TaskType) -> Duration {
    let secs = match task_type {
        TaskType::CpuLight => 30,
        TaskType::CpuHeavy => 120,
        TaskType::MemoryHeavy => 60,
        TaskType::GpuInference => 20,
        TaskType::GpuTraining => 600,
        TaskType::Mixed => 90,
    };
    Duration::from_secs(secs)
}

#[derive(Debug, Clone, Copy)]
struct Estimate {
    tau: Duration,
    samples: u64,
}

struct Inner {
    estimates: [Estimate; 6],
    seen_outcomes: HashSet<String>,
}

fn index(task_type: TaskType) -> usize {
    TaskType::ALL.iter().position(|t| *t == task_type).unwrap()
}

/// The τ-store: current per-type runtime estimates plus the dedup set of
/// outcome ids already folded in.
pub struct TauStore {
    inner: RwLock<Inner>,
}

impl Default for TauStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TauStore {
    pub fn new() -> Self {
        let estimates = TaskType::ALL.map(|t| Estimate {
            tau: default_tau(t),
            samples: 0,
        });
        Self {
            inner: RwLock::new(Inner {
                estimates,
                seen_outcomes: HashSet::new(),
            }),
        }
    }

    /// Current τ for `task_type`.
    pub fn get(&self, task_type: TaskType) -> Duration {
        self.inner.read().estimates[index(task_type)].tau
    }

    /// Number of samples folded into `task_type`'s estimate so far.
    pub fn sample_count(&self, task_type: TaskType) -> u64 {
        self.inner.read().estimates[index(task_type)].samples
    }

    /// Fold an observed duration into the estimate for `task_type`, keyed by
    /// `outcome_id` for idempotence under replay. Returns `false` (and makes
    /// no change) if `outcome_id` was already applied.
    pub fn update(&self, task_type: TaskType, outcome_id: &str, observed: Duration) -> bool {
        let mut inner = self.inner.write();
        if !inner.seen_outcomes.insert(outcome_id.to_string()) {
            return false;
        }
        let idx = index(task_type);
        let est = &mut inner.estimates[idx];
        let new_tau = (1.0 - LAMBDA) * est.tau.as_secs_f64() + LAMBDA * observed.as_secs_f64();
        est.tau = Duration::from_secs_f64(new_tau.max(0.0));
        est.samples += 1;
        true
    }

    /// A snapshot of every type's current τ, for the parameter store /
    /// deadline calculation to read without holding the lock.
    pub fn snapshot(&self) -> [(TaskType, Duration); 6] {
        let inner = self.inner.read();
        let mut out = [(TaskType::CpuLight, Duration::ZERO); 6];
        for (i, t) in TaskType::ALL.iter().enumerate() {
            out[i] = (*t, inner.estimates[i].tau);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_per_type_seed_values() {
        let store = TauStore::new();
        assert_eq!(store.get(TaskType::CpuLight), Duration::from_secs(30));
        assert_eq!(store.get(TaskType::CpuHeavy), Duration::from_secs(120));
        assert_eq!(store.get(TaskType::MemoryHeavy), Duration::from_secs(60));
        assert_eq!(store.get(TaskType::GpuInference), Duration::from_secs(20));
        assert_eq!(store.get(TaskType::GpuTraining), Duration::from_secs(600));
        assert_eq!(store.get(TaskType::Mixed), Duration::from_secs(90));
    }

    #[test]
    fn update_applies_ema_sequence() {
        // E5: cpu-heavy starts at 120s, observed 150s twice in a row.
        let store = TauStore::new();
        store.update(TaskType::CpuHeavy, "o1", Duration::from_secs(150));
        let t1 = store.get(TaskType::CpuHeavy).as_secs_f64();
        assert!((t1 - 126.0).abs() < 1e-6, "got {t1}");

        store.update(TaskType::CpuHeavy, "o2", Duration::from_secs(150));
        let t2 = store.get(TaskType::CpuHeavy).as_secs_f64();
        assert!((t2 - 130.8).abs() < 1e-6, "got {t2}");
    }

    #[test]
    fn replayed_outcome_id_is_ignored() {
        let store = TauStore::new();
        assert!(store.update(TaskType::CpuLight, "o1", Duration::from_secs(60)));
        assert_eq!(store.sample_count(TaskType::CpuLight), 1);
        assert!(!store.update(TaskType::CpuLight, "o1", Duration::from_secs(999)));
        assert_eq!(store.sample_count(TaskType::CpuLight), 1);
        assert_eq!(store.get(TaskType::CpuLight), Duration::from_secs_f64(36.0));
    }

    #[test]
    fn distinct_types_are_independent() {
        let store = TauStore::new();
        store.update(TaskType::GpuTraining, "o1", Duration::from_secs(0));
        assert_eq!(store.get(TaskType::CpuLight), Duration::from_secs(30));
    }
}
