//! Asynchronous penalty-vector recompute (§4.8 step 5).
//!
//! Aggregates per-worker SLA-fail rate, overload-time fraction, and
//! normalized energy (resource-seconds, normalized by the cluster maximum)
//! into `penalty[w] ∈ [0, 5]`, then publishes the result into the parameter
//! store. The outcome ingestor feeds this tracker and triggers a recompute
//! on every terminal outcome; concurrent triggers coalesce onto a single
//! pending recompute via [`tokio::sync::Notify`], so a burst of outcomes
//! never queues up more than one extra pass.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::sync::Notify;
use tracing::info;

use crate::params::ParamStore;

#[derive(Debug, Clone, Copy, Default)]
struct WorkerStats {
    outcomes: u64,
    sla_failures: u64,
    overloaded_seconds: f64,
    total_seconds: f64,
    energy: f64,
}

/// Rolling per-worker accumulators feeding the penalty formula.
pub struct PenaltyTracker {
    stats: DashMap<String, WorkerStats>,
}

impl Default for PenaltyTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl PenaltyTracker {
    pub fn new() -> Self {
        Self { stats: DashMap::new() }
    }

    /// Fold one terminal outcome into `worker_id`'s rolling stats.
    ///
    /// `overloaded` marks whether the reported usage ran hotter than the
    /// task's reserved demand on any dimension — the proxy this core uses
    /// for "worker was under load pressure" absent a continuous telemetry
    /// feed. `energy` is the resource-seconds consumed by this run (usage
    /// summed across dimensions, times duration).
    pub fn record(&self, worker_id: &str, sla_success: bool, duration: Duration, overloaded: bool, energy: f64) {
        let mut entry = self.stats.entry(worker_id.to_string()).or_default();
        entry.outcomes += 1;
        if !sla_success {
            entry.sla_failures += 1;
        }
        entry.total_seconds += duration.as_secs_f64();
        if overloaded {
            entry.overloaded_seconds += duration.as_secs_f64();
        }
        entry.energy += energy;
    }

    /// Aggregate current stats into a penalty vector, clamped to `[0, 5]`.
    pub fn recompute(&self) -> HashMap<String, f64> {
        let cluster_max_energy = self.stats.iter().map(|e| e.energy).fold(0.0_f64, f64::max);

        self.stats
            .iter()
            .map(|entry| {
                let s = entry.value();
                let sla_fail_rate = if s.outcomes > 0 {
                    s.sla_failures as f64 / s.outcomes as f64
                } else {
                    0.0
                };
                let overload_time_fraction = if s.total_seconds > 0.0 {
                    s.overloaded_seconds / s.total_seconds
                } else {
                    0.0
                };
                let normalized_energy = if cluster_max_energy > 0.0 {
                    s.energy / cluster_max_energy
                } else {
                    0.0
                };
                let penalty = (sla_fail_rate + overload_time_fraction + normalized_energy).clamp(0.0, 5.0);
                (entry.key().clone(), penalty)
            })
            .collect()
    }
}

/// Drives the background recompute task and the trigger notification the
/// outcome ingestor uses to request a pass without blocking its return.
pub struct PenaltyEngine {
    tracker: PenaltyTracker,
    notify: Notify,
}

impl Default for PenaltyEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl PenaltyEngine {
    pub fn new() -> Self {
        Self {
            tracker: PenaltyTracker::new(),
            notify: Notify::new(),
        }
    }

    pub fn record_outcome(&self, worker_id: &str, sla_success: bool, duration: Duration, overloaded: bool, energy: f64) {
        self.tracker.record(worker_id, sla_success, duration, overloaded, energy);
    }

    /// Ask the background task to recompute soon. Non-blocking; multiple
    /// calls before the task wakes up coalesce onto one pass.
    pub fn trigger(&self) {
        self.notify.notify_one();
    }

    /// Spawn the background loop that waits for [`trigger`](Self::trigger)
    /// and publishes a fresh penalty vector into `params`.
    pub fn spawn(engine: Arc<PenaltyEngine>, params: Arc<ParamStore>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                engine.notify.notified().await;
                let penalty = engine.tracker.recompute();
                info!(workers = penalty.len(), "penalty vector recomputed");
                params.set_penalty(penalty);
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sla_failure_and_overload_raise_penalty() {
        let tracker = PenaltyTracker::new();
        tracker.record("w1", false, Duration::from_secs(10), true, 5.0);
        tracker.record("w1", true, Duration::from_secs(10), false, 1.0);
        let penalty = tracker.recompute();
        let p = penalty["w1"];
        assert!(p > 0.0 && p <= 5.0, "got {p}");
    }

    #[test]
    fn energy_normalized_by_cluster_max() {
        let tracker = PenaltyTracker::new();
        tracker.record("heavy", true, Duration::from_secs(1), false, 10.0);
        tracker.record("light", true, Duration::from_secs(1), false, 1.0);
        let penalty = tracker.recompute();
        assert!((penalty["heavy"] - 1.0).abs() < 1e-9);
        assert!((penalty["light"] - 0.1).abs() < 1e-9);
    }

    #[test]
    fn unknown_worker_has_no_entry() {
        let tracker = PenaltyTracker::new();
        assert!(tracker.recompute().is_empty());
    }
}
