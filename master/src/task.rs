//! Core task data structures for the CloudAI master.
//!
//! Mirrors the task lifecycle described in the scheduling core: a task is
//! submitted with a resource demand and a priority, assigned a deadline from
//! the current τ estimate for its type, and carried through
//! `PENDING → SCHEDULED → RUNNING → {COMPLETED|FAILED}` (or `CANCELLED` from
//! any non-terminal state) by the queue, registry, and outcome ingestor.

use std::time::{Duration, SystemTime};

// ── Task type ─────────────────────────────────────────────────────────────────

/// Task-type tag used to look up the τ (expected runtime) estimate and the
/// per-type affinity row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskType {
    CpuLight,
    CpuHeavy,
    MemoryHeavy,
    GpuInference,
    GpuTraining,
    Mixed,
}

impl TaskType {
    /// All task types, used to seed the τ-store and penalty/affinity tables.
    pub const ALL: [TaskType; 6] = [
        TaskType::CpuLight,
        TaskType::CpuHeavy,
        TaskType::MemoryHeavy,
        TaskType::GpuInference,
        TaskType::GpuTraining,
        TaskType::Mixed,
    ];

    /// Parse a task type from the wire name used by the parameter file and the
    /// submission API (`"cpu-light"`, `"gpu-training"`, ...).
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cpu-light" => Some(TaskType::CpuLight),
            "cpu-heavy" => Some(TaskType::CpuHeavy),
            "memory-heavy" => Some(TaskType::MemoryHeavy),
            "gpu-inference" => Some(TaskType::GpuInference),
            "gpu-training" => Some(TaskType::GpuTraining),
            "mixed" => Some(TaskType::Mixed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::CpuLight => "cpu-light",
            TaskType::CpuHeavy => "cpu-heavy",
            TaskType::MemoryHeavy => "memory-heavy",
            TaskType::GpuInference => "gpu-inference",
            TaskType::GpuTraining => "gpu-training",
            TaskType::Mixed => "mixed",
        }
    }

    /// Infer a task type from resource demand when the submitter leaves the
    /// tag empty (§4.1).
    ///
    /// Rule order matters: gpu > 2 ∧ cpu > 4 → gpu-training; gpu > 0 →
    /// gpu-inference; memory > 8 GB → memory-heavy; cpu > 4 → cpu-heavy;
    /// cpu > 0 → cpu-light; else mixed.
    pub fn infer(demand: &ResourceDemand) -> Self {
        const MEMORY_HEAVY_THRESHOLD_MB: u64 = 8 * 1024;

        if demand.gpu > 2.0 && demand.cpu > 4.0 {
            TaskType::GpuTraining
        } else if demand.gpu > 0.0 {
            TaskType::GpuInference
        } else if demand.memory_mb > MEMORY_HEAVY_THRESHOLD_MB {
            TaskType::MemoryHeavy
        } else if demand.cpu > 4.0 {
            TaskType::CpuHeavy
        } else if demand.cpu > 0.0 {
            TaskType::CpuLight
        } else {
            TaskType::Mixed
        }
    }
}

// ── Resource demand ───────────────────────────────────────────────────────────

/// A task's resource demand, also used as the shape of a worker's total
/// capacity and of a reservation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ResourceDemand {
    pub cpu: f64,
    pub memory_mb: u64,
    pub gpu: f64,
}

impl ResourceDemand {
    pub fn new(cpu: f64, memory_mb: u64, gpu: f64) -> Self {
        Self {
            cpu,
            memory_mb,
            gpu,
        }
    }

    /// `true` if every dimension of `self` is greater than or equal to the
    /// corresponding dimension of `demand` — the feasibility check of §4.5
    /// step 1.
    pub fn covers(&self, demand: &ResourceDemand) -> bool {
        self.cpu >= demand.cpu && self.memory_mb >= demand.memory_mb && self.gpu >= demand.gpu
    }

    pub fn saturating_sub(&self, other: &ResourceDemand) -> ResourceDemand {
        ResourceDemand {
            cpu: (self.cpu - other.cpu).max(0.0),
            memory_mb: self.memory_mb.saturating_sub(other.memory_mb),
            gpu: (self.gpu - other.gpu).max(0.0),
        }
    }

    pub fn add(&self, other: &ResourceDemand) -> ResourceDemand {
        ResourceDemand {
            cpu: self.cpu + other.cpu,
            memory_mb: self.memory_mb + other.memory_mb,
            gpu: self.gpu + other.gpu,
        }
    }
}

// ── Task status ───────────────────────────────────────────────────────────────

/// Task lifecycle state (§3 invariant:
/// `PENDING → SCHEDULED → RUNNING → {COMPLETED|FAILED}`; `CANCELLED` is
/// reachable from any non-terminal state).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    Pending,
    Scheduled,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Terminal states cannot transition further.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }
}

// ── SLA multiplier ────────────────────────────────────────────────────────────

/// SLA multiplier `k`, clamped to `[1.5, 2.5]` per §3/§6.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SlaMultiplier(f64);

impl SlaMultiplier {
    pub const MIN: f64 = 1.5;
    pub const MAX: f64 = 2.5;
    pub const DEFAULT: f64 = 2.0;

    pub fn new(k: f64) -> Self {
        Self(k.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for SlaMultiplier {
    fn default() -> Self {
        Self::new(Self::DEFAULT)
    }
}

// ── Task ──────────────────────────────────────────────────────────────────────

/// A unit of work submitted to the master.
///
/// Created by `Master::submit` from a `TaskSpec`, owned by the queue while
/// `PENDING`, then mutated in place by the queue processor and outcome
/// ingestor as it moves through its lifecycle.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub task_type: TaskType,
    pub demand: ResourceDemand,
    pub priority: i32,
    pub k: SlaMultiplier,
    pub submitted_at: SystemTime,
    pub deadline: SystemTime,
    pub status: TaskStatus,
    pub assigned_worker: Option<String>,
    pub docker_image: String,
}

impl Task {
    /// Compute the deadline for a new task: `submitted_at + k · τ(type)`.
    pub fn compute_deadline(submitted_at: SystemTime, k: SlaMultiplier, tau: Duration) -> SystemTime {
        submitted_at + Duration::from_secs_f64(k.value() * tau.as_secs_f64())
    }

    /// `true` if the task completed (successfully or not) on or before its
    /// deadline — §8 E6, §4.8 step 4.
    pub fn sla_success(&self, completed_at: SystemTime, success: bool) -> bool {
        success && completed_at <= self.deadline
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_gpu_training_needs_both_gpu_and_cpu() {
        let d = ResourceDemand::new(5.0, 1024, 3.0);
        assert_eq!(TaskType::infer(&d), TaskType::GpuTraining);
    }

    #[test]
    fn infer_gpu_inference_when_gpu_present_but_cpu_low() {
        let d = ResourceDemand::new(1.0, 1024, 1.0);
        assert_eq!(TaskType::infer(&d), TaskType::GpuInference);
    }

    #[test]
    fn infer_memory_heavy_above_8gb() {
        let d = ResourceDemand::new(1.0, 9000, 0.0);
        assert_eq!(TaskType::infer(&d), TaskType::MemoryHeavy);
    }

    #[test]
    fn infer_cpu_heavy_above_four_cores() {
        let d = ResourceDemand::new(5.0, 1024, 0.0);
        assert_eq!(TaskType::infer(&d), TaskType::CpuHeavy);
    }

    #[test]
    fn infer_cpu_light_below_threshold() {
        let d = ResourceDemand::new(2.0, 1024, 0.0);
        assert_eq!(TaskType::infer(&d), TaskType::CpuLight);
    }

    #[test]
    fn infer_mixed_when_nothing_requested() {
        let d = ResourceDemand::new(0.0, 0, 0.0);
        assert_eq!(TaskType::infer(&d), TaskType::Mixed);
    }

    #[test]
    fn sla_multiplier_clamps_to_range() {
        assert_eq!(SlaMultiplier::new(0.5).value(), 1.5);
        assert_eq!(SlaMultiplier::new(10.0).value(), 2.5);
        assert_eq!(SlaMultiplier::new(2.0).value(), 2.0);
    }

    #[test]
    fn resource_demand_covers_checks_every_dimension() {
        let total = ResourceDemand::new(4.0, 8192, 1.0);
        assert!(total.covers(&ResourceDemand::new(2.0, 2048, 0.0)));
        assert!(!total.covers(&ResourceDemand::new(5.0, 2048, 0.0)));
        assert!(!total.covers(&ResourceDemand::new(2.0, 9000, 0.0)));
        assert!(!total.covers(&ResourceDemand::new(2.0, 2048, 2.0)));
    }

    #[test]
    fn sla_success_requires_success_and_on_time() {
        let task = Task {
            id: "t".into(),
            task_type: TaskType::CpuLight,
            demand: ResourceDemand::default(),
            priority: 5,
            k: SlaMultiplier::new(2.0),
            submitted_at: SystemTime::UNIX_EPOCH,
            deadline: SystemTime::UNIX_EPOCH + Duration::from_secs(60),
            status: TaskStatus::Running,
            assigned_worker: Some("w1".into()),
            docker_image: "img".into(),
        };
        assert!(task.sla_success(SystemTime::UNIX_EPOCH + Duration::from_secs(55), true));
        assert!(!task.sla_success(SystemTime::UNIX_EPOCH + Duration::from_secs(65), true));
        assert!(!task.sla_success(SystemTime::UNIX_EPOCH + Duration::from_secs(55), false));
    }
}
