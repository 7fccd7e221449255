//! Structured error/outcome types for worker selection.
//!
//! Mirrors the two-layer shape of the original global scheduler's error
//! design: a low-level reason enum carried inside a top-level result, so a
//! caller always knows both *what* failed and *why* without re-deriving it
//! from context.

use thiserror::Error;

/// Why a worker selection call could not place the task.
#[derive(Debug, Clone, PartialEq)]
pub enum NoFitReason {
    /// No `ACTIVE` worker's available capacity covers the task's demand.
    NoFeasibleWorker,
    /// The worker snapshot passed in was empty.
    NoWorkers,
}

impl std::fmt::Display for NoFitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NoFitReason::NoFeasibleWorker => write!(f, "no ACTIVE worker has capacity for this task"),
            NoFitReason::NoWorkers => write!(f, "no ACTIVE workers are registered"),
        }
    }
}

/// Top-level error from a selection attempt (C5 or C6).
#[derive(Debug, Error, Clone, PartialEq)]
pub enum SchedulerError {
    #[error("no-fit: {0}")]
    NoFit(NoFitReason),
}
