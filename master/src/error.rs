//! Client-visible error taxonomy (§7).
//!
//! Internal failures (admission rejections, insufficient capacity, no-fit)
//! stay in their component-specific error types ([`crate::queue::QueueError`],
//! [`crate::registry::RegistryError`], [`crate::scheduler::SchedulerError`]);
//! this enum is only what [`crate::master::Master`]'s public API returns.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Error {
    #[error("invalid task spec: {0}")]
    InvalidSpec(String),

    #[error("task '{0}' already exists")]
    DuplicateTask(String),

    #[error("'{0}' not found")]
    NotFound(String),

    #[error("worker '{0}' is not authorized")]
    Unauthorized(String),
}
