/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! CloudAI master – scheduling and resource-management core.
//!
//! ```text
//! lib.rs
//! ├── task/        – task record, status index, inference rules
//! ├── queue        – priority-deadline-FIFO pending queue (C1)
//! ├── registry      – worker registry + reservation ledger (C2, C9)
//! ├── tau           – per-task-type expected runtime store (C3)
//! ├── params        – hot-reloaded weights / affinity / penalty (C4)
//! ├── success       – per-worker per-type historical success rate
//! ├── scheduler/    – RTS + round-robin worker selection (C5, C6)
//! ├── processor     – queue-draining dispatch loop (C7)
//! ├── outcome       – terminal-outcome ingestion (C8)
//! ├── dispatch      – external dispatch/sink collaborator traits
//! ├── config        – environment-sourced runtime configuration
//! └── error         – crate-wide error taxonomy
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod master;
pub mod outcome;
pub mod params;
pub mod penalty;
pub mod processor;
pub mod queue;
pub mod registry;
pub mod scheduler;
pub mod success;
pub mod task;
pub mod tau;
