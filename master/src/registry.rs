//! Worker registry, reservation ledger, and registration gate (C2 + C9).
//!
//! The registry owns every `Worker` entry and the reservation ledger.
//! Reservations are keyed by task id for O(1) release (§9 design note); a
//! per-worker view is derived on demand by scanning the ledger rather than
//! maintained as a second synchronized structure, avoiding the back-reference
//! chain the design notes warn against.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::task::ResourceDemand;

/// Worker liveness state (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Pre-registered but not yet connected.
    Authorized,
    /// Heartbeat received within the stale timeout.
    Active,
    /// No heartbeat for at least the stale timeout.
    Stale,
}

/// Errors raised by [`WorkerRegistry`] operations.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum RegistryError {
    #[error("worker '{0}' already authorized")]
    AlreadyExists(String),

    #[error("worker '{0}' is not authorized")]
    Unauthorized(String),

    #[error("worker '{0}' not found")]
    NotFound(String),

    #[error("insufficient {resource} on worker '{worker}': requested {requested}, available {available}")]
    Insufficient {
        worker: String,
        resource: &'static str,
        requested: f64,
        available: f64,
    },
}

/// A registered compute node.
#[derive(Debug, Clone)]
pub struct Worker {
    pub id: String,
    pub addr: String,
    pub total: ResourceDemand,
    pub storage_mb: u64,
    pub liveness: Liveness,
    pub last_heartbeat: Option<Instant>,
    pub last_assigned: Option<Instant>,
}

/// A provisional resource debit against a worker (§3).
#[derive(Debug, Clone)]
pub struct Reservation {
    pub task_id: String,
    pub worker_id: String,
    pub reserved: ResourceDemand,
    pub expiry: Instant,
}

/// A read-only view of a worker's current availability, as returned by
/// [`WorkerRegistry::snapshot`].
#[derive(Debug, Clone)]
pub struct WorkerView {
    pub worker: Worker,
    pub available: ResourceDemand,
    pub load: f64,
}

/// The worker map, reservation ledger, and admission gate.
pub struct WorkerRegistry {
    workers: DashMap<String, Worker>,
    reservations: DashMap<String, Reservation>,
    stale_timeout: Duration,
    /// Serializes `reserve`'s check-then-insert sequence across the
    /// `workers`/`reservations` maps (§4.2: reserve/release/snapshot are
    /// linearizable). DashMap's per-key sharding makes each individual map
    /// access atomic but not the two-map sequence as a whole — two
    /// concurrent `reserve` calls against the same worker could otherwise
    /// both read the same availability and both insert, over-committing the
    /// worker past `total`.
    reserve_lock: parking_lot::Mutex<()>,
}

impl WorkerRegistry {
    pub fn new(stale_timeout: Duration) -> Self {
        Self {
            workers: DashMap::new(),
            reservations: DashMap::new(),
            stale_timeout,
            reserve_lock: parking_lot::Mutex::new(()),
        }
    }

    /// Pre-authorize a worker id/address pair (C9). Fails if already present.
    pub fn authorize(&self, id: &str, addr: &str) -> Result<(), RegistryError> {
        if self.workers.contains_key(id) {
            return Err(RegistryError::AlreadyExists(id.to_string()));
        }
        self.workers.insert(
            id.to_string(),
            Worker {
                id: id.to_string(),
                addr: addr.to_string(),
                total: ResourceDemand::default(),
                storage_mb: 0,
                liveness: Liveness::Authorized,
                last_heartbeat: None,
                last_assigned: None,
            },
        );
        info!(worker = id, addr, "worker authorized");
        Ok(())
    }

    /// Remove a worker and its reservations (explicit, per §4.9).
    pub fn unauthorize(&self, id: &str) -> Result<(), RegistryError> {
        self.workers
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        self.reservations.retain(|_, r| r.worker_id != id);
        info!(worker = id, "worker unauthorized");
        Ok(())
    }

    /// Accept a worker-initiated connection. Only permitted if `id` is
    /// `AUTHORIZED`; fills in capacity and marks the worker `ACTIVE`.
    pub fn connect(&self, id: &str, total: ResourceDemand, storage_mb: u64) -> Result<(), RegistryError> {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| RegistryError::Unauthorized(id.to_string()))?;
        entry.total = total;
        entry.storage_mb = storage_mb;
        entry.liveness = Liveness::Active;
        entry.last_heartbeat = Some(Instant::now());
        info!(worker = id, "worker connected");
        Ok(())
    }

    /// Stamp a heartbeat, keeping the worker `ACTIVE`.
    pub fn heartbeat(&self, id: &str) -> Result<(), RegistryError> {
        let mut entry = self
            .workers
            .get_mut(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        entry.last_heartbeat = Some(Instant::now());
        entry.liveness = Liveness::Active;
        Ok(())
    }

    /// Atomically check `available ≥ demand` and append a reservation.
    ///
    /// Holds `reserve_lock` across the whole check-and-insert so two
    /// concurrent reservations against the same worker can't both observe
    /// the pre-reservation availability and both succeed.
    pub fn reserve(
        &self,
        task_id: &str,
        worker_id: &str,
        demand: ResourceDemand,
        ttl: Duration,
    ) -> Result<(), RegistryError> {
        let _guard = self.reserve_lock.lock();
        let worker = self
            .workers
            .get(worker_id)
            .ok_or_else(|| RegistryError::NotFound(worker_id.to_string()))?
            .clone();
        let available = self.available_for(&worker);

        if available.cpu < demand.cpu {
            return Err(RegistryError::Insufficient {
                worker: worker_id.to_string(),
                resource: "cpu",
                requested: demand.cpu,
                available: available.cpu,
            });
        }
        if available.memory_mb < demand.memory_mb {
            return Err(RegistryError::Insufficient {
                worker: worker_id.to_string(),
                resource: "memory",
                requested: demand.memory_mb as f64,
                available: available.memory_mb as f64,
            });
        }
        if available.gpu < demand.gpu {
            return Err(RegistryError::Insufficient {
                worker: worker_id.to_string(),
                resource: "gpu",
                requested: demand.gpu,
                available: available.gpu,
            });
        }

        self.reservations.insert(
            task_id.to_string(),
            Reservation {
                task_id: task_id.to_string(),
                worker_id: worker_id.to_string(),
                reserved: demand,
                expiry: Instant::now() + ttl,
            },
        );
        Ok(())
    }

    /// Release a reservation. Idempotent.
    pub fn release(&self, task_id: &str) {
        self.reservations.remove(task_id);
    }

    /// Record that `worker_id` was just assigned a task, for RTS tie-breaking.
    pub fn record_assignment(&self, worker_id: &str) {
        if let Some(mut w) = self.workers.get_mut(worker_id) {
            w.last_assigned = Some(Instant::now());
        }
    }

    /// A consistent point-in-time view of every `ACTIVE` worker with its
    /// computed availability and load.
    pub fn snapshot(&self) -> Vec<WorkerView> {
        self.workers
            .iter()
            .filter(|e| e.liveness == Liveness::Active)
            .map(|e| {
                let worker = e.value().clone();
                let available = self.available_for(&worker);
                let load = Self::load_fraction(&worker.total, &available);
                WorkerView {
                    worker,
                    available,
                    load,
                }
            })
            .collect()
    }

    /// Mark workers whose last heartbeat is older than the stale timeout as
    /// `STALE`, and expire reservations whose TTL has passed. An expired
    /// reservation's task is left to the queue processor / outcome ingestor
    /// to mark `FAILED`; this method only reports which task ids expired.
    pub fn sweep(&self) -> Vec<String> {
        let now = Instant::now();
        for mut w in self.workers.iter_mut() {
            if w.liveness == Liveness::Active {
                let stale = w
                    .last_heartbeat
                    .map(|hb| now.duration_since(hb) >= self.stale_timeout)
                    .unwrap_or(false);
                if stale {
                    warn!(worker = %w.id, "worker marked STALE (no heartbeat)");
                    w.liveness = Liveness::Stale;
                }
            }
        }

        let mut expired = Vec::new();
        self.reservations.retain(|task_id, r| {
            if r.expiry <= now {
                expired.push(task_id.clone());
                false
            } else {
                true
            }
        });
        expired
    }

    pub fn get(&self, id: &str) -> Option<Worker> {
        self.workers.get(id).map(|w| w.clone())
    }

    fn available_for(&self, worker: &Worker) -> ResourceDemand {
        let reserved = self
            .reservations
            .iter()
            .filter(|r| r.worker_id == worker.id)
            .fold(ResourceDemand::default(), |acc, r| acc.add(&r.reserved));
        worker.total.saturating_sub(&reserved)
    }

    fn load_fraction(total: &ResourceDemand, available: &ResourceDemand) -> f64 {
        let dims: [(f64, f64); 3] = [
            (total.cpu, available.cpu),
            (total.memory_mb as f64, available.memory_mb as f64),
            (total.gpu, available.gpu),
        ];
        let mut sum = 0.0;
        let mut count = 0.0;
        for (t, a) in dims {
            if t > 0.0 {
                sum += (t - a) / t;
                count += 1.0;
            }
        }
        if count == 0.0 {
            0.0
        } else {
            sum / count
        }
    }
}
