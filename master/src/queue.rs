//! Priority task queue (C1).
//!
//! Tasks are ordered by the lexicographic key `(-priority, deadline,
//! submitted_at)` — higher priority first, then earlier deadline, then
//! earlier submission. The queue owns every task it has ever seen in a
//! status index so `update_status`/`remove` are O(1) lookups; the
//! `BinaryHeap` only ever holds entries that are still `PENDING` — a
//! cancelled or already-dequeued entry left behind in the heap is skipped
//! lazily on pop rather than removed eagerly.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::time::SystemTime;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::task::{Task, TaskStatus};

/// Errors raised by [`TaskQueue`] operations.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("task '{0}' already exists")]
    DuplicateTask(String),

    #[error("task '{0}' not found")]
    NotFound(String),
}

/// Ordering key pushed onto the heap. Carries only what's needed to order
/// and identify an entry — the task body lives in the status index.
#[derive(Debug, Clone)]
struct QueueKey {
    priority: i32,
    deadline: SystemTime,
    submitted_at: SystemTime,
    id: String,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for QueueKey {}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; we want the "largest" element to be the
        // one dequeued first under (-priority, deadline, submitted_at), i.e.
        // highest priority, then earliest deadline, then earliest submission.
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.deadline.cmp(&self.deadline))
            .then_with(|| other.submitted_at.cmp(&self.submitted_at))
    }
}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Inner {
    heap: BinaryHeap<QueueKey>,
    tasks: HashMap<String, Task>,
}

/// The priority-ordered pending-task queue and task status index.
pub struct TaskQueue {
    inner: Mutex<Inner>,
    notify: Notify,
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                tasks: HashMap::new(),
            }),
            notify: Notify::new(),
        }
    }

    /// Insert a new task. Rejects a duplicate identifier; otherwise wakes any
    /// task waiting on [`wait_for_tasks`](Self::wait_for_tasks).
    pub fn enqueue(&self, task: Task) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        if inner.tasks.contains_key(&task.id) {
            return Err(QueueError::DuplicateTask(task.id));
        }
        inner.heap.push(QueueKey {
            priority: task.priority,
            deadline: task.deadline,
            submitted_at: task.submitted_at,
            id: task.id.clone(),
        });
        inner.tasks.insert(task.id.clone(), task);
        drop(inner);
        self.notify.notify_waiters();
        Ok(())
    }

    /// Pop up to `n` highest-ranked `PENDING` entries, marking each
    /// `SCHEDULED` in the status index. Entries left in the heap from a
    /// stale pop (already cancelled or re-scheduled elsewhere) are skipped.
    pub fn dequeue_batch(&self, n: usize) -> Vec<Task> {
        let mut inner = self.inner.lock();
        let mut out = Vec::with_capacity(n);
        while out.len() < n {
            let Some(key) = inner.heap.pop() else {
                break;
            };
            let Some(task) = inner.tasks.get_mut(&key.id) else {
                continue; // removed entirely, stale heap entry
            };
            if task.status != TaskStatus::Pending {
                continue; // cancelled or already dequeued, stale heap entry
            }
            task.status = TaskStatus::Scheduled;
            out.push(task.clone());
        }
        out
    }

    /// Transition a specific `PENDING` task to `SCHEDULED` by id, leaving its
    /// heap entry to be skipped lazily — the queue processor uses this after
    /// it has already chosen exactly which pending task to place, rather
    /// than `dequeue_batch` popping whatever is on top of the heap.
    pub fn mark_scheduled(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if task.status == TaskStatus::Pending {
            task.status = TaskStatus::Scheduled;
        }
        Ok(())
    }

    /// Non-destructive snapshot of every `PENDING` task.
    pub fn peek_pending(&self) -> Vec<Task> {
        let inner = self.inner.lock();
        inner
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect()
    }

    /// Update a task's status. Re-enqueues the task if the new status is
    /// `FAILED` and the task is not currently represented in the heap (it
    /// was dequeued earlier) — this is the unbounded retry behaviour called
    /// out as an open question in the design notes; callers that need a
    /// retry cap must track attempts externally.
    ///
    /// A task already in a terminal state (§3: `COMPLETED`/`FAILED`/
    /// `CANCELLED`) is left untouched — in particular a dispatch failure
    /// racing a user-initiated cancel must not resurrect a `CANCELLED` task
    /// back to `PENDING`.
    pub fn update_status(&self, id: &str, status: TaskStatus) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let was_pending;
        {
            let task = inner
                .tasks
                .get_mut(id)
                .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
            if task.status.is_terminal() {
                return Ok(());
            }
            was_pending = task.status == TaskStatus::Pending;
            task.status = status;
        }
        if status == TaskStatus::Failed && !was_pending {
            let task = &inner.tasks[id];
            let key = QueueKey {
                priority: task.priority,
                deadline: task.deadline,
                submitted_at: task.submitted_at,
                id: task.id.clone(),
            };
            inner.heap.push(key);
            let task = inner.tasks.get_mut(id).unwrap();
            task.status = TaskStatus::Pending;
            drop(inner);
            self.notify.notify_waiters();
            return Ok(());
        }
        Ok(())
    }

    /// Set a task's status without the `FAILED` auto-requeue side effect of
    /// [`update_status`](Self::update_status). Used for outcomes reported by
    /// the outcome ingestor (C8): a task that has actually run to COMPLETED
    /// or FAILED on a worker is terminal and must not bounce back to
    /// PENDING — only a dispatch-attempt failure (via `update_status`) gets
    /// the retry treatment.
    pub fn mark_terminal(&self, id: &str, status: TaskStatus) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        task.status = status;
        Ok(())
    }

    /// Cancel a task. A task in a terminal state is left untouched (cannot be
    /// un-terminated); otherwise it transitions to `CANCELLED` and, if still
    /// in the heap, will be skipped lazily on the next pop.
    pub fn remove(&self, id: &str) -> Result<(), QueueError> {
        let mut inner = self.inner.lock();
        let task = inner
            .tasks
            .get_mut(id)
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;
        if !task.status.is_terminal() {
            task.status = TaskStatus::Cancelled;
        }
        Ok(())
    }

    /// Look up a single task by id, regardless of status.
    pub fn get(&self, id: &str) -> Option<Task> {
        self.inner.lock().tasks.get(id).cloned()
    }

    /// Block until the queue has at least one `PENDING` entry. Wakes on the
    /// first `enqueue` (or re-enqueue via `update_status`) after the call.
    pub async fn wait_for_tasks(&self) {
        loop {
            if self.has_pending() {
                return;
            }
            let notified = self.notify.notified();
            if self.has_pending() {
                return;
            }
            notified.await;
        }
    }

    fn has_pending(&self) -> bool {
        self.inner
            .lock()
            .tasks
            .values()
            .any(|t| t.status == TaskStatus::Pending)
    }
}
