//! # Task Queue (C4)
//!
//! A priority heap of ready-to-dispatch tasks. Membership in the queue is
//! equivalent to the task being in `queued` status (§3 Invariants); only
//! tasks whose dependencies are already satisfied are ever enqueued (by
//! construction, via the coordinator's use of C5), so `tryDequeueReady`'s
//! dependency check in §4.4 is trivially true here and the queue's own
//! state only needs to track provider-capability eligibility.

use crate::errors::{EngineError, EngineResult};
use orchestrator_shared::models::provider::Capability;
use orchestrator_shared::models::task::{Priority, Task};
use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct QueueEntry {
    priority: Priority,
    seq: u64,
    task_uuid: Uuid,
    protocol: String,
    method: String,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}
impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    /// `BinaryHeap` is a max-heap; higher priority sorts greater, and
    /// among equal priorities the earlier-inserted (lower `seq`) entry
    /// sorts greater so FIFO order holds within a priority band.
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Inner {
    heap: BinaryHeap<QueueEntry>,
    present: HashSet<Uuid>,
    next_seq: u64,
}

/// Priority queue of ready tasks with a bounded scan for provider-capability
/// matching (§4.4).
pub struct TaskQueue {
    inner: Mutex<Inner>,
    max_size: usize,
    scan_limit: usize,
}

impl TaskQueue {
    pub fn new(max_size: usize, scan_limit: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                heap: BinaryHeap::new(),
                present: HashSet::new(),
                next_seq: 0,
            }),
            max_size,
            scan_limit,
        }
    }

    /// Inserts `task` if not already present. Idempotent: re-enqueueing an
    /// already-queued task is a no-op (§4.4).
    pub fn enqueue(&self, task: &Task) -> EngineResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        if inner.present.contains(&task.task_uuid) {
            return Ok(false);
        }
        if inner.present.len() >= self.max_size {
            return Err(EngineError::QueueFull {
                max_size: self.max_size,
            });
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.present.insert(task.task_uuid);
        inner.heap.push(QueueEntry {
            priority: task.priority,
            seq,
            task_uuid: task.task_uuid,
            protocol: task.protocol.clone(),
            method: task.method.clone(),
        });
        Ok(true)
    }

    /// Pops the highest-priority task whose `(protocol, method)` is among
    /// `provider_caps`, scanning at most `scan_limit` entries past an
    /// ineligible top before giving up (§4.4).
    pub fn try_dequeue_ready(&self, provider_caps: &HashSet<Capability>) -> Option<Uuid> {
        let mut inner = self.inner.lock().unwrap();
        let mut set_aside = Vec::new();
        let mut found = None;
        let mut scanned = 0usize;

        while scanned < self.scan_limit {
            let Some(entry) = inner.heap.pop() else {
                break;
            };
            if !inner.present.contains(&entry.task_uuid) {
                // Tombstoned by an explicit `remove` (e.g. cancellation);
                // drop it without spending scan budget.
                continue;
            }
            scanned += 1;
            let cap = (entry.protocol.clone(), entry.method.clone());
            if provider_caps.contains(&cap) {
                inner.present.remove(&entry.task_uuid);
                found = Some(entry.task_uuid);
                break;
            }
            set_aside.push(entry);
        }

        for entry in set_aside {
            inner.heap.push(entry);
        }
        found
    }

    /// Removes a queued task (e.g. on cancellation) without dispatching
    /// it. Lazily tombstoned; the heap entry is dropped on next scan.
    pub fn remove(&self, task_uuid: Uuid) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.present.remove(&task_uuid)
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap().present.len()
    }

    pub fn snapshot(&self) -> Vec<Uuid> {
        self.inner.lock().unwrap().present.iter().copied().collect()
    }
}
