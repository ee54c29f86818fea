//! # Event Scheduler (C7)
//!
//! A single timer driving a min-heap of scheduled events (retries,
//! timeouts, dead-letter guards, health probes). One background task owns
//! the timer; `schedule`/`cancel` wake it rather than it polling (§4.7).

use chrono::{DateTime, Utc};
use orchestrator_shared::models::event::EventRecord;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Notify};

#[derive(Debug, Clone)]
struct HeapEntry {
    scheduled_at: DateTime<Utc>,
    dedupe_key: String,
    event: EventRecord,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.scheduled_at == other.scheduled_at && self.dedupe_key == other.dedupe_key
    }
}
impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.scheduled_at
            .cmp(&other.scheduled_at)
            .then_with(|| self.dedupe_key.cmp(&other.dedupe_key))
    }
}

struct SchedulerState {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    dedupe: HashSet<String>,
    cancelled: HashSet<String>,
}

impl SchedulerState {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            dedupe: HashSet::new(),
            cancelled: HashSet::new(),
        }
    }
}

/// Handle to the running scheduler. Cloning is cheap (`Arc` internals);
/// the background timer task is spawned once by `new`.
pub struct EventScheduler {
    inner: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
}

impl EventScheduler {
    /// Spawns the background timer task and returns the scheduler handle
    /// plus the channel on which due events are delivered.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EventRecord>) {
        let inner = Arc::new(Mutex::new(SchedulerState::new()));
        let notify = Arc::new(Notify::new());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(inner.clone(), notify.clone(), tx));
        (Self { inner, notify }, rx)
    }

    /// Schedules `event`. Returns `false` without effect if an event with
    /// the same dedupe key is already pending (§4.7).
    pub fn schedule(&self, event: EventRecord) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.dedupe.contains(&event.dedupe_key) {
            return false;
        }
        state.dedupe.insert(event.dedupe_key.clone());
        state.cancelled.remove(&event.dedupe_key);
        state.heap.push(Reverse(HeapEntry {
            scheduled_at: event.scheduled_at,
            dedupe_key: event.dedupe_key.clone(),
            event,
        }));
        drop(state);
        self.notify.notify_one();
        true
    }

    /// Cancels a pending event by dedupe key. Returns `true` if one was
    /// pending (§4.7).
    pub fn cancel(&self, dedupe_key: &str) -> bool {
        let mut state = self.inner.lock().unwrap();
        if state.dedupe.remove(dedupe_key) {
            state.cancelled.insert(dedupe_key.to_string());
            true
        } else {
            false
        }
    }

    pub fn peek_next(&self) -> Option<EventRecord> {
        self.inner
            .lock()
            .unwrap()
            .heap
            .peek()
            .map(|Reverse(e)| e.event.clone())
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().dedupe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

async fn run(
    inner: Arc<Mutex<SchedulerState>>,
    notify: Arc<Notify>,
    emit_tx: mpsc::UnboundedSender<EventRecord>,
) {
    loop {
        let next_at = inner.lock().unwrap().heap.peek().map(|Reverse(e)| e.scheduled_at);

        match next_at {
            None => notify.notified().await,
            Some(at) => {
                let now = Utc::now();
                if at > now {
                    let wait = (at - now).to_std().unwrap_or(std::time::Duration::ZERO);
                    tokio::select! {
                        _ = tokio::time::sleep(wait) => {}
                        _ = notify.notified() => { continue; }
                    }
                }

                let mut ready = Vec::new();
                {
                    let mut state = inner.lock().unwrap();
                    while let Some(Reverse(entry)) = state.heap.peek() {
                        if entry.scheduled_at > Utc::now() {
                            break;
                        }
                        let Reverse(entry) = state.heap.pop().unwrap();
                        state.dedupe.remove(&entry.dedupe_key);
                        if !state.cancelled.remove(&entry.dedupe_key) {
                            ready.push(entry.event);
                        }
                    }
                }
                for event in ready {
                    if emit_tx.send(event).is_err() {
                        return;
                    }
                }
            }
        }
    }
}
