//! Single-writer priority queue for all outbound API calls (§4.2).
//!
//! A single background worker task dequeues items in `(priority,
//! sequence)` order, dispatches them through an [`ApiClient`], applies
//! the §4.2 retry/cooldown policy on rate limits, and delivers terminal
//! states to submitters in completion order via a broadcast channel.

mod persist;
mod worker;

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, Weak};

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{broadcast, oneshot, Notify};
use tracing::debug;

use crate::error::{ApiError, StorageError};
use crate::http::ApiClient;
use crate::model::{ApiRequest, Priority, QueueItemSnapshot, QueueStatus};

/// §9 Open Question (a): fixed at 3.
pub const MAX_RETRIES: u32 = 3;
/// §4.2: auto-retry only below this threshold; above it, cooldown.
pub const AUTO_RETRY_CEILING_SECS: u64 = 60;
pub const DEFAULT_HISTORY_CAP: usize = 5000;

#[derive(Debug, Clone)]
pub struct QueueItemSpec {
    pub priority: Priority,
    pub category: String,
    pub action: String,
    pub request: ApiRequest,
}

/// Returned by `submit`; lets the caller cancel and await the terminal
/// snapshot independently of the broadcast event stream.
pub struct Handle {
    pub id: u64,
    queue: Weak<ApiQueue>,
    result_rx: oneshot::Receiver<QueueItemSnapshot>,
}

impl Handle {
    /// Cooperative cancellation (§5): removes a pending item from the
    /// queue synchronously. A running item is left to complete; its
    /// entry is already gone from the map by the time it finishes, so
    /// the real result is discarded and this cancellation's `Cancelled`
    /// status is what submitters and history observe — unless the item
    /// was classified first, in which case this call is a no-op and that
    /// classification wins.
    pub fn cancel(&self) {
        if let Some(queue) = self.queue.upgrade() {
            queue.cancel_item(self.id);
        }
    }

    pub async fn result(self) -> Option<QueueItemSnapshot> {
        self.result_rx.await.ok()
    }
}

#[derive(PartialEq, Eq)]
struct HeapKey {
    priority: Priority,
    seq: u64,
}

impl Ord for HeapKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse so BinaryHeap (max-heap) pops the smallest
        // (highest-priority, earliest-sequence) entry first.
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for HeapKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Entry {
    snapshot: QueueItemSnapshot,
    result_tx: Option<oneshot::Sender<QueueItemSnapshot>>,
}

struct State {
    heap: BinaryHeap<(HeapKey, u64)>,
    items: HashMap<u64, Entry>,
    history: VecDeque<QueueItemSnapshot>,
    paused: bool,
}

pub struct ApiQueue {
    client: Arc<ApiClient>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    state: Mutex<State>,
    notify: Notify,
    history_cap: usize,
    events: broadcast::Sender<QueueItemSnapshot>,
    self_weak: Weak<ApiQueue>,
}

impl ApiQueue {
    pub fn new(client: Arc<ApiClient>, history_cap: usize) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(1024);
        let queue = Arc::new_cyclic(|weak| ApiQueue {
            client,
            next_id: AtomicU64::new(1),
            next_seq: AtomicU64::new(1),
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                items: HashMap::new(),
                history: VecDeque::new(),
                paused: false,
            }),
            notify: Notify::new(),
            history_cap,
            events,
            self_weak: weak.clone(),
        });
        worker::spawn(queue.clone());
        queue
    }

    /// §5: removes `id` from the live item map right away, whether it is
    /// still pending or currently running, and finishes it as
    /// `Cancelled`. A no-op if the item has already reached a terminal
    /// state (the classification that got there first wins).
    fn cancel_item(&self, id: u64) {
        let mut state = self.state.lock();
        if let Some(mut entry) = state.items.remove(&id) {
            entry.snapshot.status = QueueStatus::Cancelled;
            entry.snapshot.completed_at = Some(Utc::now());
            self.finish_locked(&mut state, entry);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueItemSnapshot> {
        self.events.subscribe()
    }

    pub fn submit(&self, spec: QueueItemSpec) -> Handle {
        let id = self.next_id.fetch_add(1, AtomicOrdering::SeqCst);
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let (tx, rx) = oneshot::channel();

        let snapshot = QueueItemSnapshot {
            id,
            priority: spec.priority,
            category: spec.category,
            action: spec.action,
            request: spec.request,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            status: QueueStatus::Pending,
            retry_count: 0,
            response: None,
            error: None,
        };

        {
            let mut state = self.state.lock();
            state.items.insert(
                id,
                Entry {
                    snapshot: snapshot.clone(),
                    result_tx: Some(tx),
                },
            );
            state.heap.push((HeapKey { priority: snapshot.priority, seq }, id));
        }
        debug!(id, priority = ?snapshot.priority, "item submitted");
        self.notify.notify_one();

        Handle {
            id,
            queue: self.self_weak.clone(),
            result_rx: rx,
        }
    }

    /// §4.2: pausing drains neither pending nor running items; a running
    /// item completes, then no new work is dispatched.
    pub fn pause(&self) {
        self.state.lock().paused = true;
    }

    pub fn resume(&self) {
        self.state.lock().paused = false;
        self.notify.notify_one();
    }

    pub fn is_paused(&self) -> bool {
        self.state.lock().paused
    }

    pub fn set_rate(&self, rate: f64) {
        self.client.set_rate(rate);
    }

    /// Structural copy of both the pending queue and history.
    pub fn snapshot(&self) -> (Vec<QueueItemSnapshot>, Vec<QueueItemSnapshot>) {
        let state = self.state.lock();
        let pending = state
            .items
            .values()
            .map(|e| e.snapshot.clone())
            .collect();
        let history = state.history.iter().cloned().collect();
        (pending, history)
    }

    /// Loads a previously saved `queue_history.json` into `history`
    /// (§4.2/§6). Meant to run once, right after construction, before
    /// any new items complete; does not touch pending work.
    pub fn restore_history(&self, path: &Path) -> Result<(), StorageError> {
        let loaded = persist::load_history(path)?;
        let mut state = self.state.lock();
        for snapshot in loaded {
            state.history.push_back(snapshot);
        }
        while state.history.len() > self.history_cap {
            state.history.pop_front();
        }
        Ok(())
    }

    /// Atomically writes the current history to `path` (§4.2/§6). Meant
    /// to run on profile switch and application shutdown.
    pub fn persist_history(&self, path: &Path) -> Result<(), StorageError> {
        let history: Vec<_> = self.state.lock().history.iter().cloned().collect();
        persist::save_history(path, &history)
    }

    fn dequeue(&self) -> Option<u64> {
        let mut state = self.state.lock();
        if state.paused {
            return None;
        }
        loop {
            let (_, id) = state.heap.pop()?;
            // Lazily skip entries for items already removed (cancelled
            // while pending) or currently running (re-pushed on retry
            // uses a fresh heap entry, not this stale one).
            if state.items.contains_key(&id) {
                return Some(id);
            }
        }
    }

    /// Returns `None` if the item was cancelled between dequeue and here
    /// (`cancel_item` already removed and finished it).
    fn mark_running(&self, id: u64) -> Option<QueueItemSnapshot> {
        let mut state = self.state.lock();
        let entry = state.items.get_mut(&id)?;
        entry.snapshot.status = QueueStatus::Running;
        entry.snapshot.started_at = Some(Utc::now());
        Some(entry.snapshot.clone())
    }

    /// Re-enqueue `id` at the same priority with a fresh sequence number
    /// (§4.2: re-queued items go to the back of their tier).
    fn requeue(&self, id: u64, retry_count: u32) {
        let seq = self.next_seq.fetch_add(1, AtomicOrdering::SeqCst);
        let mut state = self.state.lock();
        if let Some(entry) = state.items.get_mut(&id) {
            entry.snapshot.status = QueueStatus::Pending;
            entry.snapshot.retry_count = retry_count;
            let priority = entry.snapshot.priority;
            state.heap.push((HeapKey { priority, seq }, id));
        }
        self.notify.notify_one();
    }

    fn complete(&self, id: u64, status: QueueStatus, response: Option<serde_json::Value>, error: Option<ApiError>) {
        let mut state = self.state.lock();
        let Some(mut entry) = state.items.remove(&id) else {
            return;
        };
        entry.snapshot.status = status;
        entry.snapshot.completed_at = Some(Utc::now());
        entry.snapshot.response = response;
        entry.snapshot.error = error.map(|e| {
            let retry_after = match &e {
                ApiError::RateLimited { retry_after, .. } => Some(*retry_after),
                _ => None,
            };
            crate::model::QueueItemError {
                kind: e.kind().to_string(),
                message: e.to_string(),
                retry_after,
            }
        });
        self.finish_locked(&mut state, entry);
    }

    fn finish_locked(&self, state: &mut State, mut entry: Entry) {
        state.history.push_back(entry.snapshot.clone());
        while state.history.len() > self.history_cap {
            state.history.pop_front();
        }
        if let Some(tx) = entry.result_tx.take() {
            let _ = tx.send(entry.snapshot.clone());
        }
        let _ = self.events.send(entry.snapshot);
    }

    fn client(&self) -> Arc<ApiClient> {
        self.client.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Method;

    fn spec(priority: Priority) -> QueueItemSpec {
        QueueItemSpec {
            priority,
            category: "records".into(),
            action: "test".into(),
            request: ApiRequest::new(Method::Get, "/domains/"),
        }
    }

    #[tokio::test]
    async fn cancel_pending_is_synchronous() {
        let client = Arc::new(ApiClient::new("http://127.0.0.1:1", "t", 0.0).unwrap());
        let queue = ApiQueue::new(client, DEFAULT_HISTORY_CAP);
        queue.pause();
        let handle = queue.submit(spec(Priority::Normal));
        handle.cancel();
        // Resume so the worker processes the cancellation.
        queue.resume();
        let result = handle.result().await;
        assert_eq!(result.unwrap().status, QueueStatus::Cancelled);
    }
}
