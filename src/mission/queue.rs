//! Admission queue: a min-heap ordered by `effective_start_time` (spec §4.4)
//!
//! Grounded on the teacher's preference for `parking_lot::Mutex` around
//! short, non-async-held critical sections (e.g. `server/server.rs`'s
//! config lock). The monitor is the sole consumer, so a single lock around
//! peek+pop is sufficient (spec §9).

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use parking_lot::Mutex;
use serde_json::Value;
use uuid::Uuid;

/// One pending submission (spec §3 "Queue item"). Ordered by
/// `(effective_start_time, id)` ascending; `id` breaks ties
/// deterministically.
#[derive(Debug, Clone)]
pub struct QueueItem {
    pub effective_start_time: u64,
    pub id: Uuid,
    pub image: String,
    pub mission_payload: Value,
    pub issuer_id: String,
}

impl PartialEq for QueueItem {
    fn eq(&self, other: &Self) -> bool {
        self.effective_start_time == other.effective_start_time && self.id == other.id
    }
}
impl Eq for QueueItem {}

impl PartialOrd for QueueItem {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueItem {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        (self.effective_start_time, self.id).cmp(&(other.effective_start_time, other.id))
    }
}

/// Multi-producer, single-consumer priority queue (spec §4.4, §5).
/// `BinaryHeap` is a max-heap, so entries are wrapped in `Reverse` to get
/// min-heap-by-start-time ordering.
#[derive(Default)]
pub struct AdmissionQueue {
    heap: Mutex<BinaryHeap<Reverse<QueueItem>>>,
}

impl AdmissionQueue {
    pub fn new() -> Self {
        Self { heap: Mutex::new(BinaryHeap::new()) }
    }

    /// Enqueue does not block (spec §4.5 "Enqueue does not block").
    pub fn put(&self, item: QueueItem) {
        self.heap.lock().push(Reverse(item));
    }

    pub fn empty(&self) -> bool {
        self.heap.lock().is_empty()
    }

    /// Non-destructive look at the due-soonest item's `effective_start_time`.
    pub fn peek_start_time(&self) -> Option<u64> {
        self.heap.lock().peek().map(|Reverse(item)| item.effective_start_time)
    }

    /// Pop the head if it is due (`effective_start_time <= now`); otherwise
    /// leave the queue untouched (spec O5 "queue obedience").
    pub fn try_pop_due(&self, now: u64) -> Option<QueueItem> {
        let mut heap = self.heap.lock();
        match heap.peek() {
            Some(Reverse(item)) if item.effective_start_time <= now => {
                heap.pop().map(|Reverse(item)| item)
            }
            _ => None,
        }
    }

    /// Snapshot of entries belonging to `issuer_id`, in heap order (spec
    /// §4.5 `get_queue_for`).
    pub fn snapshot_for(&self, issuer_id: &str) -> Vec<QueueItem> {
        self.heap
            .lock()
            .iter()
            .map(|Reverse(item)| item.clone())
            .filter(|item| item.issuer_id == issuer_id)
            .collect()
    }

    pub fn snapshot_all(&self) -> Vec<QueueItem> {
        self.heap.lock().iter().map(|Reverse(item)| item.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(start: u64, id: Uuid) -> QueueItem {
        QueueItem {
            effective_start_time: start,
            id,
            image: "sim:ok".into(),
            mission_payload: serde_json::json!({}),
            issuer_id: "issuer".into(),
        }
    }

    #[test]
    fn dequeue_order_is_ascending_start_time() {
        let q = AdmissionQueue::new();
        let first = item(100, Uuid::new_v4());
        let second = item(200, Uuid::new_v4());
        q.put(second.clone());
        q.put(first.clone());

        assert_eq!(q.try_pop_due(200).unwrap().id, first.id);
        assert_eq!(q.try_pop_due(200).unwrap().id, second.id);
    }

    #[test]
    fn ties_break_by_id() {
        let q = AdmissionQueue::new();
        let id_low = Uuid::from_u128(1);
        let id_high = Uuid::from_u128(2);
        q.put(item(100, id_high));
        q.put(item(100, id_low));

        assert_eq!(q.try_pop_due(100).unwrap().id, id_low);
        assert_eq!(q.try_pop_due(100).unwrap().id, id_high);
    }

    #[test]
    fn not_due_items_stay_queued() {
        let q = AdmissionQueue::new();
        q.put(item(500, Uuid::new_v4()));
        assert!(q.try_pop_due(100).is_none());
        assert!(!q.empty());
    }

    #[test]
    fn snapshot_for_filters_by_issuer() {
        let q = AdmissionQueue::new();
        let mut mine = item(100, Uuid::new_v4());
        mine.issuer_id = "me".into();
        let mut theirs = item(100, Uuid::new_v4());
        theirs.issuer_id = "them".into();
        q.put(mine.clone());
        q.put(theirs);

        let snapshot = q.snapshot_for("me");
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, mine.id);
    }
}
