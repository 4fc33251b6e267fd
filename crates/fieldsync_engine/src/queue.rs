//! Priority-ordered view over pending records.

use fieldsync_core::{PendingRecord, Priority, RecordId};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: u8,
    created_at: u64,
    seq: u64,
}

/// In-memory projection of the store's pending records.
///
/// Ordered high > medium > low, then by creation time, then by the order
/// records first entered the queue. Synced records are never present.
#[derive(Debug, Default)]
pub struct SyncQueue {
    order: BTreeMap<QueueKey, RecordId>,
    keys: HashMap<RecordId, QueueKey>,
    next_seq: u64,
}

impl SyncQueue {
    /// Creates an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a queue from records in the store's fairness order.
    pub fn rebuild<'a>(records: impl IntoIterator<Item = &'a PendingRecord>) -> Self {
        let mut queue = Self::new();
        for record in records {
            queue.upsert(record);
        }
        queue
    }

    /// Reflects a write of `record`.
    ///
    /// A synced record leaves the queue; anything else enters it or keeps
    /// its original position among equals.
    pub fn upsert(&mut self, record: &PendingRecord) {
        if record.synced {
            self.remove(&record.id);
            return;
        }

        let seq = match self.keys.get(&record.id) {
            Some(key) => key.seq,
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        let key = QueueKey {
            rank: record.priority.rank(),
            created_at: record.created_at,
            seq,
        };
        if let Some(old) = self.keys.insert(record.id, key) {
            self.order.remove(&old);
        }
        self.order.insert(key, record.id);
    }

    /// Drops `id` from the queue. Returns whether it was present.
    pub fn remove(&mut self, id: &RecordId) -> bool {
        match self.keys.remove(id) {
            Some(key) => {
                self.order.remove(&key);
                true
            }
            None => false,
        }
    }

    /// Whether `id` is queued.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.keys.contains_key(id)
    }

    /// Every queued id in priority order.
    pub fn snapshot(&self) -> Vec<RecordId> {
        self.order.values().copied().collect()
    }

    /// Up to `limit` high-priority ids, in order.
    pub fn high_priority(&self, limit: usize) -> Vec<RecordId> {
        self.order
            .iter()
            .take_while(|(key, _)| key.rank == Priority::High.rank())
            .take(limit)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Number of queued records.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
