//! Durable record store.
//!
//! [`RecordStore`] is the narrow interface the sync engine persists through.
//! [`LogStore`] implements it as an append-only log of CRC-framed records
//! with an in-memory index rebuilt by replay at open. Superseded frames are
//! dropped by compaction, which runs on purge and whenever dead bytes
//! outweigh live ones.

use crate::config::StoreConfig;
use crate::error::{CoreError, CoreResult};
use crate::log::{needs_compaction, Frame, FrameKind, FrameLog};
use crate::record::{PendingRecord, RecordId};
use fieldsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Persistence contract for pending records.
///
/// Every write replaces the whole record under one store-wide lock, so
/// concurrent writers never interleave fields of the same record.
pub trait RecordStore: Send + Sync {
    /// Inserts or replaces a record by id.
    ///
    /// Rejects a write whose version is below the stored one.
    fn put(&self, record: PendingRecord) -> CoreResult<()>;

    /// Looks a record up by id.
    fn get(&self, id: &RecordId) -> CoreResult<Option<PendingRecord>>;

    /// Unsynced records by ascending creation time, ties by insertion order.
    fn pending(&self) -> CoreResult<Vec<PendingRecord>>;

    /// Every live record, synced or not, in the same order as `pending`.
    fn all(&self) -> CoreResult<Vec<PendingRecord>>;

    /// Marks a record synced.
    fn mark_synced(&self, id: &RecordId) -> CoreResult<()>;

    /// Bumps a record's retry counter, returning the new count.
    fn increment_retry(&self, id: &RecordId) -> CoreResult<u32>;

    /// Removes a record. Returns whether it existed.
    fn delete(&self, id: &RecordId) -> CoreResult<bool>;

    /// Removes every synced record and reclaims the space they held.
    /// Returns how many were removed.
    fn purge_synced(&self) -> CoreResult<usize>;

    /// Number of unsynced records.
    fn pending_count(&self) -> CoreResult<usize> {
        Ok(self.pending()?.len())
    }

    /// Number of live records.
    fn len(&self) -> usize;

    /// Whether the store holds no records.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Approximate bytes occupied by live records.
    fn approx_size_bytes(&self) -> u64;
}

#[derive(Debug)]
struct IndexEntry {
    offset: u64,
    encoded_len: u64,
    seq: u64,
    created_at: u64,
    synced: bool,
    /// Fast-path copy of unsynced records.
    cached: Option<PendingRecord>,
}

#[derive(Debug)]
struct StoreState {
    log: FrameLog,
    index: HashMap<RecordId, IndexEntry>,
    next_seq: u64,
    /// Sum of `encoded_len` over the index.
    live_bytes: u64,
}

impl StoreState {
    fn load(&self, id: &RecordId, entry: &IndexEntry) -> CoreResult<PendingRecord> {
        if let Some(record) = &entry.cached {
            return Ok(record.clone());
        }
        let frame = self.log.read(entry.offset)?;
        let record = PendingRecord::decode(&frame.body)?;
        if record.id != *id {
            return Err(CoreError::log_corruption(
                entry.offset,
                format!("index points {id} at record {}", record.id),
            ));
        }
        Ok(record)
    }

    fn persist(&mut self, record: PendingRecord) -> CoreResult<()> {
        let frame = Frame::put(*record.id.as_bytes(), record.encode());
        let encoded_len = frame.encoded_len() as u64;
        let offset = self.log.append(&frame)?;

        let seq = match self.index.get(&record.id) {
            Some(existing) => {
                self.live_bytes -= existing.encoded_len;
                existing.seq
            }
            None => {
                self.next_seq += 1;
                self.next_seq
            }
        };
        self.live_bytes += encoded_len;
        self.index.insert(
            record.id,
            IndexEntry {
                offset,
                encoded_len,
                seq,
                created_at: record.created_at,
                synced: record.synced,
                cached: (!record.synced).then_some(record),
            },
        );
        Ok(())
    }

    fn remove(&mut self, id: &RecordId) -> CoreResult<bool> {
        if !self.index.contains_key(id) {
            return Ok(false);
        }
        self.log.append(&Frame::tombstone(*id.as_bytes()))?;
        if let Some(entry) = self.index.remove(id) {
            self.live_bytes -= entry.encoded_len;
        }
        Ok(true)
    }

    /// Rewrites the log with one frame per live record, in replay order.
    fn compact(&mut self) -> CoreResult<u64> {
        let before = self.log.size()?;
        let mut live: Vec<(RecordId, u64, u64)> = self
            .index
            .iter()
            .map(|(id, e)| (*id, e.seq, e.offset))
            .collect();
        live.sort_by_key(|(_, seq, _)| *seq);

        let frames = live
            .iter()
            .map(|(_, _, offset)| self.log.read(*offset))
            .collect::<CoreResult<Vec<_>>>()?;
        let offsets = self.log.rewrite(&frames)?;
        for ((id, _, _), offset) in live.iter().zip(offsets) {
            if let Some(entry) = self.index.get_mut(id) {
                entry.offset = offset;
            }
        }

        let after = self.log.size()?;
        tracing::info!(before, after, records = live.len(), "record log compacted");
        Ok(before.saturating_sub(after))
    }

    /// Compacts if dead bytes have piled up. A failed rewrite leaves the
    /// old log in place, so the write that triggered it still stands.
    fn maybe_compact(&mut self) {
        let total = match self.log.size() {
            Ok(total) => total,
            Err(e) => {
                tracing::warn!(error = %e, "cannot size record log");
                return;
            }
        };
        if needs_compaction(total, self.live_bytes) {
            if let Err(e) = self.compact() {
                tracing::warn!(error = %e, "record log compaction failed");
            }
        }
    }

    fn ordered(&self, include_synced: bool) -> CoreResult<Vec<PendingRecord>> {
        let mut entries: Vec<(&RecordId, &IndexEntry)> = self
            .index
            .iter()
            .filter(|(_, e)| include_synced || !e.synced)
            .collect();
        entries.sort_by_key(|(_, e)| (e.created_at, e.seq));
        entries
            .into_iter()
            .map(|(id, entry)| self.load(id, entry))
            .collect()
    }

    fn existing(&self, id: &RecordId) -> CoreResult<PendingRecord> {
        let entry = self
            .index
            .get(id)
            .ok_or(CoreError::RecordNotFound { id: *id })?;
        self.load(id, entry)
    }
}

/// Log-structured [`RecordStore`].
#[derive(Debug)]
pub struct LogStore {
    state: RwLock<StoreState>,
}

impl LogStore {
    /// Opens a store over `backend`, replaying its log.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> CoreResult<Self> {
        let (log, frames) = FrameLog::open(backend, sync_on_write)?;
        let mut index: HashMap<RecordId, IndexEntry> = HashMap::new();
        let mut next_seq = 0u64;
        let mut superseded = 0u64;

        for located in frames {
            let id = RecordId::from_bytes(located.frame.key);
            match located.frame.kind {
                FrameKind::Tombstone => {
                    index.remove(&id);
                    superseded += 1;
                }
                FrameKind::Put => {
                    let record = PendingRecord::decode(&located.frame.body).map_err(|e| {
                        CoreError::log_corruption(located.offset, format!("bad record: {e}"))
                    })?;
                    let seq = match index.get(&id) {
                        Some(existing) => {
                            superseded += 1;
                            existing.seq
                        }
                        None => {
                            next_seq += 1;
                            next_seq
                        }
                    };
                    index.insert(
                        id,
                        IndexEntry {
                            offset: located.offset,
                            encoded_len: located.frame.encoded_len() as u64,
                            seq,
                            created_at: record.created_at,
                            synced: record.synced,
                            cached: (!record.synced).then_some(record),
                        },
                    );
                }
            }
        }

        tracing::debug!(records = index.len(), superseded, "record log replayed");

        let live_bytes = index.values().map(|e| e.encoded_len).sum();
        Ok(Self {
            state: RwLock::new(StoreState {
                log,
                index,
                next_seq,
                live_bytes,
            }),
        })
    }

    /// Opens (or creates) the on-disk store described by `config`.
    pub fn open_dir(config: &StoreConfig) -> CoreResult<Self> {
        let backend = FileBackend::open(&config.records_path())?;
        Self::open(Box::new(backend), config.sync_on_write)
    }

    /// Creates an empty in-memory store.
    pub fn in_memory() -> CoreResult<Self> {
        Self::from_backend(InMemoryBackend::new())
    }

    /// Opens a store over an in-memory backend.
    ///
    /// Clones of an [`InMemoryBackend`] share their bytes, so a second store
    /// opened over a clone sees everything the first one wrote.
    pub fn from_backend(backend: InMemoryBackend) -> CoreResult<Self> {
        Self::open(Box::new(backend), false)
    }

    /// Rewrites the log down to the live records, returning the bytes freed.
    pub fn compact(&self) -> CoreResult<u64> {
        self.state.write().compact()
    }

    /// Size of the log in bytes, live and dead frames together.
    pub fn log_size(&self) -> CoreResult<u64> {
        self.state.read().log.size()
    }

    /// Whether the fast-path cache holds `id`.
    #[must_use]
    pub fn is_cached(&self, id: &RecordId) -> bool {
        self.state
            .read()
            .index
            .get(id)
            .is_some_and(|e| e.cached.is_some())
    }
}

impl RecordStore for LogStore {
    fn put(&self, record: PendingRecord) -> CoreResult<()> {
        let mut state = self.state.write();
        if let Some(entry) = state.index.get(&record.id) {
            let stored = state.load(&record.id, entry)?;
            if record.version < stored.version {
                return Err(CoreError::VersionRegression {
                    id: record.id,
                    stored: stored.version,
                    attempted: record.version,
                });
            }
        }
        tracing::debug!(
            record_id = %record.id,
            kind = %record.kind,
            version = record.version,
            "put record"
        );
        state.persist(record)?;
        state.maybe_compact();
        Ok(())
    }

    fn get(&self, id: &RecordId) -> CoreResult<Option<PendingRecord>> {
        let state = self.state.read();
        match state.index.get(id) {
            Some(entry) => state.load(id, entry).map(Some),
            None => Ok(None),
        }
    }

    fn pending(&self) -> CoreResult<Vec<PendingRecord>> {
        self.state.read().ordered(false)
    }

    fn all(&self) -> CoreResult<Vec<PendingRecord>> {
        self.state.read().ordered(true)
    }

    fn mark_synced(&self, id: &RecordId) -> CoreResult<()> {
        let mut state = self.state.write();
        let mut record = state.existing(id)?;
        record.synced = true;
        state.persist(record)?;
        state.maybe_compact();
        Ok(())
    }

    fn increment_retry(&self, id: &RecordId) -> CoreResult<u32> {
        let mut state = self.state.write();
        let mut record = state.existing(id)?;
        record.retry_count = record.retry_count.saturating_add(1);
        let count = record.retry_count;
        state.persist(record)?;
        state.maybe_compact();
        Ok(count)
    }

    fn delete(&self, id: &RecordId) -> CoreResult<bool> {
        let mut state = self.state.write();
        let removed = state.remove(id)?;
        state.maybe_compact();
        Ok(removed)
    }

    fn purge_synced(&self) -> CoreResult<usize> {
        let mut state = self.state.write();
        let synced: Vec<RecordId> = state
            .index
            .iter()
            .filter(|(_, e)| e.synced)
            .map(|(id, _)| *id)
            .collect();
        for id in &synced {
            state.remove(id)?;
        }
        if !synced.is_empty() {
            tracing::info!(purged = synced.len(), "purged synced records");
        }
        if state.log.size()? > state.live_bytes {
            state.compact()?;
        }
        Ok(synced.len())
    }

    fn pending_count(&self) -> CoreResult<usize> {
        Ok(self.state.read().index.values().filter(|e| !e.synced).count())
    }

    fn len(&self) -> usize {
        self.state.read().index.len()
    }

    fn approx_size_bytes(&self) -> u64 {
        self.state.read().live_bytes
    }
}
