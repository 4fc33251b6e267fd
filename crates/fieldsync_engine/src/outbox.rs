//! The local outbox: durable store, queue and review ledger.
//!
//! Everything here works without a network. [`SyncEngine`] adds the remote
//! peer and connectivity on top, and the CLI drives an outbox directly.
//!
//! [`SyncEngine`]: crate::SyncEngine

use crate::config::SyncConfig;
use crate::conflict::{ConflictCase, ConflictResolver, VERSION_FIELD};
use crate::error::{SyncError, SyncResult};
use crate::ledger::{ManualReviewEntry, ReviewAction, ReviewLedger, ReviewReason};
use crate::outcome::{ReviewResolution, StorageSummary};
use crate::queue::SyncQueue;
use fieldsync_codec::Value;
use fieldsync_core::{
    Clock, ConflictStrategy, CoreError, IntegrityChecker, IntegrityVerdict, LogStore,
    PendingRecord, Priority, RecordId, RecordKind, RecordStore, StoreConfig, SystemClock,
};
use parking_lot::Mutex;
use std::sync::Arc;

/// Durable pending records plus their in-memory views.
pub struct Outbox<S: RecordStore> {
    store: S,
    ledger: ReviewLedger,
    queue: Mutex<SyncQueue>,
    checker: IntegrityChecker,
    resolver: ConflictResolver,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
}

impl Outbox<LogStore> {
    /// Opens the on-disk outbox in `store_config.dir`.
    pub fn open_dir(store_config: &StoreConfig, config: SyncConfig) -> SyncResult<Self> {
        let store = LogStore::open_dir(store_config)?;
        let ledger = ReviewLedger::open_dir(store_config)?;
        Self::new(store, ledger, config, Arc::new(SystemClock))
    }

    /// Creates an empty in-memory outbox.
    pub fn in_memory(config: SyncConfig, clock: Arc<dyn Clock>) -> SyncResult<Self> {
        Self::new(LogStore::in_memory()?, ReviewLedger::in_memory()?, config, clock)
    }
}

impl<S: RecordStore> Outbox<S> {
    /// Assembles an outbox and rebuilds its queue from the store.
    pub fn new(
        store: S,
        ledger: ReviewLedger,
        config: SyncConfig,
        clock: Arc<dyn Clock>,
    ) -> SyncResult<Self> {
        let pending = store.pending()?;
        let queue = SyncQueue::rebuild(pending.iter().filter(|r| !ledger.contains(&r.id)));
        tracing::debug!(
            pending = pending.len(),
            queued = queue.len(),
            held = ledger.len(),
            "outbox opened"
        );

        Ok(Self {
            store,
            ledger,
            queue: Mutex::new(queue),
            checker: IntegrityChecker::new(config.repair_policy),
            resolver: ConflictResolver::new(config.merge_allow_list.clone()),
            clock,
            config,
        })
    }

    /// Records a new local mutation. Returns its id.
    pub fn save(
        &self,
        kind: RecordKind,
        payload: Value,
        priority: Priority,
    ) -> SyncResult<RecordId> {
        self.save_record(kind, payload, priority, None)
    }

    /// Records a new local mutation with its own conflict strategy.
    pub fn save_with_strategy(
        &self,
        kind: RecordKind,
        payload: Value,
        priority: Priority,
        strategy: ConflictStrategy,
    ) -> SyncResult<RecordId> {
        self.save_record(kind, payload, priority, Some(strategy))
    }

    fn save_record(
        &self,
        kind: RecordKind,
        payload: Value,
        priority: Priority,
        strategy: Option<ConflictStrategy>,
    ) -> SyncResult<RecordId> {
        let mut record = PendingRecord::new(kind, payload, priority, self.now()).map_err(
            |e| match e {
                CoreError::Codec(codec) => SyncError::InvalidPayload {
                    message: codec.to_string(),
                },
                other => SyncError::Storage(other),
            },
        )?;
        record.conflict_strategy = strategy;
        let id = record.id;
        self.commit(record)?;
        tracing::info!(record_id = %id, kind = %kind, priority = %priority, "saved record");
        Ok(id)
    }

    /// Unsynced records in fairness order.
    pub fn pending(&self) -> SyncResult<Vec<PendingRecord>> {
        Ok(self.store.pending()?)
    }

    /// Looks up a record.
    pub fn get(&self, id: &RecordId) -> SyncResult<Option<PendingRecord>> {
        Ok(self.store.get(id)?)
    }

    /// Queued records in priority order.
    pub fn priority_view(&self) -> SyncResult<Vec<PendingRecord>> {
        let ids = self.queue.lock().snapshot();
        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(record) = self.store.get(&id)? {
                records.push(record);
            }
        }
        Ok(records)
    }

    /// Number of queued records.
    pub fn queue_len(&self) -> usize {
        self.queue.lock().len()
    }

    /// Records held for manual review, oldest first.
    pub fn list_manual_review(&self) -> Vec<ManualReviewEntry> {
        self.ledger.list()
    }

    /// Applies an operator decision to a held record.
    pub fn resolve_manual_review(
        &self,
        id: &RecordId,
        action: ReviewAction,
    ) -> SyncResult<ReviewResolution> {
        let entry = self
            .ledger
            .get(id)
            .ok_or(SyncError::NotInReview { id: *id })?;

        let resolution = match action {
            ReviewAction::Delete => {
                self.store.delete(id)?;
                self.ledger.remove(id)?;
                self.queue.lock().remove(id);
                ReviewResolution::Deleted
            }
            ReviewAction::Ignore => {
                self.ledger.remove(id)?;
                if let Some(record) = self.store.get(id)? {
                    self.queue.lock().upsert(&record);
                }
                ReviewResolution::Released
            }
            ReviewAction::RepairAgain => {
                let record = self
                    .store
                    .get(id)?
                    .ok_or(SyncError::RecordNotFound { id: *id })?;
                match self.retry_held(&record, &entry.reason)? {
                    Some(updated) => {
                        self.store.put(updated.clone())?;
                        self.ledger.remove(id)?;
                        self.queue.lock().upsert(&updated);
                        ReviewResolution::Repaired
                    }
                    None => ReviewResolution::StillHeld,
                }
            }
        };

        tracing::info!(record_id = %id, action = %action, ?resolution, "manual review resolved");
        Ok(resolution)
    }

    fn retry_held(
        &self,
        record: &PendingRecord,
        reason: &ReviewReason,
    ) -> SyncResult<Option<PendingRecord>> {
        let now = self.now();
        match reason {
            ReviewReason::Corruption(_) => Ok(self.checker.repair(record, now)),
            ReviewReason::Conflict { server_payload } => {
                if record.payload.is_none() {
                    return Ok(None);
                }
                let case = ConflictCase::from_record(record, server_payload.clone(), now);
                let strategy = self.strategy_for(record);
                Ok(self
                    .resolver
                    .resolve(&case, strategy)
                    .and_then(|resolved| self.revise(record, resolved).ok()))
            }
        }
    }

    /// Changes the conflict strategy of a stored record.
    pub fn set_conflict_strategy(
        &self,
        id: &RecordId,
        strategy: ConflictStrategy,
    ) -> SyncResult<()> {
        let mut record = self
            .store
            .get(id)?
            .ok_or(SyncError::RecordNotFound { id: *id })?;
        record.conflict_strategy = Some(strategy);
        self.store.put(record)?;
        Ok(())
    }

    /// Verifies every pending record without changing anything.
    pub fn verify_all(&self) -> SyncResult<Vec<IntegrityVerdict>> {
        Ok(self
            .store
            .pending()?
            .iter()
            .map(|r| self.checker.verify(r))
            .collect())
    }

    /// Drops every synced record from the store.
    pub fn purge_synced(&self) -> SyncResult<usize> {
        Ok(self.store.purge_synced()?)
    }

    /// Store totals.
    pub fn storage_summary(&self) -> SyncResult<StorageSummary> {
        Ok(StorageSummary {
            total: self.store.len(),
            pending_count: self.store.pending_count()?,
            approx_size_bytes: self.store.approx_size_bytes(),
            manual_review_count: self.ledger.len(),
        })
    }

    /// The engine configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub(crate) fn store(&self) -> &S {
        &self.store
    }

    pub(crate) fn ledger(&self) -> &ReviewLedger {
        &self.ledger
    }

    pub(crate) fn checker(&self) -> &IntegrityChecker {
        &self.checker
    }

    pub(crate) fn resolver(&self) -> &ConflictResolver {
        &self.resolver
    }

    pub(crate) fn now(&self) -> u64 {
        self.clock.now_millis()
    }

    pub(crate) fn high_priority_batch(&self) -> Vec<RecordId> {
        self.queue
            .lock()
            .high_priority(self.config.background_batch_size)
    }

    pub(crate) fn strategy_for(&self, record: &PendingRecord) -> ConflictStrategy {
        record
            .conflict_strategy
            .unwrap_or(self.config.default_strategy)
    }

    /// A new pending version of `record` carrying `payload`.
    pub(crate) fn revise(
        &self,
        record: &PendingRecord,
        payload: Value,
    ) -> SyncResult<PendingRecord> {
        let hinted = u64::try_from(payload.integer_field(VERSION_FIELD)).unwrap_or(0);
        record.revise(payload, hinted, self.now()).map_err(|e| match e {
            CoreError::Codec(codec) => SyncError::InvalidPayload {
                message: codec.to_string(),
            },
            other => SyncError::Storage(other),
        })
    }

    /// Persists `record` and reflects it in the queue.
    pub(crate) fn commit(&self, record: PendingRecord) -> SyncResult<()> {
        let mut queue = self.queue.lock();
        self.store.put(record.clone())?;
        if self.ledger.contains(&record.id) {
            queue.remove(&record.id);
        } else {
            queue.upsert(&record);
        }
        Ok(())
    }

    /// Marks `id` synced and drops it from the queue.
    pub(crate) fn complete(&self, id: &RecordId) -> SyncResult<()> {
        let mut queue = self.queue.lock();
        self.store.mark_synced(id)?;
        queue.remove(id);
        Ok(())
    }

    /// Moves a record into manual review.
    pub(crate) fn hold(&self, record: &PendingRecord, reason: ReviewReason) -> SyncResult<()> {
        let mut queue = self.queue.lock();
        self.ledger.add(record.id, record.kind, reason, self.now())?;
        queue.remove(&record.id);
        Ok(())
    }
}

impl<S: RecordStore> std::fmt::Debug for Outbox<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Outbox")
            .field("records", &self.store.len())
            .field("queued", &self.queue.lock().len())
            .field("held", &self.ledger.len())
            .finish_non_exhaustive()
    }
}
