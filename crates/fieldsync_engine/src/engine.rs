//! The sync engine: outbox, remote peer and connectivity in one handle.

use crate::connectivity::ConnectivityObserver;
use crate::error::SyncResult;
use crate::ledger::{ManualReviewEntry, ReviewAction};
use crate::orchestrator::{CycleMode, Orchestrator};
use crate::outbox::Outbox;
use crate::outcome::{ReviewResolution, StorageSummary, SyncOutcome, SyncSkipped};
use crate::remote::RemotePeer;
use fieldsync_codec::Value;
use fieldsync_core::{
    ConflictStrategy, IntegrityVerdict, PendingRecord, Priority, RecordId, RecordKind, RecordStore,
};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Running totals across cycles.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Cycles that ran to completion.
    pub cycles_completed: u64,
    /// Cycles skipped because the device was offline.
    pub skipped_offline: u64,
    /// Cycles skipped because another one was running.
    pub skipped_busy: u64,
    /// Records the remote accepted.
    pub records_synced: u64,
    /// Failed pushes.
    pub records_failed: u64,
    /// Conflicts reported by the remote.
    pub conflicts: u64,
    /// Records moved to manual review.
    pub records_held: u64,
    /// When the last cycle finished.
    pub last_sync_time: Option<Instant>,
    /// Last cycle-aborting error.
    pub last_error: Option<String>,
}

/// Clears the running flag when dropped, on every exit path.
struct RunningGuard<'a>(&'a AtomicBool);

impl<'a> RunningGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Offline-first sync engine.
///
/// Construct once and share through an [`Arc`]; at most one sync cycle runs
/// at a time and concurrent callers return immediately.
pub struct SyncEngine<S: RecordStore, P: RemotePeer> {
    outbox: Outbox<S>,
    peer: P,
    connectivity: Arc<dyn ConnectivityObserver>,
    running: AtomicBool,
    stats: RwLock<SyncStats>,
}

impl<S: RecordStore, P: RemotePeer> SyncEngine<S, P> {
    /// Creates an engine.
    pub fn new(outbox: Outbox<S>, peer: P, connectivity: Arc<dyn ConnectivityObserver>) -> Self {
        Self {
            outbox,
            peer,
            connectivity,
            running: AtomicBool::new(false),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Runs a full cycle over every pending record in creation order.
    pub fn sync(&self) -> SyncResult<SyncOutcome> {
        self.run(CycleMode::Full)
    }

    /// Runs a short cycle over at most the configured number of
    /// high-priority records.
    pub fn sync_background(&self) -> SyncResult<SyncOutcome> {
        self.run(CycleMode::Background)
    }

    fn run(&self, mode: CycleMode) -> SyncResult<SyncOutcome> {
        let start = Instant::now();

        if !self.connectivity.is_online() {
            tracing::debug!(?mode, "sync skipped: offline");
            self.stats.write().skipped_offline += 1;
            return Ok(Self::skip(SyncSkipped::Offline, start.elapsed()));
        }

        let Some(_guard) = RunningGuard::acquire(&self.running) else {
            tracing::debug!(?mode, "sync skipped: already running");
            self.stats.write().skipped_busy += 1;
            return Ok(Self::skip(SyncSkipped::AlreadyRunning, start.elapsed()));
        };

        let result = Orchestrator::new(&self.outbox, &self.peer).run(mode);

        let mut stats = self.stats.write();
        match &result {
            Ok(outcome) => {
                stats.cycles_completed += 1;
                stats.records_synced += outcome.synced_count as u64;
                stats.records_failed += outcome.failed_count as u64;
                stats.conflicts += outcome.conflict_count as u64;
                stats.records_held += outcome.review_count as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "sync cycle aborted");
                stats.last_error = Some(e.to_string());
            }
        }
        result
    }

    fn skip(reason: SyncSkipped, elapsed: Duration) -> SyncOutcome {
        SyncOutcome::skipped(reason).finish(elapsed)
    }

    /// Whether a cycle is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Totals across cycles.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// The local outbox.
    pub fn outbox(&self) -> &Outbox<S> {
        &self.outbox
    }

    /// The remote peer.
    pub fn peer(&self) -> &P {
        &self.peer
    }

    /// The connectivity source.
    pub fn connectivity(&self) -> &Arc<dyn ConnectivityObserver> {
        &self.connectivity
    }

    /// Records a new local mutation.
    pub fn save(
        &self,
        kind: RecordKind,
        payload: Value,
        priority: Priority,
    ) -> SyncResult<RecordId> {
        self.outbox.save(kind, payload, priority)
    }

    /// Records a new local mutation with its own conflict strategy.
    pub fn save_with_strategy(
        &self,
        kind: RecordKind,
        payload: Value,
        priority: Priority,
        strategy: ConflictStrategy,
    ) -> SyncResult<RecordId> {
        self.outbox.save_with_strategy(kind, payload, priority, strategy)
    }

    /// Unsynced records in creation order.
    pub fn pending(&self) -> SyncResult<Vec<PendingRecord>> {
        self.outbox.pending()
    }

    /// Queued records in priority order.
    pub fn priority_view(&self) -> SyncResult<Vec<PendingRecord>> {
        self.outbox.priority_view()
    }

    /// Records held for manual review.
    pub fn list_manual_review(&self) -> Vec<ManualReviewEntry> {
        self.outbox.list_manual_review()
    }

    /// Applies an operator decision to a held record.
    pub fn resolve_manual_review(
        &self,
        id: &RecordId,
        action: ReviewAction,
    ) -> SyncResult<ReviewResolution> {
        self.outbox.resolve_manual_review(id, action)
    }

    /// Changes a stored record's conflict strategy.
    pub fn set_conflict_strategy(
        &self,
        id: &RecordId,
        strategy: ConflictStrategy,
    ) -> SyncResult<()> {
        self.outbox.set_conflict_strategy(id, strategy)
    }

    /// Verifies every pending record.
    pub fn verify_all(&self) -> SyncResult<Vec<IntegrityVerdict>> {
        self.outbox.verify_all()
    }

    /// Drops synced records.
    pub fn purge_synced(&self) -> SyncResult<usize> {
        self.outbox.purge_synced()
    }

    /// Store totals.
    pub fn storage_summary(&self) -> SyncResult<StorageSummary> {
        self.outbox.storage_summary()
    }
}

impl<S: RecordStore, P: RemotePeer> std::fmt::Debug for SyncEngine<S, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("outbox", &self.outbox)
            .field("online", &self.connectivity.is_online())
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::connectivity::ConnectivityState;
    use crate::remote::{MockPeer, MockReply};
    use fieldsync_core::{LogStore, ManualClock};

    fn engine(online: bool) -> SyncEngine<LogStore, MockPeer> {
        let outbox =
            Outbox::in_memory(SyncConfig::default(), Arc::new(ManualClock::new(100))).unwrap();
        SyncEngine::new(
            outbox,
            MockPeer::new(),
            Arc::new(ConnectivityState::new(online)),
        )
    }

    #[test]
    fn guard_is_exclusive_and_released() {
        let flag = AtomicBool::new(false);
        {
            let _held = RunningGuard::acquire(&flag).unwrap();
            assert!(RunningGuard::acquire(&flag).is_none());
        }
        assert!(RunningGuard::acquire(&flag).is_some());
    }

    #[test]
    fn offline_sync_touches_nothing() {
        let engine = engine(false);
        let id = engine
            .save(RecordKind::Grievance, Value::from("late"), Priority::High)
            .unwrap();

        let outcome = engine.sync().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.skipped, Some(SyncSkipped::Offline));
        assert_eq!(outcome.synced_count, 0);
        assert_eq!(outcome.failed_count, 0);
        assert_eq!(engine.peer().push_count(), 0);
        assert_eq!(engine.pending().unwrap()[0].id, id);
        assert_eq!(engine.stats().skipped_offline, 1);
    }

    #[test]
    fn stats_accumulate() {
        let engine = engine(true);
        engine
            .save(RecordKind::Grievance, Value::from(1), Priority::Low)
            .unwrap();
        let failing = engine
            .save(RecordKind::Grievance, Value::from(2), Priority::Low)
            .unwrap();
        engine.peer().script(failing, MockReply::Fail("503".into()));

        let outcome = engine.sync().unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.synced_count, 1);
        assert_eq!(outcome.failed_count, 1);

        let stats = engine.stats();
        assert_eq!(stats.cycles_completed, 1);
        assert_eq!(stats.records_synced, 1);
        assert_eq!(stats.records_failed, 1);
        assert!(stats.last_sync_time.is_some());
        assert!(!engine.is_running());
    }
}
