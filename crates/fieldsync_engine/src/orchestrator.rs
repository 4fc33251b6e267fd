//! One sync cycle over the outbox.
//!
//! Per record the cycle moves through
//!
//! ```text
//! PENDING -> verify -> (repair -> PENDING | MANUAL_REVIEW)
//! PENDING -> push   -> SYNCED | RETRY_PENDING | CONFLICTED
//! CONFLICTED -> resolve -> PENDING (new version) | MANUAL_REVIEW
//! ```
//!
//! Records are processed sequentially. Per-record failures are folded into
//! the [`SyncOutcome`]; only a store failure aborts the cycle.

use crate::conflict::ConflictCase;
use crate::error::SyncResult;
use crate::ledger::ReviewReason;
use crate::outbox::Outbox;
use crate::outcome::{RecordError, SyncOutcome};
use crate::remote::{PushRequest, PushResponse, RemotePeer};
use fieldsync_core::{PendingRecord, RecordStore};
use std::time::Instant;

/// Which records a cycle visits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleMode {
    /// Every pending record, oldest first.
    Full,
    /// Only high-priority records, capped at the background batch size.
    Background,
}

/// Drives a single cycle. The caller holds the running guard.
pub(crate) struct Orchestrator<'a, S: RecordStore, P: RemotePeer> {
    outbox: &'a Outbox<S>,
    peer: &'a P,
}

impl<'a, S: RecordStore, P: RemotePeer> Orchestrator<'a, S, P> {
    pub(crate) fn new(outbox: &'a Outbox<S>, peer: &'a P) -> Self {
        Self { outbox, peer }
    }

    pub(crate) fn run(&self, mode: CycleMode) -> SyncResult<SyncOutcome> {
        let start = Instant::now();
        let mut outcome = SyncOutcome::default();

        for record in self.batch(mode)? {
            self.process(record, &mut outcome)?;
        }

        let outcome = outcome.finish(start.elapsed());
        tracing::info!(
            ?mode,
            synced = outcome.synced_count,
            failed = outcome.failed_count,
            conflicts = outcome.conflict_count,
            held = outcome.review_count,
            "sync cycle finished"
        );
        Ok(outcome)
    }

    fn batch(&self, mode: CycleMode) -> SyncResult<Vec<PendingRecord>> {
        let store = self.outbox.store();
        let ledger = self.outbox.ledger();
        match mode {
            CycleMode::Full => Ok(store
                .pending()?
                .into_iter()
                .filter(|r| !ledger.contains(&r.id))
                .collect()),
            CycleMode::Background => {
                let mut records = Vec::new();
                for id in self.outbox.high_priority_batch() {
                    if let Some(record) = store.get(&id)? {
                        if !record.synced {
                            records.push(record);
                        }
                    }
                }
                Ok(records)
            }
        }
    }

    fn process(&self, record: PendingRecord, outcome: &mut SyncOutcome) -> SyncResult<()> {
        let Some(record) = self.ensure_integrity(record, outcome)? else {
            return Ok(());
        };
        let Some(request) = PushRequest::from_record(&record) else {
            return Ok(());
        };

        match self.peer.push(&request) {
            Ok(PushResponse::Accepted) => {
                self.outbox.complete(&record.id)?;
                outcome.synced_count += 1;
                tracing::debug!(record_id = %record.id, version = record.version, "record synced");
            }
            Ok(PushResponse::Conflict { server_payload }) => {
                outcome.conflict_count += 1;
                let case = ConflictCase::from_record(&record, server_payload, self.outbox.now());
                let case = self.resolve_conflict(&record, case, outcome)?;
                outcome.conflicts.push(case);
            }
            Err(e) => {
                let retries = self.outbox.store().increment_retry(&record.id)?;
                tracing::warn!(
                    record_id = %record.id,
                    retries,
                    error = %e,
                    "push failed"
                );
                outcome.failed_count += 1;
                outcome.errors.push(RecordError {
                    id: record.id,
                    kind: e.kind(),
                    detail: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Verifies `record`, repairing it if possible. `None` means the record
    /// went to manual review.
    fn ensure_integrity(
        &self,
        record: PendingRecord,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<Option<PendingRecord>> {
        let verdict = self.outbox.checker().verify(&record);
        let Some(kind) = verdict.corruption_kind else {
            return Ok(Some(record));
        };

        tracing::warn!(record_id = %record.id, corruption = %kind, "integrity check failed");
        match self.outbox.checker().repair(&record, self.outbox.now()) {
            Some(repaired) => {
                tracing::info!(
                    record_id = %repaired.id,
                    version = repaired.version,
                    "checksum realigned"
                );
                self.outbox.commit(repaired.clone())?;
                Ok(Some(repaired))
            }
            None => {
                self.outbox.hold(&record, ReviewReason::Corruption(kind))?;
                outcome.review_count += 1;
                Ok(None)
            }
        }
    }

    fn resolve_conflict(
        &self,
        record: &PendingRecord,
        mut case: ConflictCase,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<ConflictCase> {
        let strategy = self.outbox.strategy_for(record);
        let resolved = self
            .outbox
            .resolver()
            .resolve(&case, strategy)
            .map(|payload| self.outbox.revise(record, payload));

        match resolved {
            Some(Ok(next)) => {
                tracing::info!(
                    record_id = %record.id,
                    %strategy,
                    version = next.version,
                    "conflict resolved"
                );
                self.outbox.commit(next)?;
                case.resolve(strategy);
            }
            Some(Err(e)) => {
                tracing::warn!(record_id = %record.id, error = %e, "resolved payload rejected");
                self.hold_conflict(record, &case, outcome)?;
            }
            None => self.hold_conflict(record, &case, outcome)?,
        }
        Ok(case)
    }

    fn hold_conflict(
        &self,
        record: &PendingRecord,
        case: &ConflictCase,
        outcome: &mut SyncOutcome,
    ) -> SyncResult<()> {
        self.outbox.hold(
            record,
            ReviewReason::Conflict {
                server_payload: case.server_payload.clone(),
            },
        )?;
        outcome.review_count += 1;
        Ok(())
    }
}
