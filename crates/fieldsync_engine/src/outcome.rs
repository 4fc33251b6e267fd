//! Results reported by sync cycles and the outbox.

use crate::conflict::ConflictCase;
use crate::error::ErrorKind;
use fieldsync_core::RecordId;
use std::fmt;
use std::time::Duration;

/// A structured per-record failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordError {
    /// The record that failed.
    pub id: RecordId,
    /// Failure class.
    pub kind: ErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: [{}] {}", self.id, self.kind, self.detail)
    }
}

/// Why a sync cycle did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncSkipped {
    /// The remote is unreachable.
    Offline,
    /// Another cycle holds the running guard.
    AlreadyRunning,
}

impl SyncSkipped {
    /// Explanation for logs and callers.
    pub const fn message(self) -> &'static str {
        match self {
            SyncSkipped::Offline => "device is offline",
            SyncSkipped::AlreadyRunning => "a sync cycle is already running",
        }
    }
}

impl fmt::Display for SyncSkipped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.message())
    }
}

/// Aggregate result of one sync cycle.
#[derive(Debug, Clone, Default)]
pub struct SyncOutcome {
    /// True when the cycle ran and no record failed.
    pub success: bool,
    /// Records the remote accepted.
    pub synced_count: usize,
    /// Records that failed transiently.
    pub failed_count: usize,
    /// Conflicts reported by the remote, resolved or not.
    pub conflict_count: usize,
    /// Records moved to manual review this cycle, by failed repair or by a
    /// conflict left for an operator.
    pub review_count: usize,
    /// One entry per failed record.
    pub errors: Vec<RecordError>,
    /// Every conflict seen this cycle.
    pub conflicts: Vec<ConflictCase>,
    /// Set when the cycle did not run.
    pub skipped: Option<SyncSkipped>,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
}

impl SyncOutcome {
    /// An outcome for a cycle that did not run.
    pub fn skipped(reason: SyncSkipped) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    pub(crate) fn finish(mut self, duration: Duration) -> Self {
        self.success = self.skipped.is_none() && self.failed_count == 0;
        self.duration = duration;
        self
    }
}

/// Counts describing the outbox.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StorageSummary {
    /// Live records, synced or not.
    pub total: usize,
    /// Records waiting to sync.
    pub pending_count: usize,
    /// Approximate bytes used by live records.
    pub approx_size_bytes: u64,
    /// Records held for manual review.
    pub manual_review_count: usize,
}

/// What `resolve_manual_review` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewResolution {
    /// Record and entry removed.
    Deleted,
    /// Entry removed; record back in the queue unchanged.
    Released,
    /// Repair or resolution succeeded; record back in the queue.
    Repaired,
    /// Repair or resolution failed again; entry kept.
    StillHeld,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn skipped_outcome_is_unsuccessful() {
        let outcome = SyncOutcome::skipped(SyncSkipped::Offline).finish(Duration::ZERO);
        assert!(!outcome.success);
        assert_eq!(outcome.synced_count + outcome.failed_count, 0);
        assert_eq!(outcome.skipped.unwrap().to_string(), "device is offline");
    }

    #[test]
    fn failures_clear_success() {
        let clean = SyncOutcome {
            synced_count: 2,
            conflict_count: 1,
            ..SyncOutcome::default()
        }
        .finish(Duration::from_millis(3));
        assert!(clean.success);

        let failed = SyncOutcome {
            failed_count: 1,
            ..SyncOutcome::default()
        }
        .finish(Duration::ZERO);
        assert!(!failed.success);
    }

    #[test]
    fn record_error_display() {
        let id = RecordId::new();
        let err = RecordError {
            id,
            kind: ErrorKind::Transient,
            detail: "timeout".into(),
        };
        assert_eq!(err.to_string(), format!("{id}: [transient] timeout"));
    }
}
