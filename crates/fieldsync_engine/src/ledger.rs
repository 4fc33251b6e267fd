//! Manual review ledger.
//!
//! Records that automated repair or conflict resolution could not settle
//! are parked here until an operator acts. The ledger keeps its own
//! CRC-framed log next to the record log, so held items survive restarts.

use crate::error::{SyncError, SyncResult};
use fieldsync_codec::{decode, encode, Value};
use fieldsync_core::log::{needs_compaction, Frame, FrameKind, FrameLog};
use fieldsync_core::{CoreError, CorruptionKind, RecordId, RecordKind, StoreConfig};
use fieldsync_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Why a record is held.
#[derive(Debug, Clone, PartialEq)]
pub enum ReviewReason {
    /// Integrity repair failed.
    Corruption(CorruptionKind),
    /// A conflict with the server was left for an operator.
    Conflict {
        /// The server's side of the conflict.
        server_payload: Value,
    },
}

impl ReviewReason {
    /// Short label for listings.
    pub fn label(&self) -> String {
        match self {
            ReviewReason::Corruption(kind) => format!("corruption: {kind}"),
            ReviewReason::Conflict { .. } => "conflict".to_string(),
        }
    }
}

/// A record awaiting operator action.
#[derive(Debug, Clone, PartialEq)]
pub struct ManualReviewEntry {
    /// The held record.
    pub id: RecordId,
    /// Its kind.
    pub kind: RecordKind,
    /// Why it is held.
    pub reason: ReviewReason,
    /// When it was added (unix millis).
    pub added_at: u64,
}

impl ManualReviewEntry {
    fn to_value(&self) -> Value {
        let mut entries = vec![
            ("kind".to_string(), Value::from(self.kind.as_str())),
            (
                "added_at".to_string(),
                Value::Integer(i64::try_from(self.added_at).unwrap_or(i64::MAX)),
            ),
        ];
        match &self.reason {
            ReviewReason::Corruption(kind) => {
                entries.push(("reason".into(), Value::from("corruption")));
                entries.push(("corruption".into(), Value::from(kind.as_str())));
            }
            ReviewReason::Conflict { server_payload } => {
                entries.push(("reason".into(), Value::from("conflict")));
                entries.push(("server_payload".into(), server_payload.clone()));
            }
        }
        Value::Map(entries)
    }

    fn from_value(id: RecordId, value: &Value) -> Result<Self, CoreError> {
        let text = |key: &str| {
            value
                .get(key)
                .and_then(Value::as_text)
                .ok_or_else(|| CoreError::invalid_record(format!("review entry lacks '{key}'")))
        };

        let reason = match text("reason")? {
            "corruption" => {
                let raw = text("corruption")?;
                ReviewReason::Corruption(CorruptionKind::parse(raw).ok_or_else(|| {
                    CoreError::invalid_record(format!("unknown corruption kind '{raw}'"))
                })?)
            }
            "conflict" => ReviewReason::Conflict {
                server_payload: value.get("server_payload").cloned().unwrap_or_default(),
            },
            other => {
                return Err(CoreError::invalid_record(format!(
                    "unknown review reason '{other}'"
                )))
            }
        };

        Ok(Self {
            id,
            kind: text("kind")?.parse()?,
            reason,
            added_at: u64::try_from(value.integer_field("added_at")).unwrap_or(0),
        })
    }
}

/// Operator decision on a held record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewAction {
    /// Run repair or conflict resolution again.
    RepairAgain,
    /// Drop the record and the entry.
    Delete,
    /// Drop only the entry; the record goes back to the queue as-is.
    Ignore,
}

impl ReviewAction {
    /// Stable textual name.
    pub const fn as_str(self) -> &'static str {
        match self {
            ReviewAction::RepairAgain => "repair-again",
            ReviewAction::Delete => "delete",
            ReviewAction::Ignore => "ignore",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReviewAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "repair-again" => Ok(ReviewAction::RepairAgain),
            "delete" => Ok(ReviewAction::Delete),
            "ignore" => Ok(ReviewAction::Ignore),
            other => Err(format!("unknown review action '{other}'")),
        }
    }
}

#[derive(Debug)]
struct Held {
    seq: u64,
    encoded_len: u64,
    entry: ManualReviewEntry,
}

#[derive(Debug)]
struct LedgerState {
    log: FrameLog,
    entries: HashMap<RecordId, Held>,
    next_seq: u64,
}

impl LedgerState {
    fn live_bytes(&self) -> u64 {
        self.entries.values().map(|h| h.encoded_len).sum()
    }

    /// Entries live in memory, so the rewrite never reads the old log back.
    fn compact(&mut self) -> SyncResult<()> {
        let mut held: Vec<&Held> = self.entries.values().collect();
        held.sort_by_key(|h| h.seq);
        let frames: Vec<Frame> = held
            .iter()
            .map(|h| Frame::put(*h.entry.id.as_bytes(), encode(&h.entry.to_value())))
            .collect();
        let before = self.log.size()?;
        self.log.rewrite(&frames)?;
        tracing::debug!(before, after = self.log.size()?, "review ledger compacted");
        Ok(())
    }

    fn maybe_compact(&mut self) {
        let live = self.live_bytes();
        let worth_it = match self.log.size() {
            Ok(total) => (live == 0 && total > 0) || needs_compaction(total, live),
            Err(e) => {
                tracing::warn!(error = %e, "cannot size review ledger");
                false
            }
        };
        if worth_it {
            if let Err(e) = self.compact() {
                tracing::warn!(error = %e, "review ledger compaction failed");
            }
        }
    }
}

/// Persistent set of held records.
#[derive(Debug)]
pub struct ReviewLedger {
    state: RwLock<LedgerState>,
}

impl ReviewLedger {
    /// Opens a ledger over `backend`, replaying its log.
    pub fn open(backend: Box<dyn StorageBackend>, sync_on_write: bool) -> SyncResult<Self> {
        let (log, frames) = FrameLog::open(backend, sync_on_write)?;
        let mut entries = HashMap::new();
        let mut next_seq = 0u64;

        for located in frames {
            let id = RecordId::from_bytes(located.frame.key);
            match located.frame.kind {
                FrameKind::Tombstone => {
                    entries.remove(&id);
                }
                FrameKind::Put => {
                    let value = decode(&located.frame.body).map_err(CoreError::from)?;
                    let entry = ManualReviewEntry::from_value(id, &value)?;
                    next_seq += 1;
                    let held = Held {
                        seq: next_seq,
                        encoded_len: located.frame.encoded_len() as u64,
                        entry,
                    };
                    entries.insert(id, held);
                }
            }
        }

        tracing::debug!(entries = entries.len(), "review ledger replayed");
        Ok(Self {
            state: RwLock::new(LedgerState {
                log,
                entries,
                next_seq,
            }),
        })
    }

    /// Opens (or creates) the ledger file described by `config`.
    pub fn open_dir(config: &StoreConfig) -> SyncResult<Self> {
        let backend = FileBackend::open(&config.review_path()).map_err(CoreError::from)?;
        Self::open(Box::new(backend), config.sync_on_write)
    }

    /// Creates an empty in-memory ledger.
    pub fn in_memory() -> SyncResult<Self> {
        Self::open(Box::new(InMemoryBackend::new()), false)
    }

    /// Holds a record, replacing any earlier entry for the same id.
    pub fn add(
        &self,
        id: RecordId,
        kind: RecordKind,
        reason: ReviewReason,
        added_at: u64,
    ) -> SyncResult<()> {
        let entry = ManualReviewEntry {
            id,
            kind,
            reason,
            added_at,
        };
        let frame = Frame::put(*id.as_bytes(), encode(&entry.to_value()));
        let mut state = self.state.write();
        state.log.append(&frame)?;
        state.next_seq += 1;
        let seq = state.next_seq;
        tracing::info!(
            record_id = %id,
            kind = %kind,
            reason = %entry.reason.label(),
            "held for manual review"
        );
        let held = Held {
            seq,
            encoded_len: frame.encoded_len() as u64,
            entry,
        };
        state.entries.insert(id, held);
        state.maybe_compact();
        Ok(())
    }

    /// Held entries, oldest first.
    pub fn list(&self) -> Vec<ManualReviewEntry> {
        let state = self.state.read();
        let mut held: Vec<&Held> = state.entries.values().collect();
        held.sort_by_key(|h| (h.entry.added_at, h.seq));
        held.into_iter().map(|h| h.entry.clone()).collect()
    }

    /// The entry for `id`, if held.
    pub fn get(&self, id: &RecordId) -> Option<ManualReviewEntry> {
        self.state.read().entries.get(id).map(|h| h.entry.clone())
    }

    /// Whether `id` is held.
    pub fn contains(&self, id: &RecordId) -> bool {
        self.state.read().entries.contains_key(id)
    }

    /// Releases `id`.
    pub fn remove(&self, id: &RecordId) -> SyncResult<ManualReviewEntry> {
        let mut state = self.state.write();
        if !state.entries.contains_key(id) {
            return Err(SyncError::NotInReview { id: *id });
        }
        state.log.append(&Frame::tombstone(*id.as_bytes()))?;
        let held = state
            .entries
            .remove(id)
            .ok_or(SyncError::NotInReview { id: *id })?;
        state.maybe_compact();
        Ok(held.entry)
    }

    /// Number of held records.
    pub fn len(&self) -> usize {
        self.state.read().entries.len()
    }

    /// Whether nothing is held.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Size of the ledger log in bytes.
    pub fn log_size(&self) -> SyncResult<u64> {
        Ok(self.state.read().log.size()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_core::log::COMPACT_MIN_DEAD_BYTES;

    #[test]
    fn add_list_remove() {
        let ledger = ReviewLedger::in_memory().unwrap();
        let a = RecordId::new();
        let b = RecordId::new();
        ledger
            .add(
                b,
                RecordKind::Grievance,
                ReviewReason::Corruption(CorruptionKind::MissingPayload),
                20,
            )
            .unwrap();
        ledger
            .add(
                a,
                RecordKind::MemberUpdate,
                ReviewReason::Conflict {
                    server_payload: Value::map([("name", Value::from("Bob"))]),
                },
                10,
            )
            .unwrap();

        let ids: Vec<_> = ledger.list().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![a, b]);
        assert!(ledger.contains(&a));

        let removed = ledger.remove(&a).unwrap();
        assert_eq!(removed.kind, RecordKind::MemberUpdate);
        assert!(matches!(
            ledger.remove(&a),
            Err(SyncError::NotInReview { .. })
        ));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn entries_survive_replay() {
        let backend = InMemoryBackend::new();
        let held = RecordId::new();
        let released = RecordId::new();
        {
            let ledger = ReviewLedger::open(Box::new(backend.clone()), false).unwrap();
            let reason = ReviewReason::Conflict {
                server_payload: Value::map([("v", Value::from(3))]),
            };
            ledger
                .add(held, RecordKind::HouseholdUpdate, reason.clone(), 5)
                .unwrap();
            ledger
                .add(released, RecordKind::HouseholdUpdate, reason, 6)
                .unwrap();
            ledger.remove(&released).unwrap();
        }

        let ledger = ReviewLedger::open(Box::new(backend), false).unwrap();
        assert_eq!(ledger.len(), 1);
        let entry = ledger.get(&held).unwrap();
        assert_eq!(entry.added_at, 5);
        assert_eq!(
            entry.reason,
            ReviewReason::Conflict {
                server_payload: Value::map([("v", Value::from(3))])
            }
        );
    }

    #[test]
    fn re_adding_replaces_entry() {
        let ledger = ReviewLedger::in_memory().unwrap();
        let id = RecordId::new();
        ledger
            .add(
                id,
                RecordKind::Grievance,
                ReviewReason::Corruption(CorruptionKind::Unparseable),
                1,
            )
            .unwrap();
        ledger
            .add(
                id,
                RecordKind::Grievance,
                ReviewReason::Corruption(CorruptionKind::ChecksumMismatch),
                2,
            )
            .unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(
            ledger.get(&id).unwrap().reason.label(),
            "corruption: checksum-mismatch"
        );
    }

    #[test]
    fn releasing_everything_empties_the_log() {
        let backend = InMemoryBackend::new();
        let ledger = ReviewLedger::open(Box::new(backend.clone()), false).unwrap();
        let ids: Vec<_> = (0..20).map(|_| RecordId::new()).collect();
        for (at, id) in ids.iter().enumerate() {
            ledger
                .add(
                    *id,
                    RecordKind::Grievance,
                    ReviewReason::Corruption(CorruptionKind::MissingPayload),
                    at as u64,
                )
                .unwrap();
        }
        assert!(ledger.log_size().unwrap() > 0);

        for id in &ids {
            ledger.remove(id).unwrap();
        }
        assert_eq!(ledger.log_size().unwrap(), 0);
        assert!(backend.data().is_empty());
    }

    #[test]
    fn churn_keeps_ledger_bounded() {
        let backend = InMemoryBackend::new();
        let ledger = ReviewLedger::open(Box::new(backend.clone()), false).unwrap();
        let steady = RecordId::new();
        let reason = ReviewReason::Conflict {
            server_payload: Value::map([("note", Value::from("x".repeat(200)))]),
        };
        ledger
            .add(steady, RecordKind::HouseholdUpdate, reason.clone(), 1)
            .unwrap();
        for at in 0..2_000 {
            let passing = RecordId::new();
            ledger
                .add(passing, RecordKind::Grievance, reason.clone(), at)
                .unwrap();
            ledger.remove(&passing).unwrap();
        }

        assert!(ledger.log_size().unwrap() < 3 * COMPACT_MIN_DEAD_BYTES);
        let reopened = ReviewLedger::open(Box::new(backend), false).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.get(&steady).unwrap().reason, reason);
    }

    #[test]
    fn actions_parse() {
        assert_eq!(
            "repair-again".parse::<ReviewAction>().unwrap(),
            ReviewAction::RepairAgain
        );
        assert_eq!(ReviewAction::Ignore.to_string(), "ignore");
        assert!("retry".parse::<ReviewAction>().is_err());
    }
}
