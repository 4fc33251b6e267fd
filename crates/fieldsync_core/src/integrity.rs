//! Payload checksums, verification and repair.

use crate::record::{Checksum, PendingRecord, RecordId};
use fieldsync_codec::{canonicalize, decode, CodecResult, Value};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 over the canonical encoding of `payload`.
///
/// Field insertion order does not affect the result. Fails when the payload
/// has no canonical form.
pub fn digest(payload: &Value) -> CodecResult<Checksum> {
    let canonical = canonicalize(payload)?;
    Ok(Checksum(Sha256::digest(&canonical).into()))
}

/// Classification of an integrity failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorruptionKind {
    /// The payload no longer matches its stored checksum.
    ChecksumMismatch,
    /// The record has no payload.
    MissingPayload,
    /// The payload has no canonical form.
    Unparseable,
}

impl CorruptionKind {
    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CorruptionKind::ChecksumMismatch => "checksum-mismatch",
            CorruptionKind::MissingPayload => "missing-payload",
            CorruptionKind::Unparseable => "unparseable",
        }
    }

    /// Parses a textual name.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "checksum-mismatch" => Some(CorruptionKind::ChecksumMismatch),
            "missing-payload" => Some(CorruptionKind::MissingPayload),
            "unparseable" => Some(CorruptionKind::Unparseable),
            _ => None,
        }
    }
}

impl fmt::Display for CorruptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of verifying one record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntegrityVerdict {
    /// The verified record.
    pub id: RecordId,
    /// Whether the payload matches its checksum.
    pub valid: bool,
    /// Digest of the current payload, if it could be computed.
    pub computed_checksum: Option<Checksum>,
    /// The checksum stored on the record.
    pub expected_checksum: Checksum,
    /// What is wrong, when `valid` is false.
    pub corruption_kind: Option<CorruptionKind>,
}

/// What `repair` may do with a payload whose content changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepairPolicy {
    /// Re-align the checksum to whatever payload is present, as long as that
    /// payload has a stable canonical form.
    #[default]
    RealignChecksum,
    /// Never accept altered content: a checksum mismatch always goes to
    /// manual review. Only records whose checksum already matches pass.
    EscalateMismatch,
}

/// Verifies and repairs record payloads.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntegrityChecker {
    policy: RepairPolicy,
}

impl IntegrityChecker {
    /// Creates a checker with the given repair policy.
    #[must_use]
    pub const fn new(policy: RepairPolicy) -> Self {
        Self { policy }
    }

    /// The active repair policy.
    #[must_use]
    pub const fn policy(&self) -> RepairPolicy {
        self.policy
    }

    /// Recomputes the payload digest and compares it to the stored one.
    #[must_use]
    pub fn verify(&self, record: &PendingRecord) -> IntegrityVerdict {
        let (computed, kind) = match &record.payload {
            None => (None, Some(CorruptionKind::MissingPayload)),
            Some(payload) => match digest(payload) {
                Err(_) => (None, Some(CorruptionKind::Unparseable)),
                Ok(sum) if sum == record.checksum => (Some(sum), None),
                Ok(sum) => (Some(sum), Some(CorruptionKind::ChecksumMismatch)),
            },
        };

        IntegrityVerdict {
            id: record.id,
            valid: kind.is_none(),
            computed_checksum: computed,
            expected_checksum: record.checksum,
            corruption_kind: kind,
        }
    }

    /// Attempts to bring a record back to a consistent state.
    ///
    /// Returns the updated record (`version + 1`, `last_modified = now`,
    /// realigned checksum), or `None` when the record must go to manual
    /// review. A record that already verifies is returned unchanged.
    #[must_use]
    pub fn repair(&self, record: &PendingRecord, now: u64) -> Option<PendingRecord> {
        let verdict = self.verify(record);
        match verdict.corruption_kind {
            None => return Some(record.clone()),
            Some(CorruptionKind::MissingPayload | CorruptionKind::Unparseable) => return None,
            Some(CorruptionKind::ChecksumMismatch) => {
                if self.policy == RepairPolicy::EscalateMismatch {
                    return None;
                }
            }
        }

        let payload = record.payload.as_ref()?;
        let canonical = canonicalize(payload).ok()?;
        let reread = decode(&canonical).ok()?;
        if canonicalize(&reread).ok()? != canonical {
            return None;
        }

        let mut repaired = record.clone();
        repaired.checksum = Checksum(Sha256::digest(&canonical).into());
        repaired.version += 1;
        repaired.last_modified = now.max(record.last_modified);
        Some(repaired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{Priority, RecordKind};
    use proptest::prelude::*;

    fn record(payload: Value) -> PendingRecord {
        PendingRecord::new(RecordKind::MemberUpdate, payload, Priority::Medium, 10).unwrap()
    }

    #[test]
    fn unmodified_record_is_valid() {
        let r = record(Value::map([("name", Value::from("Ana"))]));
        let verdict = IntegrityChecker::default().verify(&r);
        assert!(verdict.valid);
        assert_eq!(verdict.corruption_kind, None);
        assert_eq!(verdict.computed_checksum, Some(r.checksum));
    }

    #[test]
    fn mutated_payload_is_checksum_mismatch() {
        let mut r = record(Value::map([("name", Value::from("Ana"))]));
        r.payload = Some(Value::map([("name", Value::from("Eve"))]));
        let verdict = IntegrityChecker::default().verify(&r);
        assert!(!verdict.valid);
        assert_eq!(
            verdict.corruption_kind,
            Some(CorruptionKind::ChecksumMismatch)
        );
        assert_ne!(verdict.computed_checksum, Some(verdict.expected_checksum));
    }

    #[test]
    fn missing_and_unparseable() {
        let checker = IntegrityChecker::default();
        let mut r = record(Value::from(1));
        r.payload = None;
        assert_eq!(
            checker.verify(&r).corruption_kind,
            Some(CorruptionKind::MissingPayload)
        );

        r.payload = Some(Value::map([("v", Value::Float(f64::INFINITY))]));
        let verdict = checker.verify(&r);
        assert_eq!(verdict.corruption_kind, Some(CorruptionKind::Unparseable));
        assert_eq!(verdict.computed_checksum, None);
    }

    #[test]
    fn realign_repairs_mismatch() {
        let mut r = record(Value::map([("name", Value::from("Ana"))]));
        r.payload = Some(Value::map([("name", Value::from("Eve"))]));
        let repaired = IntegrityChecker::default().repair(&r, 99).unwrap();
        assert_eq!(repaired.version, 2);
        assert_eq!(repaired.last_modified, 99);
        assert!(IntegrityChecker::default().verify(&repaired).valid);
    }

    #[test]
    fn escalate_policy_refuses_mismatch() {
        let mut r = record(Value::map([("name", Value::from("Ana"))]));
        r.payload = Some(Value::map([("name", Value::from("Eve"))]));
        let checker = IntegrityChecker::new(RepairPolicy::EscalateMismatch);
        assert!(checker.repair(&r, 99).is_none());
    }

    #[test]
    fn repair_fails_without_usable_payload() {
        let checker = IntegrityChecker::default();
        let mut r = record(Value::from(1));
        r.payload = None;
        assert!(checker.repair(&r, 5).is_none());
        r.payload = Some(Value::Map(vec![
            ("k".into(), Value::from(1)),
            ("k".into(), Value::from(1)),
        ]));
        assert!(checker.repair(&r, 5).is_none());
    }

    #[test]
    fn repairing_valid_record_is_identity() {
        let r = record(Value::map([("a", Value::from(true))]));
        assert_eq!(IntegrityChecker::default().repair(&r, 50), Some(r));
    }

    proptest! {
        #[test]
        fn digest_ignores_insertion_order(
            fields in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 1..10)
        ) {
            let forward: Vec<(String, Value)> =
                fields.iter().map(|(k, v)| (k.clone(), Value::Integer(*v))).collect();
            let mut backward = forward.clone();
            backward.reverse();

            let a = digest(&Value::Map(forward)).unwrap();
            let b = digest(&Value::Map(backward.clone())).unwrap();
            prop_assert_eq!(a, b);

            let canonical = canonicalize(&Value::Map(backward)).unwrap();
            prop_assert_eq!(digest(&decode(&canonical).unwrap()).unwrap(), a);
        }
    }
}
