//! Conflict detection records and resolution strategies.

use crate::config::MergeAllowList;
use fieldsync_codec::Value;
use fieldsync_core::{ConflictStrategy, PendingRecord, RecordId, RecordKind};

/// Payload field carrying the modification timestamp.
pub const LAST_MODIFIED_FIELD: &str = "lastModified";
/// Payload field carrying the version.
pub const VERSION_FIELD: &str = "version";

/// How a conflict ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Waiting for an operator.
    Pending,
    /// Settled automatically with the given strategy.
    Resolved(ConflictStrategy),
}

/// A client/server disagreement over one record.
#[derive(Debug, Clone, PartialEq)]
pub struct ConflictCase {
    /// The record in conflict.
    pub id: RecordId,
    /// Its kind, which selects the merge allow-list.
    pub kind: RecordKind,
    /// The payload the client tried to push.
    pub client_payload: Value,
    /// The payload the server holds.
    pub server_payload: Value,
    /// The client record's modification time (unix millis).
    pub client_last_modified: u64,
    /// The client record's version.
    pub client_version: u64,
    /// When the conflict was reported (unix millis).
    pub detected_at: u64,
    /// Current resolution state.
    pub resolution: ConflictResolution,
}

impl ConflictCase {
    /// Creates an unresolved case.
    pub fn new(
        id: RecordId,
        kind: RecordKind,
        client_payload: Value,
        server_payload: Value,
        detected_at: u64,
    ) -> Self {
        Self {
            id,
            kind,
            client_payload,
            server_payload,
            client_last_modified: 0,
            client_version: 0,
            detected_at,
            resolution: ConflictResolution::Pending,
        }
    }

    /// Creates an unresolved case for a stored record.
    ///
    /// The record's own `last_modified` and `version` travel with the case,
    /// so a payload saved without timestamp fields still merges by the time
    /// it was recorded.
    pub fn from_record(record: &PendingRecord, server_payload: Value, detected_at: u64) -> Self {
        Self {
            client_last_modified: record.last_modified,
            client_version: record.version,
            ..Self::new(
                record.id,
                record.kind,
                record.payload.clone().unwrap_or_default(),
                server_payload,
                detected_at,
            )
        }
    }

    /// The client payload with the record metadata folded in.
    ///
    /// Payload fields win only when they are larger than the metadata.
    fn client_view(&self) -> Value {
        let mut view = match &self.client_payload {
            Value::Map(_) => self.client_payload.clone(),
            _ => Value::empty_map(),
        };
        let modified = view
            .integer_field(LAST_MODIFIED_FIELD)
            .max(clamp(self.client_last_modified));
        let version = view.integer_field(VERSION_FIELD).max(clamp(self.client_version));
        view.set(LAST_MODIFIED_FIELD, Value::Integer(modified));
        view.set(VERSION_FIELD, Value::Integer(version));
        view
    }

    /// Marks the case resolved by `strategy`.
    pub fn resolve(&mut self, strategy: ConflictStrategy) {
        self.resolution = ConflictResolution::Resolved(strategy);
    }

    /// Returns true if the case has been resolved.
    pub fn is_resolved(&self) -> bool {
        matches!(self.resolution, ConflictResolution::Resolved(_))
    }
}

/// Produces reconciled payloads.
#[derive(Debug, Clone, Default)]
pub struct ConflictResolver {
    allow_list: MergeAllowList,
}

impl ConflictResolver {
    /// Creates a resolver merging with `allow_list`.
    pub fn new(allow_list: MergeAllowList) -> Self {
        Self { allow_list }
    }

    /// The merge allow-list in use.
    pub fn allow_list(&self) -> &MergeAllowList {
        &self.allow_list
    }

    /// Resolves `case` with `strategy`.
    ///
    /// Returns `None` for [`ConflictStrategy::Manual`]; the caller is
    /// responsible for holding the record for review.
    pub fn resolve(&self, case: &ConflictCase, strategy: ConflictStrategy) -> Option<Value> {
        match strategy {
            ConflictStrategy::ServerWins => Some(case.server_payload.clone()),
            ConflictStrategy::ClientWins => Some(case.client_payload.clone()),
            ConflictStrategy::Merge => {
                Some(self.merge(case.kind, &case.client_view(), &case.server_payload))
            }
            ConflictStrategy::Manual => None,
        }
    }

    /// Field-level merge.
    ///
    /// Starts from the server payload. A client field overwrites it only if
    /// the field is allow-listed for `kind` and the client's `lastModified`
    /// is strictly newer. `lastModified` becomes the larger of the two and
    /// `version` one past the larger of the two. Missing or non-integer
    /// timestamps and versions count as 0.
    pub fn merge(&self, kind: RecordKind, client: &Value, server: &Value) -> Value {
        let client_modified = client.integer_field(LAST_MODIFIED_FIELD);
        let server_modified = server.integer_field(LAST_MODIFIED_FIELD);
        let client_newer = client_modified > server_modified;

        let mut merged = match server {
            Value::Map(_) => server.clone(),
            _ => Value::empty_map(),
        };

        if client_newer {
            for (field, value) in client.as_map().unwrap_or_default() {
                if field == LAST_MODIFIED_FIELD || field == VERSION_FIELD {
                    continue;
                }
                if self.allow_list.is_allowed(kind, field) {
                    merged.set(field, value.clone());
                }
            }
        }

        let version = client
            .integer_field(VERSION_FIELD)
            .max(server.integer_field(VERSION_FIELD))
            .saturating_add(1);
        merged.set(
            LAST_MODIFIED_FIELD,
            Value::Integer(client_modified.max(server_modified)),
        );
        merged.set(VERSION_FIELD, Value::Integer(version));
        merged
    }
}

fn clamp(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fieldsync_codec::canonicalize;
    use proptest::prelude::*;

    fn case(client: Value, server: Value) -> ConflictCase {
        ConflictCase::new(RecordId::new(), RecordKind::MemberUpdate, client, server, 7)
    }

    fn resolver() -> ConflictResolver {
        ConflictResolver::new(
            MergeAllowList::empty().allow(RecordKind::MemberUpdate, "contactNumber"),
        )
    }

    #[test]
    fn server_and_client_wins_are_identity() {
        let client = Value::map([("a", Value::from(1))]);
        let server = Value::map([("b", Value::from(2))]);
        let c = case(client.clone(), server.clone());
        let r = resolver();
        assert_eq!(r.resolve(&c, ConflictStrategy::ServerWins), Some(server));
        assert_eq!(r.resolve(&c, ConflictStrategy::ClientWins), Some(client));
        assert_eq!(r.resolve(&c, ConflictStrategy::Manual), None);
    }

    #[test]
    fn newer_client_wins_allow_listed_fields() {
        let client = Value::map([
            ("contactNumber", Value::from("111")),
            ("lastModified", Value::from(100)),
            ("version", Value::from(1)),
        ]);
        let server = Value::map([
            ("name", Value::from("Bob")),
            ("lastModified", Value::from(50)),
            ("version", Value::from(1)),
        ]);
        let merged = resolver()
            .resolve(&case(client, server), ConflictStrategy::Merge)
            .unwrap();

        let expected = Value::map([
            ("name", Value::from("Bob")),
            ("contactNumber", Value::from("111")),
            ("lastModified", Value::from(100)),
            ("version", Value::from(2)),
        ]);
        assert_eq!(
            canonicalize(&merged).unwrap(),
            canonicalize(&expected).unwrap()
        );
    }

    #[test]
    fn fields_outside_allow_list_are_ignored() {
        let client = Value::map([
            ("name", Value::from("Mallory")),
            ("lastModified", Value::from(100)),
        ]);
        let server = Value::map([("name", Value::from("Bob")), ("lastModified", Value::from(50))]);
        let merged = resolver().merge(RecordKind::MemberUpdate, &client, &server);
        assert_eq!(merged.get("name"), Some(&Value::from("Bob")));
        assert_eq!(merged.get("version"), Some(&Value::from(1)));
    }

    #[test]
    fn older_client_changes_nothing() {
        let client = Value::map([
            ("contactNumber", Value::from("111")),
            ("lastModified", Value::from(10)),
            ("version", Value::from(4)),
        ]);
        let server = Value::map([
            ("contactNumber", Value::from("999")),
            ("lastModified", Value::from(50)),
            ("version", Value::from(2)),
        ]);
        let merged = resolver().merge(RecordKind::MemberUpdate, &client, &server);
        assert_eq!(merged.get("contactNumber"), Some(&Value::from("999")));
        assert_eq!(merged.get("lastModified"), Some(&Value::from(50)));
        assert_eq!(merged.get("version"), Some(&Value::from(5)));
    }

    #[test]
    fn missing_timestamps_count_as_zero() {
        let client = Value::map([("contactNumber", Value::from("111"))]);
        let server = Value::from("not a map");
        let merged = resolver().merge(RecordKind::MemberUpdate, &client, &server);
        assert_eq!(merged.get("contactNumber"), None);
        assert_eq!(merged.get("lastModified"), Some(&Value::from(0)));
        assert_eq!(merged.get("version"), Some(&Value::from(1)));
    }

    #[test]
    fn case_resolution_state() {
        let mut c = case(Value::Null, Value::Null);
        assert!(!c.is_resolved());
        c.resolve(ConflictStrategy::Merge);
        assert_eq!(
            c.resolution,
            ConflictResolution::Resolved(ConflictStrategy::Merge)
        );
    }

    #[test]
    fn record_metadata_stands_in_for_missing_fields() {
        let record = PendingRecord::new(
            RecordKind::MemberUpdate,
            Value::map([("contactNumber", Value::from("111"))]),
            fieldsync_core::Priority::Medium,
            1000,
        )
        .unwrap();
        let server = Value::map([
            ("contactNumber", Value::from("999")),
            ("lastModified", Value::from(50)),
            ("version", Value::from(1)),
        ]);
        let c = ConflictCase::from_record(&record, server, 1001);
        assert_eq!(c.client_last_modified, 1000);
        assert_eq!(c.client_version, 1);

        let r = resolver();
        let merged = r.resolve(&c, ConflictStrategy::Merge).unwrap();
        assert_eq!(merged.get("contactNumber"), Some(&Value::from("111")));
        assert_eq!(merged.get("lastModified"), Some(&Value::from(1000)));
        assert_eq!(merged.get("version"), Some(&Value::from(2)));

        let kept = r.resolve(&c, ConflictStrategy::ClientWins).unwrap();
        assert_eq!(kept, Value::map([("contactNumber", Value::from("111"))]));
    }

    #[test]
    fn newer_payload_timestamp_beats_record_metadata() {
        let mut c = case(
            Value::map([("contactNumber", Value::from("111")), ("lastModified", Value::from(80))]),
            Value::map([("contactNumber", Value::from("999")), ("lastModified", Value::from(60))]),
        );
        c.client_last_modified = 40;
        let merged = resolver().resolve(&c, ConflictStrategy::Merge).unwrap();
        assert_eq!(merged.get("contactNumber"), Some(&Value::from("111")));
        assert_eq!(merged.get("lastModified"), Some(&Value::from(80)));
    }

    proptest! {
        #[test]
        fn merge_is_deterministic(
            client_lm in 0i64..1000,
            server_lm in 0i64..1000,
            client_v in 0i64..50,
            server_v in 0i64..50,
            phone in "[0-9]{3,8}",
        ) {
            let client = Value::map([
                ("contactNumber", Value::from(phone.as_str())),
                ("lastModified", Value::Integer(client_lm)),
                ("version", Value::Integer(client_v)),
            ]);
            let server = Value::map([
                ("name", Value::from("Bob")),
                ("lastModified", Value::Integer(server_lm)),
                ("version", Value::Integer(server_v)),
            ]);
            let r = resolver();
            let a = r.merge(RecordKind::MemberUpdate, &client, &server);
            let b = r.merge(RecordKind::MemberUpdate, &client, &server);
            prop_assert_eq!(&a, &b);
            prop_assert_eq!(a.integer_field("version"), client_v.max(server_v) + 1);
            prop_assert_eq!(a.integer_field("lastModified"), client_lm.max(server_lm));
        }
    }
}
