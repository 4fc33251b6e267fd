//! Pending-record model.
//!
//! A [`PendingRecord`] is one local mutation waiting to reach the remote
//! system of record. Records are persisted as a codec map (see
//! [`PendingRecord::encode`]) using the faithful encoding, so a payload that
//! was damaged in memory is stored exactly as found.

use crate::error::{CoreError, CoreResult};
use crate::integrity::digest;
use fieldsync_codec::{decode, encode, Value};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Caller-opaque record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Generates a fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an id from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(Uuid::from_bytes(bytes))
    }

    /// Returns the raw bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| CoreError::invalid_record(format!("bad record id '{s}': {e}")))
    }
}

/// Mutation categories the client can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RecordKind {
    /// A new household enrolled in the field.
    HouseholdRegistration,
    /// Changes to household-level details.
    HouseholdUpdate,
    /// Changes to one household member.
    MemberUpdate,
    /// A grievance filed by a beneficiary.
    Grievance,
    /// Beneficiary acknowledgement of a received payment.
    PaymentAcknowledgement,
}

impl RecordKind {
    /// Every kind, in declaration order.
    pub const ALL: [RecordKind; 5] = [
        RecordKind::HouseholdRegistration,
        RecordKind::HouseholdUpdate,
        RecordKind::MemberUpdate,
        RecordKind::Grievance,
        RecordKind::PaymentAcknowledgement,
    ];

    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            RecordKind::HouseholdRegistration => "household-registration",
            RecordKind::HouseholdUpdate => "household-update",
            RecordKind::MemberUpdate => "member-update",
            RecordKind::Grievance => "grievance",
            RecordKind::PaymentAcknowledgement => "payment-acknowledgement",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| CoreError::invalid_record(format!("unknown record kind '{s}'")))
    }
}

/// Sync priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Priority {
    /// Synced first, and by the background path.
    High,
    /// Default priority.
    #[default]
    Medium,
    /// Synced last.
    Low,
}

impl Priority {
    /// Sort rank; lower ranks sync first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high" => Ok(Priority::High),
            "medium" => Ok(Priority::Medium),
            "low" => Ok(Priority::Low),
            other => Err(CoreError::invalid_record(format!(
                "unknown priority '{other}'"
            ))),
        }
    }
}

/// How a record's conflicts with the server are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConflictStrategy {
    /// Take the server's payload.
    ServerWins,
    /// Keep the client's payload.
    ClientWins,
    /// Field-level merge restricted to an allow-list.
    Merge,
    /// Hold the record for an operator.
    Manual,
}

impl ConflictStrategy {
    /// Stable textual name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            ConflictStrategy::ServerWins => "server-wins",
            ConflictStrategy::ClientWins => "client-wins",
            ConflictStrategy::Merge => "merge",
            ConflictStrategy::Manual => "manual",
        }
    }
}

impl fmt::Display for ConflictStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictStrategy {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "server-wins" => Ok(ConflictStrategy::ServerWins),
            "client-wins" => Ok(ConflictStrategy::ClientWins),
            "merge" => Ok(ConflictStrategy::Merge),
            "manual" => Ok(ConflictStrategy::Manual),
            other => Err(CoreError::invalid_record(format!(
                "unknown conflict strategy '{other}'"
            ))),
        }
    }
}

/// SHA-256 digest of a canonical payload.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(pub [u8; 32]);

impl Checksum {
    /// Raw digest bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase hex rendering.
    #[must_use]
    pub fn to_hex(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Checksum({self})")
    }
}

/// A local mutation waiting to be synced.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingRecord {
    /// Unique id.
    pub id: RecordId,
    /// Mutation category.
    pub kind: RecordKind,
    /// Structured payload; `None` when the payload has been lost.
    pub payload: Option<Value>,
    /// Creation time (unix millis).
    pub created_at: u64,
    /// Last local modification (unix millis).
    pub last_modified: u64,
    /// Monotonic version, starting at 1.
    pub version: u64,
    /// Sync priority.
    pub priority: Priority,
    /// Whether the remote has accepted this version.
    pub synced: bool,
    /// Failed push attempts so far.
    pub retry_count: u32,
    /// Digest of the canonical payload at the last legitimate write.
    pub checksum: Checksum,
    /// Per-record conflict strategy, if the caller chose one.
    pub conflict_strategy: Option<ConflictStrategy>,
}

impl PendingRecord {
    /// Creates a fresh version-1 record.
    ///
    /// Fails if the payload has no canonical form (duplicate keys,
    /// non-finite floats), since no valid checksum could be computed.
    pub fn new(kind: RecordKind, payload: Value, priority: Priority, now: u64) -> CoreResult<Self> {
        let checksum = digest(&payload)?;
        Ok(Self {
            id: RecordId::new(),
            kind,
            payload: Some(payload),
            created_at: now,
            last_modified: now,
            version: 1,
            priority,
            synced: false,
            retry_count: 0,
            checksum,
            conflict_strategy: None,
        })
    }

    /// Sets the conflict strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = Some(strategy);
        self
    }

    /// Returns a copy carrying `payload` as a new version.
    ///
    /// The checksum is realigned, `version` is raised to at least
    /// `min_version`, `last_modified` is set to `now` and the record is
    /// pending again.
    pub fn revise(&self, payload: Value, min_version: u64, now: u64) -> CoreResult<Self> {
        let checksum = digest(&payload)?;
        Ok(Self {
            payload: Some(payload),
            version: (self.version + 1).max(min_version),
            last_modified: now.max(self.last_modified),
            synced: false,
            checksum,
            ..self.clone()
        })
    }

    /// Converts the record to its stored map form.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut entries: Vec<(String, Value)> = vec![
            ("id".into(), Value::Bytes(self.id.as_bytes().to_vec())),
            ("kind".into(), Value::from(self.kind.as_str())),
            ("created_at".into(), Value::Integer(to_i64(self.created_at))),
            (
                "last_modified".into(),
                Value::Integer(to_i64(self.last_modified)),
            ),
            ("version".into(), Value::Integer(to_i64(self.version))),
            ("priority".into(), Value::from(self.priority.as_str())),
            ("synced".into(), Value::Bool(self.synced)),
            ("retry_count".into(), Value::from(self.retry_count)),
            ("checksum".into(), Value::Bytes(self.checksum.0.to_vec())),
        ];
        if let Some(payload) = &self.payload {
            entries.push(("payload".into(), payload.clone()));
        }
        if let Some(strategy) = self.conflict_strategy {
            entries.push(("strategy".into(), Value::from(strategy.as_str())));
        }
        Value::Map(entries)
    }

    /// Rebuilds a record from its stored map form.
    pub fn from_value(value: &Value) -> CoreResult<Self> {
        if value.as_map().is_none() {
            return Err(CoreError::invalid_record("record is not a map"));
        }

        let id_bytes = bytes_field(value, "id")?;
        let id: [u8; 16] = id_bytes
            .try_into()
            .map_err(|_| CoreError::invalid_record("id must be 16 bytes"))?;
        let checksum: [u8; 32] = bytes_field(value, "checksum")?
            .try_into()
            .map_err(|_| CoreError::invalid_record("checksum must be 32 bytes"))?;
        let retry_count = u32::try_from(u64_field(value, "retry_count")?)
            .map_err(|_| CoreError::invalid_record("retry_count out of range"))?;
        let conflict_strategy = match value.get("strategy") {
            Some(v) => Some(text_of(v, "strategy")?.parse()?),
            None => None,
        };

        Ok(Self {
            id: RecordId::from_bytes(id),
            kind: text_field(value, "kind")?.parse()?,
            payload: value.get("payload").cloned(),
            created_at: u64_field(value, "created_at")?,
            last_modified: u64_field(value, "last_modified")?,
            version: u64_field(value, "version")?,
            priority: text_field(value, "priority")?.parse()?,
            synced: value
                .get("synced")
                .and_then(Value::as_bool)
                .ok_or_else(|| CoreError::invalid_record("missing field 'synced'"))?,
            retry_count,
            checksum: Checksum(checksum),
            conflict_strategy,
        })
    }

    /// Serializes the record for the log.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        encode(&self.to_value())
    }

    /// Deserializes a record read from the log.
    pub fn decode(bytes: &[u8]) -> CoreResult<Self> {
        Self::from_value(&decode(bytes)?)
    }
}

fn to_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn u64_field(value: &Value, key: &str) -> CoreResult<u64> {
    let raw = value
        .get(key)
        .and_then(Value::as_integer)
        .ok_or_else(|| CoreError::invalid_record(format!("missing integer field '{key}'")))?;
    u64::try_from(raw).map_err(|_| CoreError::invalid_record(format!("negative '{key}'")))
}

fn text_field<'a>(value: &'a Value, key: &str) -> CoreResult<&'a str> {
    let field = value
        .get(key)
        .ok_or_else(|| CoreError::invalid_record(format!("missing field '{key}'")))?;
    text_of(field, key)
}

fn text_of<'a>(value: &'a Value, key: &str) -> CoreResult<&'a str> {
    value
        .as_text()
        .ok_or_else(|| CoreError::invalid_record(format!("field '{key}' is not text")))
}

fn bytes_field<'a>(value: &'a Value, key: &str) -> CoreResult<&'a [u8]> {
    match value.get(key) {
        Some(Value::Bytes(b)) => Ok(b),
        _ => Err(CoreError::invalid_record(format!(
            "missing byte field '{key}'"
        ))),
    }
}
