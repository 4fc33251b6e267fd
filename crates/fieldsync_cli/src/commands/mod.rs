//! CLI command implementations.

pub mod pending;
pub mod purge;
pub mod review;
pub mod save;
pub mod strategy;
pub mod summary;
pub mod verify;

use fieldsync_codec::Value;
use fieldsync_core::{LogStore, PendingRecord, StoreConfig};
use fieldsync_engine::{Outbox, SyncConfig};
use serde::Serialize;
use std::path::Path;

/// Opens the outbox in `dir` with default engine settings.
pub fn open(dir: &Path) -> Result<Outbox<LogStore>, Box<dyn std::error::Error>> {
    tracing::debug!(dir = %dir.display(), "opening outbox");
    Ok(Outbox::open_dir(
        &StoreConfig::new(dir),
        SyncConfig::default(),
    )?)
}

/// Printable form of a record.
#[derive(Debug, Serialize)]
pub struct RecordView {
    /// Record id.
    pub id: String,
    /// Record kind.
    pub kind: &'static str,
    /// Priority.
    pub priority: &'static str,
    /// Version.
    pub version: u64,
    /// Failed push attempts.
    pub retry_count: u32,
    /// Creation time (unix millis).
    pub created_at: u64,
    /// Conflict strategy, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<&'static str>,
    /// Payload, if present.
    pub payload: Option<Value>,
}

impl From<&PendingRecord> for RecordView {
    fn from(record: &PendingRecord) -> Self {
        Self {
            id: record.id.to_string(),
            kind: record.kind.as_str(),
            priority: record.priority.as_str(),
            version: record.version,
            retry_count: record.retry_count,
            created_at: record.created_at,
            strategy: record.conflict_strategy.map(|s| s.as_str()),
            payload: record.payload.clone(),
        }
    }
}
