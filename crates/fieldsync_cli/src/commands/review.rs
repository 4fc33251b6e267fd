//! Review command implementations.

use fieldsync_codec::Value;
use fieldsync_engine::{ManualReviewEntry, ReviewAction, ReviewReason};
use fieldsync_core::RecordId;
use serde::Serialize;
use std::path::Path;

/// A held record as printed by `review list`.
#[derive(Debug, Serialize)]
pub struct EntryView {
    /// Record id.
    pub id: String,
    /// Record kind.
    pub kind: &'static str,
    /// Why the record is held.
    pub reason: String,
    /// When it was held (unix millis).
    pub added_at: u64,
    /// The server's payload for held conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_payload: Option<Value>,
}

impl From<&ManualReviewEntry> for EntryView {
    fn from(entry: &ManualReviewEntry) -> Self {
        let server_payload = match &entry.reason {
            ReviewReason::Conflict { server_payload } => Some(server_payload.clone()),
            ReviewReason::Corruption(_) => None,
        };
        Self {
            id: entry.id.to_string(),
            kind: entry.kind.as_str(),
            reason: entry.reason.label(),
            added_at: entry.added_at,
            server_payload,
        }
    }
}

/// Runs `review list`.
pub fn list(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = super::open(dir)?;
    let entries: Vec<EntryView> = outbox
        .list_manual_review()
        .iter()
        .map(EntryView::from)
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&entries)?),
        _ => {
            if entries.is_empty() {
                println!("No records held for review");
            }
            for entry in &entries {
                println!("{}  {:<24} {}", entry.id, entry.kind, entry.reason);
            }
        }
    }
    Ok(())
}

/// Runs `review resolve`.
pub fn resolve(dir: &Path, id: &str, action: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id: RecordId = id.parse()?;
    let action: ReviewAction = action.parse()?;

    let outbox = super::open(dir)?;
    let resolution = outbox.resolve_manual_review(&id, action)?;
    println!("{id}: {action} -> {resolution:?}");
    Ok(())
}
