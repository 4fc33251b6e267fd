//! Save command implementation.

use fieldsync_codec::Value;
use fieldsync_core::{ConflictStrategy, Priority, RecordKind};
use std::path::Path;

/// Runs the save command. Prints the new record id.
pub fn run(
    dir: &Path,
    kind: &str,
    payload: &str,
    priority: &str,
    strategy: Option<&str>,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind: RecordKind = kind.parse()?;
    let priority: Priority = priority.parse()?;
    let payload = parse_payload(payload)?;

    let outbox = super::open(dir)?;
    let id = match strategy {
        Some(s) => {
            let strategy: ConflictStrategy = s.parse()?;
            outbox.save_with_strategy(kind, payload, priority, strategy)?
        }
        None => outbox.save(kind, payload, priority)?,
    };
    println!("{id}");
    Ok(())
}

fn parse_payload(json: &str) -> Result<Value, Box<dyn std::error::Error>> {
    serde_json::from_str(json).map_err(|e| format!("Invalid payload JSON: {e}").into())
}
