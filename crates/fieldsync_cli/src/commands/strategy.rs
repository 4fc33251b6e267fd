//! Set-strategy command implementation.

use fieldsync_core::{ConflictStrategy, RecordId};
use std::path::Path;

/// Runs the set-strategy command.
pub fn run(dir: &Path, id: &str, strategy: &str) -> Result<(), Box<dyn std::error::Error>> {
    let id: RecordId = id.parse()?;
    let strategy: ConflictStrategy = strategy.parse()?;

    let outbox = super::open(dir)?;
    outbox.set_conflict_strategy(&id, strategy)?;
    println!("{id}: strategy set to {strategy}");
    Ok(())
}
