//! Purge command implementation.

use std::path::Path;

/// Runs the purge command.
pub fn run(dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = super::open(dir)?;
    let removed = outbox.purge_synced()?;
    println!("Purged {removed} synced record(s)");
    Ok(())
}
