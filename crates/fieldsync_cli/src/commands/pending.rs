//! Pending command implementation.

use super::RecordView;
use std::path::Path;

/// Runs the pending command.
pub fn run(dir: &Path, by_priority: bool, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = super::open(dir)?;
    let records = if by_priority {
        outbox.priority_view()?
    } else {
        outbox.pending()?
    };
    let views: Vec<RecordView> = records.iter().map(RecordView::from).collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&views)?),
        _ => {
            if views.is_empty() {
                println!("No pending records");
            }
            for view in &views {
                println!(
                    "{}  {:<24} {:<6} v{} retries={}",
                    view.id, view.kind, view.priority, view.version, view.retry_count
                );
            }
        }
    }
    Ok(())
}
