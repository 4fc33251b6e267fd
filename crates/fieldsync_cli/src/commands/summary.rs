//! Summary command implementation.

use serde::Serialize;
use std::path::Path;

/// Outbox totals.
#[derive(Debug, Serialize)]
pub struct SummaryResult {
    /// Outbox directory.
    pub path: String,
    /// Live records, synced or not.
    pub total: usize,
    /// Records waiting to sync.
    pub pending: usize,
    /// Approximate bytes used by live records.
    pub approx_size_bytes: u64,
    /// Records held for manual review.
    pub manual_review: usize,
}

/// Runs the summary command.
pub fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = super::open(dir)?;
    let summary = outbox.storage_summary()?;
    let result = SummaryResult {
        path: dir.display().to_string(),
        total: summary.total,
        pending: summary.pending_count,
        approx_size_bytes: summary.approx_size_bytes,
        manual_review: summary.manual_review_count,
    };

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => {
            println!("Outbox: {}", result.path);
            println!("  Records:        {}", result.total);
            println!("  Pending:        {}", result.pending);
            println!("  Manual review:  {}", result.manual_review);
            println!("  Size:           {}", format_bytes(result.approx_size_bytes));
        }
    }
    Ok(())
}

fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MB");
    }
}
