//! Verify command implementation.

use fieldsync_core::IntegrityVerdict;
use serde::Serialize;
use std::path::Path;

/// Verification result for one record.
#[derive(Debug, Serialize)]
pub struct VerdictView {
    /// Record id.
    pub id: String,
    /// Whether the payload matches its checksum.
    pub valid: bool,
    /// Stored checksum (hex).
    pub expected: String,
    /// Checksum of the current payload (hex), if computable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub computed: Option<String>,
    /// Corruption class, if invalid.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corruption: Option<&'static str>,
}

impl From<&IntegrityVerdict> for VerdictView {
    fn from(verdict: &IntegrityVerdict) -> Self {
        Self {
            id: verdict.id.to_string(),
            valid: verdict.valid,
            expected: verdict.expected_checksum.to_hex(),
            computed: verdict.computed_checksum.map(|c| c.to_hex()),
            corruption: verdict.corruption_kind.map(|k| k.as_str()),
        }
    }
}

/// Runs the verify command. Fails if any pending record is corrupted.
pub fn run(dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let outbox = super::open(dir)?;
    let verdicts: Vec<VerdictView> = outbox.verify_all()?.iter().map(VerdictView::from).collect();
    let corrupt = verdicts.iter().filter(|v| !v.valid).count();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&verdicts)?),
        _ => {
            println!("Verifying outbox at {:?}", dir);
            for verdict in verdicts.iter().filter(|v| !v.valid) {
                println!(
                    "  {}  {}",
                    verdict.id,
                    verdict.corruption.unwrap_or("invalid")
                );
            }
            println!("  Records checked: {}", verdicts.len());
            println!("  Corrupt records: {}", corrupt);
            println!();
        }
    }

    if corrupt == 0 {
        if format != "json" {
            println!("✓ Outbox verification passed");
        }
        Ok(())
    } else {
        Err(format!("{corrupt} corrupt record(s)").into())
    }
}
