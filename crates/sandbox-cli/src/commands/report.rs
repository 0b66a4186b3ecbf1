//! `sandbox-cli report replay`: reads a framed report-channel capture back
//! off disk and renders it for a human, or as JSON for downstream tooling.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result};

use report_channel::framing::read_all;
use report_channel::json::render_session;
use report_channel::redact::redact_path;

pub fn replay(input: &Path, json: bool) -> Result<()> {
    let file = File::open(input)
        .with_context(|| format!("open report capture {}", input.display()))?;
    let records = read_all(BufReader::new(file))
        .with_context(|| format!("read framed records from {}", input.display()))?;

    if json {
        println!("{}", render_session(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("(no records)");
        return Ok(());
    }

    for record in &records {
        println!(
            "#{:<6} corr={:<6} pip={:<4} {:<24} {:?}/{:?} access={:#06x} err={:<4} usn={:<8} {}",
            record.operation_id.0,
            record.correlation_id.0,
            record.pip_id.0,
            record.operation_name,
            record.action,
            record.report_level,
            record.access_mask,
            record.error_code,
            record.usn.0,
            redact_path(&record.path),
        );
        if let Some(filter) = &record.filter {
            println!("       filter: {filter}");
        }
    }
    Ok(())
}
