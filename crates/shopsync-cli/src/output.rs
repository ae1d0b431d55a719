//! Terminal summary for batch reports.

use std::path::Path;

use shopsync_pipeline::{BatchReport, Outcome};

/// Failures listed before the summary truncates.
const MAX_LISTED_FAILURES: usize = 20;

/// Prints the summary of `report` and, with `--report`, writes it as JSON.
pub(crate) fn emit_report(report: &BatchReport, path: Option<&Path>) -> anyhow::Result<()> {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!(
        "{}{mode}: {} succeeded, {} failed, {} skipped",
        report.operation,
        report.successes(),
        report.failures(),
        report.skips()
    );
    if let Some(batch_id) = report.batch_id {
        println!("  batch: {batch_id}");
    }
    for (counter, n) in &report.counts {
        println!("  {counter:<18}{n}");
    }

    let failed: Vec<_> = report
        .items
        .iter()
        .filter(|item| item.outcome == Outcome::Failed)
        .collect();
    for item in failed.iter().take(MAX_LISTED_FAILURES) {
        println!(
            "  FAILED {}: {}",
            item.key,
            item.detail.as_deref().unwrap_or("-")
        );
    }
    if failed.len() > MAX_LISTED_FAILURES {
        println!("  ... and {} more", failed.len() - MAX_LISTED_FAILURES);
    }

    if let Some(path) = path {
        report.write_json(path)?;
        println!("report written to {}", path.display());
    }
    Ok(())
}
