//! Reporting — CSV and JSON artifacts for a finished batch.
//!
//! The CSV carries one row per expression with full provenance, so a run can
//! be analyzed (or a follow-up batch scoped) without re-parsing expression
//! strings.

use std::path::Path;

use anyhow::{Context, Result};

use crate::batch::{BatchSummary, JobResult};

/// Export batch results as CSV.
///
/// Columns: expression, field, ts_op, days, group_op, group_by, state,
/// alpha_id, detail, completed_at
pub fn export_results_csv(results: &[JobResult]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record([
        "expression",
        "field",
        "ts_op",
        "days",
        "group_op",
        "group_by",
        "state",
        "alpha_id",
        "detail",
        "completed_at",
    ])?;

    for r in results {
        let days = r.expression.days.map(|d| d.to_string()).unwrap_or_default();
        let state = format!("{:?}", r.state).to_uppercase();
        let completed_at = r.completed_at.to_rfc3339();
        wtr.write_record([
            r.expression.expression.as_str(),
            r.expression.field_id.as_str(),
            r.expression.ts_op.as_deref().unwrap_or(""),
            days.as_str(),
            r.expression.group_op.as_str(),
            r.expression.group_by.as_str(),
            state.as_str(),
            r.alpha_id.as_deref().unwrap_or(""),
            r.detail.as_deref().unwrap_or(""),
            completed_at.as_str(),
        ])?;
    }

    let bytes = wtr.into_inner().context("failed to flush CSV writer")?;
    String::from_utf8(bytes).context("CSV output was not valid UTF-8")
}

/// Write batch results to a CSV file at `path`.
pub fn write_results_csv(path: &Path, results: &[JobResult]) -> Result<()> {
    let csv = export_results_csv(results)?;
    std::fs::write(path, csv)
        .with_context(|| format!("failed to write results to {}", path.display()))
}

/// Serialize batch results to pretty JSON.
pub fn export_results_json(results: &[JobResult]) -> Result<String> {
    serde_json::to_string_pretty(results).context("failed to serialize results to JSON")
}

/// One-line human summary for the end of a run.
pub fn render_summary(summary: &BatchSummary) -> String {
    let mut line = format!(
        "{} expressions: {} succeeded, {} failed, {} errored",
        summary.total, summary.succeeded, summary.failed, summary.errored
    );
    if summary.cancelled > 0 {
        line.push_str(&format!(", {} cancelled", summary.cancelled));
    }
    line
}
