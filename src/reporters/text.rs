//! One-line (and slightly longer) terminal summaries for each phase

use crate::models::{HealthReport, IssueClass};
use crate::surgeon::SurgeryResult;
use crate::triage::TriageQueue;
use crate::validator::{StepStatus, ValidationReport};
use console::style;

/// Batches listed in the triage summary
const MAX_BATCHES_SHOWN: usize = 5;

fn status_label(status: StepStatus) -> String {
    match status {
        StepStatus::Success => style("success").green().bold().to_string(),
        StepStatus::Failed => style("failed").red().bold().to_string(),
        StepStatus::Skipped => style("skipped").dim().to_string(),
    }
}

pub fn scan_summary(report: &HealthReport) -> String {
    let mut out = format!(
        "{}Scanned {} files, found {} issues\n",
        style("✓ ").green(),
        style(report.files_scanned).cyan(),
        style(report.total_issues()).bold()
    );
    for class in IssueClass::ALL {
        let count = report.summary.get(&class).copied().unwrap_or(0);
        out.push_str(&format!("  {:<16} {}\n", class.label(), count));
    }
    out
}

pub fn triage_summary(queue: &TriageQueue) -> String {
    let mut out = format!(
        "{}Created {} batches from {} issues\n",
        style("✓ ").green(),
        style(queue.batches.len()).cyan(),
        queue.total_issues
    );
    for batch in queue.batches.iter().take(MAX_BATCHES_SHOWN) {
        out.push_str(&format!(
            "  {}  {} issues, ~{}\n",
            style(&batch.batch_id).bold(),
            batch.issue_count,
            batch.estimated_time
        ));
    }
    let hidden = queue.batches.len().saturating_sub(MAX_BATCHES_SHOWN);
    if hidden > 0 {
        out.push_str(&format!("  {}\n", style(format!("...and {} more", hidden)).dim()));
    }
    out
}

pub fn surgery_summary(result: &SurgeryResult) -> String {
    let Some(batch) = result.batches_processed.first() else {
        return format!("{}No magic-number batch to operate on\n", style("• ").dim());
    };

    let mut out = if result.preview {
        let planned: usize = batch.result.plan.iter().map(|p| p.replacements.len()).sum();
        format!(
            "{}Preview of {}: {} replacements in {} files ({} grouping)\n",
            style("• ").cyan(),
            style(&batch.batch_id).bold(),
            planned,
            batch.result.plan.len(),
            batch.result.grouping_source
        )
    } else {
        format!(
            "{}{}: fixed {} issues in {} files ({} grouping)\n",
            style("✓ ").green(),
            style(&batch.batch_id).bold(),
            batch.issues_fixed,
            result.files_modified.len(),
            batch.result.grouping_source
        )
    };
    for failed in &result.failed_files {
        out.push_str(&format!(
            "  {}{}: {}\n",
            style("⚠️  ").yellow(),
            failed.path.display(),
            failed.reason
        ));
    }
    out
}

pub fn validation_summary(report: &ValidationReport) -> String {
    let icon = if report.passed() {
        style("✓ ").green()
    } else {
        style("✗ ").red()
    };
    let mut out = format!(
        "{}Build {}, tests {} (warnings {} → {})\n",
        icon,
        status_label(report.build_status),
        status_label(report.test_status),
        report.warnings_before,
        report.warnings_after
    );
    for error in &report.errors {
        out.push_str(&format!("  {}\n", style(error).red()));
    }
    for name in &report.test_failures {
        out.push_str(&format!("  {} {}\n", style("FAILED").red(), name));
    }
    if let Some(rollback) = &report.rollback {
        out.push_str(&format!(
            "  Rolled back: {} files restored, {} artifacts reverted\n",
            rollback.files_restored.len(),
            rollback.artifacts_reverted.len()
        ));
        for path in &rollback.conflicts {
            out.push_str(&format!("  {} {}\n", style("kept, edited after surgery:").yellow(), path.display()));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_scan_summary_lists_every_class() {
        console::set_colors_enabled(false);
        let report = HealthReport::new(4, BTreeMap::new(), BTreeMap::new());
        let out = scan_summary(&report);
        assert!(out.contains("Scanned 4 files, found 0 issues"));
        assert!(out.contains("Long functions"));
        assert_eq!(out.lines().count(), 5);
    }

    #[test]
    fn test_validation_summary() {
        console::set_colors_enabled(false);
        let mut report = ValidationReport::skipped(true, 2);
        report.build_status = StepStatus::Failed;
        report.errors = vec!["a.cpp:1: error: nope".into()];
        let out = validation_summary(&report);
        assert!(out.contains("Build failed, tests skipped (warnings 2 → 2)"));
        assert!(out.contains("a.cpp:1: error: nope"));
    }
}
