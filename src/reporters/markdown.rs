//! Markdown report of a pipeline run
//!
//! Combines the health report, the surgery result and the validation report
//! into `CODEMEND_REPORT.md`. Surgery and validation are optional: a scan-only
//! run still gets a report, with verification shown as skipped.

use crate::models::{HealthReport, IssueClass};
use crate::surgeon::SurgeryResult;
use crate::validator::{StepStatus, ValidationReport};
use anyhow::Result;
use chrono::Local;

pub const REPORT_FILE: &str = "CODEMEND_REPORT.md";

/// Maximum failed files listed before truncating
const MAX_FAILED_FILES: usize = 20;

/// Render the run report as GitHub-flavored Markdown
pub fn render(
    health: &HealthReport,
    surgery: Option<&SurgeryResult>,
    validation: Option<&ValidationReport>,
) -> Result<String> {
    let mut md = String::new();

    md.push_str(&render_header());
    md.push('\n');

    md.push_str(&render_summary(surgery, validation));
    md.push('\n');

    md.push_str(&render_health(health));
    md.push('\n');

    if let Some(surgery) = surgery {
        if !surgery.batches_processed.is_empty() {
            md.push_str(&render_changes(surgery)?);
            md.push('\n');
        }
        if !surgery.files_modified.is_empty() || !surgery.failed_files.is_empty() {
            md.push_str(&render_files(surgery));
            md.push('\n');
        }
    }

    md.push_str(&render_verification(validation));
    md.push('\n');

    md.push_str(&render_next_steps(surgery, validation));
    md.push('\n');

    md.push_str(&render_footer());

    Ok(md)
}

fn render_header() -> String {
    format!(
        "# Codemend Fix Report\n\n**Date**: {}\n",
        Local::now().format("%Y-%m-%d %H:%M:%S")
    )
}

fn status_word(status: Option<StepStatus>) -> String {
    status.unwrap_or(StepStatus::Skipped).to_string().to_uppercase()
}

fn render_summary(surgery: Option<&SurgeryResult>, validation: Option<&ValidationReport>) -> String {
    let batches = surgery.map_or(0, |s| s.batches_processed.len());
    let modified = surgery.map_or(0, |s| s.files_modified.len());
    let mode = match surgery {
        Some(s) if s.preview => "preview",
        Some(_) => "apply",
        None => "scan only",
    };

    format!(
        r#"## Summary

- Mode: {}
- Batches processed: {}
- Files modified: {}
- Build status: **{}**
- Test status: **{}**
"#,
        mode,
        batches,
        modified,
        status_word(validation.map(|v| v.build_status)),
        status_word(validation.map(|v| v.test_status)),
    )
}

fn render_health(health: &HealthReport) -> String {
    let mut md = String::from("## Codebase Health Scan\n\n");
    md.push_str(&format!("Files scanned: {}\n\n", health.files_scanned));
    md.push_str("| Issue Type | Count |\n");
    md.push_str("|------------|-------|\n");
    for class in IssueClass::ALL {
        let count = health.summary.get(&class).copied().unwrap_or(0);
        md.push_str(&format!("| {} | {} |\n", class.label(), count));
    }
    md.push_str(&format!("| **Total** | **{}** |\n", health.total_issues()));
    md
}

fn render_changes(surgery: &SurgeryResult) -> Result<String> {
    let mut md = String::from("## Changes Applied\n\n");
    if surgery.preview {
        md.push_str("*Preview only: nothing below was written.*\n\n");
    }

    for batch in &surgery.batches_processed {
        let result = &batch.result;
        md.push_str(&format!("### Batch: {}\n\n", batch.batch_id));
        md.push_str(&format!("**Type**: {}  \n", batch.class));
        md.push_str(&format!("**Issues Fixed**: {}  \n", batch.issues_fixed));
        md.push_str(&format!("**Grouping**: {}\n", result.grouping_source));
        if let Some(error) = &result.advisor_error {
            md.push_str(&format!("\n> Advisor unavailable: {}\n", error));
        }
        md.push('\n');

        let planned: usize = result.plan.iter().map(|p| p.replacements.len()).sum();
        md.push_str(&format!(
            "Planned {} replacements in {} files. Artifacts: `{}`, `{}`, `{}`\n\n",
            planned,
            result.plan.len(),
            result.config_path.display(),
            result.declaration_path.display(),
            result.initializer_path.display()
        ));

        md.push_str("**Generated Configuration**:\n\n```json\n");
        md.push_str(&serde_json::to_string_pretty(&result.config_structure)?);
        md.push_str("\n```\n\n");
    }
    Ok(md)
}

fn render_files(surgery: &SurgeryResult) -> String {
    let mut md = String::new();

    if !surgery.files_modified.is_empty() {
        md.push_str("## Modified Files\n\n");
        for path in &surgery.files_modified {
            md.push_str(&format!("- `{}`\n", path.display()));
        }
        md.push('\n');
    }

    if !surgery.failed_files.is_empty() {
        md.push_str("## Skipped Files\n\n");
        for failed in surgery.failed_files.iter().take(MAX_FAILED_FILES) {
            md.push_str(&format!("- `{}`: {}\n", failed.path.display(), failed.reason));
        }
        let hidden = surgery.failed_files.len().saturating_sub(MAX_FAILED_FILES);
        if hidden > 0 {
            md.push_str(&format!("\n*...and {} more*\n", hidden));
        }
        md.push('\n');
    }
    md
}

fn render_verification(validation: Option<&ValidationReport>) -> String {
    let mut md = String::from("## Verification Results\n\n");

    let Some(report) = validation else {
        md.push_str("### Build: SKIPPED\n\n### Tests: SKIPPED\n");
        return md;
    };

    match report.build_status {
        StepStatus::Success => {
            md.push_str("### Build: PASSED\n\n");
            md.push_str(&format!(
                "- Warnings: {} (before: {})\n",
                report.warnings_after, report.warnings_before
            ));
        }
        StepStatus::Failed => {
            md.push_str("### Build: FAILED\n\n**Errors**:\n\n```\n");
            for error in &report.errors {
                md.push_str(error);
                md.push('\n');
            }
            md.push_str("```\n");
        }
        StepStatus::Skipped => md.push_str("### Build: SKIPPED\n"),
    }
    md.push('\n');

    match report.test_status {
        StepStatus::Success => md.push_str("### Tests: PASSED\n\n- All tests passing\n"),
        StepStatus::Failed => {
            md.push_str("### Tests: FAILED\n\n");
            if report.test_failures.is_empty() {
                md.push_str("```\n");
                md.push_str(report.test_output.trim_end());
                md.push_str("\n```\n");
            } else {
                md.push_str("**Failed Tests**:\n\n");
                for name in &report.test_failures {
                    md.push_str(&format!("- {}\n", name));
                }
            }
        }
        StepStatus::Skipped if !report.tests_required => {
            md.push_str("### Tests: SKIPPED (not required)\n")
        }
        StepStatus::Skipped => md.push_str("### Tests: SKIPPED\n"),
    }

    if let Some(rollback) = &report.rollback {
        md.push_str("\n### Rollback\n\n");
        md.push_str(&format!(
            "- Files restored: {}\n- Artifacts reverted: {}\n",
            rollback.files_restored.len(),
            rollback.artifacts_reverted.len()
        ));
        for path in &rollback.conflicts {
            md.push_str(&format!("- Kept (edited after surgery): `{}`\n", path.display()));
        }
        for error in &rollback.errors {
            md.push_str(&format!("- Error: {}\n", error));
        }
    }
    md
}

fn render_next_steps(surgery: Option<&SurgeryResult>, validation: Option<&ValidationReport>) -> String {
    let mut md = String::from("## Next Steps\n\n");

    let passed = validation.is_some_and(|v| v.passed());
    let rolled_back = validation.is_some_and(|v| v.rolled_back());

    match surgery {
        None => md.push_str("Run `codemend surgery` to preview a fix for the top batch.\n"),
        Some(s) if s.preview => {
            md.push_str("This was a preview. Re-run with `--apply` to write the changes and validate them.\n")
        }
        Some(_) if rolled_back => md.push_str(
            "Validation failed. Changes have been rolled back.\n\n\
             Review the errors above and fix manually, or run codemend again.\n",
        ),
        Some(s) if s.rolled_back => md.push_str("The changes were reverted with `codemend rollback`.\n"),
        Some(s) if !s.has_changes() => md.push_str("No changes were made.\n"),
        Some(_) if passed => md.push_str(
            r#"All changes validated successfully!

1. **Review changes** with your version control tool (`git diff`).
2. **Test manually** (optional): run the project against the generated configuration.
3. **Commit** the modified sources together with the generated artifacts.
"#,
        ),
        Some(_) => md.push_str(
            "Validation failed and the changes were left in place.\n\n\
             Run `codemend rollback` to revert them.\n",
        ),
    }
    md
}

fn render_footer() -> String {
    "---\n\n*Generated by codemend: self-healing code maintenance*\n".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::{RollbackOutcome, ValidationState};
    use std::collections::BTreeMap;

    fn health() -> HealthReport {
        HealthReport::new(12, BTreeMap::new(), BTreeMap::new())
    }

    fn validation(build: StepStatus, test: StepStatus) -> ValidationReport {
        let mut report = ValidationReport::skipped(true, 3);
        report.build_status = build;
        report.test_status = test;
        report.final_state = ValidationState::TestsOk;
        report.warnings_after = 5;
        report
    }

    fn applied() -> SurgeryResult {
        serde_json::from_value(serde_json::json!({
            "timestamp": "2026-01-01T00:00:00+00:00",
            "preview": false,
            "batches_processed": [],
            "config_generated": true,
            "files_modified": ["player.cpp"],
            "failed_files": [{"path": "enemy.cpp", "reason": "file changed since it was scanned"}],
            "rollback_info": {"backup_dir": "/tmp/b", "files": [
                {"path": "/p/src/player.cpp", "backup_path": "/tmp/b/player.cpp", "original_sha256": "x"}
            ], "artifacts": []}
        }))
        .unwrap()
    }

    #[test]
    fn test_scan_only_report() {
        let md = render(&health(), None, None).unwrap();
        assert!(md.starts_with("# Codemend Fix Report"));
        assert!(md.contains("## Codebase Health Scan"));
        assert!(md.contains("| Magic numbers | 0 |"));
        assert!(md.contains("| Duplicates | 0 |"));
        assert!(md.contains("Build status: **SKIPPED**"));
        assert!(md.contains("### Tests: SKIPPED"));
        assert!(!md.contains("## Changes Applied"));
    }

    #[test]
    fn test_successful_run() {
        let surgery = applied();
        let report = validation(StepStatus::Success, StepStatus::Success);
        let md = render(&health(), Some(&surgery), Some(&report)).unwrap();
        assert!(md.contains("- Mode: apply"));
        assert!(md.contains("## Modified Files\n\n- `player.cpp`"));
        assert!(md.contains("- `enemy.cpp`: file changed since it was scanned"));
        assert!(md.contains("### Build: PASSED"));
        assert!(md.contains("- Warnings: 5 (before: 3)"));
        assert!(md.contains("### Tests: PASSED"));
        assert!(md.contains("All changes validated successfully!"));
    }

    #[test]
    fn test_failed_run_with_rollback() {
        let surgery = applied();
        let mut report = validation(StepStatus::Failed, StepStatus::Skipped);
        report.errors = vec!["player.cpp(4): error C2065: 'config': undeclared identifier".into()];
        report.rollback = Some(RollbackOutcome {
            files_restored: vec!["/p/src/player.cpp".into()],
            artifacts_reverted: vec![],
            conflicts: vec![],
            errors: vec![],
        });
        let md = render(&health(), Some(&surgery), Some(&report)).unwrap();
        assert!(md.contains("### Build: FAILED"));
        assert!(md.contains("error C2065"));
        assert!(md.contains("- Files restored: 1"));
        assert!(md.contains("Changes have been rolled back."));
    }

    #[test]
    fn test_failed_tests_listed() {
        let surgery = applied();
        let mut report = validation(StepStatus::Success, StepStatus::Failed);
        report.test_failures = vec!["Combat.CritDamage".into()];
        let md = render(&health(), Some(&surgery), Some(&report)).unwrap();
        assert!(md.contains("### Tests: FAILED"));
        assert!(md.contains("- Combat.CritDamage"));
        assert!(md.contains("codemend rollback"));
    }

    #[test]
    fn test_reverted_surgery_after_auto_rollback() {
        let mut surgery = applied();
        surgery.rolled_back = true;
        let mut report = validation(StepStatus::Failed, StepStatus::Skipped);
        report.rollback = Some(RollbackOutcome {
            files_restored: vec![],
            artifacts_reverted: vec![],
            conflicts: vec!["/p/src/player.cpp".into()],
            errors: vec![],
        });
        let md = render(&health(), Some(&surgery), Some(&report)).unwrap();
        assert!(md.contains("- Kept (edited after surgery): `/p/src/player.cpp`"));
        assert!(md.contains("Changes have been rolled back."));

        let md = render(&health(), Some(&surgery), None).unwrap();
        assert!(md.contains("reverted with `codemend rollback`"));
        assert!(!md.contains("No changes were made."));
    }

    #[test]
    fn test_preview_next_steps() {
        let mut surgery = applied();
        surgery.preview = true;
        let md = render(&health(), Some(&surgery), None).unwrap();
        assert!(md.contains("- Mode: preview"));
        assert!(md.contains("Re-run with `--apply`"));
    }
}
