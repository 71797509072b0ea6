//! Pipeline orchestration
//!
//! Runs the stages in order:
//! 1. Scan the source tree into a health report
//! 2. Triage the report into batches
//! 3. Operate on the first magic-number batch (preview or apply)
//! 4. Validate applied changes with the build+test gate
//! 5. Render the Markdown report
//!
//! Each stage persists its output in the output directory and reads its
//! predecessor's output from there, so any stage can be re-run on its own.

use anyhow::{Context, Result};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

use crate::advisor::{self, Advisor, AiClient};
use crate::config::PipelineConfig;
use crate::models::{HealthReport, IssueClass};
use crate::reporters::{self, markdown, text};
use crate::scanner::Scanner;
use crate::surgeon::{Surgeon, SurgeryResult};
use crate::triage::{triage, TriagePolicy, TriageQueue};
use crate::validator::{self, RollbackOutcome, ValidationReport, Validator};

/// How the Surgeon should run
#[derive(Debug, Clone, Copy, Default)]
pub struct SurgeryOptions {
    /// Write changes instead of previewing them
    pub apply: bool,
    pub kind: Option<IssueClass>,
    /// Skip the Advisor and use the deterministic grouping
    pub no_advisor: bool,
}

/// Options for a full run
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub surgery: SurgeryOptions,
    pub batch_size: Option<usize>,
}

/// Everything a full run produced
#[derive(Debug)]
pub struct RunOutcome {
    pub health: HealthReport,
    pub queue: TriageQueue,
    pub surgery: SurgeryResult,
    pub validation: Option<ValidationReport>,
    pub report_path: PathBuf,
}

impl RunOutcome {
    /// Every phase completed and, when changes were applied, the gate passed
    pub fn succeeded(&self) -> bool {
        validation_succeeded(&self.surgery, self.validation.as_ref())
    }
}

/// A surgery that changed nothing needs no validation
pub fn validation_succeeded(surgery: &SurgeryResult, validation: Option<&ValidationReport>) -> bool {
    if !surgery.has_changes() {
        return true;
    }
    validation.is_some_and(|v| v.passed())
}

fn create_spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
        .template("{spinner:.green} {msg}")
        .unwrap()
}

fn spinner(message: impl Into<String>) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(create_spinner_style());
    bar.set_message(message.into());
    bar.enable_steady_tick(Duration::from_millis(100));
    bar
}

pub struct Pipeline<'a> {
    config: &'a PipelineConfig,
}

impl<'a> Pipeline<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    fn output_dir(&self) -> PathBuf {
        self.config.output_dir()
    }

    /// Scan the source tree and persist `health_report.json`
    pub fn scan(&self) -> Result<HealthReport> {
        let bar = spinner(format!("Scanning {}...", self.config.source_root().display()));
        let report = Scanner::new(self.config).scan();
        bar.finish_and_clear();
        let report = report?;

        reporters::write_json(&self.output_dir(), reporters::HEALTH_REPORT, &report)?;
        print!("{}", text::scan_summary(&report));
        Ok(report)
    }

    /// Triage the last health report and persist `triage_queue.json`
    pub fn triage(&self, batch_size: Option<usize>) -> Result<TriageQueue> {
        let report: HealthReport = reporters::read_json(&self.output_dir(), reporters::HEALTH_REPORT)?;
        self.triage_report(&report, batch_size)
    }

    fn triage_report(&self, report: &HealthReport, batch_size: Option<usize>) -> Result<TriageQueue> {
        let queue = triage(report, &TriagePolicy::from_config(self.config, batch_size));
        reporters::write_json(&self.output_dir(), reporters::TRIAGE_QUEUE, &queue)?;
        print!("{}", text::triage_summary(&queue));
        Ok(queue)
    }

    /// The configured Advisor, or `None` when disabled or not constructible
    fn advisor(&self, options: SurgeryOptions) -> Option<AiClient> {
        if options.no_advisor || !self.config.advisor.enabled {
            info!("Advisor disabled, using fallback grouping");
            return None;
        }
        match advisor::from_settings(&self.config.advisor) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!("Advisor unavailable ({}), using fallback grouping", e);
                None
            }
        }
    }

    /// Operate on the last triage queue and persist `surgery_results.json`
    pub fn surgery(&self, options: SurgeryOptions) -> Result<SurgeryResult> {
        let queue: TriageQueue = reporters::read_json(&self.output_dir(), reporters::TRIAGE_QUEUE)?;
        self.operate(&queue, options)
    }

    fn operate(&self, queue: &TriageQueue, options: SurgeryOptions) -> Result<SurgeryResult> {
        let client = self.advisor(options);
        let advisor = client.as_ref().map(|c| c as &dyn Advisor);

        let bar = spinner(if options.apply {
            "Applying fixes..."
        } else {
            "Planning fixes (preview)..."
        });
        let result = Surgeon::new(self.config, advisor).operate(queue, options.kind, !options.apply);
        bar.finish_and_clear();
        let result = result.context("Surgery failed")?;

        reporters::write_json(&self.output_dir(), reporters::SURGERY_RESULTS, &result)?;
        print!("{}", text::surgery_summary(&result));
        Ok(result)
    }

    /// Warning count of the last baseline, 0 without one
    fn warnings_before(&self) -> Result<usize> {
        let baseline: Option<ValidationReport> =
            reporters::read_json_opt(&self.output_dir(), reporters::VALIDATION_BASELINE)?;
        Ok(baseline.map_or(0, |b| b.warnings_after))
    }

    /// Validate the last surgery result and persist `validation_report.json`
    pub fn validate(&self) -> Result<ValidationReport> {
        let surgery: SurgeryResult = reporters::read_json(&self.output_dir(), reporters::SURGERY_RESULTS)?;
        if surgery.rolled_back {
            // Keep the report that explains the rollback
            println!("{}Last surgery was rolled back, nothing to validate", style("• ").dim());
            return Ok(ValidationReport::skipped(
                self.config.safety.require_tests,
                self.warnings_before()?,
            ));
        }
        self.validate_surgery(&surgery)
    }

    fn validate_surgery(&self, surgery: &SurgeryResult) -> Result<ValidationReport> {
        let warnings_before = self.warnings_before()?;
        let bar = spinner("Building and testing...");
        let report = Validator::new(self.config).validate(surgery, warnings_before);
        bar.finish_and_clear();

        reporters::write_json(&self.output_dir(), reporters::VALIDATION_REPORT, &report)?;
        if let Some(outcome) = &report.rollback {
            self.mark_rolled_back(surgery, outcome)?;
        }
        print!("{}", text::validation_summary(&report));
        Ok(report)
    }

    /// Persist the rolled-back marker unless the rollback hit errors and may be retried
    fn mark_rolled_back(&self, surgery: &SurgeryResult, outcome: &RollbackOutcome) -> Result<()> {
        if !outcome.errors.is_empty() {
            warn!("Rollback incomplete, run `codemend rollback` to retry");
            return Ok(());
        }
        let mut reverted = surgery.clone();
        reverted.rolled_back = true;
        reporters::write_json(&self.output_dir(), reporters::SURGERY_RESULTS, &reverted)?;
        Ok(())
    }

    /// Build and test the current tree, persisting `validation_baseline.json`
    pub fn verify(&self) -> Result<ValidationReport> {
        let warnings_before = self.warnings_before()?;
        let bar = spinner("Building and testing the current tree...");
        let report = Validator::new(self.config).check(warnings_before);
        bar.finish_and_clear();

        reporters::write_json(&self.output_dir(), reporters::VALIDATION_BASELINE, &report)?;
        print!("{}", text::validation_summary(&report));
        Ok(report)
    }

    /// Revert the last applied surgery
    pub fn rollback(&self) -> Result<RollbackOutcome> {
        let surgery: SurgeryResult = reporters::read_json(&self.output_dir(), reporters::SURGERY_RESULTS)?;
        if surgery.rolled_back {
            println!("{}Last surgery was already rolled back", style("• ").dim());
            return Ok(RollbackOutcome::default());
        }
        if !surgery.has_changes() {
            println!("{}Last surgery changed nothing, nothing to roll back", style("• ").dim());
            return Ok(RollbackOutcome::default());
        }

        let outcome = validator::rollback(&surgery.rollback_info);
        self.mark_rolled_back(&surgery, &outcome)?;
        println!(
            "{}Restored {} files, reverted {} artifacts",
            if outcome.is_clean() { style("✓ ").green() } else { style("⚠️  ").yellow() },
            outcome.files_restored.len(),
            outcome.artifacts_reverted.len()
        );
        for path in &outcome.conflicts {
            println!("  {} {}", style("kept, edited after surgery:").yellow(), path.display());
        }
        for error in &outcome.errors {
            println!("  {}", style(error).red());
        }
        Ok(outcome)
    }

    /// Render the Markdown report from the persisted outputs
    pub fn report(&self) -> Result<(PathBuf, String)> {
        let out = self.output_dir();
        let health: HealthReport = reporters::read_json(&out, reporters::HEALTH_REPORT)?;
        let surgery: Option<SurgeryResult> = reporters::read_json_opt(&out, reporters::SURGERY_RESULTS)?;
        let validation: Option<ValidationReport> =
            reporters::read_json_opt(&out, reporters::VALIDATION_REPORT)?;
        self.write_report(&health, surgery.as_ref(), validation.as_ref())
    }

    fn write_report(
        &self,
        health: &HealthReport,
        surgery: Option<&SurgeryResult>,
        validation: Option<&ValidationReport>,
    ) -> Result<(PathBuf, String)> {
        let markdown = markdown::render(health, surgery, validation)?;
        let out = self.output_dir();
        std::fs::create_dir_all(&out)
            .with_context(|| format!("Failed to create output directory {}", out.display()))?;
        let path = out.join(reporters::REPORT_FILE);
        std::fs::write(&path, &markdown).with_context(|| format!("Failed to write {}", path.display()))?;
        Ok((path, markdown))
    }

    /// Scan, triage, operate, validate (when applying) and report
    pub fn run(&self, options: RunOptions) -> Result<RunOutcome> {
        println!("{}", style("[1/5] Scan").bold());
        let health = self.scan()?;

        println!("{}", style("[2/5] Triage").bold());
        let queue = self.triage_report(&health, options.batch_size)?;

        println!("{}", style("[3/5] Surgery").bold());
        let surgery = self.operate(&queue, options.surgery)?;

        println!("{}", style("[4/5] Validation").bold());
        let validation = if surgery.has_changes() {
            Some(self.validate_surgery(&surgery)?)
        } else {
            println!("{}Nothing applied, validation skipped", style("• ").dim());
            // A stale report from an earlier run must not be shown with this one
            let stale = self.output_dir().join(reporters::VALIDATION_REPORT);
            if stale.exists() {
                std::fs::remove_file(&stale)
                    .with_context(|| format!("Failed to remove {}", stale.display()))?;
            }
            None
        };

        println!("{}", style("[5/5] Report").bold());
        let (report_path, _) = self.write_report(&health, Some(&surgery), validation.as_ref())?;
        println!("{}Report saved to {}", style("✓ ").green(), style(report_path.display()).cyan());

        Ok(RunOutcome {
            health,
            queue,
            surgery,
            validation,
            report_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn project() -> (tempfile::TempDir, PipelineConfig) {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join("player.cpp"), "void Player::reset() {\n    hp = 150;\n    mp = 35;\n}\n").unwrap();
        let mut config = PipelineConfig::with_root(dir.path());
        config.advisor.enabled = false;
        (dir, config)
    }

    #[test]
    fn test_stages_persist_outputs() {
        let (dir, config) = project();
        let pipeline = Pipeline::new(&config);

        let health = pipeline.scan().unwrap();
        assert_eq!(health.summary[&IssueClass::MagicNumbers], 2);
        let queue = pipeline.triage(Some(1)).unwrap();
        assert_eq!(queue.batches.len(), 2);
        let surgery = pipeline.surgery(SurgeryOptions::default()).unwrap();
        assert!(surgery.preview);

        let out = dir.path().join(".codemend");
        for name in ["health_report.json", "triage_queue.json", "surgery_results.json"] {
            assert!(out.join(name).exists(), "{} missing", name);
        }
    }

    #[test]
    fn test_triage_without_scan_fails() {
        let (_dir, config) = project();
        let err = Pipeline::new(&config).triage(None).unwrap_err();
        assert!(err.to_string().contains("health_report.json"));
    }

    #[test]
    fn test_preview_run_succeeds_without_validation() {
        let (dir, config) = project();
        let outcome = Pipeline::new(&config).run(RunOptions::default()).unwrap();
        assert!(outcome.succeeded());
        assert!(outcome.validation.is_none());
        assert!(outcome.report_path.exists());
        let player = fs::read_to_string(dir.path().join("src/player.cpp")).unwrap();
        assert!(player.contains("150"));
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_gate_rolls_back() {
        let (dir, mut config) = project();
        config.build.build_command = vec!["false".into()];
        let options = RunOptions {
            surgery: SurgeryOptions {
                apply: true,
                ..Default::default()
            },
            batch_size: None,
        };
        let outcome = Pipeline::new(&config).run(options).unwrap();
        assert!(!outcome.succeeded());
        let validation = outcome.validation.unwrap();
        assert!(validation.rolled_back());
        let player = fs::read_to_string(dir.path().join("src/player.cpp")).unwrap();
        assert!(player.contains("hp = 150;"));
        assert!(!dir.path().join("config/game_config.json").exists());

        let out = dir.path().join(".codemend");
        let persisted: SurgeryResult = reporters::read_json(&out, reporters::SURGERY_RESULTS).unwrap();
        assert!(persisted.rolled_back);
        assert!(!persisted.has_changes());

        // Work done after the rollback survives later commands
        let edited = "void Player::reset() {\n    hp = 200;\n}\n";
        fs::write(dir.path().join("src/player.cpp"), edited).unwrap();
        let mut passing = config.clone();
        passing.build.build_command = vec!["true".into()];
        let pipeline = Pipeline::new(&passing);

        let revalidated = pipeline.validate().unwrap();
        assert_eq!(revalidated.build_status, validator::StepStatus::Skipped);
        assert!(validation_succeeded(&persisted, Some(&revalidated)));
        let kept: ValidationReport = reporters::read_json(&out, reporters::VALIDATION_REPORT).unwrap();
        assert!(kept.rolled_back());

        assert_eq!(pipeline.rollback().unwrap(), RollbackOutcome::default());
        assert_eq!(fs::read_to_string(dir.path().join("src/player.cpp")).unwrap(), edited);
    }

    #[cfg(unix)]
    #[test]
    fn test_manual_rollback() {
        let (dir, mut config) = project();
        config.build.build_command = vec!["true".into()];
        config.safety.require_tests = false;
        let pipeline = Pipeline::new(&config);
        let options = RunOptions {
            surgery: SurgeryOptions {
                apply: true,
                ..Default::default()
            },
            batch_size: None,
        };
        assert!(pipeline.run(options).unwrap().succeeded());
        assert!(!fs::read_to_string(dir.path().join("src/player.cpp")).unwrap().contains("150"));

        let outcome = pipeline.rollback().unwrap();
        assert!(outcome.is_clean());
        assert!(fs::read_to_string(dir.path().join("src/player.cpp")).unwrap().contains("hp = 150;"));
        assert!(pipeline.rollback().unwrap().files_restored.is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_manual_rollback_keeps_later_edits() {
        let (dir, mut config) = project();
        config.build.build_command = vec!["true".into()];
        config.safety.require_tests = false;
        let pipeline = Pipeline::new(&config);
        let options = RunOptions {
            surgery: SurgeryOptions {
                apply: true,
                ..Default::default()
            },
            batch_size: None,
        };
        assert!(pipeline.run(options).unwrap().succeeded());

        let path = dir.path().join("src/player.cpp");
        let edited = format!("{}// follow-up work\n", fs::read_to_string(&path).unwrap());
        fs::write(&path, &edited).unwrap();

        let outcome = pipeline.rollback().unwrap();
        assert_eq!(outcome.conflicts, vec![path.clone()]);
        assert!(!outcome.is_clean());
        assert_eq!(fs::read_to_string(&path).unwrap(), edited);
        assert!(!dir.path().join("config/game_config.json").exists());
    }

    #[test]
    fn test_report_from_scan_only() {
        let (_dir, config) = project();
        let pipeline = Pipeline::new(&config);
        pipeline.scan().unwrap();
        let (path, markdown) = pipeline.report().unwrap();
        assert!(path.ends_with("CODEMEND_REPORT.md"));
        assert!(markdown.contains("### Build: SKIPPED"));
    }
}
