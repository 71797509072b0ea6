//! Validator: the build+test gate
//!
//! Runs the project's build, then its tests, and reports the outcome as a
//! [`ValidationReport`]. When the gate fails after a surgery and the safety
//! policy allows it, every change recorded in the surgery's rollback info is
//! reverted.
//!
//! State machine:
//!
//! ```text
//! Pending → Building → BuildFailed
//!                    → BuildOk            (terminal when tests are not required)
//!                    → BuildOk → Testing → TestsFailed | TestsOk
//! ```

mod process;

pub use process::{CommandRunner, CommandSpec, ProcessRunner, ToolOutput};

use crate::backup::{atomic_write, sha256_hex};
use crate::config::PipelineConfig;
use crate::surgeon::{restore_artifacts, RollbackInfo, SurgeryResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Build errors kept in a report
const MAX_BUILD_ERRORS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Success,
    Failed,
    Skipped,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Success => write!(f, "success"),
            StepStatus::Failed => write!(f, "failed"),
            StepStatus::Skipped => write!(f, "skipped"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Pending,
    Building,
    BuildFailed,
    BuildOk,
    Testing,
    TestsFailed,
    TestsOk,
}

/// What a rollback did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackOutcome {
    pub files_restored: Vec<PathBuf>,
    pub artifacts_reverted: Vec<PathBuf>,
    /// Files edited after the surgery; left as they are
    #[serde(default)]
    pub conflicts: Vec<PathBuf>,
    pub errors: Vec<String>,
}

impl RollbackOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.conflicts.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub timestamp: String,
    pub build_status: StepStatus,
    pub test_status: StepStatus,
    pub build_output: String,
    pub test_output: String,
    pub warnings_before: usize,
    pub warnings_after: usize,
    /// Compiler and linker error lines (first 10)
    pub errors: Vec<String>,
    /// Names of failed tests
    #[serde(default)]
    pub test_failures: Vec<String>,
    pub final_state: ValidationState,
    pub tests_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rollback: Option<RollbackOutcome>,
}

impl ValidationReport {
    /// Report for a run where nothing was built (preview, no changes)
    pub fn skipped(tests_required: bool, warnings_before: usize) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            build_status: StepStatus::Skipped,
            test_status: StepStatus::Skipped,
            build_output: String::new(),
            test_output: String::new(),
            warnings_before,
            warnings_after: warnings_before,
            errors: Vec::new(),
            test_failures: Vec::new(),
            final_state: ValidationState::Pending,
            tests_required,
            rollback: None,
        }
    }

    /// Build succeeded and tests passed, or were skipped while not required
    pub fn passed(&self) -> bool {
        self.build_status == StepStatus::Success
            && (self.test_status == StepStatus::Success
                || (self.test_status == StepStatus::Skipped && !self.tests_required))
    }

    pub fn rolled_back(&self) -> bool {
        self.rollback.is_some()
    }
}

static FAILED_TEST: OnceLock<Regex> = OnceLock::new();

fn failed_test_pattern() -> &'static Regex {
    FAILED_TEST.get_or_init(|| Regex::new(r"\[  FAILED  \] (.+)").unwrap())
}

/// Compiler and linker error lines: MSVC `error C`/`error LNK`, gcc/clang `error:`
pub fn parse_build_errors(output: &str) -> Vec<String> {
    output
        .lines()
        .filter(|l| l.contains("error C") || l.contains("error LNK") || l.contains("error:"))
        .map(|l| l.trim().to_string())
        .take(MAX_BUILD_ERRORS)
        .collect()
}

/// Lines mentioning "warning"
pub fn count_warnings(output: &str) -> usize {
    output.lines().filter(|l| l.contains("warning")).count()
}

/// Names from `[  FAILED  ] Suite.Test` lines, without duplicates
pub fn parse_test_failures(output: &str) -> Vec<String> {
    let mut failures: Vec<String> = Vec::new();
    for caps in failed_test_pattern().captures_iter(output) {
        let name = caps[1].trim().to_string();
        if !failures.contains(&name) {
            failures.push(name);
        }
    }
    failures
}

pub struct Validator<'a> {
    config: &'a PipelineConfig,
    runner: Box<dyn CommandRunner + 'a>,
}

impl<'a> Validator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self::with_runner(config, Box::new(ProcessRunner))
    }

    pub fn with_runner(config: &'a PipelineConfig, runner: Box<dyn CommandRunner + 'a>) -> Self {
        Self { config, runner }
    }

    pub fn build_command(&self) -> CommandSpec {
        let build = &self.config.build;
        let argv = if build.build_command.is_empty() {
            vec![
                "cmake".to_string(),
                "--build".to_string(),
                self.config.build_dir().to_string_lossy().into_owned(),
                "--config".to_string(),
                build.config.clone(),
            ]
        } else {
            build.build_command.clone()
        };
        CommandSpec::new("Build", &argv, self.config.project_root(), self.config.build_timeout())
    }

    /// The test command, or why there is none
    pub fn test_command(&self) -> Result<CommandSpec, String> {
        let build = &self.config.build;
        let argv = if build.test_command.is_empty() {
            let exe = self
                .config
                .build_dir()
                .join("bin")
                .join(&build.config)
                .join(&build.test_executable);
            if !exe.is_file() {
                return Err(format!("Test executable not found: {}", exe.display()));
            }
            vec![exe.to_string_lossy().into_owned()]
        } else {
            build.test_command.clone()
        };
        Ok(CommandSpec::new("Tests", &argv, self.config.project_root(), self.config.test_timeout()))
    }

    fn transition(state: &mut ValidationState, next: ValidationState) {
        debug!("Validation {:?} -> {:?}", state, next);
        *state = next;
    }

    /// Run the gate against the current tree
    pub fn check(&self, warnings_before: usize) -> ValidationReport {
        let tests_required = self.config.safety.require_tests;
        let mut report = ValidationReport::skipped(tests_required, warnings_before);
        let mut state = ValidationState::Pending;

        Self::transition(&mut state, ValidationState::Building);
        let spec = self.build_command();
        info!("Building: {}", spec.display());
        let output = self.runner.run(&spec);
        report.build_output = output.combined();
        report.warnings_after = count_warnings(&report.build_output);

        if output.exited_ok() {
            report.build_status = StepStatus::Success;
            Self::transition(&mut state, ValidationState::BuildOk);
        } else {
            report.build_status = StepStatus::Failed;
            report.errors = parse_build_errors(&report.build_output);
            if report.errors.is_empty() {
                let reason = output.error.clone().unwrap_or_else(|| {
                    format!("Build exited with code {}", output.return_code.unwrap_or(-1))
                });
                report.errors.push(reason);
            }
            Self::transition(&mut state, ValidationState::BuildFailed);
            warn!("Build failed: {}", report.errors[0]);
            report.final_state = state;
            return report;
        }

        if !tests_required {
            report.final_state = state;
            return report;
        }

        Self::transition(&mut state, ValidationState::Testing);
        match self.test_command() {
            Ok(spec) => {
                info!("Testing: {}", spec.display());
                let output = self.runner.run(&spec);
                report.test_output = output.combined();
                report.test_failures = parse_test_failures(&report.test_output);
                if output.exited_ok() && report.test_failures.is_empty() {
                    report.test_status = StepStatus::Success;
                    Self::transition(&mut state, ValidationState::TestsOk);
                } else {
                    report.test_status = StepStatus::Failed;
                    Self::transition(&mut state, ValidationState::TestsFailed);
                }
            }
            Err(reason) => {
                warn!("{}", reason);
                report.test_output = reason;
                report.test_status = StepStatus::Failed;
                Self::transition(&mut state, ValidationState::TestsFailed);
            }
        }

        report.final_state = state;
        report
    }

    /// Validate a surgery; revert it when the gate fails and auto-rollback is on
    pub fn validate(&self, surgery: &SurgeryResult, warnings_before: usize) -> ValidationReport {
        if !surgery.has_changes() {
            info!("No changes to validate");
            return ValidationReport::skipped(self.config.safety.require_tests, warnings_before);
        }

        let mut report = self.check(warnings_before);
        if !report.passed() {
            if self.config.safety.auto_rollback {
                warn!("Validation failed, rolling back");
                report.rollback = Some(rollback(&surgery.rollback_info));
            } else {
                warn!("Validation failed; auto_rollback is off, changes left in place");
            }
        }
        report
    }
}

/// Revert every change recorded in `info`.
///
/// Source files are restored atomically from their backups; a backup whose
/// hash differs from the recorded original is not used. A file whose content
/// is no longer what the surgery wrote is a conflict and is left untouched;
/// one already back at its original content counts as restored. Artifacts
/// the surgery created are deleted and overwritten ones restored.
pub fn rollback(info: &RollbackInfo) -> RollbackOutcome {
    let mut outcome = RollbackOutcome::default();

    for file in &info.files {
        let current = match std::fs::read(&file.path) {
            Ok(bytes) => sha256_hex(&bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("{} was deleted after the surgery, not restored", file.path.display());
                outcome.conflicts.push(file.path.clone());
                continue;
            }
            Err(e) => {
                outcome.errors.push(format!("{}: unreadable: {}", file.path.display(), e));
                continue;
            }
        };
        if current == file.original_sha256 {
            debug!("{} already has its original content", file.path.display());
            outcome.files_restored.push(file.path.clone());
            continue;
        }
        if !file.applied_sha256.is_empty() && current != file.applied_sha256 {
            warn!("{} changed after the surgery, not restored", file.path.display());
            outcome.conflicts.push(file.path.clone());
            continue;
        }

        let bytes = match std::fs::read(&file.backup_path) {
            Ok(b) => b,
            Err(e) => {
                warn!("Backup {} unreadable: {}", file.backup_path.display(), e);
                outcome
                    .errors
                    .push(format!("{}: backup unreadable: {}", file.path.display(), e));
                continue;
            }
        };
        if sha256_hex(&bytes) != file.original_sha256 {
            warn!("Backup {} does not match the recorded hash", file.backup_path.display());
            outcome
                .errors
                .push(format!("{}: backup hash mismatch, not restored", file.path.display()));
            continue;
        }
        match atomic_write(&file.path, &bytes) {
            Ok(()) => {
                info!("Restored {}", file.path.display());
                outcome.files_restored.push(file.path.clone());
            }
            Err(e) => {
                warn!("Could not restore {}: {}", file.path.display(), e);
                outcome.errors.push(format!("{}: {}", file.path.display(), e));
            }
        }
    }

    let (reverted, errors) = restore_artifacts(&info.artifacts);
    outcome.artifacts_reverted = reverted;
    outcome.errors.extend(errors);

    info!(
        "Rollback restored {} files and reverted {} artifacts ({} conflicts, {} errors)",
        outcome.files_restored.len(),
        outcome.artifacts_reverted.len(),
        outcome.conflicts.len(),
        outcome.errors.len()
    );
    outcome
}
