//! Base detector trait and types
//!
//! This module defines the core abstractions for per-file issue detection:
//! - `SourceFile`, a lexed view of one file handed to every detector
//! - `Detector` trait that all detectors must implement
//! - `DetectorResult` for capturing execution results

use super::lexer::{mask_lines, MaskedLine};
use crate::config::PipelineConfig;
use crate::models::{Issue, IssueClass};
use anyhow::Result;
use std::path::{Path, PathBuf};

/// One source file, split into lines and lexed
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the source root
    pub path: PathBuf,
    /// Original lines without terminators
    pub lines: Vec<String>,
    /// Same lines with comments and literal contents blanked
    pub masked: Vec<MaskedLine>,
}

impl SourceFile {
    pub fn parse(path: impl Into<PathBuf>, content: &str) -> Self {
        let lines: Vec<String> = content.lines().map(str::to_string).collect();
        let masked = mask_lines(lines.iter().map(String::as_str));
        Self {
            path: path.into(),
            lines,
            masked,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The line at `idx` and its immediate neighbours, trimmed
    pub fn context(&self, idx: usize) -> String {
        let start = idx.saturating_sub(1);
        let end = (idx + 2).min(self.lines.len());
        self.lines[start..end].join("\n").trim().to_string()
    }
}

/// Result from running a single detector on a single file
#[derive(Debug, Clone)]
pub struct DetectorResult {
    pub detector_name: String,
    pub issues: Vec<Issue>,
    pub success: bool,
    pub error: Option<String>,
}

impl DetectorResult {
    pub fn success(detector_name: String, issues: Vec<Issue>) -> Self {
        Self {
            detector_name,
            issues,
            success: true,
            error: None,
        }
    }

    pub fn failure(detector_name: String, error: String) -> Self {
        Self {
            detector_name,
            issues: Vec::new(),
            success: false,
            error: Some(error),
        }
    }
}

/// Trait for all issue detectors
///
/// A detector looks at one lexed file at a time and reports issues of a
/// single class. Issue ids are left empty; the scanner numbers them once
/// every file has been seen.
pub trait Detector: Send + Sync {
    /// Unique identifier for this detector
    fn name(&self) -> &'static str;

    /// Human-readable description of what this detector finds
    fn description(&self) -> &'static str;

    /// Issue class every reported issue belongs to
    fn class(&self) -> IssueClass;

    /// Run detection over one file
    fn detect(&self, file: &SourceFile) -> Result<Vec<Issue>>;

    /// Run detection, capturing failure instead of propagating it
    fn run(&self, file: &SourceFile) -> DetectorResult {
        match self.detect(file) {
            Ok(issues) => DetectorResult::success(self.name().to_string(), issues),
            Err(e) => DetectorResult::failure(self.name().to_string(), e.to_string()),
        }
    }
}

/// Every detector the scanner runs by default
pub fn default_detectors(config: &PipelineConfig) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(super::MagicNumbersDetector::new(
            config.limits.magic_number_skip.clone(),
        )),
        Box::new(super::StringLiteralsDetector::new()),
        Box::new(super::LongFunctionsDetector::new(
            config.limits.max_function_length,
        )),
    ]
}
