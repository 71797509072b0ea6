//! Long Functions Detector
//!
//! A brace-depth state machine over the lexed lines. A line whose code opens
//! a function body (signature and `{` on the same line) starts a record while
//! no function is open; the record closes when the depth returns to zero.
//!
//! Signatures spread over several lines, constructor initializer lists and
//! functions nested inside an open record are not recognised.

use super::base::{Detector, SourceFile};
use crate::models::{Issue, IssueClass, IssueDetail, Severity};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

static SIGNATURE_PATTERN: OnceLock<Regex> = OnceLock::new();

fn signature_pattern() -> &'static Regex {
    SIGNATURE_PATTERN.get_or_init(|| {
        Regex::new(concat!(
            r"^\s*(?:(?:inline|static|virtual|constexpr|explicit|friend|const)\s+)*",
            r"([\w:]+(?:<[^>]*>)?)[\s*&]+",
            r"([\w:~]+)\s*\([^)]*\)\s*",
            r"(?:(?:const|noexcept|override|final)\s*)*\{",
        ))
        .unwrap()
    })
}

/// Words that look like a name or return type but never start a function
const CONTROL_KEYWORDS: &[&str] = &[
    "if", "for", "while", "switch", "catch", "else", "return", "do", "new", "delete", "case",
    "throw", "sizeof",
];

#[derive(Debug)]
enum ScanState {
    Idle,
    InFunction {
        name: String,
        start_line: u32,
        depth: i32,
    },
}

pub struct LongFunctionsDetector {
    threshold: u32,
}

impl LongFunctionsDetector {
    pub fn new(threshold: u32) -> Self {
        Self { threshold }
    }

    fn finish(&self, file: &SourceFile, name: String, start_line: u32, end_line: u32) -> Option<Issue> {
        let length = end_line - start_line;
        if length <= self.threshold {
            return None;
        }
        Some(Issue {
            id: String::new(),
            file: file.path.clone(),
            line: start_line,
            severity: severity_for(length, self.threshold),
            detail: IssueDetail::LongFunction {
                name,
                start_line,
                end_line,
                length,
            },
        })
    }
}

/// Name of the function a line opens, if any
fn opened_function(code: &str) -> Option<String> {
    let caps = signature_pattern().captures(code)?;
    let return_type = caps.get(1)?.as_str();
    let name = caps.get(2)?.as_str();
    if CONTROL_KEYWORDS.contains(&return_type) || CONTROL_KEYWORDS.contains(&name) {
        return None;
    }
    Some(name.to_string())
}

impl Detector for LongFunctionsDetector {
    fn name(&self) -> &'static str {
        "long-functions"
    }

    fn description(&self) -> &'static str {
        "Detects functions longer than the configured line limit"
    }

    fn class(&self) -> IssueClass {
        IssueClass::LongFunctions
    }

    fn detect(&self, file: &SourceFile) -> Result<Vec<Issue>> {
        let mut issues = vec![];
        let mut state = ScanState::Idle;

        for (idx, masked) in file.masked.iter().enumerate() {
            let line_no = (idx + 1) as u32;
            let delta = masked.brace_delta();

            state = match state {
                ScanState::Idle => match opened_function(&masked.code) {
                    Some(name) if delta > 0 => ScanState::InFunction {
                        name,
                        start_line: line_no,
                        depth: delta,
                    },
                    _ => ScanState::Idle,
                },
                ScanState::InFunction {
                    name,
                    start_line,
                    depth,
                } => {
                    let depth = depth + delta;
                    if depth <= 0 {
                        issues.extend(self.finish(file, name, start_line, line_no));
                        ScanState::Idle
                    } else {
                        ScanState::InFunction {
                            name,
                            start_line,
                            depth,
                        }
                    }
                }
            };
        }

        if let ScanState::InFunction { name, start_line, .. } = state {
            debug!(
                "{}: function '{}' opened at line {} never closes",
                file.path.display(),
                name,
                start_line
            );
        }

        Ok(issues)
    }
}

/// High above twice the threshold
fn severity_for(length: u32, threshold: u32) -> Severity {
    if length > threshold.saturating_mul(2) {
        Severity::High
    } else {
        Severity::Medium
    }
}
