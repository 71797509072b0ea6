//! String Literals Detector
//!
//! Reports hardcoded string literals and guesses what they are used for.

use super::base::{Detector, SourceFile};
use super::lexer::{MaskedLine, StringToken};
use crate::models::{Issue, IssueClass, IssueDetail, Severity, StringCategory};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

static LOG_CALL_PATTERN: OnceLock<Regex> = OnceLock::new();

fn log_call_pattern() -> &'static Regex {
    LOG_CALL_PATTERN.get_or_init(|| {
        Regex::new(
            r"(?:\b(?:[Ll]og\w*|LOG\w*|print\w*|puts)\s*\(|\b(?:cout|cerr|clog)\b|\.(?:info|warn|warning|error|debug|trace)\s*\()",
        )
        .unwrap()
    })
}

pub struct StringLiteralsDetector;

impl StringLiteralsDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Default for StringLiteralsDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl Detector for StringLiteralsDetector {
    fn name(&self) -> &'static str {
        "string-literals"
    }

    fn description(&self) -> &'static str {
        "Detects hardcoded string literals"
    }

    fn class(&self) -> IssueClass {
        IssueClass::StringLiterals
    }

    fn detect(&self, file: &SourceFile) -> Result<Vec<Issue>> {
        let mut issues = vec![];

        for (idx, masked) in file.masked.iter().enumerate() {
            if masked.code.trim_start().starts_with("#include") {
                continue;
            }

            for token in &masked.strings {
                if token.text.chars().count() < 2 {
                    continue;
                }
                let category = categorize(&file.lines[idx], masked, token);
                issues.push(Issue {
                    id: String::new(),
                    file: file.path.clone(),
                    line: (idx + 1) as u32,
                    severity: match category {
                        StringCategory::JsonKey | StringCategory::ItemName => Severity::Medium,
                        StringCategory::LogMessage | StringCategory::Other => Severity::Low,
                    },
                    detail: IssueDetail::StringLiteral {
                        value: token.text.clone(),
                        context: file.context(idx),
                        category,
                    },
                });
            }
        }

        Ok(issues)
    }
}

/// First matching rule wins: subscript key, logging call, item name, other
fn categorize(line: &str, masked: &MaskedLine, token: &StringToken) -> StringCategory {
    let before = masked.code[..token.start].trim_end();
    let after = masked.code[token.end..].trim_start();
    if before.ends_with('[') && after.starts_with(']') {
        StringCategory::JsonKey
    } else if log_call_pattern().is_match(&masked.code) {
        StringCategory::LogMessage
    } else if line.to_lowercase().contains("name") {
        StringCategory::ItemName
    } else {
        StringCategory::Other
    }
}
