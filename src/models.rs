//! Core data models for codemend
//!
//! These models flow between the pipeline stages and are persisted as JSON
//! between runs, so their serialized field names are stable contracts.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Severity levels for issues
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Rank used by triage ordering (high=3, medium=2, low=1)
    pub fn rank(&self) -> u8 {
        match self {
            Severity::High => 3,
            Severity::Medium => 2,
            Severity::Low => 1,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
        }
    }
}

/// The four issue classes the pipeline knows about.
///
/// Declaration order is the order classes appear in persisted reports.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum IssueClass {
    MagicNumbers,
    StringLiterals,
    LongFunctions,
    Duplicates,
}

impl IssueClass {
    pub const ALL: [IssueClass; 4] = [
        IssueClass::MagicNumbers,
        IssueClass::StringLiterals,
        IssueClass::LongFunctions,
        IssueClass::Duplicates,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueClass::MagicNumbers => "magic_numbers",
            IssueClass::StringLiterals => "string_literals",
            IssueClass::LongFunctions => "long_functions",
            IssueClass::Duplicates => "duplicates",
        }
    }

    /// Prefix for issue ids (`MAGIC_0001`, ...)
    pub fn id_prefix(&self) -> &'static str {
        match self {
            IssueClass::MagicNumbers => "MAGIC",
            IssueClass::StringLiterals => "STRING",
            IssueClass::LongFunctions => "LONGFUNC",
            IssueClass::Duplicates => "DUP",
        }
    }

    /// Human-readable label for reports
    pub fn label(&self) -> &'static str {
        match self {
            IssueClass::MagicNumbers => "Magic numbers",
            IssueClass::StringLiterals => "String literals",
            IssueClass::LongFunctions => "Long functions",
            IssueClass::Duplicates => "Duplicates",
        }
    }
}

impl std::fmt::Display for IssueClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueClass {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "magic_numbers" | "magic" | "numbers" => Ok(IssueClass::MagicNumbers),
            "string_literals" | "strings" => Ok(IssueClass::StringLiterals),
            "long_functions" | "functions" => Ok(IssueClass::LongFunctions),
            "duplicates" => Ok(IssueClass::Duplicates),
            _ => Err(anyhow::anyhow!(
                "Unknown issue class '{}'. Valid classes: magic_numbers, string_literals, long_functions, duplicates",
                s
            )),
        }
    }
}

/// Heuristic category of a string literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StringCategory {
    JsonKey,
    LogMessage,
    ItemName,
    Other,
}

/// Class-specific payload of an issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueDetail {
    MagicNumber {
        value: serde_json::Number,
        /// Literal as written in the source, including sign and suffix
        value_str: String,
        /// Byte offset of the literal within its line
        column: usize,
        context: String,
    },
    StringLiteral {
        value: String,
        context: String,
        category: StringCategory,
    },
    LongFunction {
        name: String,
        start_line: u32,
        end_line: u32,
        length: u32,
    },
    /// Reserved: no detector produces this variant.
    Duplicate {
        duplicate_of: PathBuf,
        duplicate_line: u32,
        length: u32,
    },
}

/// A single code-health issue found by the scanner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    /// Path relative to the scanned source root
    pub file: PathBuf,
    pub line: u32,
    pub severity: Severity,
    #[serde(flatten)]
    pub detail: IssueDetail,
}

impl Issue {
    pub fn class(&self) -> IssueClass {
        match self.detail {
            IssueDetail::MagicNumber { .. } => IssueClass::MagicNumbers,
            IssueDetail::StringLiteral { .. } => IssueClass::StringLiterals,
            IssueDetail::LongFunction { .. } => IssueClass::LongFunctions,
            IssueDetail::Duplicate { .. } => IssueClass::Duplicates,
        }
    }

    /// Numeric value for magic-number issues
    pub fn numeric_value(&self) -> Option<f64> {
        match &self.detail {
            IssueDetail::MagicNumber { value, .. } => value.as_f64(),
            _ => None,
        }
    }
}

/// Result of one scan over the source tree. Never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub timestamp: String,
    pub files_scanned: usize,
    pub issues: BTreeMap<IssueClass, Vec<Issue>>,
    pub summary: BTreeMap<IssueClass, usize>,
    /// SHA-256 of every scanned file, keyed by path relative to the source root
    #[serde(default)]
    pub fingerprints: BTreeMap<PathBuf, String>,
}

impl HealthReport {
    /// Build a report, deriving the summary from the issue lists.
    ///
    /// Every class is present in both maps even when it has no issues.
    pub fn new(
        files_scanned: usize,
        mut issues: BTreeMap<IssueClass, Vec<Issue>>,
        fingerprints: BTreeMap<PathBuf, String>,
    ) -> Self {
        for class in IssueClass::ALL {
            issues.entry(class).or_default();
        }
        let summary = issues.iter().map(|(c, v)| (*c, v.len())).collect();
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            files_scanned,
            issues,
            summary,
            fingerprints,
        }
    }

    pub fn total_issues(&self) -> usize {
        self.issues.values().map(Vec::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn magic(id: &str, value: i64) -> Issue {
        Issue {
            id: id.into(),
            file: "src/player.cpp".into(),
            line: 12,
            severity: Severity::Medium,
            detail: IssueDetail::MagicNumber {
                value: value.into(),
                value_str: value.to_string(),
                column: 17,
                context: "int max_hp = 150;".into(),
            },
        }
    }

    #[test]
    fn test_issue_json_shape() {
        let json = serde_json::to_value(magic("MAGIC_0001", 150)).unwrap();
        assert_eq!(json["id"], "MAGIC_0001");
        assert_eq!(json["kind"], "magic_number");
        assert_eq!(json["value"], 150);
        assert_eq!(json["severity"], "medium");
        assert_eq!(json["file"], "src/player.cpp");

        let back: Issue = serde_json::from_value(json).unwrap();
        assert_eq!(back.class(), IssueClass::MagicNumbers);
        assert_eq!(back.numeric_value(), Some(150.0));
    }

    #[test]
    fn test_health_report_has_every_class() {
        let mut issues = BTreeMap::new();
        issues.insert(IssueClass::MagicNumbers, vec![magic("MAGIC_0001", 150)]);
        let report = HealthReport::new(1, issues, BTreeMap::new());

        assert_eq!(report.summary.len(), 4);
        assert_eq!(report.summary[&IssueClass::MagicNumbers], 1);
        assert_eq!(report.summary[&IssueClass::Duplicates], 0);
        assert_eq!(report.total_issues(), 1);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json["issues"]["string_literals"].as_array().unwrap().is_empty());
        assert_eq!(json["summary"]["magic_numbers"], 1);
    }

    #[test]
    fn test_issue_class_parsing() {
        assert_eq!("magic_numbers".parse::<IssueClass>().unwrap(), IssueClass::MagicNumbers);
        assert_eq!("strings".parse::<IssueClass>().unwrap(), IssueClass::StringLiterals);
        assert_eq!("long-functions".parse::<IssueClass>().unwrap(), IssueClass::LongFunctions);
        assert!("everything".parse::<IssueClass>().is_err());
    }

    #[test]
    fn test_severity_rank_order() {
        assert!(Severity::High.rank() > Severity::Medium.rank());
        assert!(Severity::Medium.rank() > Severity::Low.rank());
    }
}
