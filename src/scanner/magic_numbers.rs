//! Magic Numbers Detector

use super::base::{Detector, SourceFile};
use crate::models::{Issue, IssueClass, IssueDetail, Severity};
use anyhow::Result;
use regex::Regex;
use std::sync::OnceLock;

static NUMBER_PATTERN: OnceLock<Regex> = OnceLock::new();
static CONSTEXPR_PATTERN: OnceLock<Regex> = OnceLock::new();

fn number_pattern() -> &'static Regex {
    // Decimal literals with optional fraction, exponent and C suffixes.
    // Hex never matches: the leading 0 is not followed by a word boundary.
    NUMBER_PATTERN.get_or_init(|| {
        Regex::new(r"\b\d+(?:\.\d+)?(?:[eE][+-]?\d+)?[fFuUlL]*\b").unwrap()
    })
}

fn constexpr_pattern() -> &'static Regex {
    CONSTEXPR_PATTERN.get_or_init(|| Regex::new(r"\bconstexpr\b").unwrap())
}

/// Characters after which a `-` is a unary minus
const UNARY_CONTEXT: &str = "=(,[{?:+-*/%<>!&|^~;";

pub struct MagicNumbersDetector {
    skip_values: Vec<f64>,
}

impl MagicNumbersDetector {
    pub fn new(skip_values: Vec<f64>) -> Self {
        Self { skip_values }
    }

    fn is_skipped(&self, value: f64) -> bool {
        self.skip_values.iter().any(|s| *s == value)
    }
}

impl Detector for MagicNumbersDetector {
    fn name(&self) -> &'static str {
        "magic-numbers"
    }

    fn description(&self) -> &'static str {
        "Detects unexplained numeric literals"
    }

    fn class(&self) -> IssueClass {
        IssueClass::MagicNumbers
    }

    fn detect(&self, file: &SourceFile) -> Result<Vec<Issue>> {
        let mut issues = vec![];

        for (idx, masked) in file.masked.iter().enumerate() {
            let code = masked.code.as_str();
            if code.trim_start().starts_with('#') || constexpr_pattern().is_match(code) {
                continue;
            }

            for m in number_pattern().find_iter(code) {
                if code[..m.start()].ends_with('.') {
                    continue;
                }
                let negated = is_negated(code, m.start());
                let Some((value, as_f64)) = parse_literal(m.as_str(), negated) else {
                    continue;
                };
                if self.is_skipped(as_f64) {
                    continue;
                }

                let column = if negated { m.start() - 1 } else { m.start() };
                issues.push(Issue {
                    id: String::new(),
                    file: file.path.clone(),
                    line: (idx + 1) as u32,
                    severity: severity_for(as_f64),
                    detail: IssueDetail::MagicNumber {
                        value,
                        value_str: file.lines[idx][column..m.end()].to_string(),
                        column,
                        context: file.context(idx),
                    },
                });
            }
        }

        Ok(issues)
    }
}

/// Severity by magnitude
fn severity_for(value: f64) -> Severity {
    let magnitude = value.abs();
    if magnitude > 1000.0 {
        Severity::High
    } else if magnitude > 10.0 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

/// A `-` directly before the literal, itself after an operator, open bracket,
/// `return` or nothing at all.
fn is_negated(code: &str, start: usize) -> bool {
    let Some(rest) = code[..start].strip_suffix('-') else {
        return false;
    };
    let rest = rest.trim_end();
    match rest.chars().last() {
        None => true,
        Some(c) => UNARY_CONTEXT.contains(c) || rest.ends_with("return"),
    }
}

/// Parse literal text into its JSON number and float value
fn parse_literal(text: &str, negated: bool) -> Option<(serde_json::Number, f64)> {
    let digits = text.trim_end_matches(['f', 'F', 'u', 'U', 'l', 'L']);
    let sign = if negated { -1 } else { 1 };

    if digits.contains(['.', 'e', 'E']) {
        let v = digits.parse::<f64>().ok()? * sign as f64;
        Some((serde_json::Number::from_f64(v)?, v))
    } else {
        let radix = if digits.len() > 1 && digits.starts_with('0') { 8 } else { 10 };
        let v = i64::from_str_radix(digits, radix).ok()? * sign;
        Some((v.into(), v as f64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detect(src: &str) -> Vec<Issue> {
        let detector = MagicNumbersDetector::new(vec![0.0, 1.0, -1.0, 2.0, 10.0, 100.0]);
        detector.detect(&SourceFile::parse("player.cpp", src)).unwrap()
    }

    fn values(issues: &[Issue]) -> Vec<String> {
        issues
            .iter()
            .map(|i| match &i.detail {
                IssueDetail::MagicNumber { value_str, .. } => value_str.clone(),
                _ => unreachable!(),
            })
            .collect()
    }

    #[test]
    fn test_value_150_is_medium() {
        let issues = detect("void f() {\n    int max_hp = 150;\n}\n");
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].line, 2);
        assert_eq!(issues[0].severity, Severity::Medium);
        assert_eq!(issues[0].numeric_value(), Some(150.0));
        match &issues[0].detail {
            IssueDetail::MagicNumber { column, context, .. } => {
                assert_eq!(*column, 17);
                assert!(context.starts_with("void f() {"));
                assert!(context.ends_with('}'));
            }
            _ => panic!("wrong detail"),
        }
    }

    #[test]
    fn test_severity_bands() {
        assert_eq!(severity_for(5000.0), Severity::High);
        assert_eq!(severity_for(-2500.0), Severity::High);
        assert_eq!(severity_for(11.0), Severity::Medium);
        assert_eq!(severity_for(7.0), Severity::Low);
    }

    #[test]
    fn test_skip_list_and_hex() {
        let issues = detect("a = 0; b = 1; c = 100; d = 0xFF; e = 0x10;\n");
        assert!(issues.is_empty());
    }

    #[test]
    fn test_literal_forms() {
        let issues = detect("x = 2.5f; y = 3e5; z = 42u; w = 1.5;\n");
        assert_eq!(values(&issues), vec!["2.5f", "3e5", "42u", "1.5"]);
        assert_eq!(issues[1].numeric_value(), Some(300000.0));
    }

    #[test]
    fn test_unary_minus() {
        let issues = detect("speed = -35; gap = width-20; return -7;\n");
        assert_eq!(values(&issues), vec!["-35", "20", "-7"]);
        assert_eq!(issues[0].numeric_value(), Some(-35.0));
        match &issues[0].detail {
            IssueDetail::MagicNumber { column, .. } => assert_eq!(*column, 8),
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_minus_one_is_skipped() {
        assert!(detect("int idx = -1;\n").is_empty());
    }

    #[test]
    fn test_ignores_comments_strings_and_preprocessor() {
        let src = "#define MAX 500\n\
                   constexpr int LIMIT = 64;\n\
                   log(\"took 250 ms\"); // retry 3 times\n\
                   /* 999\n 888 */ int v = 77;\n";
        let issues = detect(src);
        assert_eq!(values(&issues), vec!["77"]);
        assert_eq!(issues[0].line, 5);
    }

    #[test]
    fn test_identifiers_with_digits_ignored() {
        assert!(detect("vec3 pos; int32_t hp; Player2 p;\n").is_empty());
    }
}
