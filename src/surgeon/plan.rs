//! Source modification plan
//!
//! A plan lists, per file, which literal occurrences are replaced by which
//! accessor expression and whether the config include must be added. Plans
//! are built from the batch and the tree alone; applying one is a pure
//! text-to-text function so it can be checked without touching disk.

use super::grouping::ConfigTree;
use crate::models::{Issue, IssueDetail};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replacement {
    pub issue_id: String,
    pub line: u32,
    /// Byte offset of the literal within its line
    pub column: usize,
    pub original: String,
    pub replacement: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilePlan {
    /// Path relative to the source root
    pub path: PathBuf,
    pub needs_include: bool,
    pub replacements: Vec<Replacement>,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PlanError {
    #[error("line {line} does not exist")]
    MissingLine { line: u32 },

    #[error("expected `{expected}` at line {line}, column {column}")]
    LiteralMismatch {
        line: u32,
        column: usize,
        expected: String,
    },
}

/// Group replacements per file. Issues whose value the tree does not hold
/// are left out.
pub fn build_replacements(
    issues: &[Issue],
    tree: &ConfigTree,
    accessor_root: &str,
) -> BTreeMap<PathBuf, Vec<Replacement>> {
    let mut per_file: BTreeMap<PathBuf, Vec<Replacement>> = BTreeMap::new();
    for issue in issues {
        let IssueDetail::MagicNumber {
            value,
            value_str,
            column,
            ..
        } = &issue.detail
        else {
            continue;
        };
        let Some(triple) = tree.lookup_by_value(value) else {
            continue;
        };
        per_file.entry(issue.file.clone()).or_default().push(Replacement {
            issue_id: issue.id.clone(),
            line: issue.line,
            column: *column,
            original: value_str.clone(),
            replacement: format!("{}.{}.{}", accessor_root, triple.category, triple.entry.cpp_name),
        });
    }
    per_file
}

/// True when `content` already carries the include directive
pub fn has_include(content: &str, directive: &str) -> bool {
    content.lines().any(|l| l.trim() == directive.trim())
}

/// Apply a file plan to its current content.
///
/// Replacements go bottom-to-top so earlier offsets stay valid. Every
/// literal is verified in place first; any mismatch rejects the whole file.
pub fn apply_plan(content: &str, plan: &FilePlan, directive: &str) -> Result<String, PlanError> {
    let mut lines: Vec<String> = content.split_inclusive('\n').map(str::to_string).collect();

    let mut ordered: Vec<&Replacement> = plan.replacements.iter().collect();
    ordered.sort_by(|a, b| b.line.cmp(&a.line).then(b.column.cmp(&a.column)));

    for rep in ordered {
        let idx = (rep.line as usize)
            .checked_sub(1)
            .ok_or(PlanError::MissingLine { line: rep.line })?;
        let line = lines.get_mut(idx).ok_or(PlanError::MissingLine { line: rep.line })?;
        let end = rep.column + rep.original.len();
        if line.get(rep.column..end) != Some(rep.original.as_str()) {
            return Err(PlanError::LiteralMismatch {
                line: rep.line,
                column: rep.column,
                expected: rep.original.clone(),
            });
        }
        line.replace_range(rep.column..end, &rep.replacement);
    }

    if plan.needs_include {
        insert_include(&mut lines, directive, content);
    }

    Ok(lines.concat())
}

/// Insert after the first `#include`, else after `#pragma once`, else at the top
fn insert_include(lines: &mut Vec<String>, directive: &str, content: &str) {
    let eol = if content.contains("\r\n") { "\r\n" } else { "\n" };
    let anchor = lines
        .iter()
        .position(|l| l.trim_start().starts_with("#include"))
        .or_else(|| lines.iter().position(|l| l.trim() == "#pragma once"));

    let at = match anchor {
        Some(i) => {
            if !lines[i].ends_with('\n') {
                lines[i].push_str(eol);
            }
            i + 1
        }
        None => 0,
    };
    lines.insert(at, format!("{}{}", directive, eol));
}
