//! Prompt builder for semantic grouping of magic numbers

use crate::models::{Issue, IssueDetail};
use serde::Serialize;
use std::path::PathBuf;

/// One magic number as shown to the Advisor
#[derive(Debug, Clone, Serialize)]
pub struct SampleEntry {
    pub value: serde_json::Number,
    pub file: PathBuf,
    pub line: u32,
    pub context: String,
}

const GROUPING_INSTRUCTIONS: &str = r#"Requirements:
1. Group by logical category (items, combat, ai, map, ui, etc.)
2. Create subcategories as needed (potions, weapons, detection, generation, etc.)
3. Use snake_case for all keys
4. Suggest descriptive names based on usage context
5. Return ONLY valid JSON with this structure:

{
  "category": {
    "subcategory": {
      "descriptive_name": {
        "value": <number>,
        "type": "int|float",
        "cpp_name": "member_name"
      }
    }
  }
}

Example:
{"items": {"potions": {"health_potion_heal": {"value": 25, "type": "int", "cpp_name": "health_potion_heal"}}}}

Return ONLY the JSON, no explanation."#;

/// Builds the grouping prompt from a bounded sample of a batch
pub struct GroupingPromptBuilder {
    sample_size: usize,
    context_chars: usize,
}

impl GroupingPromptBuilder {
    pub fn new(sample_size: usize, context_chars: usize) -> Self {
        Self {
            sample_size,
            context_chars,
        }
    }

    /// The first `sample_size` magic numbers, contexts truncated
    pub fn sample(&self, issues: &[Issue]) -> Vec<SampleEntry> {
        issues
            .iter()
            .filter_map(|issue| match &issue.detail {
                IssueDetail::MagicNumber { value, context, .. } => Some(SampleEntry {
                    value: value.clone(),
                    file: issue.file.clone(),
                    line: issue.line,
                    context: context.chars().take(self.context_chars).collect(),
                }),
                _ => None,
            })
            .take(self.sample_size)
            .collect()
    }

    pub fn build(&self, issues: &[Issue]) -> String {
        let sample = self.sample(issues);
        let listing = serde_json::to_string_pretty(&sample).unwrap_or_else(|_| "[]".to_string());
        format!(
            "Analyze these magic numbers from C++ code and organize them into a hierarchical JSON structure.\n\n\
             Magic numbers found:\n{}\n\n{}",
            listing, GROUPING_INSTRUCTIONS
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn magic(n: usize, context: &str) -> Issue {
        Issue {
            id: format!("MAGIC_{:04}", n),
            file: "src/combat.cpp".into(),
            line: n as u32,
            severity: Severity::Medium,
            detail: IssueDetail::MagicNumber {
                value: (n as i64 * 7).into(),
                value_str: (n * 7).to_string(),
                column: 4,
                context: context.to_string(),
            },
        }
    }

    #[test]
    fn test_sample_is_bounded_and_truncated() {
        let long = "x".repeat(500);
        let issues: Vec<Issue> = (1..=30).map(|n| magic(n, &long)).collect();
        let sample = GroupingPromptBuilder::new(20, 200).sample(&issues);
        assert_eq!(sample.len(), 20);
        assert!(sample.iter().all(|s| s.context.chars().count() == 200));
        assert_eq!(sample[0].line, 1);
    }

    #[test]
    fn test_prompt_lists_values_and_schema() {
        let prompt = GroupingPromptBuilder::new(20, 200).build(&[magic(3, "dmg = 21;")]);
        assert!(prompt.contains("\"value\": 21"));
        assert!(prompt.contains("\"context\": \"dmg = 21;\""));
        assert!(prompt.contains("cpp_name"));
        assert!(prompt.ends_with("Return ONLY the JSON, no explanation."));
    }
}
