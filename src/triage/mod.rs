//! Issue prioritization and batching
//!
//! Flattens a [`HealthReport`], orders issues by (class priority, severity)
//! and cuts the ordered list into class-homogeneous batches no larger than
//! the configured batch size.

use crate::config::PipelineConfig;
use crate::models::{HealthReport, Issue, IssueClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::debug;

/// Minutes of Advisor time added to every batch
const ADVISOR_OVERHEAD_MINUTES: f64 = 1.0;
/// Minutes of build+test time added to every batch
const VALIDATION_OVERHEAD_MINUTES: f64 = 3.0;

/// A class-homogeneous group of issues fixed together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageBatch {
    pub batch_id: String,
    #[serde(rename = "type")]
    pub class: IssueClass,
    pub priority: u32,
    pub issue_count: usize,
    pub issues: Vec<Issue>,
    pub estimated_time: String,
}

/// Ordered batches derived from one health report
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriageQueue {
    pub timestamp: String,
    pub total_issues: usize,
    pub batches: Vec<TriageBatch>,
    /// Fingerprints carried over from the health report
    #[serde(default)]
    pub fingerprints: BTreeMap<PathBuf, String>,
}

impl TriageQueue {
    /// First batch of `class`, in queue order
    pub fn first_of(&self, class: IssueClass) -> Option<&TriageBatch> {
        self.batches.iter().find(|b| b.class == class)
    }
}

/// Priority weights and batch size used to build a queue
#[derive(Debug, Clone)]
pub struct TriagePolicy {
    pub priorities: BTreeMap<IssueClass, u32>,
    pub batch_size: usize,
}

impl TriagePolicy {
    /// Policy from configuration, with an optional batch-size override
    pub fn from_config(config: &PipelineConfig, batch_size: Option<usize>) -> Self {
        Self {
            priorities: IssueClass::ALL
                .into_iter()
                .map(|c| (c, config.priority(c)))
                .collect(),
            batch_size: batch_size.unwrap_or(config.limits.batch_size).max(1),
        }
    }

    pub fn priority(&self, class: IssueClass) -> u32 {
        self.priorities.get(&class).copied().unwrap_or(50)
    }
}

/// Per-issue fix time in minutes
fn minutes_per_issue(class: IssueClass) -> f64 {
    match class {
        IssueClass::MagicNumbers => 0.5,
        IssueClass::StringLiterals => 0.3,
        IssueClass::LongFunctions => 2.0,
        IssueClass::Duplicates => 3.0,
    }
}

/// Advisory estimate for fixing `count` issues of `class`
pub fn estimate_time(class: IssueClass, count: usize) -> String {
    let total = minutes_per_issue(class) * count as f64
        + ADVISOR_OVERHEAD_MINUTES
        + VALIDATION_OVERHEAD_MINUTES;
    if total < 1.0 {
        format!("{} seconds", (total * 60.0).trunc() as u64)
    } else {
        format!("{} minutes", total.trunc() as u64)
    }
}

/// Build the triage queue for a health report.
///
/// Every input issue ends up in exactly one batch.
pub fn triage(report: &HealthReport, policy: &TriagePolicy) -> TriageQueue {
    let mut tagged: Vec<(IssueClass, u32, &Issue)> = report
        .issues
        .iter()
        .flat_map(|(class, issues)| {
            let priority = policy.priority(*class);
            issues.iter().map(move |issue| (*class, priority, issue))
        })
        .collect();

    // Vec::sort_by is stable: ties keep class order, then scan order
    tagged.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| b.2.severity.rank().cmp(&a.2.severity.rank()))
    });

    let batch_size = policy.batch_size.max(1);
    let mut batches: Vec<TriageBatch> = Vec::new();
    let mut current: Vec<Issue> = Vec::new();
    let mut current_class: Option<(IssueClass, u32)> = None;

    for (class, priority, issue) in tagged {
        let starts_new = match current_class {
            Some((c, _)) => c != class || current.len() >= batch_size,
            None => false,
        };
        if starts_new {
            if let Some((c, p)) = current_class {
                batches.push(make_batch(batches.len() + 1, c, p, std::mem::take(&mut current)));
            }
        }
        current_class = Some((class, priority));
        current.push(issue.clone());
    }
    if let Some((c, p)) = current_class {
        if !current.is_empty() {
            batches.push(make_batch(batches.len() + 1, c, p, current));
        }
    }

    debug!("Triage produced {} batches", batches.len());

    TriageQueue {
        timestamp: chrono::Local::now().to_rfc3339(),
        total_issues: report.total_issues(),
        batches,
        fingerprints: report.fingerprints.clone(),
    }
}

fn make_batch(seq: usize, class: IssueClass, priority: u32, issues: Vec<Issue>) -> TriageBatch {
    let count = issues.len();
    TriageBatch {
        batch_id: format!(
            "BATCH_{:03}_{}_{:03}",
            seq,
            class.as_str().to_uppercase(),
            count
        ),
        class,
        priority,
        issue_count: count,
        issues,
        estimated_time: estimate_time(class, count),
    }
}
