use std::collections::{BTreeMap, BTreeSet};

use proptest::prelude::*;

use codemend::models::{HealthReport, Issue, IssueClass, IssueDetail, Severity, StringCategory};
use codemend::scanner::lexer::LineLexer;
use codemend::triage::{triage, TriagePolicy};

fn severity_of(n: u8) -> Severity {
    match n % 3 {
        0 => Severity::Low,
        1 => Severity::Medium,
        _ => Severity::High,
    }
}

fn issue(class: IssueClass, n: usize, severity: Severity) -> Issue {
    let detail = match class {
        IssueClass::MagicNumbers => IssueDetail::MagicNumber {
            value: (n as i64 + 11).into(),
            value_str: (n + 11).to_string(),
            column: 0,
            context: String::new(),
        },
        IssueClass::StringLiterals => IssueDetail::StringLiteral {
            value: format!("s{}", n),
            context: String::new(),
            category: StringCategory::Other,
        },
        IssueClass::LongFunctions => IssueDetail::LongFunction {
            name: format!("f{}", n),
            start_line: 1,
            end_line: 80,
            length: 79,
        },
        IssueClass::Duplicates => IssueDetail::Duplicate {
            duplicate_of: "b.cpp".into(),
            duplicate_line: 1,
            length: 10,
        },
    };
    Issue {
        id: format!("{}_{:04}", class.id_prefix(), n),
        file: "a.cpp".into(),
        line: n as u32 + 1,
        severity,
        detail,
    }
}

/// A report with up to 30 issues per class, random severities
fn arb_report() -> impl Strategy<Value = HealthReport> {
    prop::collection::vec(prop::collection::vec(any::<u8>(), 0..30), 4).prop_map(|per_class| {
        let issues: BTreeMap<IssueClass, Vec<Issue>> = IssueClass::ALL
            .into_iter()
            .zip(per_class)
            .map(|(class, severities)| {
                let list = severities
                    .into_iter()
                    .enumerate()
                    .map(|(n, s)| issue(class, n, severity_of(s)))
                    .collect();
                (class, list)
            })
            .collect();
        HealthReport::new(1, issues, BTreeMap::new())
    })
}

fn arb_policy() -> impl Strategy<Value = TriagePolicy> {
    (prop::collection::vec(0u32..100, 4), 1usize..15).prop_map(|(weights, batch_size)| TriagePolicy {
        priorities: IssueClass::ALL.into_iter().zip(weights).collect(),
        batch_size,
    })
}

proptest! {
    #[test]
    fn every_issue_lands_in_exactly_one_batch(report in arb_report(), policy in arb_policy()) {
        let queue = triage(&report, &policy);
        let ids: Vec<&str> = queue.batches.iter().flat_map(|b| b.issues.iter().map(|i| i.id.as_str())).collect();
        let unique: BTreeSet<&str> = ids.iter().copied().collect();
        prop_assert_eq!(ids.len(), report.total_issues());
        prop_assert_eq!(unique.len(), ids.len());
        prop_assert_eq!(queue.total_issues, report.total_issues());
    }

    #[test]
    fn batches_are_homogeneous_and_bounded(report in arb_report(), policy in arb_policy()) {
        let queue = triage(&report, &policy);
        for batch in &queue.batches {
            prop_assert!(!batch.issues.is_empty());
            prop_assert!(batch.issues.len() <= policy.batch_size);
            prop_assert_eq!(batch.issue_count, batch.issues.len());
            prop_assert!(batch.issues.iter().all(|i| i.class() == batch.class));
        }
        let ids: BTreeSet<&str> = queue.batches.iter().map(|b| b.batch_id.as_str()).collect();
        prop_assert_eq!(ids.len(), queue.batches.len());
    }

    #[test]
    fn flattened_queue_is_ordered(report in arb_report(), policy in arb_policy()) {
        let queue = triage(&report, &policy);
        let keys: Vec<(u32, u8)> = queue
            .batches
            .iter()
            .flat_map(|b| b.issues.iter().map(move |i| (b.priority, i.severity.rank())))
            .collect();
        for pair in keys.windows(2) {
            prop_assert!(pair[0] >= pair[1], "{:?} before {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn lexer_preserves_line_length(lines in prop::collection::vec("[ -~]{0,60}", 0..20)) {
        let mut lexer = LineLexer::new();
        for line in &lines {
            let masked = lexer.mask_line(line);
            prop_assert_eq!(masked.code.len(), line.len());
        }
    }
}
