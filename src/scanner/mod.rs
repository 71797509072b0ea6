//! Source tree scanner
//!
//! Walks the configured source root, lexes every eligible file once and runs
//! the registered detectors over it. The result is an immutable
//! [`HealthReport`] with ids numbered per class in scan order.

pub mod base;
pub mod lexer;
mod long_functions;
mod magic_numbers;
mod string_literals;

pub use base::{default_detectors, Detector, DetectorResult, SourceFile};
pub use long_functions::LongFunctionsDetector;
pub use magic_numbers::MagicNumbersDetector;
pub use string_literals::StringLiteralsDetector;

use crate::config::PipelineConfig;
use crate::models::{HealthReport, Issue, IssueClass};
use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub struct Scanner {
    source_root: PathBuf,
    extensions: Vec<String>,
    exclude_patterns: Vec<String>,
    detectors: Vec<Box<dyn Detector>>,
}

impl Scanner {
    pub fn new(config: &PipelineConfig) -> Self {
        Self::with_detectors(config, default_detectors(config))
    }

    pub fn with_detectors(config: &PipelineConfig, detectors: Vec<Box<dyn Detector>>) -> Self {
        Self {
            source_root: config.source_root(),
            extensions: config.limits.extensions.clone(),
            exclude_patterns: config.limits.exclude_patterns.clone(),
            detectors,
        }
    }

    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    /// Test files are matched on the `/`-prefixed relative path
    pub fn is_excluded(&self, relative: &Path) -> bool {
        let normalized = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
        self.exclude_patterns
            .iter()
            .any(|pattern| normalized.contains(pattern.as_str()))
    }

    fn has_eligible_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .is_some_and(|ext| self.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }

    /// Eligible files as (absolute, relative) pairs, sorted by relative path
    pub fn source_files(&self) -> Vec<(PathBuf, PathBuf)> {
        let walker = ignore::WalkBuilder::new(&self.source_root)
            .hidden(false)
            .git_ignore(true)
            .build();

        let mut files: Vec<(PathBuf, PathBuf)> = walker
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_some_and(|t| t.is_file()))
            .filter_map(|e| {
                let path = e.into_path();
                let relative = path.strip_prefix(&self.source_root).ok()?.to_path_buf();
                Some((path, relative))
            })
            .filter(|(path, relative)| self.has_eligible_extension(path) && !self.is_excluded(relative))
            .collect();

        files.sort_by(|a, b| a.1.cmp(&b.1));
        files
    }

    /// Scan the whole source tree
    pub fn scan(&self) -> Result<HealthReport> {
        if !self.source_root.is_dir() {
            bail!("Source root {} is not a directory", self.source_root.display());
        }

        let files = self.source_files();
        info!("Scanning {} files under {}", files.len(), self.source_root.display());

        let mut issues: BTreeMap<IssueClass, Vec<Issue>> = BTreeMap::new();
        let mut fingerprints = BTreeMap::new();
        let mut files_scanned = 0;

        for (path, relative) in files {
            let bytes = match std::fs::read(&path) {
                Ok(b) => b,
                Err(e) => {
                    warn!("Skipping unreadable file {}: {}", path.display(), e);
                    continue;
                }
            };
            fingerprints.insert(relative.clone(), format!("{:x}", Sha256::digest(&bytes)));
            files_scanned += 1;

            let source = SourceFile::parse(relative, &String::from_utf8_lossy(&bytes));
            for detector in &self.detectors {
                let result = detector.run(&source);
                if !result.success {
                    warn!(
                        "Detector {} failed on {}: {}",
                        result.detector_name,
                        source.path.display(),
                        result.error.unwrap_or_default()
                    );
                    continue;
                }
                debug!(
                    "{}: {} issues from {}",
                    source.path.display(),
                    result.issues.len(),
                    result.detector_name
                );
                issues.entry(detector.class()).or_default().extend(result.issues);
            }
        }

        assign_ids(&mut issues);
        let report = HealthReport::new(files_scanned, issues, fingerprints);
        info!("Scan found {} issues in {} files", report.total_issues(), files_scanned);
        Ok(report)
    }
}

/// Number issues per class in scan order (`MAGIC_0001`, ...)
fn assign_ids(issues: &mut BTreeMap<IssueClass, Vec<Issue>>) {
    for (class, list) in issues.iter_mut() {
        for (i, issue) in list.iter_mut().enumerate() {
            issue.id = format!("{}_{:04}", class.id_prefix(), i + 1);
        }
    }
}
