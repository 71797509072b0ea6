//! Surgeon: externalizes a batch of magic numbers
//!
//! For the selected batch the Surgeon:
//! 1. asks the Advisor for a config tree (falling back to deterministic grouping)
//! 2. derives the JSON data, header and source artifacts from that tree
//! 3. plans per-file literal replacements
//! 4. unless previewing, writes the artifacts and rewrites the sources,
//!    recording a backup of every path before it is mutated
//!
//! The resulting [`SurgeryResult`] is the unit of rollback.

pub mod artifacts;
pub mod grouping;
pub mod plan;

pub use artifacts::Artifacts;
pub use grouping::{fallback_grouping, parse_advisor_tree, ConfigEntry, ConfigTree, GroupingSource};
pub use plan::{apply_plan, FilePlan, Replacement};

use crate::advisor::{Advisor, GroupingPromptBuilder};
use crate::backup::{atomic_write, sha256_hex, BackupStore};
use crate::config::PipelineConfig;
use crate::models::IssueClass;
use crate::triage::{TriageBatch, TriageQueue};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum SurgeryError {
    #[error("Surgery supports only magic_numbers batches, not {0}")]
    UnsupportedKind(IssueClass),

    #[error("Failed to write artifact {path}: {source}")]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A file the Surgeon could not modify
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub reason: String,
}

/// Backup of one modified source file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileBackup {
    pub path: PathBuf,
    pub backup_path: PathBuf,
    pub original_sha256: String,
    /// Hash of the content the Surgeon wrote; empty in results from older runs
    #[serde(default)]
    pub applied_sha256: String,
}

/// A generated artifact and the backup of what it replaced, if anything
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactBackup {
    pub path: PathBuf,
    pub backup_path: Option<PathBuf>,
}

/// Everything needed to undo a surgery
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackInfo {
    pub backup_dir: PathBuf,
    pub files: Vec<FileBackup>,
    pub artifacts: Vec<ArtifactBackup>,
}

impl RollbackInfo {
    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.artifacts.is_empty()
    }
}

/// Artifacts, tree and plan of one processed batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchArtifacts {
    pub config_path: PathBuf,
    pub declaration_path: PathBuf,
    pub initializer_path: PathBuf,
    pub grouping_source: GroupingSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub advisor_error: Option<String>,
    pub config_structure: ConfigTree,
    pub plan: Vec<FilePlan>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub batch_id: String,
    #[serde(rename = "type")]
    pub class: IssueClass,
    pub issues_fixed: usize,
    pub result: BatchArtifacts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SurgeryResult {
    pub timestamp: String,
    pub preview: bool,
    pub batches_processed: Vec<BatchOutcome>,
    pub config_generated: bool,
    /// Paths relative to the source root
    pub files_modified: Vec<PathBuf>,
    pub failed_files: Vec<FailedFile>,
    pub rollback_info: RollbackInfo,
    /// Set once the changes have been reverted
    #[serde(default)]
    pub rolled_back: bool,
}

impl SurgeryResult {
    fn empty(preview: bool) -> Self {
        Self {
            timestamp: chrono::Local::now().to_rfc3339(),
            preview,
            batches_processed: Vec::new(),
            config_generated: false,
            files_modified: Vec::new(),
            failed_files: Vec::new(),
            rollback_info: RollbackInfo::default(),
            rolled_back: false,
        }
    }

    pub fn issues_fixed(&self) -> usize {
        self.batches_processed.iter().map(|b| b.issues_fixed).sum()
    }

    /// True when the tree was changed, not yet reverted, and there is something to validate
    pub fn has_changes(&self) -> bool {
        !self.preview && !self.rolled_back && !self.rollback_info.is_empty()
    }
}

pub struct Surgeon<'a> {
    config: &'a PipelineConfig,
    advisor: Option<&'a dyn Advisor>,
}

impl<'a> Surgeon<'a> {
    /// `advisor: None` always uses the fallback grouping
    pub fn new(config: &'a PipelineConfig, advisor: Option<&'a dyn Advisor>) -> Self {
        Self { config, advisor }
    }

    /// First magic-number batch of the queue
    pub fn select_batch<'q>(
        queue: &'q TriageQueue,
        kind: Option<IssueClass>,
    ) -> Result<Option<&'q TriageBatch>, SurgeryError> {
        match kind {
            Some(class) if class != IssueClass::MagicNumbers => Err(SurgeryError::UnsupportedKind(class)),
            _ => Ok(queue.first_of(IssueClass::MagicNumbers)),
        }
    }

    pub fn operate(
        &self,
        queue: &TriageQueue,
        kind: Option<IssueClass>,
        preview: bool,
    ) -> Result<SurgeryResult, SurgeryError> {
        let mut result = SurgeryResult::empty(preview);
        let Some(batch) = Self::select_batch(queue, kind)? else {
            info!("No magic-number batch in the triage queue");
            return Ok(result);
        };
        info!("Operating on {} ({} issues)", batch.batch_id, batch.issue_count);

        let (tree, grouping_source, advisor_error) = self.group(batch);
        let settings = &self.config.refactoring;
        let artifacts = Artifacts::generate(&tree, settings);
        let source_root = self.config.source_root();

        let replacements = plan::build_replacements(&batch.issues, &tree, &settings.accessor_root);
        let mut plans = Vec::new();
        for (relative, reps) in replacements {
            let needs_include = match std::fs::read(source_root.join(&relative)) {
                Ok(bytes) => !plan::has_include(&String::from_utf8_lossy(&bytes), &settings.include_directive),
                Err(e) => {
                    result.failed_files.push(FailedFile {
                        path: relative,
                        reason: format!("unreadable: {}", e),
                    });
                    continue;
                }
            };
            plans.push(FilePlan {
                path: relative,
                needs_include,
                replacements: reps,
            });
        }

        let mut outcome = BatchOutcome {
            batch_id: batch.batch_id.clone(),
            class: batch.class,
            issues_fixed: 0,
            result: BatchArtifacts {
                config_path: settings.data_file.clone(),
                declaration_path: settings.declaration_file.clone(),
                initializer_path: settings.initializer_file.clone(),
                grouping_source,
                advisor_error,
                config_structure: tree,
                plan: plans,
            },
        };

        if preview {
            info!(
                "Preview: {} replacements planned in {} files",
                outcome.result.plan.iter().map(|p| p.replacements.len()).sum::<usize>(),
                outcome.result.plan.len()
            );
            result.batches_processed.push(outcome);
            return Ok(result);
        }

        let store = BackupStore::new(&self.config.output_dir(), &batch.batch_id);
        result.rollback_info.backup_dir = store.dir().to_path_buf();

        self.write_artifacts(&artifacts, &store, &mut result.rollback_info)?;
        result.config_generated = true;

        for file_plan in &outcome.result.plan {
            match self.rewrite_file(queue, file_plan, &store, &mut result.rollback_info) {
                Ok(()) => {
                    outcome.issues_fixed += file_plan.replacements.len();
                    result.files_modified.push(file_plan.path.clone());
                }
                Err(reason) => {
                    warn!("Not modifying {}: {}", file_plan.path.display(), reason);
                    result.failed_files.push(FailedFile {
                        path: file_plan.path.clone(),
                        reason,
                    });
                }
            }
        }

        info!(
            "Surgery fixed {} issues in {} files ({} failed)",
            outcome.issues_fixed,
            result.files_modified.len(),
            result.failed_files.len()
        );
        result.batches_processed.push(outcome);
        Ok(result)
    }

    /// Ask the Advisor, falling back on any failure or empty answer
    fn group(&self, batch: &TriageBatch) -> (ConfigTree, GroupingSource, Option<String>) {
        let Some(advisor) = self.advisor else {
            return (fallback_grouping(&batch.issues), GroupingSource::Fallback, None);
        };

        let settings = &self.config.advisor;
        let prompt = GroupingPromptBuilder::new(settings.sample_size, settings.context_chars).build(&batch.issues);
        let error = match advisor.submit(&prompt) {
            Ok(answer) => {
                let tree = parse_advisor_tree(&answer, &batch.issues);
                if !tree.is_empty() {
                    info!("{} grouped values into {} categories", advisor.name(), tree.0.len());
                    return (tree, GroupingSource::Advisor, None);
                }
                "advisor returned no usable values".to_string()
            }
            Err(e) => e.to_string(),
        };

        warn!("Advisor grouping failed ({}), using fallback grouping", error);
        (fallback_grouping(&batch.issues), GroupingSource::Fallback, Some(error))
    }

    /// Write the three artifacts; on failure restore what was already written
    fn write_artifacts(
        &self,
        artifacts: &Artifacts,
        store: &BackupStore,
        rollback: &mut RollbackInfo,
    ) -> Result<(), SurgeryError> {
        let settings = &self.config.refactoring;
        let outputs = [
            (&settings.data_file, &artifacts.data),
            (&settings.declaration_file, &artifacts.declaration),
            (&settings.initializer_file, &artifacts.initializer),
        ];

        for (index, (relative, content)) in outputs.into_iter().enumerate() {
            let path = self.config.resolve(relative);
            let key = Path::new("artifacts").join(format!("{}_{}", index, file_name(&path)));

            if let Err(source) = write_artifact(&path, content, &key, store, rollback) {
                warn!("Artifact write failed for {}, restoring artifacts", path.display());
                // A failed atomic write leaves the target as it was
                if rollback.artifacts.last().is_some_and(|a| a.path == path) {
                    rollback.artifacts.pop();
                }
                restore_artifacts(&rollback.artifacts);
                rollback.artifacts.clear();
                return Err(SurgeryError::ArtifactWrite { path, source });
            }
            info!("Wrote {}", path.display());
        }
        Ok(())
    }

    /// Verify, back up and rewrite one source file
    fn rewrite_file(
        &self,
        queue: &TriageQueue,
        file_plan: &FilePlan,
        store: &BackupStore,
        rollback: &mut RollbackInfo,
    ) -> Result<(), String> {
        let path = self.config.source_root().join(&file_plan.path);
        let bytes = std::fs::read(&path).map_err(|e| format!("unreadable: {}", e))?;
        let original_sha256 = sha256_hex(&bytes);

        match queue.fingerprints.get(&file_plan.path) {
            Some(expected) if *expected != original_sha256 => {
                return Err("file changed since it was scanned".to_string());
            }
            None => warn!("No fingerprint recorded for {}", file_plan.path.display()),
            _ => {}
        }

        let content = String::from_utf8(bytes).map_err(|_| "file is not valid UTF-8".to_string())?;
        let updated = apply_plan(&content, file_plan, &self.config.refactoring.include_directive)
            .map_err(|e| e.to_string())?;

        let backup_path = store
            .backup(&path, &Path::new("sources").join(&file_plan.path))
            .map_err(|e| format!("backup failed: {}", e))?;
        rollback.files.push(FileBackup {
            path: path.clone(),
            backup_path,
            original_sha256,
            applied_sha256: sha256_hex(updated.as_bytes()),
        });

        if let Err(e) = atomic_write(&path, updated.as_bytes()) {
            // The atomic write left the file untouched
            rollback.files.pop();
            return Err(format!("write failed: {}", e));
        }
        Ok(())
    }
}

/// Back up whatever sits at `path`, record it, then write the new content
fn write_artifact(
    path: &Path,
    content: &str,
    key: &Path,
    store: &BackupStore,
    rollback: &mut RollbackInfo,
) -> std::io::Result<()> {
    let backup_path = if path.is_file() {
        Some(store.backup(path, key)?)
    } else {
        None
    };
    rollback.artifacts.push(ArtifactBackup {
        path: path.to_path_buf(),
        backup_path,
    });
    atomic_write(path, content.as_bytes())
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string())
}

/// Put artifacts back the way they were: restore backups, remove new files.
///
/// Returns the reverted paths and one message per path that could not be reverted.
pub fn restore_artifacts(artifacts: &[ArtifactBackup]) -> (Vec<PathBuf>, Vec<String>) {
    let mut reverted = Vec::new();
    let mut errors = Vec::new();
    for artifact in artifacts.iter().rev() {
        let outcome = match &artifact.backup_path {
            Some(backup) => std::fs::read(backup).and_then(|bytes| atomic_write(&artifact.path, &bytes)),
            None => match std::fs::remove_file(&artifact.path) {
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                other => other,
            },
        };
        match outcome {
            Ok(()) => {
                info!("Restored artifact {}", artifact.path.display());
                reverted.push(artifact.path.clone());
            }
            Err(e) => {
                warn!("Could not restore artifact {}: {}", artifact.path.display(), e);
                errors.push(format!("{}: {}", artifact.path.display(), e));
            }
        }
    }
    (reverted, errors)
}
