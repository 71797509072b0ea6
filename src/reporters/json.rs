//! JSON persistence of stage outputs
//!
//! Every stage writes its output to the output directory so the next stage
//! can be re-run on its own against the last persisted result.

use crate::backup::atomic_write;
use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const HEALTH_REPORT: &str = "health_report.json";
pub const TRIAGE_QUEUE: &str = "triage_queue.json";
pub const SURGERY_RESULTS: &str = "surgery_results.json";
pub const VALIDATION_REPORT: &str = "validation_report.json";
pub const VALIDATION_BASELINE: &str = "validation_baseline.json";

/// Render any stage output as pretty-printed JSON
pub fn render<T: Serialize>(value: &T) -> Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// Write `value` to `<output_dir>/<name>`, creating the directory
pub fn write_json<T: Serialize>(output_dir: &Path, name: &str, value: &T) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)
        .with_context(|| format!("Failed to create output directory {}", output_dir.display()))?;
    let path = output_dir.join(name);
    atomic_write(&path, render(value)?.as_bytes())
        .with_context(|| format!("Failed to write {}", path.display()))?;
    debug!("Saved {}", path.display());
    Ok(path)
}

/// Read `<output_dir>/<name>`; a missing or malformed file is an error
pub fn read_json<T: DeserializeOwned>(output_dir: &Path, name: &str) -> Result<T> {
    let path = output_dir.join(name);
    let content = std::fs::read_to_string(&path).with_context(|| {
        format!(
            "Failed to read {}. Run the previous stage first.",
            path.display()
        )
    })?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Like [`read_json`], but a missing file is `None`
pub fn read_json_opt<T: DeserializeOwned>(output_dir: &Path, name: &str) -> Result<Option<T>> {
    if !output_dir.join(name).exists() {
        return Ok(None);
    }
    read_json(output_dir, name).map(Some)
}
