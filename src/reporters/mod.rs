//! Output of pipeline results
//!
//! - `json` - persisted stage outputs in the output directory
//! - `markdown` - the human-readable run report (`CODEMEND_REPORT.md`)
//! - `text` - per-phase terminal summaries

pub mod json;
pub mod markdown;
pub mod text;

pub use json::{
    read_json, read_json_opt, write_json, HEALTH_REPORT, SURGERY_RESULTS, TRIAGE_QUEUE,
    VALIDATION_BASELINE, VALIDATION_REPORT,
};
pub use markdown::REPORT_FILE;
