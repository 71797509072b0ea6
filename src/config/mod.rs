//! Configuration module for codemend
//!
//! This module handles:
//! - Pipeline configuration (codemend.toml / .codemendrc.json)
//! - Per-class priorities and limits
//! - Safety policy, build invocation and Advisor connection settings

mod pipeline_config;

pub use pipeline_config::{
    load_pipeline_config,
    AdvisorSettings,
    BuildSettings,
    LimitSettings,
    PathSettings,
    PipelineConfig,
    RefactorSettings,
    SafetyPolicy,
    DEFAULT_CONFIG_TOML,
};
