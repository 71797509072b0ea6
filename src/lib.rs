//! Codemend - self-healing code maintenance
//!
//! A pipeline that scans a C++ source tree for code-health issues, batches
//! them, externalizes magic numbers into generated configuration and keeps
//! the change only when the project still builds and passes its tests.

pub mod advisor;
pub mod backup;
pub mod cli;
pub mod config;
pub mod models;
pub mod pipeline;
pub mod reporters;
pub mod scanner;
pub mod surgeon;
pub mod triage;
pub mod validator;
