//! CLI command definitions and handlers

mod doctor;
mod init;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use console::style;
use std::path::{Path, PathBuf};

use crate::config::{load_pipeline_config, PipelineConfig};
use crate::models::IssueClass;
use crate::pipeline::{validation_succeeded, Pipeline, RunOptions, SurgeryOptions};
use crate::reporters;
use crate::surgeon::SurgeryResult;

/// Parse and validate a batch size (at least 1)
fn parse_batch_size(s: &str) -> Result<usize, String> {
    let n: usize = s
        .parse()
        .map_err(|_| format!("'{}' is not a valid number", s))?;
    if n == 0 {
        Err("batch size must be at least 1".to_string())
    } else {
        Ok(n)
    }
}

fn parse_kind(s: &str) -> Result<IssueClass, String> {
    s.parse::<IssueClass>().map_err(|e| e.to_string())
}

/// Codemend - self-healing code maintenance
///
/// Finds magic numbers, string literals and long functions in a C++ tree,
/// moves magic numbers into generated configuration, and keeps the change
/// only if the project still builds and its tests still pass.
#[derive(Parser, Debug)]
#[command(name = "codemend")]
#[command(
    version,
    about = "Self-healing code maintenance: scan, batch, fix and verify code-health issues",
    after_help = "\
Examples:
  codemend init                        Write a default codemend.toml
  codemend scan                        Scan ./src and write the health report
  codemend run                         Full pipeline in preview mode
  codemend run --apply                 Apply the top batch, build, test, roll back on failure
  codemend surgery --apply --no-ai     Apply using deterministic grouping only
  codemend report                      Render CODEMEND_REPORT.md from the last run"
)]
pub struct Cli {
    /// Project root (default: current directory)
    #[arg(global = true, default_value = ".")]
    pub path: PathBuf,

    /// Configuration file (default: codemend.toml or .codemendrc.json in the project root)
    #[arg(long, short = 'c', global = true, env = "CODEMEND_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn", value_parser = ["error", "warn", "info", "debug", "trace"])]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a commented default codemend.toml
    Init {
        /// Overwrite an existing codemend.toml
        #[arg(long)]
        force: bool,
    },

    /// Scan the source tree and write health_report.json
    Scan,

    /// Order and batch the last health report into triage_queue.json
    Triage {
        /// Maximum issues per batch (overrides limits.batch_size)
        #[arg(long, value_parser = parse_batch_size)]
        batch_size: Option<usize>,
    },

    /// Fix the top magic-number batch (preview unless --apply)
    Surgery {
        /// Write changes to disk instead of previewing them
        #[arg(long)]
        apply: bool,

        /// Issue class to operate on (only magic_numbers is supported)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<IssueClass>,

        /// Do not contact the Advisor; group values deterministically
        #[arg(long)]
        no_ai: bool,
    },

    /// Build and test the last applied surgery, rolling back on failure
    Validate,

    /// Build and test the current tree and record it as the baseline
    Verify,

    /// Revert the last applied surgery from its backups
    Rollback,

    /// Render CODEMEND_REPORT.md from the last persisted results
    Report {
        /// Do not print the report to stdout
        #[arg(long)]
        quiet: bool,
    },

    /// Full pipeline: scan, triage, surgery, validation, report
    #[command(after_help = "\
Exit status is 0 when every phase completed and, with --apply, the build+test
gate passed. A failed gate rolls the changes back and exits with 1.")]
    Run {
        /// Write changes to disk and validate them
        #[arg(long)]
        apply: bool,

        /// Maximum issues per batch (overrides limits.batch_size)
        #[arg(long, value_parser = parse_batch_size)]
        batch_size: Option<usize>,

        /// Issue class to operate on (only magic_numbers is supported)
        #[arg(long, value_parser = parse_kind)]
        kind: Option<IssueClass>,

        /// Do not contact the Advisor; group values deterministically
        #[arg(long)]
        no_ai: bool,
    },

    /// Check the Advisor connection and the build setup
    Doctor,
}

fn load_config(path: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;
    if !root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", root.display());
    }
    load_pipeline_config(&root, explicit)
}

fn gate_failed() -> ! {
    eprintln!("{}", style("Validation failed").red().bold());
    std::process::exit(1);
}

/// Run the CLI
pub fn run(cli: Cli) -> Result<()> {
    if let Commands::Init { force } = cli.command {
        return init::run(&cli.path, force);
    }

    let config = load_config(&cli.path, cli.config.as_deref())?;
    let pipeline = Pipeline::new(&config);

    match cli.command {
        Commands::Init { .. } => Ok(()),

        Commands::Scan => pipeline.scan().map(|_| ()),

        Commands::Triage { batch_size } => pipeline.triage(batch_size).map(|_| ()),

        Commands::Surgery { apply, kind, no_ai } => pipeline
            .surgery(SurgeryOptions {
                apply,
                kind,
                no_advisor: no_ai,
            })
            .map(|_| ()),

        Commands::Validate => {
            let validation = pipeline.validate()?;
            let surgery: SurgeryResult =
                reporters::read_json(&config.output_dir(), reporters::SURGERY_RESULTS)?;
            if !validation_succeeded(&surgery, Some(&validation)) {
                gate_failed();
            }
            Ok(())
        }

        Commands::Verify => {
            if !pipeline.verify()?.passed() {
                gate_failed();
            }
            Ok(())
        }

        Commands::Rollback => {
            let outcome = pipeline.rollback()?;
            if !outcome.is_clean() {
                anyhow::bail!(
                    "Rollback finished with {} errors and {} files kept because they changed after surgery",
                    outcome.errors.len(),
                    outcome.conflicts.len()
                );
            }
            Ok(())
        }

        Commands::Report { quiet } => {
            let (path, markdown) = pipeline.report()?;
            if !quiet {
                println!("{}", markdown);
            }
            println!("{}Report saved to {}", style("✓ ").green(), style(path.display()).cyan());
            Ok(())
        }

        Commands::Run {
            apply,
            batch_size,
            kind,
            no_ai,
        } => {
            let outcome = pipeline.run(RunOptions {
                surgery: SurgeryOptions {
                    apply,
                    kind,
                    no_advisor: no_ai,
                },
                batch_size,
            })?;
            if !outcome.succeeded() {
                gate_failed();
            }
            Ok(())
        }

        Commands::Doctor => doctor::run(&config),
    }
}
