//! Init command - write a default codemend.toml

use anyhow::{Context, Result};
use console::style;
use std::path::Path;

use crate::config::DEFAULT_CONFIG_TOML;

/// Run the init command
pub fn run(path: &Path, force: bool) -> Result<()> {
    let project_root = path
        .canonicalize()
        .with_context(|| format!("Path does not exist: {}", path.display()))?;

    if !project_root.is_dir() {
        anyhow::bail!("Path is not a directory: {}", project_root.display());
    }

    println!("\n{} Initializing codemend\n", style("🩹").bold());

    let config_path = project_root.join("codemend.toml");
    if config_path.exists() && !force {
        println!(
            "{} Already initialized: {} (use --force to overwrite)",
            style("✓").green(),
            style(config_path.display()).cyan()
        );
        return Ok(());
    }

    std::fs::write(&config_path, DEFAULT_CONFIG_TOML)
        .with_context(|| format!("Failed to write {}", config_path.display()))?;
    println!(
        "{} Created {}",
        style("✓").green(),
        style(config_path.display()).cyan()
    );

    if !project_root.join("src").is_dir() {
        println!(
            "{} No src/ directory here; set paths.source_dir to your C++ sources",
            style("⚠️ ").yellow()
        );
    }

    println!("\nNext: {}", style("codemend run").bold());
    Ok(())
}
