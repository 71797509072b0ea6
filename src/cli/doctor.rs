//! Doctor command - check the environment before a run

use anyhow::Result;
use console::style;

use crate::advisor;
use crate::config::PipelineConfig;
use crate::validator::Validator;

pub fn run(config: &PipelineConfig) -> Result<()> {
    println!("🩺 Codemend Doctor\n");
    let mut problems = 0;

    let source_root = config.source_root();
    if source_root.is_dir() {
        println!("✓ Source root: {}", source_root.display());
    } else {
        println!("✗ Source root missing: {}", source_root.display());
        problems += 1;
    }

    // Advisor failures never fail the check
    if !config.advisor.enabled {
        println!("○ Advisor: disabled (fallback grouping)");
    } else {
        match advisor::from_settings(&config.advisor) {
            Ok(client) => match client.probe() {
                Ok(detail) => println!(
                    "✓ Advisor: {} {} ({})",
                    client.backend().as_str(),
                    client.model(),
                    detail
                ),
                Err(e) => {
                    println!("○ Advisor: {} at {} ({})", client.backend().as_str(), client.url(), e);
                    println!("  Surgery will use the fallback grouping");
                }
            },
            Err(e) => {
                println!("○ Advisor: {}", e);
                println!("  Surgery will use the fallback grouping");
            }
        }
    }

    let build_dir = config.build_dir();
    if build_dir.is_dir() {
        println!("✓ Build directory: {}", build_dir.display());
    } else if config.build.build_command.is_empty() {
        println!("✗ Build directory missing: {}", build_dir.display());
        println!("  Configure the project first (cmake -S . -B {})", config.build.build_dir.display());
        problems += 1;
    } else {
        println!("○ Build directory missing, custom build command configured");
    }

    let validator = Validator::new(config);
    println!("  Build command: {}", validator.build_command().display());
    match validator.test_command() {
        Ok(spec) => println!("✓ Test command: {}", spec.display()),
        Err(reason) if config.safety.require_tests => {
            println!("✗ {}", reason);
            problems += 1;
        }
        Err(_) => println!("○ Tests not required"),
    }

    if problems == 0 {
        println!("\n{}", style("✅ All checks passed!").green());
        Ok(())
    } else {
        anyhow::bail!("{} check(s) failed", problems)
    }
}
