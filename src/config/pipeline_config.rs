//! Pipeline configuration support
//!
//! Loads configuration from `codemend.toml` or `.codemendrc.json` in the
//! project root, or from an explicit `--config` path.
//!
//! # Configuration Format
//!
//! ```toml
//! # codemend.toml
//!
//! [paths]
//! source_dir = "src"
//! output_dir = ".codemend"
//!
//! [limits]
//! batch_size = 10
//! max_function_length = 50
//! magic_number_skip = [0, 1, -1, 2, 10, 100]
//!
//! [priorities]
//! magic_numbers = 80
//! string_literals = 40
//!
//! [safety]
//! require_tests = true
//! auto_rollback = true
//! ```
//!
//! Every field has a default, so a partial file is fine. A file that exists
//! but cannot be parsed is a fatal error.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::models::IssueClass;

/// Priority used for classes missing from the priority table
const DEFAULT_PRIORITY: u32 = 50;

/// Complete pipeline configuration, read once at startup
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathSettings,

    #[serde(default)]
    pub limits: LimitSettings,

    /// Issue class → integer weight (higher is fixed first)
    #[serde(default = "default_priorities")]
    pub priorities: BTreeMap<String, u32>,

    #[serde(default)]
    pub safety: SafetyPolicy,

    #[serde(default)]
    pub build: BuildSettings,

    #[serde(default)]
    pub advisor: AdvisorSettings,

    #[serde(default)]
    pub refactoring: RefactorSettings,

    /// Project root every relative path is resolved against (not serialized)
    #[serde(skip)]
    project_root: PathBuf,
}

/// Source and output locations, relative to the project root
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathSettings {
    pub source_dir: PathBuf,
    pub output_dir: PathBuf,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("src"),
            output_dir: PathBuf::from(".codemend"),
        }
    }
}

/// Scanner and triage limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitSettings {
    /// Maximum issues per triage batch
    pub batch_size: usize,
    /// Functions longer than this many lines are reported
    pub max_function_length: u32,
    /// Numeric values never reported as magic numbers
    pub magic_number_skip: Vec<f64>,
    /// Source file extensions to scan
    pub extensions: Vec<String>,
    /// Path substrings marking test files (matched against `/`-prefixed relative paths)
    pub exclude_patterns: Vec<String>,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            max_function_length: 50,
            magic_number_skip: vec![0.0, 1.0, -1.0, 2.0, 10.0, 100.0],
            extensions: vec!["cpp".into(), "h".into(), "hpp".into()],
            exclude_patterns: vec!["/tests/".into(), ".test.".into()],
        }
    }
}

/// Gate policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyPolicy {
    /// Run the test runner after a successful build
    pub require_tests: bool,
    /// Revert surgery automatically when the gate fails
    pub auto_rollback: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            require_tests: true,
            auto_rollback: true,
        }
    }
}

/// External build and test invocation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSettings {
    pub build_dir: PathBuf,
    /// Build configuration name (Debug, Release, ...)
    pub config: String,
    /// Test executable name, looked up under `<build_dir>/bin/<config>/`
    pub test_executable: String,
    /// Full build command override; default is `cmake --build <build_dir> --config <config>`
    pub build_command: Vec<String>,
    /// Full test command override; default runs the test executable
    pub test_command: Vec<String>,
    pub build_timeout_secs: u64,
    pub test_timeout_secs: u64,
}

impl Default for BuildSettings {
    fn default() -> Self {
        Self {
            build_dir: PathBuf::from("build"),
            config: "Debug".into(),
            test_executable: if cfg!(windows) { "test_exe.exe" } else { "test_exe" }.into(),
            build_command: Vec::new(),
            test_command: Vec::new(),
            build_timeout_secs: 300,
            test_timeout_secs: 60,
        }
    }
}

/// Advisor (LLM) connection parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdvisorSettings {
    pub enabled: bool,
    /// ollama, openai or anthropic
    pub backend: String,
    /// Base URL; empty uses the backend's default
    pub endpoint: String,
    /// Model identifier; empty uses the backend's default
    pub model: String,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Issues sent to the Advisor per batch
    pub sample_size: usize,
    /// Context characters kept per sampled issue
    pub context_chars: usize,
}

impl Default for AdvisorSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: "ollama".into(),
            endpoint: String::new(),
            model: String::new(),
            timeout_secs: 120,
            temperature: 0.3,
            max_tokens: 4096,
            sample_size: 20,
            context_chars: 200,
        }
    }
}

/// Where generated artifacts go and how sources refer to them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefactorSettings {
    /// Serialized configuration data loaded at runtime
    pub data_file: PathBuf,
    /// Typed accessor declaration (C++ header)
    pub declaration_file: PathBuf,
    /// Accessor initialization code (C++ source)
    pub initializer_file: PathBuf,
    /// Directive inserted into every modified source file
    pub include_directive: String,
    /// Include used by the initializer to reach the declaration
    pub declaration_include: String,
    /// Expression naming the in-scope Config object at replacement sites
    pub accessor_root: String,
    /// Path the generated `Config::fromFile` opens by default
    pub runtime_data_path: String,
}

impl Default for RefactorSettings {
    fn default() -> Self {
        Self {
            data_file: PathBuf::from("config/game_config.json"),
            declaration_file: PathBuf::from("include/Config/Config.h"),
            initializer_file: PathBuf::from("src/Config/Config.cpp"),
            include_directive: "#include \"Config/Config.h\"".into(),
            declaration_include: "Config/Config.h".into(),
            accessor_root: "config".into(),
            runtime_data_path: "config/game_config.json".into(),
        }
    }
}

fn default_priorities() -> BTreeMap<String, u32> {
    [
        (IssueClass::MagicNumbers, 80),
        (IssueClass::LongFunctions, 60),
        (IssueClass::StringLiterals, 40),
        (IssueClass::Duplicates, 30),
    ]
    .into_iter()
    .map(|(class, weight)| (class.as_str().to_string(), weight))
    .collect()
}

impl PipelineConfig {
    /// Defaults rooted at `project_root`
    pub fn with_root(project_root: impl Into<PathBuf>) -> Self {
        Self {
            priorities: default_priorities(),
            project_root: project_root.into(),
            ..Default::default()
        }
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Re-root the configuration (used after loading and by tests)
    pub fn set_project_root(&mut self, root: impl Into<PathBuf>) {
        self.project_root = root.into();
    }

    /// Resolve a configured path against the project root
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn source_root(&self) -> PathBuf {
        self.resolve(&self.paths.source_dir)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.resolve(&self.paths.output_dir)
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve(&self.build.build_dir)
    }

    /// Weight of an issue class (50 when unlisted)
    pub fn priority(&self, class: IssueClass) -> u32 {
        self.priorities
            .get(class.as_str())
            .copied()
            .unwrap_or(DEFAULT_PRIORITY)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build.build_timeout_secs)
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.build.test_timeout_secs)
    }

    /// Reject settings the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.limits.batch_size == 0 {
            bail!("limits.batch_size must be at least 1");
        }
        if self.limits.max_function_length == 0 {
            bail!("limits.max_function_length must be at least 1");
        }
        if self.limits.extensions.is_empty() {
            bail!("limits.extensions must list at least one file extension");
        }
        if self.refactoring.accessor_root.trim().is_empty() {
            bail!("refactoring.accessor_root must not be empty");
        }
        for key in self.priorities.keys() {
            let class = key
                .parse::<IssueClass>()
                .with_context(|| format!("Invalid key in [priorities]: {}", key))?;
            if class.as_str() != key {
                bail!("[priorities] key '{}' must be written as '{}'", key, class.as_str());
            }
        }
        if !(0.0..=2.0).contains(&self.advisor.temperature) {
            bail!(
                "advisor.temperature must be between 0.0 and 2.0 (got {})",
                self.advisor.temperature
            );
        }
        Ok(())
    }
}

/// Load the pipeline configuration for a project.
///
/// Lookup order: explicit path, `codemend.toml`, `.codemendrc.json`, defaults.
pub fn load_pipeline_config(project_root: &Path, explicit: Option<&Path>) -> Result<PipelineConfig> {
    let mut config = match explicit {
        Some(path) => load_config_file(path)?,
        None => {
            let toml_path = project_root.join("codemend.toml");
            let json_path = project_root.join(".codemendrc.json");
            if toml_path.exists() {
                load_config_file(&toml_path)?
            } else if json_path.exists() {
                load_config_file(&json_path)?
            } else {
                debug!("No pipeline config found, using defaults");
                PipelineConfig::with_root(project_root)
            }
        }
    };

    config.set_project_root(project_root);
    config.validate()?;
    Ok(config)
}

fn load_config_file(path: &Path) -> Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;

    let config: PipelineConfig = if path.extension().and_then(|e| e.to_str()) == Some("json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))?
    };

    let mut config = config;
    config.priorities = canonical_priorities(&config.priorities)
        .with_context(|| format!("Invalid [priorities] in {}", path.display()))?;
    debug!("Loaded pipeline config from {}", path.display());
    Ok(config)
}

/// Rewrite class aliases (`magic`, `strings`, ...) to their canonical names
fn canonical_priorities(raw: &BTreeMap<String, u32>) -> Result<BTreeMap<String, u32>> {
    let mut out = BTreeMap::new();
    for (key, weight) in raw {
        let class: IssueClass = key
            .parse()
            .with_context(|| format!("Invalid key in [priorities]: {}", key))?;
        if out.insert(class.as_str().to_string(), *weight).is_some() {
            bail!("[priorities] sets {} more than once", class.as_str());
        }
    }
    Ok(out)
}

/// Commented starter configuration written by `codemend init`
pub const DEFAULT_CONFIG_TOML: &str = r#"# codemend configuration
# Every key is optional; the values below are the defaults.

[paths]
# Tree to scan, relative to the project root
source_dir = "src"
# Where reports and backups are written
output_dir = ".codemend"

[limits]
batch_size = 10
max_function_length = 50
magic_number_skip = [0, 1, -1, 2, 10, 100]
extensions = ["cpp", "h", "hpp"]
exclude_patterns = ["/tests/", ".test."]

[priorities]
magic_numbers = 80
long_functions = 60
string_literals = 40
duplicates = 30

[safety]
require_tests = true
auto_rollback = true

[build]
build_dir = "build"
config = "Debug"
test_executable = "test_exe"
# build_command = ["cmake", "--build", "build", "--config", "Debug"]
# test_command = ["ctest", "--test-dir", "build"]
build_timeout_secs = 300
test_timeout_secs = 60

[advisor]
enabled = true
# ollama, openai or anthropic
backend = "ollama"
# endpoint = "http://localhost:11434"
# model = "deepseek-coder-v2:16b-lite-instruct-q4_K_M"
timeout_secs = 120
temperature = 0.3
sample_size = 20

[refactoring]
data_file = "config/game_config.json"
declaration_file = "include/Config/Config.h"
initializer_file = "src/Config/Config.cpp"
include_directive = '#include "Config/Config.h"'
declaration_include = "Config/Config.h"
# Replacements read `<accessor_root>.<category>.<name>`. The generated header
# declares the Config class only: this must name a Config object in scope at
# every replacement site (a global, a member, or a call such as `Config::get()`),
# otherwise the build fails and the change is rolled back.
accessor_root = "config"
runtime_data_path = "config/game_config.json"
"#;
