use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Location of the optional configuration file, relative to the project root.
pub const CONFIG_FILE: &str = ".ai/extractor.toml";

/// Top-level configuration from `.ai/extractor.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub inputs: InputsConfig,
    #[serde(default)]
    pub link: LinkConfig,
}

/// Which directories and files the Source Collector walks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectConfig {
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,
    #[serde(default = "default_test_patterns")]
    pub test_patterns: Vec<String>,
}

fn default_roots() -> Vec<String> {
    [
        "src", "lib", "app", "server", "tools", "scripts", "packages", "test", "tests",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_extensions() -> Vec<String> {
    ["js", "mjs", "cjs", "jsx", "ts", "tsx"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_exclude_dirs() -> Vec<String> {
    [
        "node_modules",
        "vendor",
        "dist",
        "build",
        "coverage",
        "target",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_test_patterns() -> Vec<String> {
    vec![
        "**/*.test.*".to_string(),
        "**/*.spec.*".to_string(),
        "**/__tests__/**".to_string(),
        "test/**".to_string(),
        "tests/**".to_string(),
    ]
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            extensions: default_extensions(),
            exclude_dirs: default_exclude_dirs(),
            test_patterns: default_test_patterns(),
        }
    }
}

/// Inputs read by the repository-level passes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputsConfig {
    /// Candidate orchestration entry files; the first one that exists is scanned.
    #[serde(default = "default_cli_entries")]
    pub cli_entries: Vec<String>,
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,
    #[serde(default = "default_env_files")]
    pub env_files: Vec<String>,
    /// Glob patterns for JSON/YAML configuration files.
    #[serde(default = "default_config_files")]
    pub config_files: Vec<String>,
}

fn default_cli_entries() -> Vec<String> {
    vec![
        "tools/cli.js".to_string(),
        "bin/cli.js".to_string(),
        "src/cli.ts".to_string(),
        "src/cli.js".to_string(),
        "cli.js".to_string(),
    ]
}

fn default_workflows_dir() -> String {
    ".github/workflows".to_string()
}

fn default_env_files() -> Vec<String> {
    vec![
        ".env".to_string(),
        ".env.example".to_string(),
        ".env.sample".to_string(),
        ".env.local".to_string(),
    ]
}

fn default_config_files() -> Vec<String> {
    vec![
        "config/*.json".to_string(),
        "config/*.yaml".to_string(),
        "config/*.yml".to_string(),
    ]
}

impl Default for InputsConfig {
    fn default() -> Self {
        Self {
            cli_entries: default_cli_entries(),
            workflows_dir: default_workflows_dir(),
            env_files: default_env_files(),
            config_files: default_config_files(),
        }
    }
}

/// Test Linker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkConfig {
    #[serde(default = "default_max_tests")]
    pub max_tests_per_entity: usize,
}

fn default_max_tests() -> usize {
    10
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            max_tests_per_entity: default_max_tests(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `revgraph init --force` to write a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Load `.ai/extractor.toml` under `root`.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn load_project(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        Self::load(&config_path)
    }

    /// Generate default TOML content for `revgraph init`.
    pub fn default_toml() -> String {
        r#"# revgraph - entity extraction configuration

[collect]
# Subfolders of the project root to scan for source files
roots = ["src", "lib", "app", "server", "tools", "scripts", "packages", "test", "tests"]
extensions = ["js", "mjs", "cjs", "jsx", "ts", "tsx"]
# Directory names never descended into (hidden directories are always skipped)
exclude_dirs = ["node_modules", "vendor", "dist", "build", "coverage", "target"]
# Collected files matching these globs are test files, linked back to entities
test_patterns = ["**/*.test.*", "**/*.spec.*", "**/__tests__/**", "test/**", "tests/**"]

[inputs]
# First existing file is scanned for CLI command registrations
cli_entries = ["tools/cli.js", "bin/cli.js", "src/cli.ts", "src/cli.js", "cli.js"]
workflows_dir = ".github/workflows"
env_files = [".env", ".env.example", ".env.sample", ".env.local"]
config_files = ["config/*.json", "config/*.yaml", "config/*.yml"]

[link]
max_tests_per_entity = 10
"#
        .to_string()
    }
}
