use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// File name looked up in the project directory and its ancestors.
pub const CONFIG_FILE: &str = ".codemeter.toml";

/// Top-level configuration from `.codemeter.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Job orchestration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Number of analysis workers per job; 0 picks a size from the CPU count.
    #[serde(default)]
    pub worker_pool_size: usize,
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
}

fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            worker_pool_size: 0,
            cache_ttl_secs: default_cache_ttl_secs(),
        }
    }
}

impl ServiceConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

/// Thresholds used when scoring a file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_complexity_threshold")]
    pub complexity_threshold: u32,
    #[serde(default = "default_loc_threshold")]
    pub loc_threshold: usize,
    #[serde(default = "default_long_function_lines")]
    pub long_function_lines: usize,
    #[serde(default = "default_max_parameters")]
    pub max_parameters: usize,
    #[serde(default = "default_max_class_methods")]
    pub max_class_methods: usize,
    #[serde(default = "default_max_class_properties")]
    pub max_class_properties: usize,
    #[serde(default = "default_max_imports")]
    pub max_imports: usize,
}

fn default_complexity_threshold() -> u32 {
    10
}
fn default_loc_threshold() -> usize {
    500
}
fn default_long_function_lines() -> usize {
    50
}
fn default_max_parameters() -> usize {
    5
}
fn default_max_class_methods() -> usize {
    20
}
fn default_max_class_properties() -> usize {
    15
}
fn default_max_imports() -> usize {
    20
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            complexity_threshold: default_complexity_threshold(),
            loc_threshold: default_loc_threshold(),
            long_function_lines: default_long_function_lines(),
            max_parameters: default_max_parameters(),
            max_class_methods: default_max_class_methods(),
            max_class_properties: default_max_class_properties(),
            max_imports: default_max_imports(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from a `.codemeter.toml` file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file '{}'", path.display()))?;
        let config: Config = toml::from_str(&content).with_context(|| {
            format!(
                "failed to parse '{}'. Run `codemeter init` to create a valid config file",
                path.display()
            )
        })?;
        Ok(config)
    }

    /// Find `.codemeter.toml` in `dir` or any ancestor.
    pub fn find(dir: &Path) -> Option<std::path::PathBuf> {
        let start = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        start
            .ancestors()
            .map(|d| d.join(CONFIG_FILE))
            .find(|p| p.exists())
    }

    /// Load from the nearest `.codemeter.toml`, or return defaults.
    ///
    /// A config file that exists but cannot be parsed is an error rather than
    /// a silent fallback.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        match Self::find(dir) {
            Some(path) => Self::load(&path),
            None => Ok(Self::default()),
        }
    }

    /// Generate default TOML content for `codemeter init`.
    pub fn default_toml() -> String {
        r#"# codemeter - code metrics configuration

[service]
# Analysis workers per job. 0 = max(4, 2 x CPU count)
worker_pool_size = 0
# How long job status and summaries stay in the cache
cache_ttl_secs = 86400

[metrics]
# Functions above this cyclomatic complexity count as a smell and accrue debt
complexity_threshold = 10
# Lines above this add 0.01h of debt each
loc_threshold = 500
long_function_lines = 50
max_parameters = 5
max_class_methods = 20
max_class_properties = 15
max_imports = 20

[logging]
# Overridden by RUST_LOG when set
level = "info"
"#
        .to_string()
    }
}
