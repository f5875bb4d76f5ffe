use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;

use crate::managed::StaticManagedValues;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub reporter: ReporterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Values of managed parameters, keyed by parameter name.
    /// Supports ${ENV_VAR} substitution
    #[serde(default)]
    pub managed: HashMap<String, String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReporterConfig {
    /// Print the result of a passing run as JSON
    #[serde(default)]
    pub print_result: bool,
    /// Where to write the `{result, message, status}` artifact
    pub json_output: Option<PathBuf>,
    #[serde(default = "default_colors")]
    pub colors: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Used when RUST_LOG is not set
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

fn default_colors() -> bool {
    true
}

fn default_log_filter() -> String {
    "action_engine=info".to_string()
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            print_result: false,
            json_output: None,
            colors: default_colors(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        // Expand environment variables like ${GITHUB_TOKEN}
        let expanded = shellexpand::env(content)?;
        let config: Config = toml::from_str(&expanded)?;
        Ok(config)
    }

    /// Managed-value provider backed by the `[managed]` table
    pub fn managed_values(&self) -> StaticManagedValues {
        StaticManagedValues::from(self.managed.clone())
    }
}
