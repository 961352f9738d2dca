//! Configuration for the tag collector

mod collector;
mod logging;

pub use collector::{CollectorConfig, SearchConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Browser-like user agents rotated across requests
pub const DEFAULT_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:125.0) Gecko/20100101 Firefox/125.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36",
];

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Fetch, render, extract and batching settings
    #[serde(default)]
    pub collector: CollectorConfig,
    /// Index search settings
    #[serde(default)]
    pub search: SearchConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise fall back to defaults.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();
        let c = &self.collector;

        if c.batch_size == 0 {
            errors.push("batch_size must be positive".to_string());
        }
        if c.concurrency == 0 {
            errors.push("concurrency must be positive".to_string());
        }
        if c.fetch_timeout_secs == 0 {
            errors.push("fetch_timeout_secs must be positive".to_string());
        }
        if c.render_timeout_secs == 0 {
            errors.push("render_timeout_secs must be positive".to_string());
        }
        if c.max_body_bytes == 0 {
            errors.push("max_body_bytes must be positive".to_string());
        }
        if c.max_div_words == 0 {
            errors.push("max_div_words must be positive".to_string());
        }
        if c.user_agents.iter().all(|ua| ua.trim().is_empty()) {
            errors.push("user_agents must contain at least one entry".to_string());
        }

        if url::Url::parse(&self.search.index_server).is_err() {
            errors.push(format!(
                "search.index_server is not a valid URL: {}",
                self.search.index_server
            ));
        }
        if self.search.request_timeout_secs == 0 {
            errors.push("search.request_timeout_secs must be positive".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(anyhow::anyhow!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            ))
        }
    }

    /// Render the configuration as TOML (used by `init`)
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
