//! Tag collector and index search configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use super::DEFAULT_USER_AGENTS;

/// Tag collection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectorConfig {
    /// Execute page scripts in a headless browser before extraction
    pub render_javascript: bool,
    /// URLs processed per isolated batch
    pub batch_size: usize,
    /// Maximum in-flight fetches within a batch
    pub concurrency: usize,
    /// Per-attempt fetch timeout (seconds)
    pub fetch_timeout_secs: u64,
    /// Hard deadline for rendering one page (seconds)
    pub render_timeout_secs: u64,
    /// Responses larger than this are discarded (bytes)
    pub max_body_bytes: usize,
    /// Word budget for the extracted div text
    pub max_div_words: usize,
    /// User agents to rotate through, one picked per request
    pub user_agents: Vec<String>,
    /// Verbose failure logging; no behavior change
    pub debug: bool,
}

impl CollectorConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn render_timeout(&self) -> Duration {
        Duration::from_secs(self.render_timeout_secs)
    }

    /// Character backstop applied after the word budget
    pub fn max_div_chars(&self) -> usize {
        self.max_div_words * 10
    }
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            render_javascript: false,
            batch_size: 200,
            concurrency: 100,
            fetch_timeout_secs: 120,
            render_timeout_secs: 15,
            max_body_bytes: 10_000_000,
            max_div_words: 500,
            user_agents: DEFAULT_USER_AGENTS.iter().map(|s| s.to_string()).collect(),
            debug: false,
        }
    }
}

/// Index search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Base URL of the CDX index server
    pub index_server: String,
    /// Where the pagination cursor is persisted
    pub cursor_path: PathBuf,
    /// Request timeout (seconds)
    pub request_timeout_secs: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_server: "http://index.commoncrawl.org/".to_string(),
            cursor_path: PathBuf::from(".tag-collector/search-cursor.json"),
            request_timeout_secs: 60,
        }
    }
}
