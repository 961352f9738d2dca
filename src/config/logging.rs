//! Logging configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::Level;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    /// Convert to the `tracing` level used by the subscriber
    pub fn as_tracing(&self) -> Level {
        match self {
            Self::Trace => Level::TRACE,
            Self::Debug => Level::DEBUG,
            Self::Info => Level::INFO,
            Self::Warn => Level::WARN,
            Self::Error => Level::ERROR,
        }
    }

    /// Lower the threshold by `steps` levels (each `-v` is one step).
    pub fn lowered(self, steps: u8) -> Self {
        let mut level = self;
        for _ in 0..steps {
            level = match level {
                Self::Error => Self::Warn,
                Self::Warn => Self::Info,
                Self::Info => Self::Debug,
                Self::Debug | Self::Trace => Self::Trace,
            };
        }
        level
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log format
    #[serde(default)]
    pub format: LogFormat,
    /// Log level
    #[serde(default)]
    pub level: LogLevel,
}

impl LoggingConfig {
    /// Effective level after applying the debug switch and CLI verbosity.
    ///
    /// Debug mode only widens logging to `debug`; it never raises a more
    /// verbose configured level back up.
    pub fn effective_level(&self, debug: bool, verbose: u8) -> Level {
        let mut level = self.level.lowered(verbose);
        if debug && level > LogLevel::Debug {
            level = LogLevel::Debug;
        }
        level.as_tracing()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_widens_to_debug() {
        let config = LoggingConfig::default();
        assert_eq!(config.effective_level(false, 0), Level::INFO);
        assert_eq!(config.effective_level(true, 0), Level::DEBUG);
    }

    #[test]
    fn test_verbosity_steps() {
        let config = LoggingConfig {
            format: LogFormat::Text,
            level: LogLevel::Warn,
        };
        assert_eq!(config.effective_level(false, 1), Level::INFO);
        assert_eq!(config.effective_level(false, 5), Level::TRACE);
    }

    #[test]
    fn test_trace_is_not_raised_by_debug() {
        let config = LoggingConfig {
            format: LogFormat::Json,
            level: LogLevel::Trace,
        };
        assert_eq!(config.effective_level(true, 0), Level::TRACE);
    }
}
