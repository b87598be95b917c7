//! Logging section of the agent configuration.
//!
//! Mirrors the `[logger]` table of the TOML file. Validation runs through
//! the `validator` crate before the subscriber is installed.

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Console output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Pretty,
    Json,
}

/// `[logger]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct LoggerConfig {
    /// One of trace, debug, info, warn, error (case-insensitive).
    /// `RUST_LOG` takes precedence when set.
    #[validate(custom(function = "validate_log_level"))]
    pub level: String,

    #[validate(nested)]
    pub console: Option<ConsoleConfig>,

    #[validate(nested)]
    pub journald: Option<JournaldConfig>,
}

fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => {
            let mut err = ValidationError::new("invalid_log_level");
            err.message = Some(format!("Invalid log level: {}", level).into());
            Err(err)
        }
    }
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            level: "info".to_string(),
            console: Some(ConsoleConfig::default()),
            journald: Some(JournaldConfig::default()),
        }
    }
}

/// `[logger.console]` table.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ConsoleConfig {
    pub enabled: bool,
    pub format: LogFormat,
    /// Print the module path of each event.
    pub show_target: bool,
    pub show_thread_ids: bool,
    /// Emit span close events (carries per-cycle timing).
    pub show_spans: bool,
    pub ansi_colors: bool,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        ConsoleConfig {
            enabled: true,
            format: LogFormat::default(),
            show_target: false,
            show_thread_ids: false,
            show_spans: false,
            ansi_colors: true,
        }
    }
}

/// `[logger.journald]` table. Only meaningful on systemd hosts.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct JournaldConfig {
    pub enabled: bool,

    #[validate(length(min = 1))]
    pub identifier: String,
}

impl Default for JournaldConfig {
    fn default() -> Self {
        JournaldConfig {
            enabled: false,
            identifier: "serverhealth".to_string(),
        }
    }
}
