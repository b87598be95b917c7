//! Agent configuration loading and validation.
//!
//! The configuration is read once at startup from a TOML file and stays
//! immutable afterwards. The core only reads it; a hostname resolved at
//! runtime is held by the scheduler, not written back here.

use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use validator::Validate;

use self::{
    agent::{AgentConfig, CollectorEndpoint, ProbesConfig},
    logger::LoggerConfig,
};

pub mod agent;
pub mod logger;

/// Default location used when neither the CLI nor the environment names a file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/serverhealth/config.toml";

/// Timestamp used by the `print_*` macros, matching the console layer style.
pub fn early_timestamp() -> String {
    time::OffsetDateTime::now_utc()
        .format(time::macros::format_description!(
            "[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:6]Z"
        ))
        .unwrap_or_default()
}

/// Timestamped console output for the window before the tracing subscriber
/// is installed.
#[macro_export]
macro_rules! print_info {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("INFO").green(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_warn {
    ($($arg:tt)*) => {
        println!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("WARN").yellow(),
            format_args!($($arg)*)
        );
    };
}

#[macro_export]
macro_rules! print_error {
    ($($arg:tt)*) => {
        eprintln!("{}  {} {}",
            console::style($crate::config::early_timestamp()).dim(),
            console::style("ERROR").red(),
            format_args!($($arg)*)
        );
    };
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error while reading configuration: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Parse error while reading configuration: {0}")]
    ParseError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),
}

/// Top-level configuration file. `[collector]` is mandatory; every other
/// table falls back to its defaults.
#[derive(Serialize, Deserialize, Debug, Validate, Clone)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub logger: LoggerConfig,

    #[serde(default)]
    #[validate(nested)]
    pub agent: AgentConfig,

    #[validate(nested)]
    pub collector: CollectorEndpoint,

    #[serde(default)]
    #[validate(nested)]
    pub probes: ProbesConfig,
}

impl Config {
    /// Locates and loads the configuration.
    ///
    /// `explicit` comes from the command line (or `SERVERHEALTH_CONFIG`);
    /// without it the default path under `/etc` is tried.
    pub fn new(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let path = Self::resolve_path(explicit)?;
        Self::load(&path)
    }

    fn resolve_path(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
        if let Some(path) = explicit {
            print_info!("Using config from command line: {}", path.display());
            return Ok(path.to_path_buf());
        }

        let fallback = Path::new(DEFAULT_CONFIG_PATH);
        if fallback.exists() {
            print_info!("Using default config path: {}", fallback.display());
            return Ok(fallback.to_path_buf());
        }

        Err(ConfigError::Config(format!(
            "No configuration file given and {} does not exist",
            DEFAULT_CONFIG_PATH
        )))
    }

    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> Result<Config, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let raw = fs::read_to_string(path)?;
        let config = Self::from_toml(&raw)?;

        print_info!("Successfully loaded config from: {}", path.display());
        Ok(config)
    }

    /// Parses and validates configuration text.
    pub fn from_toml(raw: &str) -> Result<Config, ConfigError> {
        let config: Config =
            toml::from_str(raw).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        config
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))?;

        Ok(config)
    }
}
