//! Agent identity, collector endpoint and probe source configuration.
//!
//! These are the `[agent]`, `[collector]` and `[probes]` tables. Defaults
//! target a stock Linux host: `vmstat` for CPU, `/proc` for load and memory,
//! `hostname` for identity.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use validator::Validate;

/// `[agent]` table.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct AgentConfig {
    /// Name reported in every datagram. When absent or blank the hostname
    /// resolver runs once at startup.
    pub hostname: Option<String>,
}

impl AgentConfig {
    /// Configured hostname, ignoring blank values.
    pub fn hostname_override(&self) -> Option<&str> {
        self.hostname
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
    }
}

/// `[collector]` table: where reports are sent. Both keys are required.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CollectorEndpoint {
    #[validate(length(min = 1, message = "Collector host must not be empty"))]
    pub host: String,

    #[validate(range(min = 1, message = "Collector port must be between 1 and 65535"))]
    pub port: u16,
}

impl std::fmt::Display for CollectorEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// `[probes]` table. Commands are argv arrays and never go through a shell.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ProbesConfig {
    /// Two-sample utilization command; the idle column of its second sample
    /// drives `cpuUsage`.
    #[validate(length(min = 1, message = "cpu_command must name a program"))]
    pub cpu_command: Vec<String>,

    pub loadavg_path: PathBuf,

    pub meminfo_path: PathBuf,

    #[validate(length(min = 1, message = "hostname_short_command must name a program"))]
    pub hostname_short_command: Vec<String>,

    #[validate(length(min = 1, message = "hostname_full_command must name a program"))]
    pub hostname_full_command: Vec<String>,

    /// Upper bound for a single probe, in seconds. Unset means a hung probe
    /// stalls the cycle forever.
    #[validate(range(min = 1, message = "timeout_secs must be at least 1 second"))]
    pub timeout_secs: Option<u64>,

    /// How often the completion barrier re-checks its pending count.
    #[validate(range(
        min = 1,
        max = 1000,
        message = "barrier_poll_interval_ms must be between 1 and 1000"
    ))]
    pub barrier_poll_interval_ms: u64,
}

impl ProbesConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    pub fn barrier_poll_interval(&self) -> Duration {
        Duration::from_millis(self.barrier_poll_interval_ms)
    }
}

impl Default for ProbesConfig {
    fn default() -> Self {
        Self {
            cpu_command: argv(&["vmstat", "1", "2"]),
            loadavg_path: PathBuf::from("/proc/loadavg"),
            meminfo_path: PathBuf::from("/proc/meminfo"),
            hostname_short_command: argv(&["hostname", "--short"]),
            hostname_full_command: argv(&["hostname"]),
            timeout_secs: None,
            barrier_poll_interval_ms: 10,
        }
    }
}

fn argv(parts: &[&str]) -> Vec<String> {
    parts.iter().map(|part| part.to_string()).collect()
}
