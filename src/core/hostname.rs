//! Resolves the name the agent reports under.
//!
//! A configured name always wins. Otherwise the short form is asked for
//! first (`hostname --short`) and the plain query is the fallback, because
//! some hosts' `hostname` does not understand `--short`. When both fail the
//! agent has no identity, which is the one fatal error at startup.

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    config::agent::ProbesConfig,
    core::probes::{
        error::ProbeError,
        source::{CommandLine, Source},
        types::ProbeResult,
    },
};

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("Unable to determine hostname: short query failed ({short}); full query failed ({full})")]
    Exhausted { short: ProbeError, full: ProbeError },
}

#[derive(Debug, Clone)]
pub struct HostnameResolver {
    short: Source,
    full: Source,
}

impl HostnameResolver {
    pub fn new(short: Source, full: Source) -> Self {
        Self { short, full }
    }

    pub fn from_config(config: &ProbesConfig) -> Self {
        let defaults = Self::default();
        let command = |argv: &[String], fallback: Source| {
            CommandLine::from_argv(argv)
                .map(Source::Command)
                .unwrap_or(fallback)
        };
        Self {
            short: command(&config.hostname_short_command, defaults.short),
            full: command(&config.hostname_full_command, defaults.full),
        }
    }

    /// Returns `configured` when it is set, otherwise queries the host.
    pub async fn resolve_or(&self, configured: Option<&str>) -> Result<String, ResolveError> {
        match configured {
            Some(name) => {
                debug!("Using configured hostname '{}'", name);
                Ok(name.to_string())
            }
            None => self.resolve().await,
        }
    }

    /// Runs the short query, falling back to the full one.
    pub async fn resolve(&self) -> Result<String, ResolveError> {
        info!("Getting our hostname...");

        let short = match query(&self.short).await {
            Ok(name) => {
                info!("Resolved hostname '{}'", name);
                return Ok(name);
            }
            Err(e) => e,
        };
        // Not alarming: plenty of hosts lack a short form.
        debug!("Short hostname unavailable, trying full name: {}", short);

        match query(&self.full).await {
            Ok(name) => {
                info!("Resolved hostname '{}'", name);
                Ok(name)
            }
            Err(full) => {
                warn!("Full hostname query failed: {}", full);
                Err(ResolveError::Exhausted { short, full })
            }
        }
    }
}

impl Default for HostnameResolver {
    fn default() -> Self {
        Self::new(
            Source::Command(CommandLine::new("hostname", &["--short"])),
            Source::Command(CommandLine::new("hostname", &[])),
        )
    }
}

async fn query(source: &Source) -> ProbeResult<String> {
    let raw = source.read().await?;
    let name = raw.trim_end();
    if name.is_empty() {
        return Err(ProbeError::EmptyOutput {
            location: source.location(),
        });
    }
    Ok(name.to_string())
}
