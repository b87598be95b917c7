//! Installs the global `tracing` subscriber.
//!
//! Console output (compact, pretty or JSON) and systemd journald are both
//! optional layers; at least one must come up or startup fails.

use std::io;

use thiserror::Error;
use tracing_subscriber::{fmt, fmt::format::FmtSpan, prelude::*, EnvFilter, Layer};
use validator::{Validate, ValidationErrors};

use crate::{
    config::logger::{ConsoleConfig, LogFormat, LoggerConfig},
    print_info, print_warn,
};

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// Journald socket could not be opened.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Global subscriber already installed: {0}")]
    AlreadyInitialized(String),

    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,
}

pub struct LoggerManager {
    config: LoggerConfig,
}

impl LoggerManager {
    /// Validates `config` and prepares a manager for it.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;
        Ok(LoggerManager { config })
    }

    /// Builds the configured layers and installs them globally.
    ///
    /// Must run once, before the first event the operator cares about.
    pub fn init(&self) -> Result<(), LoggerError> {
        let layers = self.build_layers()?;
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::AlreadyInitialized(e.to_string()))
    }

    fn build_layers(&self) -> Result<Vec<BoxedLayer>, LoggerError> {
        let mut layers = Vec::new();

        if let Some(console) = self.config.console.as_ref().filter(|c| c.enabled) {
            layers.push(console_layer(console, self.filter()));
        }

        if let Some(journald) = self.config.journald.as_ref().filter(|j| j.enabled) {
            match tracing_journald::layer() {
                Ok(layer) => {
                    let layer = layer.with_syslog_identifier(journald.identifier.clone());
                    layers.push(layer.with_filter(self.filter()).boxed());
                    print_info!(
                        "Systemd journald logger initialized with identifier: {}",
                        journald.identifier
                    );
                }
                Err(e) if layers.is_empty() => return Err(LoggerError::IoError(e)),
                Err(e) => {
                    print_warn!("Journald unavailable, continuing with console only: {}", e);
                }
            }
        }

        if layers.is_empty() {
            return Err(LoggerError::NoLayersConfigured);
        }
        Ok(layers)
    }

    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }
}

fn console_layer(config: &ConsoleConfig, filter: EnvFilter) -> BoxedLayer {
    let span_events = if config.show_spans {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };
    let base = fmt::layer()
        .with_target(config.show_target)
        .with_thread_ids(config.show_thread_ids)
        .with_span_events(span_events)
        .with_ansi(config.ansi_colors)
        .with_writer(io::stdout);

    match config.format {
        LogFormat::Json => base.json().with_filter(filter).boxed(),
        LogFormat::Pretty => base.pretty().with_filter(filter).boxed(),
        LogFormat::Compact => base.compact().with_filter(filter).boxed(),
    }
}
