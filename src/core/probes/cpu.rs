//! CPU utilization from a two-sample `vmstat` run.
//!
//! `vmstat 1 2` prints two header lines and two samples. The first sample
//! is an average since boot; the second covers the one-second window, so
//! that is the line used. Its 15th column (`id`) is the idle percentage.
//!
//! ```text
//! procs -----------memory---------- ---swap-- -----io---- -system-- ------cpu-----
//!  r  b   swpd   free   buff  cache   si   so    bi    bo   in   cs us sy id wa st
//!  1  0      0 812344  90120 981232    0    0     5    12   80  150  3  1 95  1  0
//!  0  0      0 812100  90120 981240    0    0     0     0  210  390 10  3 87  0  0
//! ```

use super::{
    error::ProbeError,
    source::{CommandLine, Source},
    traits::Probe,
    types::ProbeResult,
};
use crate::core::report::ReportBuilder;

/// Zero-based line index of the second (stabilized) sample.
pub const SAMPLE_LINE: usize = 3;

/// Zero-based column index of the idle percentage.
pub const IDLE_COLUMN: usize = 14;

#[derive(Debug, Clone)]
pub struct CpuProbe {
    source: Source,
}

impl CpuProbe {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

impl Default for CpuProbe {
    fn default() -> Self {
        Self::new(Source::Command(CommandLine::new("vmstat", &["1", "2"])))
    }
}

/// Returns `100 - idle` from sampler output.
pub fn parse_cpu_usage(raw: &str, location: &str) -> ProbeResult<f64> {
    if raw.trim().is_empty() {
        return Err(ProbeError::EmptyOutput {
            location: location.to_string(),
        });
    }

    let line = raw
        .lines()
        .nth(SAMPLE_LINE)
        .ok_or_else(|| ProbeError::MissingField {
            field: "second sample line".to_string(),
            location: location.to_string(),
        })?;

    let idle = line
        .split_whitespace()
        .nth(IDLE_COLUMN)
        .ok_or_else(|| ProbeError::MissingField {
            field: "idle column".to_string(),
            location: location.to_string(),
        })?;

    let idle: f64 = idle.parse().map_err(|_| ProbeError::ParseError {
        metric: "cpu idle".to_string(),
        location: location.to_string(),
        reason: format!("invalid value: {}", idle),
    })?;

    if !(0.0..=100.0).contains(&idle) {
        return Err(ProbeError::ParseError {
            metric: "cpu idle".to_string(),
            location: location.to_string(),
            reason: format!("out of range: {}", idle),
        });
    }

    Ok(100.0 - idle)
}

#[async_trait::async_trait]
impl Probe for CpuProbe {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn sample(&self) -> ProbeResult<String> {
        self.source.read().await
    }

    fn apply(&self, raw: &str, report: &ReportBuilder) -> ProbeResult<()> {
        let usage = parse_cpu_usage(raw, &self.source.location())?;
        report.set_cpu_usage(usage);
        Ok(())
    }
}
