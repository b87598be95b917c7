use super::{error::ProbeError, source::Source, traits::Probe, types::ProbeResult};
use crate::core::report::{MemoryUsage, ReportBuilder};

/// Total and free memory from `/proc/meminfo`.
///
/// The kernel always prints `MemTotal` then `MemFree` as the first two
/// lines, so the probe reads them by position:
///
/// ```text
/// MemTotal:       16384000 kB
/// MemFree:          512000 kB
/// MemAvailable:   12288000 kB
/// ```
#[derive(Debug, Clone)]
pub struct MemoryProbe {
    source: Source,
}

impl MemoryProbe {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

/// Value column of a `Key:   value kB` line, unit removed.
fn kilobytes(line: Option<&str>, field: &str, location: &str) -> ProbeResult<String> {
    let line = line.ok_or_else(|| ProbeError::MissingField {
        field: field.to_string(),
        location: location.to_string(),
    })?;

    let cleaned = line.replace("kB", "");
    let value = cleaned
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| ProbeError::MissingField {
            field: field.to_string(),
            location: location.to_string(),
        })?;

    if value.parse::<u64>().is_err() {
        return Err(ProbeError::ParseError {
            metric: field.to_string(),
            location: location.to_string(),
            reason: format!("invalid value: {}", value),
        });
    }
    Ok(value.to_string())
}

pub fn parse_memory_usage(raw: &str, location: &str) -> ProbeResult<MemoryUsage> {
    if raw.trim().is_empty() {
        return Err(ProbeError::EmptyOutput {
            location: location.to_string(),
        });
    }

    let mut lines = raw.lines();
    Ok(MemoryUsage {
        memory_total: kilobytes(lines.next(), "memoryTotal", location)?,
        memory_free: kilobytes(lines.next(), "memoryFree", location)?,
    })
}

#[async_trait::async_trait]
impl Probe for MemoryProbe {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sample(&self) -> ProbeResult<String> {
        self.source.read().await
    }

    fn apply(&self, raw: &str, report: &ReportBuilder) -> ProbeResult<()> {
        let memory = parse_memory_usage(raw, &self.source.location())?;
        report.set_memory_usage(memory);
        Ok(())
    }
}
