use super::{error::ProbeError, source::Source, traits::Probe, types::ProbeResult};
use crate::core::report::{LoadAverage, ReportBuilder};

/// Load averages from `/proc/loadavg` (`"0.52 0.58 0.59 1/467 12345"`).
#[derive(Debug, Clone)]
pub struct LoadAverageProbe {
    source: Source,
}

impl LoadAverageProbe {
    pub fn new(source: Source) -> Self {
        Self { source }
    }
}

/// Takes the first three whitespace-separated values, dropping separator
/// commas, and keeps them as the kernel printed them.
pub fn parse_load_average(raw: &str, location: &str) -> ProbeResult<LoadAverage> {
    if raw.trim().is_empty() {
        return Err(ProbeError::EmptyOutput {
            location: location.to_string(),
        });
    }

    let mut values = raw.split_whitespace().map(|field| field.replace(',', ""));
    let mut next = |metric: &str| -> ProbeResult<String> {
        let value = values.next().ok_or_else(|| ProbeError::MissingField {
            field: metric.to_string(),
            location: location.to_string(),
        })?;
        if value.parse::<f64>().is_err() {
            return Err(ProbeError::ParseError {
                metric: metric.to_string(),
                location: location.to_string(),
                reason: format!("invalid value: {}", value),
            });
        }
        Ok(value)
    };

    Ok(LoadAverage {
        one_minute: next("oneMinute")?,
        five_minutes: next("fiveMinutes")?,
        fifteen_minutes: next("fifteenMinutes")?,
    })
}

#[async_trait::async_trait]
impl Probe for LoadAverageProbe {
    fn name(&self) -> &'static str {
        "loadavg"
    }

    async fn sample(&self) -> ProbeResult<String> {
        self.source.read().await
    }

    fn apply(&self, raw: &str, report: &ReportBuilder) -> ProbeResult<()> {
        let load = parse_load_average(raw, &self.source.location())?;
        report.set_load_avg(load);
        Ok(())
    }
}
