use tracing::warn;

use super::{error::ProbeError, types::ProbeResult};
use crate::core::report::ReportBuilder;

/// A single metric probe.
///
/// A probe samples raw text asynchronously, parses it into its own report
/// fields, and on any failure only logs. Probes hold configuration but no
/// per-cycle state, so one instance serves every cycle.
#[async_trait::async_trait]
pub trait Probe: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Produces the raw text for this cycle (command stdout, file contents).
    async fn sample(&self) -> ProbeResult<String>;

    /// Parses `raw` and writes this probe's fields into `report`.
    ///
    /// Must write nothing when it returns an error, so a half-parsed group
    /// never reaches the wire.
    fn apply(&self, raw: &str, report: &ReportBuilder) -> ProbeResult<()>;

    /// Called instead of `apply` when sampling failed, or after `apply`
    /// rejected the text. Never propagates.
    fn on_failure(&self, error: &ProbeError) {
        warn!(probe = self.name(), "Probe failed, field omitted: {}", error);
    }
}
