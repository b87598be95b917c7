//! Metric probes and the fixed set launched every cycle.
//!
//! Every probe runs on its own task and is registered with the cycle's
//! [`CompletionBarrier`] before it starts. Whatever happens inside (success,
//! failure, timeout, panic) the registration ends exactly once, and failures
//! only ever cost the probe's own report fields.

use std::{sync::Arc, time::Duration};

use tracing::{debug, debug_span, Instrument};

use self::{
    cpu::CpuProbe,
    error::ProbeError,
    loadavg::LoadAverageProbe,
    memory::MemoryProbe,
    source::{CommandLine, Source},
    traits::Probe,
};
use crate::{
    config::agent::ProbesConfig,
    core::{
        barrier::{CompletionBarrier, PendingGuard},
        report::ReportBuilder,
    },
};

pub mod cpu;
pub mod error;
pub mod loadavg;
pub mod memory;
pub mod source;
pub mod traits;
pub mod types;

/// The probes run in each cycle plus their shared time limit.
#[derive(Clone)]
pub struct ProbeSet {
    probes: Vec<Arc<dyn Probe>>,
    timeout: Option<Duration>,
}

impl ProbeSet {
    pub fn new(probes: Vec<Arc<dyn Probe>>) -> Self {
        Self {
            probes,
            timeout: None,
        }
    }

    /// Caps each probe's sampling time. `None` keeps it unbounded.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// CPU, load average and memory probes wired to the configured sources.
    pub fn from_config(config: &ProbesConfig) -> Self {
        let cpu = CommandLine::from_argv(&config.cpu_command)
            .map(|command| CpuProbe::new(Source::Command(command)))
            .unwrap_or_default();

        Self::new(vec![
            Arc::new(cpu),
            Arc::new(LoadAverageProbe::new(Source::File(
                config.loadavg_path.clone(),
            ))),
            Arc::new(MemoryProbe::new(Source::File(config.meminfo_path.clone()))),
        ])
        .with_timeout(config.timeout())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.probes.iter().map(|p| p.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.probes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.probes.is_empty()
    }

    /// Starts every probe concurrently. Returns without waiting; completion
    /// is observed through `barrier`.
    pub fn launch(&self, barrier: &Arc<CompletionBarrier>, report: &ReportBuilder) {
        for probe in &self.probes {
            let guard = barrier.begin();
            spawn_probe(probe.clone(), guard, report.clone(), self.timeout);
        }
    }
}

fn spawn_probe(
    probe: Arc<dyn Probe>,
    guard: PendingGuard,
    report: ReportBuilder,
    timeout: Option<Duration>,
) {
    let span = debug_span!("probe", name = probe.name());
    tokio::spawn(
        async move {
            run_probe(probe.as_ref(), &report, timeout).await;
            drop(report);
            guard.finish();
        }
        .instrument(span),
    );
}

async fn run_probe(probe: &dyn Probe, report: &ReportBuilder, timeout: Option<Duration>) {
    let sampled = match timeout {
        Some(limit) => tokio::time::timeout(limit, probe.sample())
            .await
            .unwrap_or_else(|_| {
                Err(ProbeError::Timeout {
                    probe: probe.name().to_string(),
                    after: limit,
                })
            }),
        None => probe.sample().await,
    };

    match sampled.and_then(|raw| probe.apply(&raw, report)) {
        Ok(()) => debug!("Probe completed"),
        Err(e) => probe.on_failure(&e),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::atomic::{AtomicUsize, Ordering},
    };

    use tracing_test::traced_test;

    use super::*;
    use crate::core::probes::types::ProbeResult;

    /// Probe whose behavior is scripted by the test.
    struct ScriptedProbe {
        delay: Duration,
        outcome: Result<f64, &'static str>,
        failures: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl Probe for ScriptedProbe {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn sample(&self) -> ProbeResult<String> {
            tokio::time::sleep(self.delay).await;
            match self.outcome {
                Ok(v) => Ok(v.to_string()),
                Err(msg) => Err(ProbeError::EmptyOutput {
                    location: msg.to_string(),
                }),
            }
        }

        fn apply(&self, raw: &str, report: &ReportBuilder) -> ProbeResult<()> {
            report.set_cpu_usage(raw.parse().unwrap());
            Ok(())
        }

        fn on_failure(&self, _error: &ProbeError) {
            self.failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn scripted(
        delay_ms: u64,
        outcome: Result<f64, &'static str>,
    ) -> (Arc<dyn Probe>, Arc<AtomicUsize>) {
        let failures = Arc::new(AtomicUsize::new(0));
        let probe: Arc<dyn Probe> = Arc::new(ScriptedProbe {
            delay: Duration::from_millis(delay_ms),
            outcome,
            failures: failures.clone(),
        });
        (probe, failures)
    }

    #[test]
    fn default_set_has_three_probes() {
        let set = ProbeSet::from_config(&ProbesConfig::default());
        assert_eq!(set.names(), vec!["cpu", "loadavg", "memory"]);
        assert_eq!(set.len(), 3);
        assert!(!set.is_empty());
    }

    #[tokio::test]
    async fn launch_registers_every_probe_before_returning() {
        let (slow, _) = scripted(50, Ok(1.0));
        let set = ProbeSet::new(vec![slow.clone(), slow]);
        let barrier = Arc::new(CompletionBarrier::default());
        let report = ReportBuilder::new("host");

        set.launch(&barrier, &report);
        assert_eq!(barrier.pending(), 2);

        barrier.wait_idle().await;
        assert_eq!(report.snapshot().cpu_usage, Some(1.0));
    }

    #[tokio::test]
    async fn failure_is_handled_and_still_ends() {
        let (failing, failures) = scripted(5, Err("nothing"));
        let set = ProbeSet::new(vec![failing]);
        let barrier = Arc::new(CompletionBarrier::default());
        let report = ReportBuilder::new("host");

        set.launch(&barrier, &report);
        barrier.wait_idle().await;

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(report.snapshot().cpu_usage.is_none());
    }

    #[tokio::test]
    async fn timeout_turns_hung_probe_into_failure() {
        let (hung, failures) = scripted(10_000, Ok(5.0));
        let set = ProbeSet::new(vec![hung]).with_timeout(Some(Duration::from_millis(30)));
        let barrier = Arc::new(CompletionBarrier::default());
        let report = ReportBuilder::new("host");

        set.launch(&barrier, &report);
        tokio::time::timeout(Duration::from_secs(2), barrier.wait_idle())
            .await
            .expect("timeout should release the barrier");

        assert_eq!(failures.load(Ordering::SeqCst), 1);
        assert!(report.snapshot().cpu_usage.is_none());
    }

    #[tokio::test]
    #[traced_test]
    async fn configured_sources_fill_the_report() {
        let mut loadavg = tempfile::NamedTempFile::new().unwrap();
        writeln!(loadavg, "0.10 0.25 0.30 1/100 4242").unwrap();
        let mut meminfo = tempfile::NamedTempFile::new().unwrap();
        writeln!(meminfo, "MemTotal:    16384000 kB\nMemFree:      512000 kB").unwrap();

        let config = ProbesConfig {
            cpu_command: vec!["sh".into(), "-c".into(), "echo vmstat missing >&2".into()],
            loadavg_path: loadavg.path().to_path_buf(),
            meminfo_path: meminfo.path().to_path_buf(),
            ..Default::default()
        };

        let set = ProbeSet::from_config(&config);
        let barrier = Arc::new(CompletionBarrier::default());
        let report = ReportBuilder::new("host");
        set.launch(&barrier, &report);
        barrier.wait_idle().await;

        let report = report.finish();
        assert!(report.cpu_usage.is_none());
        assert_eq!(report.load_avg.unwrap().five_minutes, "0.25");
        assert_eq!(report.memory_usage.unwrap().memory_free, "512000");
        assert!(logs_contain("vmstat missing"));
    }
}
