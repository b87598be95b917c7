//! The perpetual collect-and-send loop.
//!
//! Each cycle builds a fresh barrier and report, launches every probe,
//! waits for the barrier to go idle, sends the report, and only then starts
//! the next cycle. There is no delay between cycles: a slow host reports
//! less often instead of stacking up overlapping cycles.

use std::{convert::Infallible, sync::Arc, time::Duration};

use tracing::{debug, error, info, Instrument};

use super::{
    barrier::{CompletionBarrier, DEFAULT_POLL_INTERVAL},
    hostname::{HostnameResolver, ResolveError},
    probes::ProbeSet,
    report::{Report, ReportBuilder},
    state::{Phase, StateTracker},
    transport::{Transport, UdpTransport},
};
use crate::config::Config;

pub struct Scheduler {
    hostname: String,
    probes: ProbeSet,
    transport: Arc<dyn Transport>,
    poll_interval: Duration,
    state: StateTracker,
}

impl Scheduler {
    pub fn new(
        hostname: impl Into<String>,
        probes: ProbeSet,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            hostname: hostname.into(),
            probes,
            transport,
            poll_interval: DEFAULT_POLL_INTERVAL,
            state: StateTracker::new(),
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn with_state(mut self, state: StateTracker) -> Self {
        self.state = state;
        self
    }

    /// Resolves the hostname (unless configured) and wires probes and the
    /// UDP transport from `config`.
    ///
    /// # Errors
    ///
    /// Returns `ResolveError` when no hostname can be determined; the agent
    /// must not start in that case.
    pub async fn bootstrap(config: &Config, state: StateTracker) -> Result<Self, ResolveError> {
        state.set_phase(Phase::ResolvingHostname);

        let resolver = HostnameResolver::from_config(&config.probes);
        let hostname = resolver
            .resolve_or(config.agent.hostname_override())
            .await?;

        let transport = Arc::new(UdpTransport::new(config.collector.clone()));
        Ok(Self::new(hostname, ProbeSet::from_config(&config.probes), transport)
            .with_poll_interval(config.probes.barrier_poll_interval())
            .with_state(state))
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn state(&self) -> &StateTracker {
        &self.state
    }

    /// Runs one full cycle and returns the report that was sent.
    ///
    /// Probe and transport failures are logged here and never abort the
    /// cycle. A probe that never finishes stalls this call indefinitely
    /// unless a probe timeout is configured.
    pub async fn run_cycle(&self) -> Report {
        let cycle = self.state.begin_cycle();
        let span = tracing::debug_span!("cycle", n = cycle);

        async {
            let barrier = Arc::new(CompletionBarrier::new(self.poll_interval));
            let builder = ReportBuilder::new(self.hostname.as_str());

            self.probes.launch(&barrier, &builder);

            self.state.set_phase(Phase::AwaitingBarrier);
            let report = barrier.on_idle(|| builder.finish()).await;

            self.state.set_phase(Phase::Sending);
            match self.transport.send(&report).await {
                Ok(bytes) => debug!(
                    bytes,
                    fields = ?report.present_fields(),
                    "Report sent"
                ),
                Err(e) => error!("Failed to send report: {}", e),
            }
            report
        }
        .instrument(span)
        .await
    }

    /// Runs cycles back to back until the process is stopped. Never returns.
    pub async fn run(self) -> Infallible {
        info!(
            "Starting main loop: host '{}', probes {:?}",
            self.hostname,
            self.probes.names()
        );

        loop {
            self.run_cycle().await;
            // Let other tasks (signal handling) in before the next cycle.
            tokio::task::yield_now().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Write,
        sync::{
            atomic::{AtomicUsize, Ordering},
            Mutex,
        },
    };

    use tokio::time::{sleep, timeout};
    use tracing_test::traced_test;

    use super::*;
    use crate::{
        config::agent::{CollectorEndpoint, ProbesConfig},
        core::{
            probes::{error::ProbeError, traits::Probe, types::ProbeResult},
            transport::TransportError,
        },
    };

    #[derive(Default)]
    struct MockTransport {
        sent: Mutex<Vec<Report>>,
    }

    impl MockTransport {
        fn sent(&self) -> Vec<Report> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl Transport for MockTransport {
        async fn send(&self, report: &Report) -> Result<usize, TransportError> {
            self.sent.lock().unwrap().push(report.clone());
            Ok(report.to_json()?.len())
        }
    }

    struct FailingTransport {
        attempts: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _report: &Report) -> Result<usize, TransportError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TransportError::Bind(std::io::Error::new(
                std::io::ErrorKind::AddrNotAvailable,
                "no network",
            )))
        }
    }

    /// Shared event log used to check cycle ordering.
    type Events = Arc<Mutex<Vec<&'static str>>>;

    struct RecordingProbe {
        events: Events,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Probe for RecordingProbe {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn sample(&self) -> ProbeResult<String> {
            self.events.lock().unwrap().push("probe-start");
            sleep(self.delay).await;
            self.events.lock().unwrap().push("probe-end");
            Ok(String::new())
        }

        fn apply(&self, _raw: &str, _report: &ReportBuilder) -> ProbeResult<()> {
            Ok(())
        }
    }

    struct RecordingTransport {
        events: Events,
    }

    #[async_trait::async_trait]
    impl Transport for RecordingTransport {
        async fn send(&self, _report: &Report) -> Result<usize, TransportError> {
            self.events.lock().unwrap().push("send-start");
            sleep(Duration::from_millis(5)).await;
            self.events.lock().unwrap().push("send-end");
            Ok(0)
        }
    }

    struct HungProbe;

    #[async_trait::async_trait]
    impl Probe for HungProbe {
        fn name(&self) -> &'static str {
            "hung"
        }

        async fn sample(&self) -> ProbeResult<String> {
            std::future::pending::<()>().await;
            Err(ProbeError::EmptyOutput {
                location: "never".into(),
            })
        }

        fn apply(&self, _raw: &str, _report: &ReportBuilder) -> ProbeResult<()> {
            Ok(())
        }
    }

    struct Fixtures {
        _loadavg: tempfile::NamedTempFile,
        _meminfo: tempfile::NamedTempFile,
        probes: ProbesConfig,
    }

    fn fixtures(cpu_script: &str) -> Fixtures {
        let mut loadavg = tempfile::NamedTempFile::new().unwrap();
        writeln!(loadavg, "0.10, 0.25 0.30 2/300 999").unwrap();
        let mut meminfo = tempfile::NamedTempFile::new().unwrap();
        writeln!(meminfo, "MemTotal:    16384000 kB\nMemFree:      512000 kB").unwrap();

        let probes = ProbesConfig {
            cpu_command: vec!["sh".into(), "-c".into(), cpu_script.into()],
            loadavg_path: loadavg.path().to_path_buf(),
            meminfo_path: meminfo.path().to_path_buf(),
            ..Default::default()
        };
        Fixtures {
            _loadavg: loadavg,
            _meminfo: meminfo,
            probes,
        }
    }

    #[tokio::test]
    #[traced_test]
    async fn cpu_failure_still_sends_other_groups() {
        let fx = fixtures("echo 'vmstat: command not found' >&2");
        let transport = Arc::new(MockTransport::default());
        let probes = ProbeSet::from_config(&fx.probes);
        let scheduler = Scheduler::new("web-01", probes, transport.clone());

        let report = scheduler.run_cycle().await;

        assert_eq!(report.name, "web-01");
        assert!(report.cpu_usage.is_none());
        assert_eq!(report.load_avg.as_ref().unwrap().one_minute, "0.10");
        assert_eq!(report.memory_usage.as_ref().unwrap().memory_total, "16384000");
        assert_eq!(transport.sent(), vec![report]);
        assert!(logs_contain("Probe failed"));
    }

    #[tokio::test]
    async fn full_cycle_fills_every_group() {
        let vmstat =
            "printf 'h1\\nh2\\n1 0 0 1 1 1 0 0 0 0 0 0 3 1 95 1 0\\n0 0 0 1 1 1 0 0 0 0 0 0 10 3 87 0 0\\n'";
        let fx = fixtures(vmstat);
        let transport = Arc::new(MockTransport::default());
        let probes = ProbeSet::from_config(&fx.probes);
        let scheduler = Scheduler::new("web-01", probes, transport.clone());

        let report = scheduler.run_cycle().await;

        assert_eq!(report.cpu_usage, Some(13.0));
        assert_eq!(report.present_fields(), vec!["cpuUsage", "loadAvg", "memoryUsage"]);
        assert_eq!(scheduler.state().current().phase, Phase::Sending);
        assert_eq!(scheduler.state().current().cycle, 1);
    }

    #[tokio::test]
    #[traced_test]
    async fn transport_failure_does_not_stop_the_next_cycle() {
        let transport = Arc::new(FailingTransport {
            attempts: AtomicUsize::new(0),
        });
        let scheduler = Scheduler::new("web-01", ProbeSet::new(Vec::new()), transport.clone());

        scheduler.run_cycle().await;
        scheduler.run_cycle().await;

        assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.state().current().cycle, 2);
        assert!(logs_contain("Failed to send report"));
    }

    #[tokio::test]
    async fn cycles_never_overlap() {
        let events: Events = Arc::new(Mutex::new(Vec::new()));
        let probes: Vec<Arc<dyn Probe>> = (0..3u64)
            .map(|i| {
                Arc::new(RecordingProbe {
                    events: events.clone(),
                    delay: Duration::from_millis(2 + i * 3),
                }) as Arc<dyn Probe>
            })
            .collect();
        let transport = Arc::new(RecordingTransport {
            events: events.clone(),
        });
        let scheduler = Scheduler::new("web-01", ProbeSet::new(probes), transport)
            .with_poll_interval(Duration::from_millis(1));

        let handle = tokio::spawn(scheduler.run());
        sleep(Duration::from_millis(200)).await;
        handle.abort();

        let events = events.lock().unwrap().clone();
        let sends = events.iter().filter(|e| **e == "send-end").count();
        assert!(sends >= 2, "expected several cycles, got {sends}");

        let mut running = 0usize;
        let mut sending = false;
        for event in events {
            match event {
                "probe-start" => {
                    assert!(!sending, "probe started while a report was in flight");
                    running += 1;
                }
                "probe-end" => running -= 1,
                "send-start" => {
                    assert_eq!(running, 0, "report sent before all probes finished");
                    sending = true;
                }
                "send-end" => sending = false,
                _ => unreachable!(),
            }
        }
    }

    #[tokio::test]
    async fn hung_probe_stalls_the_cycle() {
        let transport = Arc::new(MockTransport::default());
        let scheduler = Scheduler::new(
            "web-01",
            ProbeSet::new(vec![Arc::new(HungProbe)]),
            transport.clone(),
        );

        let stalled = timeout(Duration::from_millis(100), scheduler.run_cycle()).await;
        assert!(stalled.is_err());
        assert!(transport.sent().is_empty());
        assert_eq!(scheduler.state().current().phase, Phase::AwaitingBarrier);
    }

    #[tokio::test]
    async fn probe_timeout_unblocks_a_hung_probe() {
        let transport = Arc::new(MockTransport::default());
        let probes = ProbeSet::new(vec![Arc::new(HungProbe)])
            .with_timeout(Some(Duration::from_millis(20)));
        let scheduler = Scheduler::new("web-01", probes, transport.clone());

        let report = timeout(Duration::from_secs(2), scheduler.run_cycle())
            .await
            .expect("timeout should let the cycle finish");
        assert_eq!(report, Report::new("web-01"));
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn bootstrap_prefers_configured_hostname() {
        let config = Config {
            logger: Default::default(),
            agent: crate::config::agent::AgentConfig {
                hostname: Some("pinned".into()),
            },
            collector: CollectorEndpoint {
                host: "127.0.0.1".into(),
                port: 9,
            },
            probes: ProbesConfig {
                hostname_short_command: vec!["false".into()],
                hostname_full_command: vec!["false".into()],
                ..Default::default()
            },
        };

        let scheduler = Scheduler::bootstrap(&config, StateTracker::new())
            .await
            .unwrap();
        assert_eq!(scheduler.hostname(), "pinned");
        assert_eq!(scheduler.state().current().phase, Phase::ResolvingHostname);
    }

    #[tokio::test]
    async fn bootstrap_fails_when_hostname_cannot_be_resolved() {
        let config = Config {
            logger: Default::default(),
            agent: Default::default(),
            collector: CollectorEndpoint {
                host: "127.0.0.1".into(),
                port: 9,
            },
            probes: ProbesConfig {
                hostname_short_command: vec!["false".into()],
                hostname_full_command: vec!["sh".into(), "-c".into(), "echo nope >&2".into()],
                ..Default::default()
            },
        };

        let state = StateTracker::new();
        let result = Scheduler::bootstrap(&config, state.clone()).await;
        assert!(matches!(result, Err(ResolveError::Exhausted { .. })));
        assert_eq!(state.current().cycle, 0, "no cycle may start without a hostname");
    }
}
