//! Per-cycle report and the builder probes write into.
//!
//! A [`Report`] always carries the host name; every metric group is optional
//! and simply left out of the datagram when its probe failed. The wire
//! encoding is camelCase JSON:
//!
//! ```text
//! {"name":"web-01","cpuUsage":13,
//!  "loadAvg":{"oneMinute":"0.10","fiveMinutes":"0.25","fifteenMinutes":"0.30"},
//!  "memoryUsage":{"memoryTotal":"16384000","memoryFree":"512000"}}
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize, Serializer};

/// Load averages as printed by the kernel, kept as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadAverage {
    pub one_minute: String,
    pub five_minutes: String,
    pub fifteen_minutes: String,
}

/// Total and free memory in kilobytes, kept as decimal strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryUsage {
    pub memory_total: String,
    pub memory_free: String,
}

/// One datagram worth of host health.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub name: String,

    /// `100 - idle` percentage from the CPU sampler. Whole values go on the
    /// wire as integers (`13`, not `13.0`).
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_percentage"
    )]
    pub cpu_usage: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub load_avg: Option<LoadAverage>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_usage: Option<MemoryUsage>,
}

impl Report {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// UTF-8 JSON payload for the transport.
    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }

    /// Names of the metric groups present, for log lines.
    pub fn present_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::with_capacity(3);
        if self.cpu_usage.is_some() {
            fields.push("cpuUsage");
        }
        if self.load_avg.is_some() {
            fields.push("loadAvg");
        }
        if self.memory_usage.is_some() {
            fields.push("memoryUsage");
        }
        fields
    }
}

fn serialize_percentage<S>(value: &Option<f64>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    match value {
        Some(v) if v.fract() == 0.0 && v.abs() <= i64::MAX as f64 => {
            serializer.serialize_some(&(*v as i64))
        }
        Some(v) => serializer.serialize_some(v),
        None => serializer.serialize_none(),
    }
}

/// Shared accumulator for the report of the running cycle.
///
/// Cloned into every probe task. Each probe owns a disjoint set of fields,
/// so the mutex only guards memory safety, never ordering.
#[derive(Debug, Clone)]
pub struct ReportBuilder {
    inner: Arc<Mutex<Report>>,
}

impl ReportBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Report::new(name))),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Report> {
        // A panicking probe cannot leave a field half-written, so the data
        // behind a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_cpu_usage(&self, usage: f64) {
        self.lock().cpu_usage = Some(usage);
    }

    pub fn set_load_avg(&self, load: LoadAverage) {
        self.lock().load_avg = Some(load);
    }

    pub fn set_memory_usage(&self, memory: MemoryUsage) {
        self.lock().memory_usage = Some(memory);
    }

    /// Copy of the report as it stands now.
    pub fn snapshot(&self) -> Report {
        self.lock().clone()
    }

    /// Freezes the report. Call only once the cycle's barrier is idle.
    pub fn finish(self) -> Report {
        match Arc::try_unwrap(self.inner) {
            Ok(mutex) => mutex.into_inner().unwrap_or_else(PoisonError::into_inner),
            Err(shared) => shared
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
