//! CPU and memory sampling via `sysinfo`
//!
//! The monitor keeps one `System` alive between samples: CPU usage is the
//! delta between two refreshes, so the very first sample reports 0.

use std::collections::BTreeMap;

use serde::Serialize;
use sysinfo::System;
use tracing::trace;

use crate::storage::MetricStore;

/// Category under which host metrics are stored and broadcast
pub const SYSTEM_CATEGORY: &str = "system";

/// One host-level reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSample {
    /// Global CPU usage as a fraction in `0.0..=1.0`
    pub cpu: f64,
    /// Used memory as a fraction in `0.0..=1.0`
    pub memory: f64,
    pub memory_used: u64,
    pub memory_total: u64,
    /// One-minute load average (0 where the platform has none)
    pub load_average: f64,
}

impl SystemSample {
    /// Metric name/value pairs as stored in the `"system"` category
    pub fn values(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("cpu", self.cpu),
            ("memory", self.memory),
            ("memoryUsed", self.memory_used as f64),
            ("memoryTotal", self.memory_total as f64),
            ("loadAverage", self.load_average),
        ])
    }

    /// Append this sample to the store
    pub async fn record(&self, store: &MetricStore) {
        let timestamp = chrono::Utc::now().timestamp_millis();
        store
            .append_batch(self.values().into_iter().map(|(name, value)| {
                (
                    SYSTEM_CATEGORY.to_string(),
                    name.to_string(),
                    crate::storage::MetricPoint::new(value, timestamp),
                )
            }))
            .await;
    }
}

pub struct SystemMonitor {
    sys: System,
}

impl SystemMonitor {
    pub fn new() -> Self {
        Self { sys: System::new() }
    }

    /// Refresh CPU and memory counters and return a reading
    pub fn sample(&mut self) -> SystemSample {
        self.sys.refresh_cpu_usage();
        self.sys.refresh_memory();

        let memory_total = self.sys.total_memory();
        let memory_used = self.sys.used_memory();
        let memory = if memory_total == 0 {
            0.0
        } else {
            memory_used as f64 / memory_total as f64
        };

        let sample = SystemSample {
            cpu: (self.sys.global_cpu_usage() as f64 / 100.0).clamp(0.0, 1.0),
            memory,
            memory_used,
            memory_total,
            load_average: System::load_average().one,
        };

        trace!("sampled system metrics: {sample:?}");
        sample
    }
}

impl Default for SystemMonitor {
    fn default() -> Self {
        Self::new()
    }
}
