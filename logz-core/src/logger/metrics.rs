use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use super::config::LogLevel;

/// Counter incremented once per accepted entry.
pub const LOGS_TOTAL: &str = "logs_total";

/// Counter sink handed to the logger. A disabled sink reports
/// `is_enabled() == false` and the logger skips it entirely.
pub trait MetricsSink: Send + Sync {
    fn increment(&self, name: &str, by: u64);

    fn is_enabled(&self) -> bool {
        true
    }
}

/// Name of the per-level counter, e.g. `logs_total_fatal`.
pub fn level_counter(level: LogLevel) -> String {
    format!("{LOGS_TOTAL}_{}", level.as_lowercase())
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn increment(&self, _name: &str, _by: u64) {}

    fn is_enabled(&self) -> bool {
        false
    }
}

/// Concurrent in-process counter registry.
#[derive(Debug, Default)]
pub struct CounterRegistry {
    counters: DashMap<String, AtomicU64>,
}

impl CounterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> u64 {
        self.counters
            .get(name)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, u64> {
        self.counters
            .iter()
            .map(|c| (c.key().clone(), c.value().load(Ordering::Relaxed)))
            .collect()
    }

    /// Prometheus text exposition of every counter, sorted by name.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in self.snapshot() {
            let _ = writeln!(out, "# TYPE {name} counter");
            let _ = writeln!(out, "{name} {value}");
        }
        out
    }
}

impl MetricsSink for CounterRegistry {
    fn increment(&self, name: &str, by: u64) {
        if let Some(counter) = self.counters.get(name) {
            counter.fetch_add(by, Ordering::Relaxed);
            return;
        }
        self.counters
            .entry(name.to_string())
            .or_default()
            .fetch_add(by, Ordering::Relaxed);
    }
}
