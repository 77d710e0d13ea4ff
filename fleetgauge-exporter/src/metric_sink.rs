use fleetgauge_core::Timestamp;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use crate::series_naming::{SeriesKey, SeriesNaming};

/// All series values of one replayed timestamp.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SeriesFrame {
    pub(crate) timestamp: Timestamp,
    pub(crate) values: Vec<(SeriesKey, f64)>,
}

/// Destination of the replayed gauges.
pub(crate) trait MetricSink: Send + Sync {
    fn set(&self, key: &SeriesKey, value: f64);

    /// Applies a whole frame. Sinks that can be read concurrently override
    /// this so that readers never see two timestamps mixed.
    fn publish(&self, frame: &SeriesFrame) {
        for (key, value) in &frame.values {
            self.set(key, *value);
        }
    }
}

/// Sink backed by the global `metrics` recorder, served by the Prometheus
/// HTTP listener installed in `init_metrics`.
#[derive(Debug, Default)]
pub(crate) struct PrometheusSink;

impl PrometheusSink {
    pub(crate) fn new() -> Self {
        PrometheusSink
    }

    /// Registers help text for every series the naming can produce.
    pub(crate) fn describe(&self, naming: &SeriesNaming) {
        for (name, description) in naming.descriptions() {
            metrics::describe_gauge!(name, description);
        }
    }
}

impl MetricSink for PrometheusSink {
    fn set(&self, key: &SeriesKey, value: f64) {
        metrics::gauge!(key.name.clone(), &key.labels).set(value);
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    timestamp: Option<Timestamp>,
    values: HashMap<SeriesKey, f64>,
}

/// In-process sink holding the latest value of every series.
#[derive(Debug, Default)]
pub(crate) struct MemorySink {
    state: RwLock<MemoryState>,
    frames: AtomicU64,
}

impl MemorySink {
    pub(crate) fn new() -> Self {
        MemorySink::default()
    }

    pub(crate) fn get(&self, key: &SeriesKey) -> Option<f64> {
        self.read(|state| state.values.get(key).copied())
    }

    /// Timestamp of the last published frame.
    pub(crate) fn timestamp(&self) -> Option<Timestamp> {
        self.read(|state| state.timestamp)
    }

    /// Consistent copy of the current values and the frame they belong to.
    pub(crate) fn snapshot(&self) -> (Option<Timestamp>, HashMap<SeriesKey, f64>) {
        self.read(|state| (state.timestamp, state.values.clone()))
    }

    pub(crate) fn frames_published(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn read<T>(&self, f: impl FnOnce(&MemoryState) -> T) -> T {
        let guard = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&guard)
    }
}

impl MetricSink for MemorySink {
    fn set(&self, key: &SeriesKey, value: f64) {
        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        guard.values.insert(key.clone(), value);
    }

    fn publish(&self, frame: &SeriesFrame) {
        let values: HashMap<SeriesKey, f64> = frame.values.iter().cloned().collect();

        let mut guard = self.state.write().unwrap_or_else(|e| e.into_inner());
        guard.values = values;
        guard.timestamp = Some(frame.timestamp);
        drop(guard);

        self.frames.fetch_add(1, Ordering::Relaxed);
    }
}
