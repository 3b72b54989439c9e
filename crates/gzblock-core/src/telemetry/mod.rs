//! Process-wide counters and histograms for pipeline runs.
//!
//! Recording is compiled in with the `telemetry` feature. Without it every
//! recorder is a no-op and [`snapshot`] returns an empty view, so call sites
//! never need their own `cfg` guards.

use std::collections::BTreeMap;

use serde::Serialize;

pub mod progress;
pub mod tags;
pub mod worker;

pub use progress::{NoProgress, ProgressSink};

/// Summary of one histogram.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct HistogramSnapshot {
    pub count: u64,
    pub total: u64,
    pub min: u64,
    pub max: u64,
    pub mean: f64,
}

/// Point-in-time copy of every recorded metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TelemetrySnapshot {
    pub counters: BTreeMap<String, u64>,
    pub histograms: BTreeMap<String, HistogramSnapshot>,
}

impl TelemetrySnapshot {
    pub fn counter(&self, name: &str) -> Option<u64> {
        self.counters.get(name).copied()
    }

    pub fn histogram(&self, name: &str) -> Option<HistogramSnapshot> {
        self.histograms.get(name).copied()
    }
}

/// Increments a named counter by `value`.
///
/// Labels document the call site; the in-process registry keys on the name only.
#[inline]
pub fn increment_counter(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::increment_counter(name, value);

    let _ = (name, value);
}

/// Records one histogram sample.
#[inline]
pub fn record_histogram(name: &'static str, value: u64, _labels: &[(&str, &str)]) {
    #[cfg(feature = "telemetry")]
    registry::record_histogram(name, value);

    let _ = (name, value);
}

pub fn snapshot() -> TelemetrySnapshot {
    #[cfg(feature = "telemetry")]
    {
        registry::snapshot()
    }

    #[cfg(not(feature = "telemetry"))]
    {
        TelemetrySnapshot::default()
    }
}

pub fn reset() {
    #[cfg(feature = "telemetry")]
    registry::reset();
}

#[cfg(feature = "telemetry")]
mod registry {
    use std::collections::BTreeMap;
    use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};

    use super::{HistogramSnapshot, TelemetrySnapshot};

    #[derive(Debug, Clone, Copy, Default)]
    struct Aggregate {
        count: u64,
        total: u64,
        min: u64,
        max: u64,
    }

    impl Aggregate {
        fn record(&mut self, value: u64) {
            if self.count == 0 {
                self.min = value;
                self.max = value;
            } else {
                self.min = self.min.min(value);
                self.max = self.max.max(value);
            }
            self.count = self.count.saturating_add(1);
            self.total = self.total.saturating_add(value);
        }

        fn summary(&self) -> HistogramSnapshot {
            let mean = if self.count == 0 {
                0.0
            } else {
                self.total as f64 / self.count as f64
            };
            HistogramSnapshot {
                count: self.count,
                total: self.total,
                min: self.min,
                max: self.max,
                mean,
            }
        }
    }

    #[derive(Default)]
    struct Registry {
        counters: BTreeMap<&'static str, u64>,
        histograms: BTreeMap<&'static str, Aggregate>,
    }

    fn registry() -> MutexGuard<'static, Registry> {
        static REGISTRY: OnceLock<Mutex<Registry>> = OnceLock::new();
        REGISTRY
            .get_or_init(|| Mutex::new(Registry::default()))
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(super) fn increment_counter(name: &'static str, value: u64) {
        let mut registry = registry();
        let entry = registry.counters.entry(name).or_insert(0);
        *entry = entry.saturating_add(value);
    }

    pub(super) fn record_histogram(name: &'static str, value: u64) {
        registry().histograms.entry(name).or_default().record(value);
    }

    pub(super) fn snapshot() -> TelemetrySnapshot {
        let registry = registry();
        TelemetrySnapshot {
            counters: registry
                .counters
                .iter()
                .map(|(name, value)| ((*name).to_owned(), *value))
                .collect(),
            histograms: registry
                .histograms
                .iter()
                .map(|(name, aggregate)| ((*name).to_owned(), aggregate.summary()))
                .collect(),
        }
    }

    pub(super) fn reset() {
        let mut registry = registry();
        registry.counters.clear();
        registry.histograms.clear();
    }
}
