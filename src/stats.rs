//! Statistics Sink Binding
//!
//! A pluggable observer attached to every engine's extension registry at
//! construction time, before the customization hook runs, so instrumentation
//! is visible to per-node custom logic.
//!
//! The default sink is a no-op that never blocks and drops all samples.
//! Swapping to a real sink is a per-fixture configuration choice made once,
//! never per node, and never ambient global state: tests can substitute a
//! [`RecordingStatisticsSink`] without cross-test interference.

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Abstract statistics sink.
///
/// Implementations must never block the caller; a slow exporter drops
/// samples rather than stalling provisioning.
pub trait StatisticsSink: Send + Sync + fmt::Debug {
    /// Record a monotonic count sample.
    fn record_count(&self, name: &str, delta: u64);

    /// Record an elapsed-time sample.
    fn record_duration(&self, name: &str, elapsed: Duration);
}

/// Default sink: drops every sample.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopStatisticsSink;

impl StatisticsSink for NoopStatisticsSink {
    fn record_count(&self, _name: &str, _delta: u64) {}

    fn record_duration(&self, _name: &str, _elapsed: Duration) {}
}

/// Capturing sink for tests.
///
/// Stores every sample; inspect with [`counts`](Self::counts),
/// [`total_count`](Self::total_count), and [`durations`](Self::durations).
#[derive(Debug, Default)]
pub struct RecordingStatisticsSink {
    counts: Mutex<Vec<(String, u64)>>,
    durations: Mutex<Vec<(String, Duration)>>,
}

impl RecordingStatisticsSink {
    /// Create an empty recording sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// All count samples recorded so far, in order.
    #[must_use]
    pub fn counts(&self) -> Vec<(String, u64)> {
        self.counts.lock().expect("stats lock poisoned").clone()
    }

    /// Sum of all count samples recorded under `name`.
    #[must_use]
    pub fn total_count(&self, name: &str) -> u64 {
        self.counts
            .lock()
            .expect("stats lock poisoned")
            .iter()
            .filter(|(sample, _)| sample == name)
            .map(|(_, delta)| delta)
            .sum()
    }

    /// All duration samples recorded so far, in order.
    #[must_use]
    pub fn durations(&self) -> Vec<(String, Duration)> {
        self.durations.lock().expect("stats lock poisoned").clone()
    }
}

impl StatisticsSink for RecordingStatisticsSink {
    fn record_count(&self, name: &str, delta: u64) {
        self.counts
            .lock()
            .expect("stats lock poisoned")
            .push((name.to_string(), delta));
    }

    fn record_duration(&self, name: &str, elapsed: Duration) {
        self.durations
            .lock()
            .expect("stats lock poisoned")
            .push((name.to_string(), elapsed));
    }
}

/// The concrete value registered into each engine's extension registry.
///
/// Registries store `Arc<dyn Any>`, which cannot hold a bare trait object,
/// so the sink is wrapped in this newtype and looked up by its concrete type:
///
/// ```rust,ignore
/// let binding = engine
///     .extensions()
///     .lookup::<StatisticsBinding>(STATISTICS_SERVICE_KIND)
///     .expect("sink bound before customization");
/// binding.sink().record_count("custom.setup", 1);
/// ```
#[derive(Debug, Clone)]
pub struct StatisticsBinding(Arc<dyn StatisticsSink>);

impl StatisticsBinding {
    /// Wrap a sink for registration.
    #[must_use]
    pub fn new(sink: Arc<dyn StatisticsSink>) -> Self {
        Self(sink)
    }

    /// The bound sink.
    #[must_use]
    pub fn sink(&self) -> &Arc<dyn StatisticsSink> {
        &self.0
    }
}
