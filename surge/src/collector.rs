use crate::measurement::Measurement;
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;
use surge_core::{Aggregates, Sample, SampleKind};
use tokio::time::Instant;

/// Append-only sample store shared by every virtual user.
///
/// Besides the full history used for the final aggregates, request outcomes are also
/// counted into a window that the scheduler drains for progress reports.
pub struct MetricsCollector {
    started: Instant,
    samples: AtomicBucket<Sample>,
    recorded: AtomicUsize,
    window: WindowAtomics,
}

struct WindowAtomics {
    success: AtomicU64,
    error: AtomicU64,
    iterations: AtomicU64,
    latency: AtomicBucket<Duration>,
}

impl WindowAtomics {
    fn new() -> Self {
        Self {
            success: AtomicU64::new(0),
            error: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            latency: AtomicBucket::new(),
        }
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            samples: AtomicBucket::new(),
            recorded: AtomicUsize::new(0),
            window: WindowAtomics::new(),
        }
    }

    /// When the collector was created; sample timestamps are offsets from this instant.
    pub fn started(&self) -> Instant {
        self.started
    }

    pub fn record(&self, sample: Sample) {
        match sample.kind {
            SampleKind::Request => {
                let counter = if sample.success {
                    &self.window.success
                } else {
                    &self.window.error
                };
                counter.fetch_add(1, Ordering::Relaxed);
                self.window.latency.push(sample.duration);
            }
            SampleKind::Iteration if sample.success => {
                self.window.iterations.fetch_add(1, Ordering::Relaxed);
            }
            _ => {}
        }

        #[cfg(feature = "metrics")]
        mirror(&sample);

        self.samples.push(sample);
        self.recorded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_all(&self, samples: impl IntoIterator<Item = Sample>) {
        for sample in samples {
            self.record(sample);
        }
    }

    /// Point-in-time aggregates over everything recorded so far.
    pub fn snapshot(&self) -> Aggregates {
        Aggregates::from_samples(&self.samples.data(), self.started.elapsed())
    }

    pub fn len(&self) -> usize {
        self.recorded.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Everything recorded since the previous call, summarised over `elapsed`.
    pub fn drain_window(&self, elapsed: Duration) -> Measurement {
        let success = self.window.success.swap(0, Ordering::Relaxed);
        let error = self.window.error.swap(0, Ordering::Relaxed);
        let iterations = self.window.iterations.swap(0, Ordering::Relaxed);
        let mut measurement = Measurement::new(success, error, iterations, elapsed);
        self.window
            .latency
            .clear_with(|dur| measurement.populate_latencies(dur));
        measurement
    }
}

#[cfg(feature = "metrics")]
fn mirror(sample: &Sample) {
    let labels = sample.kind.labels();
    let operation = sample.operation.to_string();

    metrics::counter!(labels.total, "operation" => operation.clone()).increment(1);
    if !sample.success {
        metrics::counter!(labels.failed, "operation" => operation.clone()).increment(1);
    }
    if sample.kind != SampleKind::Check {
        metrics::histogram!(labels.duration, "operation" => operation)
            .record(sample.duration.as_secs_f64());
    }
}
