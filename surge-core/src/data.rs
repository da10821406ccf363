use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleKind {
    /// One network call, including authentication calls.
    Request,
    /// One boolean check over a response.
    Check,
    /// One iteration of the scenario (or one aborted virtual user).
    Iteration,
}

/// A single recorded outcome. Immutable once recorded.
#[derive(Debug, Clone)]
pub struct Sample {
    pub operation: Arc<str>,
    pub kind: SampleKind,
    pub duration: Duration,
    pub success: bool,
    /// Offset from the start of the run.
    pub timestamp: Duration,
}

impl Sample {
    pub fn new(
        operation: impl Into<Arc<str>>,
        kind: SampleKind,
        duration: Duration,
        success: bool,
        timestamp: Duration,
    ) -> Self {
        Self {
            operation: operation.into(),
            kind,
            duration,
            success,
            timestamp,
        }
    }

    pub fn request(operation: impl Into<Arc<str>>, duration: Duration, success: bool) -> Self {
        Self::new(operation, SampleKind::Request, duration, success, Duration::ZERO)
    }

    pub fn check(operation: impl Into<Arc<str>>, success: bool) -> Self {
        Self::new(
            operation,
            SampleKind::Check,
            Duration::ZERO,
            success,
            Duration::ZERO,
        )
    }

    pub fn iteration(operation: impl Into<Arc<str>>, duration: Duration, success: bool) -> Self {
        Self::new(
            operation,
            SampleKind::Iteration,
            duration,
            success,
            Duration::ZERO,
        )
    }

    pub fn at(mut self, timestamp: Duration) -> Self {
        self.timestamp = timestamp;
        self
    }
}

/// Nearest-rank percentile over an ascending slice.
///
/// The rank is `ceil(p / 100 * n)` clamped to `[1, n]`, so the result is always one of the
/// observed values and repeated calls over the same data agree.
pub fn percentile(sorted: &[Duration], p: f64) -> Option<Duration> {
    if sorted.is_empty() || !p.is_finite() {
        return None;
    }

    let n = sorted.len();
    Some(sorted[nearest_rank(p.clamp(0., 100.), n).clamp(1, n) - 1])
}

/// `ceil(p * n / 100)`, exact for integral and short decimal `p` such as `99.9`.
fn nearest_rank(p: f64, n: usize) -> usize {
    const SCALE: f64 = 1_000_000.;
    let scaled = (p * SCALE).round();
    if (scaled / SCALE - p).abs() <= f64::EPSILON * 100. {
        // p * n / 100 == scaled * n / (100 * SCALE), done in integers
        let numerator = scaled as u128 * n as u128;
        let denominator = 100 * SCALE as u128;
        return numerator.div_ceil(denominator) as usize;
    }
    (p * n as f64 / 100.).ceil() as usize
}

/// Derived statistics over one group of samples.
#[derive(Debug, Clone, Default)]
pub struct MetricAggregate {
    durations: Vec<Duration>,
    failures: u64,
}

impl MetricAggregate {
    pub fn from_samples<'a>(samples: impl IntoIterator<Item = &'a Sample>) -> Self {
        let mut aggregate = Self::default();
        for sample in samples {
            aggregate.push(sample);
        }
        aggregate.finish();
        aggregate
    }

    fn push(&mut self, sample: &Sample) {
        self.durations.push(sample.duration);
        if !sample.success {
            self.failures += 1;
        }
    }

    fn finish(&mut self) {
        self.durations.sort_unstable();
    }

    pub fn count(&self) -> u64 {
        self.durations.len() as u64
    }

    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn successes(&self) -> u64 {
        self.count() - self.failures
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    /// Fraction of samples that failed.
    pub fn error_rate(&self) -> Option<f64> {
        (!self.is_empty()).then(|| self.failures as f64 / self.count() as f64)
    }

    /// Fraction of samples that succeeded.
    pub fn pass_rate(&self) -> Option<f64> {
        self.error_rate().map(|rate| 1. - rate)
    }

    pub fn percentile(&self, p: f64) -> Option<Duration> {
        percentile(&self.durations, p)
    }

    pub fn median(&self) -> Option<Duration> {
        self.percentile(50.)
    }

    pub fn min(&self) -> Option<Duration> {
        self.durations.first().copied()
    }

    pub fn max(&self) -> Option<Duration> {
        self.durations.last().copied()
    }

    pub fn mean(&self) -> Option<Duration> {
        if self.is_empty() {
            return None;
        }

        let secs: Vec<f64> = self.durations.iter().map(Duration::as_secs_f64).collect();
        Some(Duration::from_secs_f64(statistical::mean(&secs)))
    }

    pub fn std_dev(&self) -> Option<Duration> {
        if self.durations.len() < 2 {
            return None;
        }

        let secs: Vec<f64> = self.durations.iter().map(Duration::as_secs_f64).collect();
        Some(Duration::from_secs_f64(statistical::standard_deviation(
            &secs, None,
        )))
    }
}

/// Point-in-time, read-only view over everything the collector has recorded.
#[derive(Debug, Clone, Default)]
pub struct Aggregates {
    by_kind: BTreeMap<SampleKind, MetricAggregate>,
    by_operation: BTreeMap<(SampleKind, Arc<str>), MetricAggregate>,
    /// Successful iterations only; interrupted users never completed one.
    completed: MetricAggregate,
    completed_by_operation: BTreeMap<Arc<str>, MetricAggregate>,
    elapsed: Duration,
}

impl Aggregates {
    pub fn from_samples(samples: &[Sample], elapsed: Duration) -> Self {
        let mut by_kind: BTreeMap<SampleKind, MetricAggregate> = BTreeMap::new();
        let mut by_operation: BTreeMap<(SampleKind, Arc<str>), MetricAggregate> = BTreeMap::new();
        let mut completed = MetricAggregate::default();
        let mut completed_by_operation: BTreeMap<Arc<str>, MetricAggregate> = BTreeMap::new();

        for sample in samples {
            by_kind.entry(sample.kind).or_default().push(sample);
            by_operation
                .entry((sample.kind, sample.operation.clone()))
                .or_default()
                .push(sample);

            if sample.kind == SampleKind::Iteration && sample.success {
                completed.push(sample);
                completed_by_operation
                    .entry(sample.operation.clone())
                    .or_default()
                    .push(sample);
            }
        }

        by_kind.values_mut().for_each(MetricAggregate::finish);
        by_operation.values_mut().for_each(MetricAggregate::finish);
        completed.finish();
        completed_by_operation
            .values_mut()
            .for_each(MetricAggregate::finish);

        Self {
            by_kind,
            by_operation,
            completed,
            completed_by_operation,
            elapsed,
        }
    }

    /// Aggregate over every sample of one kind. Empty when nothing of that kind was recorded.
    pub fn kind(&self, kind: SampleKind) -> MetricAggregate {
        self.by_kind.get(&kind).cloned().unwrap_or_default()
    }

    pub fn kind_ref(&self, kind: SampleKind) -> Option<&MetricAggregate> {
        self.by_kind.get(&kind)
    }

    pub fn operation(&self, kind: SampleKind, operation: &str) -> Option<&MetricAggregate> {
        self.by_operation.get(&(kind, Arc::from(operation)))
    }

    pub fn operations(&self) -> impl Iterator<Item = (SampleKind, &str, &MetricAggregate)> {
        self.by_operation
            .iter()
            .map(|((kind, name), aggregate)| (*kind, name.as_ref(), aggregate))
    }

    pub fn requests(&self) -> MetricAggregate {
        self.kind(SampleKind::Request)
    }

    pub fn checks(&self) -> MetricAggregate {
        self.kind(SampleKind::Check)
    }

    pub fn iterations(&self) -> MetricAggregate {
        self.kind(SampleKind::Iteration)
    }

    /// Completed iterations. `None` until any iteration, completed or interrupted, was recorded.
    pub fn completed_iterations(&self) -> Option<&MetricAggregate> {
        self.by_kind
            .contains_key(&SampleKind::Iteration)
            .then_some(&self.completed)
    }

    pub fn completed_iteration(&self, operation: &str) -> Option<&MetricAggregate> {
        self.completed_by_operation.get(operation)
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }
}
