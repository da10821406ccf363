use crate::SampleKind;
use std::fmt;

/// Built-in metrics that thresholds can be declared against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Latency of every request sample, in milliseconds.
    HttpReqDuration,
    /// Failure rate of request samples.
    HttpReqFailed,
    /// Pass rate of check samples.
    Checks,
    /// Completed iterations.
    Iterations,
    /// Latency of whole iterations, in milliseconds.
    IterationDuration,
}

impl MetricKind {
    pub const ALL: [MetricKind; 5] = [
        MetricKind::HttpReqDuration,
        MetricKind::HttpReqFailed,
        MetricKind::Checks,
        MetricKind::Iterations,
        MetricKind::IterationDuration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetricKind::HttpReqDuration => "http_req_duration",
            MetricKind::HttpReqFailed => "http_req_failed",
            MetricKind::Checks => "checks",
            MetricKind::Iterations => "iterations",
            MetricKind::IterationDuration => "iteration_duration",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Which samples feed this metric.
    pub fn sample_kind(&self) -> SampleKind {
        match self {
            MetricKind::HttpReqDuration | MetricKind::HttpReqFailed => SampleKind::Request,
            MetricKind::Checks => SampleKind::Check,
            MetricKind::Iterations | MetricKind::IterationDuration => SampleKind::Iteration,
        }
    }

    pub fn is_trend(&self) -> bool {
        matches!(
            self,
            MetricKind::HttpReqDuration | MetricKind::IterationDuration
        )
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Names used when mirroring samples into an external metrics recorder.
#[derive(Debug, Copy, Clone)]
pub struct MetricLabels {
    pub total: &'static str,
    pub failed: &'static str,
    pub duration: &'static str,
}

macro_rules! generate_labels {
    ($base_name:ident) => {
        MetricLabels {
            total: concat!("surge_", stringify!($base_name), "_total"),
            failed: concat!("surge_", stringify!($base_name), "_failed_total"),
            duration: concat!("surge_", stringify!($base_name), "_duration_seconds"),
        }
    };
}

pub const REQUEST_LABELS: MetricLabels = generate_labels!(http_reqs);
pub const CHECK_LABELS: MetricLabels = generate_labels!(checks);
pub const ITERATION_LABELS: MetricLabels = generate_labels!(iterations);

impl SampleKind {
    pub fn labels(&self) -> MetricLabels {
        match self {
            SampleKind::Request => REQUEST_LABELS,
            SampleKind::Check => CHECK_LABELS,
            SampleKind::Iteration => ITERATION_LABELS,
        }
    }
}
