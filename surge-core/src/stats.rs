use crate::{Aggregates, MetricAggregate, Threshold};
use serde::Serialize;
use serde_with::{serde_as, DisplayFromStr, DurationMilliSecondsWithFrac};
use std::fmt;
use std::time::Duration;

/// Latency distribution of one trend metric, as reported at the end of a run.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendSummary {
    pub count: u64,
    pub failed: u64,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub avg: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub min: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub med: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p90: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p95: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p99: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub max: Duration,
}

impl From<&MetricAggregate> for TrendSummary {
    fn from(aggregate: &MetricAggregate) -> Self {
        Self {
            count: aggregate.count(),
            failed: aggregate.failures(),
            avg: aggregate.mean().unwrap_or_default(),
            min: aggregate.min().unwrap_or_default(),
            med: aggregate.median().unwrap_or_default(),
            p90: aggregate.percentile(90.).unwrap_or_default(),
            p95: aggregate.percentile(95.).unwrap_or_default(),
            p99: aggregate.percentile(99.).unwrap_or_default(),
            max: aggregate.max().unwrap_or_default(),
        }
    }
}

impl TrendSummary {
    pub fn error_rate(&self) -> f64 {
        if self.count == 0 {
            0.
        } else {
            self.failed as f64 / self.count as f64
        }
    }
}

/// Outcome of a complete run. Produced once, when the run reaches `Completed`.
#[serde_as]
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub pass: bool,
    #[serde_as(as = "Vec<DisplayFromStr>")]
    pub failed_thresholds: Vec<Threshold>,
    pub requests: TrendSummary,
    /// Completed iterations; interrupted users are counted in `interrupted` instead.
    pub iterations: TrendSummary,
    pub checks_passed: u64,
    pub checks_failed: u64,
    /// Highest number of virtual users running at once.
    pub max_concurrency: usize,
    /// Virtual users aborted because they outlived the graceful stop period.
    pub interrupted: u64,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    #[serde(skip)]
    pub aggregates: Aggregates,
}

impl RunResult {
    pub fn new(
        aggregates: Aggregates,
        failed_thresholds: Vec<Threshold>,
        max_concurrency: usize,
        interrupted: u64,
    ) -> Self {
        let checks = aggregates.checks();
        Self {
            pass: failed_thresholds.is_empty(),
            failed_thresholds,
            requests: TrendSummary::from(&aggregates.requests()),
            iterations: aggregates
                .completed_iterations()
                .map(TrendSummary::from)
                .unwrap_or_default(),
            checks_passed: checks.successes(),
            checks_failed: checks.failures(),
            max_concurrency,
            interrupted,
            elapsed: aggregates.elapsed(),
            aggregates,
        }
    }
}

fn dotted(f: &mut fmt::Formatter<'_>, name: &str) -> fmt::Result {
    write!(f, "  {name:.<32}: ")
}

impl fmt::Display for RunResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let checks_total = self.checks_passed + self.checks_failed;
        if checks_total > 0 {
            dotted(f, "checks")?;
            writeln!(
                f,
                "{:.2}% {} / {}",
                self.checks_passed as f64 / checks_total as f64 * 100.,
                self.checks_passed,
                checks_total
            )?;
        }

        let r = &self.requests;
        dotted(f, "http_req_duration")?;
        writeln!(
            f,
            "avg={:?} min={:?} med={:?} p(90)={:?} p(95)={:?} p(99)={:?} max={:?}",
            r.avg, r.min, r.med, r.p90, r.p95, r.p99, r.max
        )?;
        dotted(f, "http_req_failed")?;
        writeln!(f, "{:.2}% {} / {}", r.error_rate() * 100., r.failed, r.count)?;

        let it = &self.iterations;
        dotted(f, "iterations")?;
        writeln!(f, "{}", it.count)?;
        dotted(f, "iteration_duration")?;
        writeln!(f, "avg={:?} p(95)={:?} max={:?}", it.avg, it.p95, it.max)?;
        dotted(f, "vus_max")?;
        writeln!(f, "{}", self.max_concurrency)?;
        if self.interrupted > 0 {
            dotted(f, "interrupted")?;
            writeln!(f, "{}", self.interrupted)?;
        }
        dotted(f, "elapsed")?;
        writeln!(f, "{}", humantime::format_duration(self.elapsed))?;

        if self.pass {
            write!(f, "  all thresholds passed")
        } else {
            writeln!(f, "  thresholds crossed:")?;
            for (idx, threshold) in self.failed_thresholds.iter().enumerate() {
                if idx > 0 {
                    writeln!(f)?;
                }
                write!(f, "    x {threshold}")?;
            }
            Ok(())
        }
    }
}
