use pdatastructs::tdigest::{TDigest, K1};
use std::fmt;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Throughput and latency estimate over one progress window.
#[derive(Debug, Clone)]
pub struct Measurement {
    /// Requests per second.
    pub rps: f64,
    pub error_rate: f64,
    pub iterations: u64,
    pub elapsed: Duration,
    latency_count: usize,
    latency: TDigest<K1>,
}

impl Measurement {
    pub fn new(success: u64, error: u64, iterations: u64, elapsed: Duration) -> Self {
        let total = success + error;
        let secs = elapsed.as_secs_f64();
        Self {
            rps: if secs > 0. { total as f64 / secs } else { 0. },
            error_rate: if total > 0 {
                error as f64 / total as f64
            } else {
                0.
            },
            iterations,
            elapsed,
            latency_count: 0,
            latency: default_tdigest(),
        }
    }

    pub fn populate_latencies(&mut self, dur: &[Duration]) {
        for latency in dur {
            self.latency.insert(latency.as_secs_f64());
        }
        self.latency_count += dur.len();
    }

    /// Estimated latency quantile (`0.0..=1.0`). Zero when nothing was measured.
    pub fn latency(&self, quantile: f64) -> Duration {
        if self.latency_count == 0 {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);

        // NOTE: TDigest occasionally yields NaN on small inputs
        let secs = if secs.is_finite() && secs >= 0. {
            secs
        } else {
            error!("Non-finite latency estimate for quantile {quantile}.");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reqs/s={:.2}, failed={:.2}%, iterations={}, p50={:?}, p90={:?}, p99={:?}",
            self.rps,
            self.error_rate * 100.,
            self.iterations,
            self.latency(0.5),
            self.latency(0.90),
            self.latency(0.99),
        )
    }
}

fn default_tdigest() -> TDigest<K1> {
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
