//! Pass/fail predicates over aggregated metrics.
//!
//! Thresholds are written the way k6 writes them: a metric name, optionally narrowed to a
//! single operation with `{name}`, and an expression such as `p(99)<50` or `rate<0.01`.
//! Latency bounds are in milliseconds.
use crate::{Aggregates, ConfigError, MetricAggregate, MetricKind};
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Aggregation {
    Percentile(f64),
    Avg,
    Min,
    Max,
    Med,
    Rate,
    Count,
}

impl Aggregation {
    fn parse(input: &str) -> Option<Self> {
        let input = input.trim();
        let aggregation = match input {
            "avg" => Aggregation::Avg,
            "min" => Aggregation::Min,
            "max" => Aggregation::Max,
            "med" => Aggregation::Med,
            "rate" => Aggregation::Rate,
            "count" => Aggregation::Count,
            _ => {
                let inner = input.strip_prefix("p(")?.strip_suffix(')')?;
                let p: f64 = inner.trim().parse().ok()?;
                if !(0. ..=100.).contains(&p) {
                    return None;
                }
                Aggregation::Percentile(p)
            }
        };
        Some(aggregation)
    }

    fn applies_to(&self, metric: MetricKind) -> bool {
        match self {
            Aggregation::Count => true,
            Aggregation::Rate => !metric.is_trend(),
            _ => metric.is_trend(),
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Aggregation::Percentile(p) => write!(f, "p({p})"),
            Aggregation::Avg => f.write_str("avg"),
            Aggregation::Min => f.write_str("min"),
            Aggregation::Max => f.write_str("max"),
            Aggregation::Med => f.write_str("med"),
            Aggregation::Rate => f.write_str("rate"),
            Aggregation::Count => f.write_str("count"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    // NOTE: two-character operators must be tried first
    const TOKENS: [(&'static str, Comparator); 6] = [
        ("<=", Comparator::Le),
        (">=", Comparator::Ge),
        ("==", Comparator::Eq),
        ("!=", Comparator::Ne),
        ("<", Comparator::Lt),
        (">", Comparator::Gt),
    ];

    pub fn holds(&self, value: f64, bound: f64) -> bool {
        match self {
            Comparator::Lt => value < bound,
            Comparator::Le => value <= bound,
            Comparator::Gt => value > bound,
            Comparator::Ge => value >= bound,
            Comparator::Eq => value == bound,
            Comparator::Ne => value != bound,
        }
    }

    fn token(&self) -> &'static str {
        Self::TOKENS
            .iter()
            .find(|(_, c)| c == self)
            .map(|(token, _)| *token)
            .unwrap_or("?")
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Predicate {
    pub aggregation: Aggregation,
    pub comparator: Comparator,
}

/// The metric a threshold observes, optionally restricted to one operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricRef {
    pub kind: MetricKind,
    pub operation: Option<String>,
}

impl MetricRef {
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let input = input.trim();
        let (name, operation) = match input.split_once('{') {
            Some((name, rest)) => {
                let operation = rest.strip_suffix('}').ok_or_else(|| {
                    ConfigError::threshold(input, "", "unterminated `{` in metric name")
                })?;
                (name.trim(), Some(operation.trim().to_string()))
            }
            None => (input, None),
        };

        let kind = MetricKind::from_name(name)
            .ok_or_else(|| ConfigError::threshold(input, "", "unknown metric"))?;

        Ok(Self { kind, operation })
    }

    fn aggregate<'a>(&self, aggregates: &'a Aggregates) -> Option<&'a MetricAggregate> {
        let kind = self.kind.sample_kind();
        let iterations = matches!(
            self.kind,
            MetricKind::Iterations | MetricKind::IterationDuration
        );
        match (&self.operation, iterations) {
            (Some(operation), true) => aggregates.completed_iteration(operation),
            (None, true) => aggregates.completed_iterations(),
            (Some(operation), false) => aggregates.operation(kind, operation),
            (None, false) => aggregates.kind_ref(kind),
        }
    }
}

impl fmt::Display for MetricRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operation {
            Some(operation) => write!(f, "{}{{{operation}}}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Threshold {
    pub metric: MetricRef,
    pub predicate: Predicate,
    pub bound: f64,
}

impl Threshold {
    /// Parse `expression` (e.g. `p(99)<50`) against `metric` (e.g. `http_req_duration`).
    pub fn parse(metric: &str, expression: &str) -> Result<Self, ConfigError> {
        let metric_ref = MetricRef::parse(metric)?;

        let (idx, token, comparator) = Comparator::TOKENS
            .iter()
            .filter_map(|(token, comparator)| {
                expression.find(token).map(|idx| (idx, *token, *comparator))
            })
            .min_by_key(|(idx, token, _)| (*idx, usize::MAX - token.len()))
            .ok_or_else(|| ConfigError::threshold(metric, expression, "missing comparator"))?;

        let aggregation = Aggregation::parse(&expression[..idx])
            .ok_or_else(|| ConfigError::threshold(metric, expression, "unknown aggregation"))?;

        if !aggregation.applies_to(metric_ref.kind) {
            return Err(ConfigError::threshold(
                metric,
                expression,
                format!("`{aggregation}` cannot be used with `{}`", metric_ref.kind),
            ));
        }

        let bound: f64 = expression[idx + token.len()..]
            .trim()
            .parse()
            .map_err(|_| ConfigError::threshold(metric, expression, "bound is not a number"))?;

        Ok(Self {
            metric: metric_ref,
            predicate: Predicate {
                aggregation,
                comparator,
            },
            bound,
        })
    }

    /// The observed value this threshold compares against its bound, if any samples exist.
    pub fn observe(&self, aggregates: &Aggregates) -> Option<f64> {
        let aggregate = self.metric.aggregate(aggregates)?;
        let millis = |d: Duration| d.as_secs_f64() * 1_000.;

        match self.predicate.aggregation {
            Aggregation::Count => Some(aggregate.count() as f64),
            Aggregation::Rate => match self.metric.kind {
                MetricKind::HttpReqFailed => aggregate.error_rate(),
                MetricKind::Checks => aggregate.pass_rate(),
                _ => {
                    let secs = aggregates.elapsed().as_secs_f64();
                    (secs > 0.).then(|| aggregate.count() as f64 / secs)
                }
            },
            Aggregation::Percentile(p) => aggregate.percentile(p).map(millis),
            Aggregation::Avg => aggregate.mean().map(millis),
            Aggregation::Min => aggregate.min().map(millis),
            Aggregation::Max => aggregate.max().map(millis),
            Aggregation::Med => aggregate.median().map(millis),
        }
    }

    /// A threshold with nothing to observe is not satisfied.
    pub fn passes(&self, aggregates: &Aggregates) -> bool {
        self.observe(aggregates)
            .is_some_and(|value| self.predicate.comparator.holds(value, self.bound))
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}{}{}",
            self.metric,
            self.predicate.aggregation,
            self.predicate.comparator.token(),
            self.bound
        )
    }
}

/// Thresholds whose predicate does not hold against `aggregates`.
pub fn evaluate(aggregates: &Aggregates, thresholds: &[Threshold]) -> Vec<Threshold> {
    thresholds
        .iter()
        .filter(|threshold| !threshold.passes(aggregates))
        .cloned()
        .collect()
}
