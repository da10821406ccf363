use crate::error::StepError;
use crate::http::{HttpClient, Request, Response};
use crate::scenario::{AuthStep, RequestStep, Scenario, Step};
use crate::timed::TimedExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{Sample, SampleKind, TokenConfig, DEFAULT_REQUEST_TIMEOUT};
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use url::Url;

/// Outcome of running a list of steps once.
#[derive(Debug, Default)]
pub struct Iteration {
    pub samples: Vec<Sample>,
    pub errors: Vec<StepError>,
    /// `false` when a failed authentication skipped the remaining steps.
    pub completed: bool,
}

impl Iteration {
    /// The first failure of the iteration, whether a step error or a failed check.
    pub fn first_failure(&self) -> Option<(String, String)> {
        if let Some(err) = self.errors.first() {
            return Some((err.operation().to_string(), err.reason().to_string()));
        }
        self.samples
            .iter()
            .find(|sample| !sample.success)
            .map(|sample| (sample.operation.to_string(), "check failed".to_string()))
    }
}

/// Token obtained by an authenticate step, scoped to one iteration.
struct Token<'a> {
    source: &'a TokenConfig,
    value: String,
}

impl Token<'_> {
    fn header(&self) -> (String, String) {
        match self.source {
            TokenConfig::Cookie(name) => ("Cookie".into(), format!("{name}={}", self.value)),
            TokenConfig::Json(_) => ("Authorization".into(), format!("Bearer {}", self.value)),
        }
    }
}

fn extract_token(source: &TokenConfig, response: &Response) -> Option<String> {
    let token = match source {
        TokenConfig::Cookie(name) => response.cookie_value(name).map(str::to_string),
        TokenConfig::Json(pointer) => response
            .json()?
            .pointer(pointer)?
            .as_str()
            .map(str::to_string),
    };
    token.filter(|token| !token.is_empty())
}

/// Runs scenario iterations against an [`HttpClient`].
///
/// Shared by every virtual user; holds no per-iteration state.
pub struct ScenarioExecutor<C> {
    client: Arc<C>,
    base_url: Url,
    default_timeout: Duration,
    limiter: Option<Arc<DefaultDirectRateLimiter>>,
    run_start: Instant,
}

impl<C> ScenarioExecutor<C>
where
    C: HttpClient + Sync + 'static,
{
    pub fn new(client: Arc<C>, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            default_timeout: DEFAULT_REQUEST_TIMEOUT,
            limiter: None,
            run_start: Instant::now(),
        }
    }

    /// Timeout for requests that do not set their own.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Cap the request rate across every caller of this executor.
    pub fn with_rate_limit(mut self, max_rps: NonZeroU32) -> Self {
        self.limiter = Some(Arc::new(RateLimiter::direct(Quota::per_second(max_rps))));
        self
    }

    /// Sample timestamps are offsets from `start`.
    pub fn with_run_start(mut self, start: Instant) -> Self {
        self.run_start = start;
        self
    }

    /// Run one iteration of `scenario`.
    ///
    /// A completed iteration ends with one successful `Iteration` sample.
    pub async fn execute(&self, scenario: &Scenario) -> Vec<Sample> {
        let start = Instant::now();
        let mut iteration = self.run_steps(scenario.steps()).await;

        if iteration.completed {
            iteration.samples.push(self.stamp(Sample::iteration(
                scenario.operation(),
                start.elapsed(),
                true,
            )));
        }

        iteration.samples
    }

    pub async fn run_steps(&self, steps: &[Step]) -> Iteration {
        let mut iteration = Iteration {
            completed: true,
            ..Default::default()
        };
        let mut token: Option<Token<'_>> = None;
        let mut last_response: Option<Response> = None;

        for step in steps {
            match step {
                Step::Authenticate(AuthStep { request, token: source }) => {
                    let response = self.send(request, None).await;
                    let extracted = self
                        .status_ok(request, &response)
                        .then(|| extract_token(source, &response))
                        .flatten();
                    let ok = extracted.is_some();
                    iteration.samples.push(self.request_sample(request, &response, ok));

                    match extracted {
                        Some(value) => {
                            token = Some(Token { source, value });
                            last_response = Some(response);
                        }
                        None => {
                            let err = StepError::AuthFailure {
                                operation: request.name.clone(),
                                reason: failure_reason(&response, "no token in response"),
                            };
                            debug!("{err}");
                            iteration.errors.push(err);
                            iteration.completed = false;
                            break;
                        }
                    }
                }
                Step::Request(request) => {
                    if request.authenticated && token.is_none() {
                        trace!("`{}` expects a token but none was obtained", request.name);
                    }
                    let response = self.send(request, token.as_ref()).await;
                    let ok = self.status_ok(request, &response);
                    iteration.samples.push(self.request_sample(request, &response, ok));

                    if !ok {
                        let err = StepError::RequestFailure {
                            operation: request.name.clone(),
                            reason: failure_reason(&response, "unexpected status"),
                        };
                        trace!("{err}");
                        iteration.errors.push(err);
                    }
                    last_response = Some(response);
                }
                Step::Check(check) => {
                    let passed = last_response
                        .as_ref()
                        .is_some_and(|response| check.evaluate(response));
                    iteration
                        .samples
                        .push(self.stamp(Sample::check(check.operation(), passed)));
                }
                Step::Pause(duration) => tokio::time::sleep(*duration).await,
            }
        }

        iteration
    }

    async fn send(&self, step: &RequestStep, token: Option<&Token<'_>>) -> Response {
        let url = match self.base_url.join(&step.path) {
            Ok(url) => url,
            Err(err) => return Response::transport_error(format!("invalid path: {err}")),
        };

        let timeout = step.timeout.unwrap_or(self.default_timeout);
        let mut request = Request::new(step.method, url).timeout(timeout);
        request.headers = step.headers.clone();
        if let Some(body) = &step.body {
            request = request.json(body.clone());
        }
        if step.authenticated {
            if let Some(token) = token {
                request.headers.push(token.header());
            }
        }

        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }

        match tokio::time::timeout(timeout, self.client.send(request).timed()).await {
            Ok((response, elapsed)) => Response {
                duration: elapsed,
                ..response
            },
            Err(_) => Response {
                duration: timeout,
                ..Response::transport_error(format!(
                    "timed out after {}",
                    humantime::format_duration(timeout)
                ))
            },
        }
    }

    fn status_ok(&self, step: &RequestStep, response: &Response) -> bool {
        match step.expect_status {
            Some(status) => response.error.is_none() && response.status == status,
            None => response.is_success(),
        }
    }

    fn request_sample(&self, step: &RequestStep, response: &Response, success: bool) -> Sample {
        self.stamp(Sample::new(
            step.name.clone(),
            SampleKind::Request,
            response.duration,
            success,
            Duration::ZERO,
        ))
    }

    fn stamp(&self, sample: Sample) -> Sample {
        sample.at(self.run_start.elapsed())
    }
}

fn failure_reason(response: &Response, fallback: &str) -> String {
    match &response.error {
        Some(err) => err.clone(),
        None if !response.is_success() => format!("status {}", response.status),
        None => fallback.to_string(),
    }
}
