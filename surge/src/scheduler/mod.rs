//! Drives virtual-user concurrency along a ramp profile.
mod status;
mod timer;
mod virtual_user;

pub use status::{RunState, RunStatus, StatusHandle};

use crate::collector::MetricsCollector;
use crate::executor::ScenarioExecutor;
use crate::http::HttpClient;
use crate::scenario::Scenario;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{
    evaluate, RampProfile, RunResult, Threshold, DEFAULT_GRACEFUL_STOP, DEFAULT_TICK,
    PROGRESS_INTERVAL,
};
use timer::Timer;
use tokio::time::Instant;
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};
use virtual_user::UserPool;

pub struct RampScheduler<C> {
    profile: RampProfile,
    executor: Arc<ScenarioExecutor<C>>,
    collector: Arc<MetricsCollector>,
    thresholds: Vec<Threshold>,
    tick: Duration,
    graceful_stop: Duration,
    status: StatusHandle,
    state: RunState,
}

impl<C> RampScheduler<C>
where
    C: HttpClient + Sync + 'static,
{
    pub fn new(
        profile: RampProfile,
        executor: Arc<ScenarioExecutor<C>>,
        collector: Arc<MetricsCollector>,
    ) -> Self {
        Self {
            profile,
            executor,
            collector,
            thresholds: vec![],
            tick: DEFAULT_TICK,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            status: StatusHandle::default(),
            state: RunState::Idle,
        }
    }

    pub fn thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.thresholds = thresholds;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.graceful_stop = graceful_stop;
        self
    }

    /// Publish live status through `status` instead of a private handle.
    pub fn status(mut self, status: StatusHandle) -> Self {
        self.status = status;
        self
    }

    pub fn status_handle(&self) -> StatusHandle {
        self.status.clone()
    }

    fn enter(&mut self, next: RunState) {
        debug_assert!(self.state.allows(next), "{} -> {next}", self.state);
        debug!("Run state {} -> {next}", self.state);
        self.state = next;
    }

    /// Ramp through every stage, drain, then evaluate thresholds over the final aggregates.
    ///
    /// Consumes the scheduler; a completed run cannot be restarted.
    #[instrument(name = "ramp", skip_all, fields(stages = self.profile.stages().len()))]
    pub async fn run(mut self, scenario: Scenario) -> RunResult {
        let mut pool = UserPool::new(
            self.executor.clone(),
            Arc::new(scenario),
            self.collector.clone(),
            self.graceful_stop,
        );

        let start = Instant::now();
        let mut timer = Timer::new(self.tick).await;
        let mut last_report = start;
        let mut target = 0;

        // NOTE: This loop only awaits its own tick; virtual users never block it.
        loop {
            let elapsed = start.elapsed();
            let Some((stage, stage_target)) = self.profile.target_at(elapsed) else {
                break;
            };

            if self.state != (RunState::Ramping { stage }) {
                self.enter(RunState::Ramping { stage });
                let stage = &self.profile.stages()[stage];
                info!(
                    "{}: {} users over {}",
                    self.state,
                    stage.target,
                    humantime::format_duration(stage.duration)
                );
            }

            target = stage_target;
            pool.set_concurrency(target);
            pool.enforce_grace();
            self.publish(&pool, elapsed, target);

            if last_report.elapsed() >= PROGRESS_INTERVAL {
                let window = self.collector.drain_window(last_report.elapsed());
                info!("users={}/{target} {window}", pool.active());
                last_report = Instant::now();
            }

            timer.tick().await;
        }

        self.enter(RunState::Draining);
        info!(
            "Stages complete; draining {} users (graceful stop {})",
            pool.running(),
            humantime::format_duration(self.graceful_stop)
        );
        pool.retire_all();
        while !pool.is_drained() {
            pool.enforce_grace();
            self.publish(&pool, start.elapsed(), 0);
            timer.tick().await;
        }
        trace!("Drained with last target {target}");

        self.enter(RunState::Completed);
        self.publish(&pool, start.elapsed(), 0);

        let aggregates = self.collector.snapshot();
        let failed = evaluate(&aggregates, &self.thresholds);
        for threshold in &failed {
            warn!("Threshold crossed: {threshold}");
        }

        let result = RunResult::new(aggregates, failed, pool.peak(), pool.interrupted());
        info!(
            "Run complete in {}: {}",
            humantime::format_duration(result.elapsed),
            if result.pass { "pass" } else { "fail" }
        );
        result
    }

    fn publish(&self, pool: &UserPool<C>, elapsed: Duration, target: usize) {
        self.status.publish(RunStatus {
            state: self.state,
            elapsed,
            target,
            active: pool.active(),
            running: pool.running(),
            peak: pool.peak(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};
    use surge_core::{Credentials, Stage, CONCURRENCY_SLACK};

    fn scheduler(client: MockClient, stages: Vec<Stage>) -> RampScheduler<MockClient> {
        let collector = Arc::new(MetricsCollector::new());
        let executor = ScenarioExecutor::new(Arc::new(client), MockClient::base_url())
            .with_run_start(collector.started());
        RampScheduler::new(
            RampProfile::new(stages).unwrap(),
            Arc::new(executor),
            collector,
        )
    }

    fn purchase() -> Scenario {
        Scenario::purchase(&Credentials::new("user1", "user1"), "socks")
    }

    fn reference_stages() -> Vec<Stage> {
        vec![
            Stage::new(Duration::from_secs(10), 100),
            Stage::new(Duration::from_secs(30), 1000),
            Stage::new(Duration::from_secs(10), 0),
        ]
    }

    fn reference_thresholds() -> Vec<Threshold> {
        vec![
            Threshold::parse("http_req_duration", "p(99)<50").unwrap(),
            Threshold::parse("http_req_failed", "rate<0.0001").unwrap(),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn reference_profile_passes() {
        let client = MockClient::new(Duration::from_millis(10)).untracked();
        let scheduler = scheduler(client, reference_stages()).thresholds(reference_thresholds());
        let status = scheduler.status_handle();
        let result = scheduler.run(purchase()).await;

        assert!(result.pass, "{result}");
        assert!(result.failed_thresholds.is_empty());
        assert_eq!(result.requests.failed, 0);
        assert!(result.requests.p99 >= Duration::from_millis(10));
        assert!(result.requests.p99 < Duration::from_millis(50));
        assert_eq!(result.checks_failed, 0);
        // ramp-down cuts users mid-iteration; none of them count as iterations
        assert!(result.interrupted > 0);
        assert_eq!(result.iterations.failed, 0);
        assert!(result.iterations.count > 10_000);
        assert!(result.max_concurrency >= 990);
        assert!(result.max_concurrency <= 1000 + CONCURRENCY_SLACK);
        assert!(result.elapsed >= Duration::from_secs(50));
        assert_eq!(status.load().state, RunState::Completed);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_auth_fails_the_run() {
        let client = MockClient::new(Duration::from_millis(10))
            .auth_latency(Duration::from_millis(250))
            .reject_auth()
            .untracked();
        let scheduler = scheduler(client, reference_stages()).thresholds(reference_thresholds());
        let result = scheduler.run(purchase()).await;

        assert!(!result.pass);
        assert!(result
            .failed_thresholds
            .iter()
            .any(|t| t.to_string() == "http_req_failed: rate<0.0001"));
        let requests = result.aggregates.requests();
        assert_eq!(requests.error_rate(), Some(1.0));
        // one failed login per iteration and nothing else
        assert!(requests.count() > 0);
        assert_eq!(
            result
                .aggregates
                .operation(surge_core::SampleKind::Request, "auth")
                .map(|a| a.count()),
            Some(requests.count())
        );
        assert_eq!(result.iterations.count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_stays_within_profile() {
        let mut rng = SmallRng::seed_from_u64(0xc0ffee);

        for _ in 0..8 {
            let stages: Vec<_> = (0..rng.gen_range(1..5))
                .map(|_| {
                    Stage::new(
                        Duration::from_millis(rng.gen_range(200..3_000)),
                        rng.gen_range(0..40),
                    )
                })
                .collect();
            let max_target = stages.iter().map(|s| s.target).max().unwrap();

            let client = MockClient::new(Duration::from_millis(rng.gen_range(1..30))).untracked();
            let scheduler = scheduler(client, stages.clone());
            let status = scheduler.status_handle();
            let result = scheduler.run(purchase()).await;

            assert!(
                result.max_concurrency <= max_target + CONCURRENCY_SLACK,
                "{} > {} for {stages:?}",
                result.max_concurrency,
                max_target + CONCURRENCY_SLACK
            );
            let last = status.load();
            assert_eq!(last.state, RunState::Completed);
            assert_eq!(last.running, 0);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_interrupts_after_grace() {
        let client = MockClient::new(Duration::from_millis(10)).untracked();
        let scenario = Scenario::new("long").pause(Duration::from_secs(60));
        let stages = vec![
            Stage::new(Duration::ZERO, 5),
            Stage::new(Duration::from_secs(1), 5),
        ];
        let scheduler = scheduler(client, stages).graceful_stop(Duration::from_secs(2));
        let result = scheduler.run(scenario).await;

        assert_eq!(result.interrupted, 5);
        assert_eq!(result.iterations.count, 0);
        assert_eq!(result.aggregates.iterations().failures(), 5);
        assert!(result.elapsed < Duration::from_secs(10));
        assert_eq!(result.max_concurrency, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn running_users_follow_the_interpolated_target() {
        let client = MockClient::new(Duration::from_millis(10)).untracked();
        let stages = vec![
            Stage::new(Duration::from_secs(2), 200),
            Stage::new(Duration::from_secs(2), 0),
            Stage::new(Duration::from_secs(1), 50),
        ];
        let scheduler = scheduler(client, stages);
        let status = scheduler.status_handle();

        let watcher = tokio::spawn(async move {
            let mut observed = 0;
            loop {
                let status = status.load();
                if let RunState::Ramping { .. } = status.state {
                    assert!(
                        status.running <= status.target + CONCURRENCY_SLACK,
                        "{status:?}"
                    );
                    observed += 1;
                }
                if status.state.is_terminal() {
                    return observed;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        });

        let result = scheduler.run(purchase()).await;
        assert!(watcher.await.unwrap() > 50);
        assert!(result.interrupted > 0);
        assert!(result.max_concurrency <= 200 + CONCURRENCY_SLACK);
    }
}
