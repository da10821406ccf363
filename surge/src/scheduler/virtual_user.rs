use crate::collector::MetricsCollector;
use crate::executor::ScenarioExecutor;
use crate::http::HttpClient;
use crate::scenario::Scenario;
use std::sync::Arc;
use std::time::Duration;
use surge_core::{Sample, CONCURRENCY_SLACK, INTERRUPTED_OPERATION};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn, Instrument};

struct VirtualUser {
    id: u64,
    stop: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

struct Retiring {
    user: VirtualUser,
    deadline: Instant,
}

/// The set of virtual user tasks of one run.
pub(crate) struct UserPool<C> {
    executor: Arc<ScenarioExecutor<C>>,
    scenario: Arc<Scenario>,
    collector: Arc<MetricsCollector>,
    graceful_stop: Duration,
    active: Vec<VirtualUser>,
    retiring: Vec<Retiring>,
    next_id: u64,
    peak: usize,
    interrupted: u64,
}

impl<C> UserPool<C>
where
    C: HttpClient + Sync + 'static,
{
    pub fn new(
        executor: Arc<ScenarioExecutor<C>>,
        scenario: Arc<Scenario>,
        collector: Arc<MetricsCollector>,
        graceful_stop: Duration,
    ) -> Self {
        Self {
            executor,
            scenario,
            collector,
            graceful_stop,
            active: vec![],
            retiring: vec![],
            next_id: 0,
            peak: 0,
            interrupted: 0,
        }
    }

    /// Move towards `target` active users.
    ///
    /// Surplus users are asked to stop after their current iteration, but running users
    /// never exceed `target + CONCURRENCY_SLACK`: retiring users beyond the slack are
    /// interrupted, oldest first.
    pub fn set_concurrency(&mut self, target: usize) {
        self.retire(target);

        let limit = target + CONCURRENCY_SLACK;
        let excess = self.running().saturating_sub(limit).min(self.retiring.len());
        let interrupted: Vec<_> = self.retiring.drain(..excess).collect();
        for Retiring { user, .. } in interrupted {
            self.interrupt(user);
        }

        if self.active.len() < target {
            let room = limit.saturating_sub(self.running());
            let count = (target - self.active.len()).min(room);
            for _ in 0..count {
                let user = self.spawn();
                self.active.push(user);
            }
        }
        self.peak = self.peak.max(self.running());
    }

    /// Signal surplus users to stop, keeping them until they finish or their grace ends.
    fn retire(&mut self, target: usize) {
        self.reap();
        if self.active.len() > target {
            let deadline = Instant::now() + self.graceful_stop;
            for user in self.active.drain(target..) {
                trace!("Retiring virtual user {}", user.id);
                let _ = user.stop.send(true);
                self.retiring.push(Retiring { user, deadline });
            }
        }
    }

    fn spawn(&mut self) -> VirtualUser {
        let id = self.next_id;
        self.next_id += 1;

        let (stop, stopped) = watch::channel(false);
        let executor = self.executor.clone();
        let scenario = self.scenario.clone();
        let collector = self.collector.clone();

        let handle = tokio::spawn(
            async move {
                while !*stopped.borrow() {
                    let samples = executor.execute(&scenario).await;
                    collector.record_all(samples);
                    // NOTE: Keeps a scenario without suspension points from starving the scheduler
                    tokio::task::yield_now().await;
                }
                trace!("Virtual user stopped");
            }
            .instrument(tracing::trace_span!("vu", id)),
        );

        VirtualUser { id, stop, handle }
    }

    /// Ask every active user to stop after its current iteration. Unlike
    /// [`set_concurrency`](Self::set_concurrency) nobody is interrupted before the grace ends.
    pub fn retire_all(&mut self) {
        self.retire(0);
    }

    /// Abort retiring users whose grace period is over, recording each as an interrupted
    /// iteration.
    pub fn enforce_grace(&mut self) {
        self.reap();

        let now = Instant::now();
        let (expired, waiting): (Vec<_>, Vec<_>) = self
            .retiring
            .drain(..)
            .partition(|retiring| retiring.deadline <= now);
        self.retiring = waiting;

        for Retiring { user, .. } in expired {
            if user.handle.is_finished() {
                continue;
            }
            debug!(
                "Virtual user {} still running after {}; aborting",
                user.id,
                humantime::format_duration(self.graceful_stop)
            );
            self.interrupt(user);
        }
    }

    /// Abort `user` mid-iteration and record it as an interrupted iteration.
    fn interrupt(&mut self, user: VirtualUser) {
        if user.handle.is_finished() {
            return;
        }
        trace!("Interrupting virtual user {}", user.id);
        user.handle.abort();
        self.interrupted += 1;
        self.collector.record(
            Sample::iteration(INTERRUPTED_OPERATION, self.graceful_stop, false)
                .at(self.collector.started().elapsed()),
        );
    }

    fn reap(&mut self) {
        self.retiring
            .retain(|retiring| !retiring.user.handle.is_finished());
    }

    pub fn is_drained(&mut self) -> bool {
        self.reap();
        self.active.is_empty() && self.retiring.is_empty()
    }

    pub fn active(&self) -> usize {
        self.active.len()
    }

    /// Users that are neither finished nor aborted, retiring ones included.
    pub fn running(&self) -> usize {
        let retiring = self
            .retiring
            .iter()
            .filter(|retiring| !retiring.user.handle.is_finished())
            .count();
        self.active.len() + retiring
    }

    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn interrupted(&self) -> u64 {
        self.interrupted
    }
}

impl<C> Drop for UserPool<C> {
    fn drop(&mut self) {
        for user in &self.active {
            user.handle.abort();
        }
        for retiring in &self.retiring {
            retiring.user.handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockClient;
    use surge_core::{Credentials, SampleKind};

    fn pool(graceful_stop: Duration) -> UserPool<MockClient> {
        let client = Arc::new(MockClient::new(Duration::from_millis(10)).untracked());
        let executor = Arc::new(ScenarioExecutor::new(client, MockClient::base_url()));
        let scenario = Arc::new(Scenario::purchase(&Credentials::new("u", "p"), "socks"));
        UserPool::new(
            executor,
            scenario,
            Arc::new(MetricsCollector::new()),
            graceful_stop,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn ramp_down_interrupts_users_beyond_the_slack() {
        let mut pool = pool(Duration::from_secs(30));
        pool.set_concurrency(10);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(pool.active(), 10);
        assert_eq!(pool.running(), 10);

        // Everyone is mid-iteration: one retiring user fits in the slack, the rest are cut.
        pool.set_concurrency(4);
        assert_eq!(pool.active(), 4);
        assert_eq!(pool.running(), 4 + CONCURRENCY_SLACK);
        assert_eq!(pool.interrupted(), 5);

        let snapshot = pool.collector.snapshot();
        assert_eq!(
            snapshot
                .operation(SampleKind::Iteration, INTERRUPTED_OPERATION)
                .map(|a| a.failures()),
            Some(5)
        );

        // The retiring user does not hold back the next ramp-up.
        pool.set_concurrency(10);
        assert_eq!(pool.active(), 10);
        assert!(pool.running() <= 10 + CONCURRENCY_SLACK);
        assert!(pool.peak() <= 10 + CONCURRENCY_SLACK);
    }

    #[tokio::test(start_paused = true)]
    async fn running_never_exceeds_target_plus_slack() {
        let mut pool = pool(Duration::from_secs(30));
        let targets = (0..=40).chain((0..40).rev()).chain((0..20).map(|i| i % 7 * 5));

        for target in targets {
            pool.set_concurrency(target);
            assert!(
                pool.running() <= target + CONCURRENCY_SLACK,
                "{} running for target {target}",
                pool.running()
            );
            if target > 0 {
                assert_eq!(pool.active(), target);
            }
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
        assert!(pool.peak() <= 40 + CONCURRENCY_SLACK);
    }

    #[tokio::test(start_paused = true)]
    async fn users_outliving_the_grace_period_are_interrupted() {
        let mut pool = pool(Duration::from_millis(100));
        pool.set_concurrency(3);
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Everyone is inside the one second pause.
        pool.retire_all();
        tokio::time::sleep(Duration::from_millis(150)).await;
        pool.enforce_grace();
        // let the runtime drop the aborted tasks
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(pool.is_drained());
        assert_eq!(pool.interrupted(), 3);
        assert_eq!(pool.running(), 0);

        let iterations = pool.collector.snapshot().iterations();
        assert_eq!(iterations.failures(), 3);
        assert!(pool
            .collector
            .snapshot()
            .operation(SampleKind::Iteration, INTERRUPTED_OPERATION)
            .is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn retired_users_finish_their_iteration() {
        let mut pool = pool(Duration::from_secs(30));
        pool.set_concurrency(2);
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.retire_all();

        tokio::time::sleep(Duration::from_secs(2)).await;
        pool.enforce_grace();
        assert!(pool.is_drained());
        assert_eq!(pool.interrupted(), 0);

        let snapshot = pool.collector.snapshot();
        assert_eq!(snapshot.iterations().successes(), 2);
        assert_eq!(snapshot.requests().failures(), 0);
    }
}
