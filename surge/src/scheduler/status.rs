use arc_swap::ArcSwap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a run. Moves forward only; `Completed` is terminal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    /// Index of the active stage.
    Ramping { stage: usize },
    Draining,
    Completed,
}

impl RunState {
    pub fn allows(&self, next: RunState) -> bool {
        use RunState::*;
        match (self, next) {
            (Idle, Ramping { .. }) | (Idle, Draining) => true,
            (Ramping { stage }, Ramping { stage: next }) => next > *stage,
            (Ramping { .. }, Draining) => true,
            (Draining, Completed) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunState::Idle => f.write_str("idle"),
            RunState::Ramping { stage } => write!(f, "ramping (stage {})", stage + 1),
            RunState::Draining => f.write_str("draining"),
            RunState::Completed => f.write_str("completed"),
        }
    }
}

/// Live view of a run, republished on every scheduler tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunStatus {
    pub state: RunState,
    pub elapsed: Duration,
    /// Interpolated concurrency the scheduler is aiming for.
    pub target: usize,
    /// Virtual users that have not been asked to stop.
    pub active: usize,
    /// Virtual user tasks still running, retiring ones included.
    pub running: usize,
    pub peak: usize,
}

/// Cheap, cloneable reader of the latest [`RunStatus`].
#[derive(Debug, Clone, Default)]
pub struct StatusHandle {
    inner: Arc<ArcSwap<RunStatus>>,
}

impl StatusHandle {
    pub fn load(&self) -> Arc<RunStatus> {
        self.inner.load_full()
    }

    pub(crate) fn publish(&self, status: RunStatus) {
        self.inner.store(Arc::new(status));
    }
}
