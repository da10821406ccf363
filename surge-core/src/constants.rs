use std::time::Duration;

/// How often the scheduler re-aligns the virtual user count with the ramp profile.
pub const DEFAULT_TICK: Duration = Duration::from_millis(100);

/// How long retired virtual users get to finish their iteration before being aborted.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Interval between progress reports while a run is ramping.
pub const PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

/// Virtual users tolerated above the interpolated target at any instant.
pub const CONCURRENCY_SLACK: usize = 1;

/// Name given to the scenario when the configuration does not provide one.
pub const DEFAULT_SCENARIO_NAME: &str = "default";

/// Operation name used for samples of virtual users aborted after the grace period.
pub const INTERRUPTED_OPERATION: &str = "interrupted";
