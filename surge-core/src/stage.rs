use crate::{duration_str, ConfigError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One window of the ramp profile: over `duration`, concurrency moves linearly from the
/// previous stage's target to this one's.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Stage {
    #[serde(with = "duration_str")]
    pub duration: Duration,
    pub target: usize,
}

impl Stage {
    pub fn new(duration: Duration, target: usize) -> Self {
        Self { duration, target }
    }
}

/// A validated, ordered sequence of stages. The first stage ramps from zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RampProfile {
    stages: Vec<Stage>,
}

impl RampProfile {
    pub fn new(stages: Vec<Stage>) -> Result<Self, ConfigError> {
        if stages.is_empty() {
            return Err(ConfigError::Stages("at least one stage is required".into()));
        }

        if stages.iter().all(|stage| stage.duration.is_zero()) {
            return Err(ConfigError::Stages(
                "the profile must last longer than zero seconds".into(),
            ));
        }

        Ok(Self { stages })
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages.iter().map(|stage| stage.duration).sum()
    }

    pub fn max_target(&self) -> usize {
        self.stages
            .iter()
            .map(|stage| stage.target)
            .max()
            .unwrap_or_default()
    }

    /// Interpolated concurrency at `elapsed`, along with the index of the active stage.
    ///
    /// Returns `None` once the profile is over. Values are floored so the result never
    /// exceeds the line between two stage boundaries.
    pub fn target_at(&self, elapsed: Duration) -> Option<(usize, usize)> {
        let mut from = 0usize;
        let mut offset = Duration::ZERO;

        for (idx, stage) in self.stages.iter().enumerate() {
            let end = offset + stage.duration;
            if elapsed < end {
                let progress = (elapsed - offset).as_secs_f64() / stage.duration.as_secs_f64();
                let value = from as f64 + (stage.target as f64 - from as f64) * progress;
                let target = value.floor().max(0.) as usize;
                return Some((idx, target.min(from.max(stage.target))));
            }

            from = stage.target;
            offset = end;
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::{Rng, SeedableRng};

    fn secs(v: u64) -> Duration {
        Duration::from_secs(v)
    }

    fn reference() -> RampProfile {
        RampProfile::new(vec![
            Stage::new(secs(10), 100),
            Stage::new(secs(30), 1000),
            Stage::new(secs(10), 0),
        ])
        .unwrap()
    }

    #[test]
    fn interpolates_linearly() {
        let profile = reference();

        assert_eq!(profile.target_at(Duration::ZERO), Some((0, 0)));
        assert_eq!(profile.target_at(secs(5)), Some((0, 50)));
        assert_eq!(profile.target_at(secs(10)), Some((1, 100)));
        assert_eq!(profile.target_at(secs(25)), Some((1, 550)));
        assert_eq!(profile.target_at(secs(40)), Some((2, 1000)));
        assert_eq!(profile.target_at(secs(45)), Some((2, 500)));
        assert_eq!(profile.target_at(secs(50)), None);
        assert_eq!(profile.total_duration(), secs(50));
        assert_eq!(profile.max_target(), 1000);
    }

    #[test]
    fn zero_length_stage_is_a_step() {
        let profile = RampProfile::new(vec![
            Stage::new(Duration::ZERO, 20),
            Stage::new(secs(10), 20),
        ])
        .unwrap();

        assert_eq!(profile.target_at(Duration::ZERO), Some((1, 20)));
        assert_eq!(profile.target_at(secs(9)), Some((1, 20)));
    }

    #[test]
    fn rejects_empty_profiles() {
        assert!(matches!(
            RampProfile::new(vec![]),
            Err(ConfigError::Stages(_))
        ));
        assert!(RampProfile::new(vec![Stage::new(Duration::ZERO, 5)]).is_err());
    }

    #[test]
    fn never_exceeds_max_target() {
        let mut rng = SmallRng::seed_from_u64(0x5eed);

        for _ in 0..200 {
            let stages: Vec<_> = (0..rng.gen_range(1..6))
                .map(|_| Stage::new(Duration::from_millis(rng.gen_range(0..5_000)), rng.gen_range(0..2_000)))
                .collect();
            let Ok(profile) = RampProfile::new(stages) else {
                continue;
            };

            let max = profile.max_target();
            let mut elapsed = Duration::ZERO;
            while let Some((_, target)) = profile.target_at(elapsed) {
                assert!(target <= max, "{target} > {max} at {elapsed:?}");
                elapsed += Duration::from_millis(37);
            }
        }
    }
}
