use std::time::Duration;

use crate::models::RunConfig;

/// One step of the concurrency ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampStage {
    /// 1-based stage number
    pub index: usize,
    /// Workers alive once this stage has started
    pub target: usize,
    /// Workers started at the beginning of this stage
    pub added: usize,
}

/// Staged growth of the worker population.
///
/// Stage `s` runs `floor(max_concurrency / stages) * s` workers. When the
/// division is not exact the final stage stays slightly below the nominal peak.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RampPlan {
    per_stage: usize,
    stages: usize,
    stage_duration: Duration,
    total_duration: Duration,
}

impl RampPlan {
    pub fn new(
        max_concurrency: usize,
        stages: usize,
        stage_duration: Duration,
        total_duration: Duration,
    ) -> Self {
        Self {
            per_stage: max_concurrency.checked_div(stages).unwrap_or(0),
            stages,
            stage_duration,
            total_duration,
        }
    }

    pub fn from_config(config: &RunConfig) -> Self {
        Self::new(
            config.max_concurrency,
            config.stages,
            config.stage_duration,
            config.duration,
        )
    }

    pub fn target(&self, stage: usize) -> usize {
        self.per_stage * stage.min(self.stages)
    }

    pub fn peak(&self) -> usize {
        self.target(self.stages)
    }

    pub fn stage_duration(&self) -> Duration {
        self.stage_duration
    }

    pub fn stage_count(&self) -> usize {
        self.stages
    }

    pub fn stages(&self) -> impl Iterator<Item = RampStage> + '_ {
        (1..=self.stages).map(|index| RampStage {
            index,
            target: self.target(index),
            added: self.target(index) - self.target(index - 1),
        })
    }

    /// Time to sustain peak load after the last stage, zero if the ramp
    /// already covers the whole run.
    pub fn hold_duration(&self) -> Duration {
        let ramp = self
            .stage_duration
            .saturating_mul(u32::try_from(self.stages).unwrap_or(u32::MAX));
        self.total_duration.saturating_sub(ramp)
    }
}
