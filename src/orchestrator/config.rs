use std::time::Duration;

use crate::broker::{DEFAULT_BUFFER_CAPACITY, DEFAULT_LISTENER_CAPACITY};

const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;

/// Runtime knobs for one [`PipelineRunner`](crate::orchestrator::PipelineRunner).
#[derive(Clone, Debug)]
pub struct RunnerConfig {
    /// Per-stage invocation timeout; a timeout is treated as a stage failure.
    pub stage_timeout: Duration,
    /// Ring-buffer capacity of brokers created for runs.
    pub broker_capacity: usize,
    /// Bounded capacity of each listener channel.
    pub listener_capacity: usize,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            broker_capacity: DEFAULT_BUFFER_CAPACITY,
            listener_capacity: DEFAULT_LISTENER_CAPACITY,
        }
    }
}

impl RunnerConfig {
    /// Resolve configuration from the environment (`.env` honored):
    /// `STAGEFLOW_STAGE_TIMEOUT_SECS`, `STAGEFLOW_BROKER_CAPACITY`,
    /// `STAGEFLOW_LISTENER_CAPACITY`. Unset or unparsable values fall back
    /// to defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        let defaults = Self::default();
        Self {
            stage_timeout: env_u64("STAGEFLOW_STAGE_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.stage_timeout),
            broker_capacity: env_u64("STAGEFLOW_BROKER_CAPACITY")
                .map(|n| n as usize)
                .unwrap_or(defaults.broker_capacity),
            listener_capacity: env_u64("STAGEFLOW_LISTENER_CAPACITY")
                .map(|n| n as usize)
                .unwrap_or(defaults.listener_capacity),
        }
    }

    #[must_use]
    pub fn with_stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = timeout;
        self
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|raw| raw.parse().ok())
}
