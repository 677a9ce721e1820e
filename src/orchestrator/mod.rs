//! Run orchestration: stage identities, runtime configuration, cooperative
//! cancellation, and the [`PipelineRunner`] that drives planner fan-out,
//! specialist execution, and fan-in aggregation.

pub mod cancel;
pub mod config;
pub mod runner;
pub mod stages;

pub use cancel::{CancelHandle, CancelToken, cancel_pair};
pub use config::RunnerConfig;
pub use runner::{PipelineRunner, RunOutcome, RunRequest, SpecialistContribution};
pub use stages::{AGGREGATOR_STAGE_ID, PLANNER_STAGE_ID};
