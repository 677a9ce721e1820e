//! Failure/completion state machine.
//!
//! Normalizes every heterogeneous stage outcome into the small observable
//! vocabulary of event kinds before publication. This is the sole place that
//! knows the concrete error shapes of the plan parser and the invocation
//! collaborator; the orchestrator and broker only ever see [`EventKind`]s
//! and [`FailureDetails`].

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::broker::{EventDraft, EventKind, EventPayload};
use crate::invoker::InvokeError;
use crate::plan::PlanFormatError;
use crate::specialists::SpecialistId;

/// Observable run state, advanced by the orchestrator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    Started,
    Planning,
    FanOut,
    Aggregating,
    Completed,
    Failed,
}

/// Normalized failure payload carried by `workflow_failed`, `executor_failed`
/// and `error` events.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct FailureDetails {
    pub error_message: String,
    pub error_type: String,
    pub extra_context: Value,
}

/// A failure somewhere in the execution graph, tagged with where it happened.
#[derive(Debug)]
pub enum StageFailure {
    /// The planner invocation itself failed. Fatal to the run.
    Planner(InvokeError),
    /// The planner answered, but its output was malformed. Fatal to the run.
    PlanFormat(PlanFormatError),
    /// One specialist failed. The run continues without its contribution.
    Specialist {
        id: SpecialistId,
        step: u32,
        source: InvokeError,
    },
    /// The aggregator invocation failed. Fatal to the run.
    Aggregator(InvokeError),
}

impl StageFailure {
    /// Event kind this failure publishes as.
    pub fn kind(&self) -> EventKind {
        match self {
            StageFailure::Planner(_) | StageFailure::PlanFormat(_) => EventKind::WorkflowFailed,
            StageFailure::Specialist { .. } => EventKind::ExecutorFailed,
            StageFailure::Aggregator(_) => EventKind::Error,
        }
    }

    /// Stage identifier the failure event is tagged with, when one applies.
    pub fn stage(&self) -> Option<&str> {
        match self {
            StageFailure::Planner(_) | StageFailure::PlanFormat(_) => {
                Some(crate::orchestrator::PLANNER_STAGE_ID)
            }
            StageFailure::Specialist { id, .. } => Some(id.as_str()),
            StageFailure::Aggregator(_) => Some(crate::orchestrator::AGGREGATOR_STAGE_ID),
        }
    }

    pub fn details(&self) -> FailureDetails {
        match self {
            StageFailure::Planner(source) => FailureDetails {
                error_message: source.to_string(),
                error_type: source.error_type().to_string(),
                extra_context: json!({ "stage": crate::orchestrator::PLANNER_STAGE_ID }),
            },
            StageFailure::PlanFormat(source) => FailureDetails {
                error_message: source.to_string(),
                error_type: "plan_format_error".to_string(),
                extra_context: json!({ "stage": crate::orchestrator::PLANNER_STAGE_ID }),
            },
            StageFailure::Specialist { id, step, source } => FailureDetails {
                error_message: source.to_string(),
                error_type: source.error_type().to_string(),
                extra_context: json!({ "stage": id.as_str(), "step": step }),
            },
            StageFailure::Aggregator(source) => FailureDetails {
                error_message: source.to_string(),
                error_type: source.error_type().to_string(),
                extra_context: json!({ "stage": crate::orchestrator::AGGREGATOR_STAGE_ID }),
            },
        }
    }

    /// Translate into the event the orchestrator publishes for this failure.
    pub fn into_event(self) -> EventDraft {
        let details = self.details();
        let message = match &self {
            StageFailure::Planner(_) | StageFailure::PlanFormat(_) => {
                "Workflow execution failed".to_string()
            }
            StageFailure::Specialist { id, .. } => format!("Specialist {id} failed"),
            StageFailure::Aggregator(_) => "Aggregation failed".to_string(),
        };
        let mut draft = EventDraft::new(self.kind())
            .with_payload(EventPayload::Failure(details))
            .with_message(message);
        if let Some(stage) = self.stage() {
            draft = draft.with_stage(stage.to_string());
        }
        draft
    }
}
