use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::outcome::FailureDetails;
use crate::plan::Plan;

/// Tag identifying what a [`StreamEvent`] reports.
///
/// The set is closed: transports and clients can switch exhaustively on it,
/// and the failure state machine in [`crate::outcome`] maps every internal
/// error shape onto one of the three failure kinds.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    WorkflowStarted,
    PlanProduced,
    Output,
    ExecutorFailed,
    WorkflowCompleted,
    WorkflowFailed,
    Error,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::WorkflowStarted => "workflow_started",
            EventKind::PlanProduced => "plan_produced",
            EventKind::Output => "output",
            EventKind::ExecutorFailed => "executor_failed",
            EventKind::WorkflowCompleted => "workflow_completed",
            EventKind::WorkflowFailed => "workflow_failed",
            EventKind::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured payload carried by an event, one shape per [`EventKind`] family.
///
/// A closed sum type instead of free-form nested maps: each variant has an
/// explicit serialization in [`EventPayload::to_json_value`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub enum EventPayload {
    /// No payload (lifecycle markers such as `workflow_started`).
    Empty,
    /// The validated plan attached to a `plan_produced` event.
    Plan(Plan),
    /// Text produced by one stage invocation.
    Output { text: String },
    /// Normalized failure details (see [`crate::outcome`]).
    Failure(FailureDetails),
}

impl EventPayload {
    pub fn to_json_value(&self) -> Value {
        match self {
            EventPayload::Empty => json!({}),
            EventPayload::Plan(plan) => json!({
                "name": plan.name,
                "description": plan.description,
                "message": plan.message,
                "steps": plan.steps.iter().map(|step| json!({
                    "number": step.number,
                    "task": step.task,
                    "assigned_agent": step.assigned_agent,
                })).collect::<Vec<_>>(),
            }),
            EventPayload::Output { text } => json!({ "text": text }),
            EventPayload::Failure(details) => json!({
                "error": details.error_message,
                "error_type": details.error_type,
                "extra": details.extra_context,
            }),
        }
    }
}

/// Event fields supplied by a producer; sequence and timestamp are assigned
/// by the broker at publish time.
#[derive(Clone, Debug, PartialEq)]
pub struct EventDraft {
    pub kind: EventKind,
    pub stage: Option<String>,
    pub payload: EventPayload,
    pub message: Option<String>,
}

impl EventDraft {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            stage: None,
            payload: EventPayload::Empty,
            message: None,
        }
    }

    #[must_use]
    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    #[must_use]
    pub fn with_payload(mut self, payload: EventPayload) -> Self {
        self.payload = payload;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn workflow_started() -> Self {
        Self::new(EventKind::WorkflowStarted).with_message("Workflow execution started")
    }

    pub fn plan_produced(stage: impl Into<String>, plan: Plan) -> Self {
        let message = plan.message.clone();
        Self::new(EventKind::PlanProduced)
            .with_stage(stage)
            .with_payload(EventPayload::Plan(plan))
            .with_message(message)
    }

    pub fn output(stage: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(EventKind::Output)
            .with_stage(stage)
            .with_payload(EventPayload::Output { text: text.into() })
    }

    pub fn workflow_completed() -> Self {
        Self::new(EventKind::WorkflowCompleted).with_message("Workflow execution completed")
    }
}

/// One immutable, sequenced record of pipeline progress.
///
/// Sequence numbers are assigned by the broker, start at 0, and strictly
/// increase for the lifetime of one broker instance; they are never reused,
/// even after ring-buffer eviction.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct StreamEvent {
    pub kind: EventKind,
    pub stage: Option<String>,
    pub payload: EventPayload,
    pub message: Option<String>,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
}

impl StreamEvent {
    pub(crate) fn from_draft(draft: EventDraft, sequence: u64) -> Self {
        Self {
            kind: draft.kind,
            stage: draft.stage,
            payload: draft.payload,
            message: draft.message,
            sequence,
            timestamp: Utc::now(),
        }
    }

    /// Normalized JSON object consumed by transports:
    ///
    /// ```json
    /// {
    ///   "type": "output",
    ///   "executor": "financial_analyst_agent",
    ///   "data": { "text": "..." },
    ///   "message": null,
    ///   "sequence": 7,
    ///   "timestamp": "2026-08-25T12:34:56.789Z"
    /// }
    /// ```
    pub fn to_json_value(&self) -> Value {
        json!({
            "type": self.kind.as_str(),
            "executor": self.stage,
            "data": self.payload.to_json_value(),
            "message": self.message,
            "sequence": self.sequence,
            "timestamp": self.timestamp.to_rfc3339(),
        })
    }

    /// Render the event as one SSE frame: `data: <json>\n\n`.
    ///
    /// Keep-alive comment lines between frames are the transport's concern,
    /// not the broker's.
    pub fn to_wire_format(&self) -> String {
        format!("data: {}\n\n", self.to_json_value())
    }
}

impl fmt::Display for StreamEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.stage, &self.message) {
            (Some(stage), Some(message)) => {
                write!(f, "#{} {} [{stage}] {message}", self.sequence, self.kind)
            }
            (Some(stage), None) => write!(f, "#{} {} [{stage}]", self.sequence, self.kind),
            (None, Some(message)) => write!(f, "#{} {} {message}", self.sequence, self.kind),
            (None, None) => write!(f, "#{} {}", self.sequence, self.kind),
        }
    }
}
