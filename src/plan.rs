//! Validated model for the planning stage's structured output.
//!
//! [`parse`] checks structural integrity only: required fields must be
//! present and step numbers must be unique integers. A plan with zero steps,
//! or whose steps name no known specialist, is valid; it simply activates no
//! specialist and leaves the planner's `message` as the user-facing reply.

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::specialists::{SpecialistId, SpecialistRegistry};

/// One step of a plan, assigned to a specialist by (alias) name.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanStep {
    pub number: u32,
    pub task: String,
    pub assigned_agent: String,
}

/// Structured task breakdown produced by the planning stage.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Plan {
    pub name: String,
    pub description: String,
    /// User-facing summary, or a clarification request when `steps` is empty.
    pub message: String,
    pub steps: Vec<PlanStep>,
}

/// Malformed planning output. Fatal to the run.
#[derive(Debug, Error, Diagnostic)]
pub enum PlanFormatError {
    #[error("planning output is not a JSON object")]
    #[diagnostic(code(stageflow::plan::not_an_object))]
    NotAnObject,

    #[error("planning output missing required field: {field}")]
    #[diagnostic(
        code(stageflow::plan::missing_field),
        help("The planner must emit name, description, message, and steps.")
    )]
    MissingField { field: &'static str },

    #[error("step {index} field `{field}` has the wrong type")]
    #[diagnostic(code(stageflow::plan::invalid_step_field))]
    InvalidStepField { index: usize, field: &'static str },

    #[error("duplicate step number {number}")]
    #[diagnostic(
        code(stageflow::plan::duplicate_step_number),
        help("Step numbers must be unique within a plan.")
    )]
    DuplicateStepNumber { number: u32 },
}

fn require_str(raw: &Value, field: &'static str) -> Result<String, PlanFormatError> {
    raw.get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or(PlanFormatError::MissingField { field })
}

/// Parse the planner's raw structured output into a [`Plan`].
///
/// No semantic validation happens here beyond the structural invariants;
/// whether the named agents exist is resolved later by
/// [`resolve_assignees`].
pub fn parse(raw: &Value) -> Result<Plan, PlanFormatError> {
    if !raw.is_object() {
        return Err(PlanFormatError::NotAnObject);
    }

    let steps_raw = raw
        .get("steps")
        .and_then(Value::as_array)
        .ok_or(PlanFormatError::MissingField { field: "steps" })?;

    let mut steps = Vec::with_capacity(steps_raw.len());
    let mut seen = FxHashMap::default();
    for (index, step) in steps_raw.iter().enumerate() {
        let number = step
            .get("number")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .ok_or(PlanFormatError::InvalidStepField {
                index,
                field: "number",
            })?;
        let task = step
            .get("task")
            .and_then(Value::as_str)
            .ok_or(PlanFormatError::InvalidStepField {
                index,
                field: "task",
            })?;
        let assigned_agent = step.get("assigned_agent").and_then(Value::as_str).ok_or(
            PlanFormatError::InvalidStepField {
                index,
                field: "assigned_agent",
            },
        )?;
        if seen.insert(number, index).is_some() {
            return Err(PlanFormatError::DuplicateStepNumber { number });
        }
        steps.push(PlanStep {
            number,
            task: task.to_string(),
            assigned_agent: assigned_agent.to_string(),
        });
    }

    Ok(Plan {
        name: require_str(raw, "name")?,
        description: require_str(raw, "description")?,
        message: require_str(raw, "message")?,
        steps,
    })
}

/// Group a plan's steps by the specialist they resolve to, preserving plan
/// order within each group.
///
/// Steps naming no known specialist are dropped; the drop is logged
/// distinctly so product can decide later whether it deserves surfacing.
pub fn resolve_assignees<'a>(
    plan: &'a Plan,
    registry: &SpecialistRegistry,
) -> FxHashMap<SpecialistId, Vec<&'a PlanStep>> {
    let mut assignments: FxHashMap<SpecialistId, Vec<&PlanStep>> = FxHashMap::default();
    for step in &plan.steps {
        match registry.resolve(&step.assigned_agent) {
            Some(specialist) => assignments.entry(specialist).or_default().push(step),
            None => {
                tracing::warn!(
                    step = step.number,
                    assigned_agent = %step.assigned_agent,
                    "plan step names no known specialist; dropped"
                );
            }
        }
    }
    assignments
}
