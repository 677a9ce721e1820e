//! Identities, instructions, and the response schema for the fixed planner
//! and aggregator stages. Specialist identities live in
//! [`crate::specialists`].

use serde_json::{Value, json};

pub const PLANNER_STAGE_ID: &str = "planning_agent";
pub const AGGREGATOR_STAGE_ID: &str = "summarizer_agent";

pub(crate) const PLANNER_INSTRUCTIONS: &str = "\
You are a planning agent orchestrating a what-if analysis. Break the user's \
input into at most 5 steps, one specialist per step, using only these agent \
ids: financial_analyst_agent, risk_analyst_agent, market_analyst_agent, \
compliance_analyst_agent. If the user addresses specific agents by name, plan \
steps for those agents only. If the input is off-topic or too vague, plan no \
steps and use the message field to ask the user for clarification. Respond \
only with JSON matching the provided schema.";

pub(crate) const AGGREGATOR_INSTRUCTIONS: &str = "\
You are an analysis summarizer. Consolidate the responses from the expert \
analyst agents into a single coherent summary in markdown, referencing each \
contributing agent by id and capturing their key insights, recommendations, \
and risk assessments.";

/// JSON schema the planner's structured output must match; handed to the
/// invoker as `response_schema`.
pub(crate) fn plan_response_schema() -> Value {
    json!({
        "type": "object",
        "required": ["name", "description", "message", "steps"],
        "properties": {
            "name": { "type": "string" },
            "description": { "type": "string" },
            "message": { "type": "string" },
            "steps": {
                "type": "array",
                "items": {
                    "type": "object",
                    "required": ["number", "task", "assigned_agent"],
                    "properties": {
                        "number": { "type": "integer" },
                        "task": { "type": "string" },
                        "assigned_agent": { "type": "string" }
                    }
                }
            }
        }
    })
}
