//! Collaborator boundary for the opaque per-stage reasoning call.
//!
//! The pipeline never knows what performs a stage's reasoning; it hands the
//! invoker a stage id, instructions, and input, and gets back text plus an
//! optional structured value. Latency and retry policy belong to the
//! implementor.

use async_trait::async_trait;
use miette::Diagnostic;
use serde_json::Value;
use thiserror::Error;

/// Result of one stage invocation.
#[derive(Clone, Debug, Default)]
pub struct StageOutput {
    /// Text form of the result, used for output events and aggregation.
    pub text: String,
    /// Structured form when a response schema was supplied.
    pub value: Option<Value>,
}

impl StageOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            value: None,
        }
    }

    pub fn structured(value: Value) -> Self {
        Self {
            text: value.to_string(),
            value: Some(value),
        }
    }
}

/// A single stage's call failed.
#[derive(Debug, Error, Diagnostic)]
pub enum InvokeError {
    #[error("stage {stage} invocation failed: {message}")]
    #[diagnostic(code(stageflow::invoke::provider))]
    Provider { stage: String, message: String },

    #[error("stage {stage} timed out after {timeout_secs}s")]
    #[diagnostic(
        code(stageflow::invoke::timeout),
        help("Stage timeouts are treated identically to stage failures.")
    )]
    Timeout { stage: String, timeout_secs: u64 },
}

impl InvokeError {
    /// Stable tag carried in failure event payloads as `error_type`.
    pub fn error_type(&self) -> &'static str {
        match self {
            InvokeError::Provider { .. } => "stage_invocation_error",
            InvokeError::Timeout { .. } => "stage_timeout",
        }
    }
}

/// Capability that performs one stage's reasoning (e.g. an LLM call).
#[async_trait]
pub trait StageInvoker: Send + Sync {
    /// Run a single stage invocation.
    ///
    /// `response_schema`, when present, asks the implementor to return a
    /// structured value matching the schema (the planner relies on this).
    async fn invoke(
        &self,
        stage_id: &str,
        instructions: &str,
        input: &str,
        response_schema: Option<&Value>,
    ) -> Result<StageOutput, InvokeError>;
}
