//! Shared test helpers: a scriptable stage invoker and plan fixtures.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rustc_hash::FxHashMap;
use serde_json::{Value, json};

use stageflow::broker::EventBroker;
use stageflow::conversation::{ConversationLog, InMemoryConversationStore};
use stageflow::invoker::{InvokeError, StageInvoker, StageOutput};
use stageflow::orchestrator::{PipelineRunner, RunnerConfig};

/// What a scripted stage should do when invoked.
#[derive(Clone)]
pub enum StageScript {
    /// Return plain text.
    Reply(String),
    /// Return a structured value (text is its JSON rendering).
    Structured(Value),
    /// Fail with a provider error.
    Fail(String),
    /// Never resolve, to exercise timeouts and cancellation.
    Hang,
}

/// Records one invocation the mock received.
#[derive(Clone, Debug)]
pub struct InvocationRecord {
    pub stage_id: String,
    pub input: String,
    pub had_schema: bool,
}

/// Stage invoker driven by a per-stage script table. Unscripted stages reply
/// with `"<stage_id> result"`.
#[derive(Default)]
pub struct ScriptedInvoker {
    scripts: Mutex<FxHashMap<String, StageScript>>,
    calls: Mutex<Vec<InvocationRecord>>,
}

impl ScriptedInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, stage_id: &str, script: StageScript) {
        self.scripts
            .lock()
            .unwrap()
            .insert(stage_id.to_string(), script);
    }

    pub fn calls(&self) -> Vec<InvocationRecord> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, stage_id: &str) -> Vec<InvocationRecord> {
        self.calls()
            .into_iter()
            .filter(|record| record.stage_id == stage_id)
            .collect()
    }
}

#[async_trait]
impl StageInvoker for ScriptedInvoker {
    async fn invoke(
        &self,
        stage_id: &str,
        _instructions: &str,
        input: &str,
        response_schema: Option<&Value>,
    ) -> Result<StageOutput, InvokeError> {
        self.calls.lock().unwrap().push(InvocationRecord {
            stage_id: stage_id.to_string(),
            input: input.to_string(),
            had_schema: response_schema.is_some(),
        });
        let script = self.scripts.lock().unwrap().get(stage_id).cloned();
        match script {
            Some(StageScript::Reply(text)) => Ok(StageOutput::text(text)),
            Some(StageScript::Structured(value)) => Ok(StageOutput::structured(value)),
            Some(StageScript::Fail(message)) => Err(InvokeError::Provider {
                stage: stage_id.to_string(),
                message,
            }),
            Some(StageScript::Hang) => {
                std::future::pending::<()>().await;
                unreachable!()
            }
            None => Ok(StageOutput::text(format!("{stage_id} result"))),
        }
    }
}

/// A well-formed plan value assigning `steps` as `(number, task, agent)`.
pub fn plan_value(message: &str, steps: &[(u64, &str, &str)]) -> Value {
    json!({
        "name": "what-if analysis",
        "description": "scripted plan",
        "message": message,
        "steps": steps
            .iter()
            .map(|(number, task, agent)| {
                json!({ "number": number, "task": task, "assigned_agent": agent })
            })
            .collect::<Vec<_>>(),
    })
}

/// Runner wired to an in-memory store, a fresh broker, and a short timeout.
pub fn test_harness(
    invoker: Arc<ScriptedInvoker>,
) -> (PipelineRunner, Arc<EventBroker>, ConversationLog) {
    let log = ConversationLog::new(Arc::new(InMemoryConversationStore::new()));
    let config = RunnerConfig::default().with_stage_timeout(Duration::from_millis(500));
    let runner = PipelineRunner::new(invoker, log.clone(), config);
    let broker = Arc::new(EventBroker::new(64, 32));
    (runner, broker, log)
}
