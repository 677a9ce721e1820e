use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::timeout;
use tracing::instrument;
use uuid::Uuid;

use crate::broker::{EventBroker, EventDraft, EventKind, EventPayload};
use crate::conversation::{ConversationLog, ConversationTurn};
use crate::invoker::{InvokeError, StageInvoker, StageOutput};
use crate::outcome::{FailureDetails, RunState, StageFailure};
use crate::plan::{self, Plan, PlanStep};
use crate::specialists::{SpecialistId, SpecialistRegistry};

use super::cancel::CancelToken;
use super::config::RunnerConfig;
use super::stages::{
    AGGREGATOR_INSTRUCTIONS, AGGREGATOR_STAGE_ID, PLANNER_INSTRUCTIONS, PLANNER_STAGE_ID,
    plan_response_schema,
};

/// Input for one pipeline run.
#[derive(Clone, Debug)]
pub struct RunRequest {
    pub conversation_id: String,
    pub input: String,
}

impl RunRequest {
    pub fn new(conversation_id: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            input: input.into(),
        }
    }
}

/// One surviving specialist result, in completion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpecialistContribution {
    pub id: SpecialistId,
    pub step: u32,
    pub text: String,
}

/// Terminal report of a run. Every failure reflected here was also published
/// as an event before the run ended.
#[derive(Clone, Debug)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub state: RunState,
    /// True when the run was cancelled; `state` then holds the stage the run
    /// was in when cancellation was observed.
    pub cancelled: bool,
    pub plan: Option<Plan>,
    pub contributions: Vec<SpecialistContribution>,
    pub summary: Option<String>,
    pub failure: Option<FailureDetails>,
}

impl RunOutcome {
    fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Started,
            cancelled: false,
            plan: None,
            contributions: Vec::new(),
            summary: None,
            failure: None,
        }
    }
}

/// Drives one run through `Started → Planning → FanOut → Aggregating →
/// Completed` (or `Failed` from any stage), publishing every transition and
/// stage output through the broker.
///
/// The runner holds no per-run state; the same instance serves any number of
/// sequential or concurrent runs, each with its own broker.
pub struct PipelineRunner {
    invoker: Arc<dyn StageInvoker>,
    registry: SpecialistRegistry,
    conversations: ConversationLog,
    config: RunnerConfig,
}

impl PipelineRunner {
    pub fn new(
        invoker: Arc<dyn StageInvoker>,
        conversations: ConversationLog,
        config: RunnerConfig,
    ) -> Self {
        Self {
            invoker,
            registry: SpecialistRegistry,
            conversations,
            config,
        }
    }

    /// Execute the full pipeline for `request`, streaming progress through
    /// `broker`.
    ///
    /// Never panics the stream: every failure path publishes a terminal
    /// event before returning. On cancellation the broker is torn down,
    /// in-flight specialist invocations run to completion-or-timeout
    /// detached, and their late publishes are dropped by the closed broker.
    #[instrument(skip_all, fields(run_id = tracing::field::Empty, conversation = %request.conversation_id))]
    pub async fn run(
        &self,
        broker: Arc<EventBroker>,
        request: RunRequest,
        mut cancel: CancelToken,
    ) -> RunOutcome {
        let run_id = Uuid::new_v4();
        tracing::Span::current().record("run_id", tracing::field::display(run_id));
        let mut outcome = RunOutcome::new(run_id);

        tracing::info!("pipeline run started");
        broker.publish(EventDraft::workflow_started());

        let history = self.conversations.load_history(&request.conversation_id).await;
        self.record_turn(
            &request.conversation_id,
            ConversationTurn::user(request.input.clone()),
        )
        .await;
        let context = render_context(&history, &request.input);

        // Planning
        outcome.state = RunState::Planning;
        let planner_result = tokio::select! {
            _ = cancel.cancelled() => {
                return self.cancel_run(&broker, outcome);
            }
            result = invoke_stage(
                Arc::clone(&self.invoker),
                self.config.stage_timeout,
                PLANNER_STAGE_ID,
                PLANNER_INSTRUCTIONS,
                &context,
                Some(plan_response_schema()),
            ) => result,
        };
        let plan = match planner_result {
            Ok(output) => match parse_plan_output(&output) {
                Ok(plan) => plan,
                Err(failure) => return self.fail_run(&broker, outcome, failure),
            },
            Err(err) => {
                return self.fail_run(&broker, outcome, StageFailure::Planner(err));
            }
        };

        // Turn number before broker sequence, so persisted order and
        // streamed order agree.
        self.record_turn(
            &request.conversation_id,
            ConversationTurn::assistant(plan.message.clone())
                .with_author(PLANNER_STAGE_ID)
                .with_structured_content(
                    serde_json::to_value(&plan).unwrap_or(Value::Null),
                ),
        )
        .await;
        broker.publish(EventDraft::plan_produced(PLANNER_STAGE_ID, plan.clone()));
        outcome.plan = Some(plan.clone());

        // Fan-out
        outcome.state = RunState::FanOut;
        let assignments = plan::resolve_assignees(&plan, &self.registry);
        let activated: Vec<(SpecialistId, Vec<PlanStep>)> = self
            .registry
            .members()
            .iter()
            .filter_map(|id| {
                assignments
                    .get(id)
                    .map(|steps| (*id, steps.iter().map(|s| (*s).clone()).collect()))
            })
            .collect();
        tracing::debug!(activated = activated.len(), "fan-out set resolved");

        let (results_tx, results_rx) = flume::unbounded();
        let expected = activated.len();
        for (id, steps) in activated {
            let broker = Arc::clone(&broker);
            let invoker = Arc::clone(&self.invoker);
            let stage_timeout = self.config.stage_timeout;
            let context = context.clone();
            let results_tx = results_tx.clone();
            tokio::spawn(async move {
                let result =
                    run_specialist(broker, invoker, stage_timeout, id, steps, &context).await;
                let _ = results_tx.send_async((id, result)).await;
            });
        }
        drop(results_tx);

        let mut failed_specialists = 0usize;
        let mut received = 0usize;
        while received < expected {
            let (id, result) = tokio::select! {
                _ = cancel.cancelled() => {
                    return self.cancel_run(&broker, outcome);
                }
                recv = results_rx.recv_async() => match recv {
                    Ok(entry) => entry,
                    Err(_) => break,
                },
            };
            received += 1;
            match result {
                Ok(contributions) => outcome.contributions.extend(contributions),
                Err(()) => {
                    failed_specialists += 1;
                    tracing::debug!(specialist = %id, "specialist excluded from aggregation");
                }
            }
        }

        if expected > 0 && failed_specialists == expected {
            let details = FailureDetails {
                error_message: "every activated specialist failed".to_string(),
                error_type: "all_specialists_failed".to_string(),
                extra_context: serde_json::json!({ "activated": expected }),
            };
            broker.publish(
                EventDraft::new(EventKind::WorkflowFailed)
                    .with_payload(EventPayload::Failure(details.clone()))
                    .with_message("Workflow execution failed"),
            );
            outcome.state = RunState::Failed;
            outcome.failure = Some(details);
            tracing::warn!("pipeline run failed: no surviving specialist output");
            return outcome;
        }

        // Fan-in / aggregation. Failed specialists contribute no entry and
        // do not block aggregation; an empty contribution list is still
        // aggregated (the clarification path).
        outcome.state = RunState::Aggregating;
        let combined = outcome
            .contributions
            .iter()
            .map(|entry| format!("{}: {}", entry.id, entry.text))
            .collect::<Vec<_>>()
            .join("\n\n");
        let aggregate_result = tokio::select! {
            _ = cancel.cancelled() => {
                return self.cancel_run(&broker, outcome);
            }
            result = invoke_stage(
                Arc::clone(&self.invoker),
                self.config.stage_timeout,
                AGGREGATOR_STAGE_ID,
                AGGREGATOR_INSTRUCTIONS,
                &combined,
                None,
            ) => result,
        };
        let summary = match aggregate_result {
            Ok(output) => output.text,
            Err(err) => {
                return self.fail_run(&broker, outcome, StageFailure::Aggregator(err));
            }
        };

        self.record_turn(
            &request.conversation_id,
            ConversationTurn::assistant(summary.clone()).with_author(AGGREGATOR_STAGE_ID),
        )
        .await;
        broker.publish(EventDraft::output(AGGREGATOR_STAGE_ID, summary.clone()));
        broker.publish(EventDraft::workflow_completed());

        outcome.state = RunState::Completed;
        outcome.summary = Some(summary);
        tracing::info!("pipeline run completed");
        outcome
    }

    /// Assign the next durable turn number and persist best-effort.
    async fn record_turn(&self, conversation_id: &str, turn: ConversationTurn) {
        let number = self.conversations.next_turn_number(conversation_id).await;
        self.conversations
            .persist_turn(conversation_id, turn.with_sequence_number(number))
            .await;
    }

    fn fail_run(
        &self,
        broker: &EventBroker,
        mut outcome: RunOutcome,
        failure: StageFailure,
    ) -> RunOutcome {
        let details = failure.details();
        broker.publish(failure.into_event());
        tracing::warn!(
            error_type = %details.error_type,
            error = %details.error_message,
            "pipeline run failed"
        );
        outcome.state = RunState::Failed;
        outcome.failure = Some(details);
        outcome
    }

    fn cancel_run(&self, broker: &EventBroker, mut outcome: RunOutcome) -> RunOutcome {
        tracing::info!(state = ?outcome.state, "pipeline run cancelled");
        broker.teardown();
        outcome.cancelled = true;
        outcome
    }
}

/// Flatten prior turns plus the current input into the stage input context.
fn render_context(history: &[ConversationTurn], input: &str) -> String {
    let mut lines: Vec<String> = history
        .iter()
        .map(|turn| {
            let speaker = turn.author.as_deref().unwrap_or(&turn.role);
            format!("{speaker}: {}", turn.text)
        })
        .collect();
    lines.push(format!("user: {input}"));
    lines.join("\n\n")
}

fn parse_plan_output(output: &StageOutput) -> Result<Plan, StageFailure> {
    let value = match &output.value {
        Some(value) => value.clone(),
        None => serde_json::from_str(&output.text).map_err(|_| {
            StageFailure::Planner(InvokeError::Provider {
                stage: PLANNER_STAGE_ID.to_string(),
                message: "planner returned no structured output".to_string(),
            })
        })?,
    };
    plan::parse(&value).map_err(StageFailure::PlanFormat)
}

async fn invoke_stage(
    invoker: Arc<dyn StageInvoker>,
    stage_timeout: Duration,
    stage_id: &str,
    instructions: &str,
    input: &str,
    response_schema: Option<Value>,
) -> Result<StageOutput, InvokeError> {
    match timeout(
        stage_timeout,
        invoker.invoke(stage_id, instructions, input, response_schema.as_ref()),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => Err(InvokeError::Timeout {
            stage: stage_id.to_string(),
            timeout_secs: stage_timeout.as_secs(),
        }),
    }
}

/// Run one specialist's assigned steps sequentially, publishing an output
/// event per step in true completion order.
///
/// Any step failure publishes `executor_failed` and discards the whole
/// specialist's contribution; other specialists are unaffected.
async fn run_specialist(
    broker: Arc<EventBroker>,
    invoker: Arc<dyn StageInvoker>,
    stage_timeout: Duration,
    id: SpecialistId,
    steps: Vec<PlanStep>,
    context: &str,
) -> Result<Vec<SpecialistContribution>, ()> {
    let mut contributions = Vec::with_capacity(steps.len());
    for step in steps {
        tracing::debug!(specialist = %id, step = step.number, "executing step");
        let input = format!("{context}\n\nTask: {}", step.task);
        match invoke_stage(
            Arc::clone(&invoker),
            stage_timeout,
            id.as_str(),
            id.instructions(),
            &input,
            None,
        )
        .await
        {
            Ok(output) => {
                broker.publish(EventDraft::output(id.as_str(), output.text.clone()));
                contributions.push(SpecialistContribution {
                    id,
                    step: step.number,
                    text: output.text,
                });
            }
            Err(err) => {
                broker.publish(
                    StageFailure::Specialist {
                        id,
                        step: step.number,
                        source: err,
                    }
                    .into_event(),
                );
                return Err(());
            }
        }
    }
    Ok(contributions)
}
