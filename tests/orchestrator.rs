mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedInvoker, StageScript, plan_value, test_harness};
use stageflow::broker::EventKind;
use stageflow::orchestrator::{RunRequest, cancel_pair};
use stageflow::outcome::RunState;

fn run_request() -> RunRequest {
    RunRequest::new("conv-1", "What if interest rates rise by 2%?")
}

#[tokio::test]
async fn happy_path_streams_plan_outputs_and_completion() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value(
            "Two-step analysis",
            &[
                (1, "Assess revenue impact", "finance agent"),
                (2, "Assess downside risk", "risk_analyst_agent"),
            ],
        )),
    );
    invoker.script(
        "financial_analyst_agent",
        StageScript::Reply("Margins compress 4%.".into()),
    );
    invoker.script(
        "risk_analyst_agent",
        StageScript::Reply("Duration risk rises.".into()),
    );
    invoker.script(
        "summarizer_agent",
        StageScript::Reply("Overall: manageable.".into()),
    );

    let (runner, broker, log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert!(!outcome.cancelled);
    assert_eq!(outcome.summary.as_deref(), Some("Overall: manageable."));
    assert_eq!(outcome.contributions.len(), 2);

    let kinds: Vec<EventKind> = broker.history(None).iter().map(|e| e.kind).collect();
    assert_eq!(kinds[0], EventKind::WorkflowStarted);
    assert_eq!(kinds[1], EventKind::PlanProduced);
    // Two specialist outputs in completion order, then summary + completion.
    assert_eq!(kinds[2..4], [EventKind::Output, EventKind::Output]);
    assert_eq!(
        kinds[4..],
        [EventKind::Output, EventKind::WorkflowCompleted]
    );

    // Alias resolution reached the canonical financial stage.
    assert_eq!(invoker.calls_for("financial_analyst_agent").len(), 1);

    // Aggregation input carries "{stage}: {text}" entries.
    let aggregator_input = &invoker.calls_for("summarizer_agent")[0].input;
    assert!(aggregator_input.contains("financial_analyst_agent: Margins compress 4%."));
    assert!(aggregator_input.contains("risk_analyst_agent: Duration risk rises."));

    // Transcript: user input, plan message, summary, numbered from 1.
    let turns = log.load_history("conv-1").await;
    assert_eq!(turns.len(), 3);
    assert_eq!(
        turns.iter().map(|t| t.sequence_number).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert_eq!(turns[0].role, "user");
    assert_eq!(turns[1].author.as_deref(), Some("planning_agent"));
    assert_eq!(turns[1].text, "Two-step analysis");
    assert_eq!(turns[2].author.as_deref(), Some("summarizer_agent"));
}

#[tokio::test]
async fn planner_receives_prior_turns_as_context() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value("No steps needed", &[])),
    );

    let (runner, broker, log) = test_harness(Arc::clone(&invoker));
    log.persist_turn(
        "conv-1",
        stageflow::conversation::ConversationTurn::user("Earlier question")
            .with_sequence_number(1),
    )
    .await;

    let (_handle, token) = cancel_pair();
    runner.run(broker, run_request(), token).await;

    let planner_call = &invoker.calls_for("planning_agent")[0];
    assert!(planner_call.had_schema);
    assert!(planner_call.input.contains("user: Earlier question"));
    assert!(
        planner_call
            .input
            .contains("user: What if interest rates rise by 2%?")
    );
}

#[tokio::test]
async fn empty_plan_completes_through_the_aggregator() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value("Could you clarify the scenario?", &[])),
    );
    invoker.script(
        "summarizer_agent",
        StageScript::Reply("Please provide more detail.".into()),
    );

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert!(outcome.contributions.is_empty());
    // Zero activated specialists is not a failure; only planner and
    // aggregator ran.
    assert_eq!(invoker.calls().len(), 2);
    assert!(invoker.calls_for("summarizer_agent")[0].input.is_empty());
}

#[tokio::test]
async fn unknown_assignees_are_dropped_silently() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value(
            "Mixed plan",
            &[
                (1, "Check the weather", "weather_agent"),
                (2, "Check the market", "market agent"),
            ],
        )),
    );

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(broker, run_request(), token).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.contributions.len(), 1);
    assert_eq!(invoker.calls_for("market_analyst_agent").len(), 1);
}

#[tokio::test]
async fn failed_specialist_is_excluded_but_run_completes() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value(
            "Two specialists",
            &[
                (1, "Financial view", "financial_analyst_agent"),
                (2, "Compliance view", "compliance_analyst_agent"),
            ],
        )),
    );
    invoker.script(
        "compliance_analyst_agent",
        StageScript::Fail("upstream 503".into()),
    );
    invoker.script(
        "financial_analyst_agent",
        StageScript::Reply("Cash flow is resilient.".into()),
    );

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.contributions.len(), 1);

    let kinds: Vec<EventKind> = broker.history(None).iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::ExecutorFailed));
    assert!(kinds.contains(&EventKind::WorkflowCompleted));

    let aggregator_input = &invoker.calls_for("summarizer_agent")[0].input;
    assert!(aggregator_input.contains("financial_analyst_agent"));
    assert!(!aggregator_input.contains("compliance_analyst_agent"));
}

#[tokio::test]
async fn all_specialists_failing_fails_the_run() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value(
            "Doomed plan",
            &[(1, "Financial view", "financial_analyst_agent")],
        )),
    );
    invoker.script(
        "financial_analyst_agent",
        StageScript::Fail("provider down".into()),
    );

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Failed);
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.error_type, "all_specialists_failed");

    let kinds: Vec<EventKind> = broker.history(None).iter().map(|e| e.kind).collect();
    assert!(kinds.contains(&EventKind::ExecutorFailed));
    assert_eq!(*kinds.last().unwrap(), EventKind::WorkflowFailed);
    // Aggregation never ran.
    assert!(invoker.calls_for("summarizer_agent").is_empty());
}

#[tokio::test]
async fn planner_failure_fails_the_workflow() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script("planning_agent", StageScript::Fail("model unavailable".into()));

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failure.unwrap().error_type, "stage_invocation_error");

    let kinds: Vec<EventKind> = broker.history(None).iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![EventKind::WorkflowStarted, EventKind::WorkflowFailed]);
}

#[tokio::test]
async fn malformed_plan_fails_the_workflow() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(serde_json::json!({"name": "incomplete"})),
    );

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(broker, run_request(), token).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failure.unwrap().error_type, "plan_format_error");
}

#[tokio::test]
async fn hung_stage_times_out_as_a_failure() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script("planning_agent", StageScript::Hang);

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(broker, run_request(), token).await;

    assert_eq!(outcome.state, RunState::Failed);
    assert_eq!(outcome.failure.unwrap().error_type, "stage_timeout");
}

#[tokio::test]
async fn aggregator_failure_publishes_error_and_fails() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script(
        "planning_agent",
        StageScript::Structured(plan_value(
            "One step",
            &[(1, "Market view", "market_analyst_agent")],
        )),
    );
    invoker.script("summarizer_agent", StageScript::Fail("boom".into()));

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let (_handle, token) = cancel_pair();
    let outcome = runner.run(Arc::clone(&broker), run_request(), token).await;

    assert_eq!(outcome.state, RunState::Failed);
    let kinds: Vec<EventKind> = broker.history(None).iter().map(|e| e.kind).collect();
    assert_eq!(*kinds.last().unwrap(), EventKind::Error);
}

#[tokio::test]
async fn cancellation_tears_down_the_stream() {
    let invoker = Arc::new(ScriptedInvoker::new());
    invoker.script("planning_agent", StageScript::Hang);

    let (runner, broker, _log) = test_harness(Arc::clone(&invoker));
    let runner = Arc::new(runner);
    let listener = broker.subscribe();

    let (handle, token) = cancel_pair();
    let run = {
        let runner = Arc::clone(&runner);
        let broker = Arc::clone(&broker);
        tokio::spawn(async move { runner.run(broker, run_request(), token).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    handle.cancel();

    let outcome = run.await.unwrap();
    assert!(outcome.cancelled);
    assert_eq!(outcome.state, RunState::Planning);

    // Teardown released the listener and cleared the buffer.
    assert!(broker.history(None).is_empty());
    let drained = tokio::time::timeout(Duration::from_millis(200), async {
        while listener.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
}
