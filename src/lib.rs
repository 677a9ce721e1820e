//! # Stageflow: Staged Multi-Agent Analysis Pipeline
//!
//! Stageflow runs "what-if" analysis requests through a staged pipeline —
//! a planning stage fans out to specialist analysts selected by the plan,
//! and an aggregation stage folds their results into a single summary —
//! while streaming every transition through a sequenced, replayable event
//! broker.
//!
//! ## Core Concepts
//!
//! - **Broker**: Per-session ring buffer of sequenced [`broker::StreamEvent`]s
//!   with live fan-out to listeners and replay by sequence number
//! - **Plan**: Structured planner output mapping numbered steps to specialist
//!   agents
//! - **Specialists**: The fixed roster of analyst stages and the alias table
//!   that resolves free-form plan assignments onto it
//! - **Runner**: The [`orchestrator::PipelineRunner`] state machine,
//!   `Started → Planning → FanOut → Aggregating → Completed` (or `Failed`)
//! - **Conversation**: Durable turn persistence with per-conversation
//!   ordinals, independent of broker sequences
//!
//! ## Streaming events
//!
//! ```
//! use stageflow::broker::{EventBroker, EventDraft};
//!
//! let broker = EventBroker::new(16, 8);
//! let listener = broker.subscribe();
//!
//! broker.publish(EventDraft::workflow_started());
//! broker.publish(EventDraft::output("financial_analyst_agent", "Margins hold."));
//!
//! // Replay everything after sequence 0.
//! let replay = broker.history(Some(0));
//! assert_eq!(replay.len(), 1);
//! assert_eq!(replay[0].sequence, 1);
//! drop(listener);
//! ```
//!
//! ## Running the pipeline
//!
//! A run needs a [`invoker::StageInvoker`] implementation (the model-provider
//! seam), a [`conversation::ConversationStore`], and a broker for the
//! session:
//!
//! ```no_run
//! use std::sync::Arc;
//! use stageflow::broker::EventBroker;
//! use stageflow::conversation::{ConversationLog, InMemoryConversationStore};
//! use stageflow::invoker::StageInvoker;
//! use stageflow::orchestrator::{PipelineRunner, RunRequest, RunnerConfig, cancel_pair};
//!
//! async fn run(invoker: Arc<dyn StageInvoker>) {
//!     let config = RunnerConfig::from_env();
//!     let log = ConversationLog::new(Arc::new(InMemoryConversationStore::new()));
//!     let runner = PipelineRunner::new(invoker, log, config.clone());
//!
//!     let broker = Arc::new(EventBroker::new(
//!         config.broker_capacity,
//!         config.listener_capacity,
//!     ));
//!     let (_handle, token) = cancel_pair();
//!     let outcome = runner
//!         .run(broker, RunRequest::new("conv-1", "What if rates rise 2%?"), token)
//!         .await;
//!     println!("finished in state {:?}", outcome.state);
//! }
//! ```

pub mod broker;
pub mod conversation;
pub mod invoker;
pub mod orchestrator;
pub mod outcome;
pub mod plan;
pub mod specialists;
pub mod telemetry;
