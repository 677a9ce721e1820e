//! Conversation turns, the document-store collaborator boundary, and the
//! sequencing adapter.
//!
//! Turn numbers are a durable, cross-session ordinal per conversation and a
//! numbering domain entirely separate from broker event sequences. They are
//! assigned synchronously before the corresponding event is published, so
//! persisted order and streamed order stay consistent even when persistence
//! and streaming race.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One persisted message in a conversation transcript.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    /// "user" or "assistant".
    pub role: String,
    pub author: Option<String>,
    pub text: String,
    pub structured_content: Option<Value>,
    /// Durable per-conversation ordinal, starting at 1.
    pub sequence_number: u64,
    pub created_at: DateTime<Utc>,
}

impl ConversationTurn {
    pub const USER: &'static str = "user";
    pub const ASSISTANT: &'static str = "assistant";

    pub fn new(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            author: None,
            text: text.into(),
            structured_content: None,
            sequence_number: 0,
            created_at: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Self::USER, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Self::ASSISTANT, text)
    }

    #[must_use]
    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    #[must_use]
    pub fn with_structured_content(mut self, content: Value) -> Self {
        self.structured_content = Some(content);
        self
    }

    #[must_use]
    pub fn with_sequence_number(mut self, sequence_number: u64) -> Self {
        self.sequence_number = sequence_number;
        self
    }
}

/// A conversation document: id, optional title, ordered turns.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    pub conversation_id: String,
    pub title: Option<String>,
    pub turns: Vec<ConversationTurn>,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            title: None,
            turns: Vec::new(),
            created_at: Utc::now(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }
}

/// Errors surfaced by a conversation store backend.
#[derive(Debug, Error, Diagnostic)]
pub enum StoreError {
    #[error("conversation not found: {conversation_id}")]
    #[diagnostic(code(stageflow::store::not_found))]
    NotFound { conversation_id: String },

    #[error("conversation store backend error: {message}")]
    #[diagnostic(code(stageflow::store::backend))]
    Backend { message: String },
}

/// Document-store collaborator for conversation persistence.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError>;

    async fn create_conversation(&self, conversation: Conversation) -> Result<(), StoreError>;

    async fn append_turn(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), StoreError>;

    /// Page through conversations ordered by creation time ascending.
    /// `page` is 1-based.
    async fn list_conversations(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError>;
}

/// Volatile store for tests and development.
#[derive(Default)]
pub struct InMemoryConversationStore {
    conversations: Mutex<FxHashMap<String, Conversation>>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn get_conversation(
        &self,
        conversation_id: &str,
    ) -> Result<Option<Conversation>, StoreError> {
        let conversations = self.conversations.lock().expect("store lock poisoned");
        Ok(conversations.get(conversation_id).cloned())
    }

    async fn create_conversation(&self, conversation: Conversation) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().expect("store lock poisoned");
        conversations.insert(conversation.conversation_id.clone(), conversation);
        Ok(())
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        turn: ConversationTurn,
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.lock().expect("store lock poisoned");
        let conversation =
            conversations
                .get_mut(conversation_id)
                .ok_or_else(|| StoreError::NotFound {
                    conversation_id: conversation_id.to_string(),
                })?;
        conversation.turns.push(turn);
        Ok(())
    }

    async fn list_conversations(
        &self,
        page: usize,
        limit: usize,
    ) -> Result<Vec<Conversation>, StoreError> {
        let conversations = self.conversations.lock().expect("store lock poisoned");
        let mut all: Vec<Conversation> = conversations.values().cloned().collect();
        all.sort_by_key(|conversation| conversation.created_at);
        let offset = page.saturating_sub(1).saturating_mul(limit);
        Ok(all.into_iter().skip(offset).take(limit).collect())
    }
}

/// Sequencing adapter over a [`ConversationStore`].
///
/// Persistence is best-effort: a store failure is logged and never fails the
/// in-flight run, since streaming to the live client takes priority over
/// transcript durability.
#[derive(Clone)]
pub struct ConversationLog {
    store: Arc<dyn ConversationStore>,
}

impl ConversationLog {
    pub fn new(store: Arc<dyn ConversationStore>) -> Self {
        Self { store }
    }

    /// Next durable turn ordinal, derived from the count of persisted turns
    /// (3 persisted turns → 4). A missing conversation starts at 1.
    pub async fn next_turn_number(&self, conversation_id: &str) -> u64 {
        match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => conversation.turns.len() as u64 + 1,
            Ok(None) => 1,
            Err(err) => {
                tracing::warn!(
                    conversation = %conversation_id,
                    error = %err,
                    "failed to read conversation for turn numbering; assuming empty"
                );
                1
            }
        }
    }

    /// Persist a turn, creating the conversation document on first write.
    pub async fn persist_turn(&self, conversation_id: &str, turn: ConversationTurn) {
        let result = match self.store.append_turn(conversation_id, turn.clone()).await {
            Err(StoreError::NotFound { .. }) => {
                let mut conversation = Conversation::new(conversation_id);
                conversation.turns.push(turn);
                self.store.create_conversation(conversation).await
            }
            other => other,
        };
        if let Err(err) = result {
            tracing::warn!(
                conversation = %conversation_id,
                error = %err,
                "failed to persist conversation turn; run continues"
            );
        }
    }

    /// Prior turns sorted ascending by `sequence_number`, used to rebuild
    /// context before a new run. Store failures yield an empty history.
    pub async fn load_history(&self, conversation_id: &str) -> Vec<ConversationTurn> {
        match self.store.get_conversation(conversation_id).await {
            Ok(Some(conversation)) => {
                let mut turns = conversation.turns;
                turns.sort_by_key(|turn| turn.sequence_number);
                turns
            }
            Ok(None) => Vec::new(),
            Err(err) => {
                tracing::warn!(
                    conversation = %conversation_id,
                    error = %err,
                    "failed to load conversation history; starting without context"
                );
                Vec::new()
            }
        }
    }
}
