// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Chat session
//
// Orchestrates one conversation: inserts the user turn and the streaming
// placeholder, opens the backend stream, runs the read loop, and handles
// user cancels and session resets. At most one request is in flight.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::{CancelOutcome, CancellationController};
use crate::config::{Config, Phrases};
use crate::message::{ChatTurn, Message};
use crate::session::{
    ConversationId, FilePersistence, InMemoryPersistence, PersistError, SessionPersistence,
};
use crate::store::{MessageStore, StoreError};
use crate::stream::{StreamOutcome, StreamProcessor};
use crate::transport::{ChatRequest, ChatTransport, HttpChatTransport, TransportError};

/// Prior messages returned by [`ChatSession::context_messages`].
pub const CONTEXT_WINDOW: usize = 4;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("a reply is still streaming")]
    Busy,

    #[error("message must not be empty")]
    EmptyMessage,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

pub struct ChatSession {
    store: Arc<MessageStore>,
    transport: Arc<dyn ChatTransport>,
    controller: CancellationController,
    processor: StreamProcessor,
    phrases: Phrases,
    welcome_message: Option<String>,
    context_turns: usize,
    pending: Mutex<Option<String>>,
}

impl ChatSession {
    pub fn new(config: &Config, store: Arc<MessageStore>, transport: Arc<dyn ChatTransport>) -> Self {
        Self {
            store,
            transport,
            controller: CancellationController::new(),
            processor: StreamProcessor::new(config.labels.clone(), config.phrases.clone()),
            phrases: config.phrases.clone(),
            welcome_message: config.welcome_message.clone(),
            context_turns: config.store.context_turns,
            pending: Mutex::new(None),
        }
    }

    /// Session over the HTTP transport, persisted under `store.data_dir`
    /// when one is configured.
    pub fn from_config(config: &Config) -> Result<Self, ChatError> {
        let backend: Arc<dyn SessionPersistence> = match &config.store.data_dir {
            Some(dir) => Arc::new(FilePersistence::new(dir)?),
            None => Arc::new(InMemoryPersistence::new()),
        };
        let store = Arc::new(MessageStore::open(&config.store, backend));
        let transport = Arc::new(HttpChatTransport::from_config(&config.backend)?);
        Ok(Self::new(config, store, transport))
    }

    pub fn store(&self) -> &Arc<MessageStore> {
        &self.store
    }

    pub fn conversation_id(&self) -> ConversationId {
        self.store.conversation_id()
    }

    pub fn is_streaming(&self) -> bool {
        self.store.streaming_index().is_some()
    }

    // -----------------------------------------------------------------
    // Sending
    // -----------------------------------------------------------------

    /// Insert the user message and the assistant placeholder. Returns the
    /// placeholder's index.
    pub fn send_message(&self, content: &str) -> Result<usize, ChatError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if self.is_streaming() {
            return Err(ChatError::Busy);
        }
        self.store.add_message(Message::user(content))?;
        Ok(self.store.begin_stream()?)
    }

    /// Open the backend stream for the placeholder at `index` and run the
    /// read loop until the message is final.
    pub async fn handle_stream_response(&self, index: usize, user_content: &str) -> StreamOutcome {
        let request_id = Uuid::new_v4();
        let conversation_id = self.store.conversation_id();
        let span = tracing::info_span!(
            "stream",
            request_id = %request_id,
            conversation_id = %conversation_id,
            index
        );

        let handle = self.controller.begin();
        let request = ChatRequest {
            conversation_id,
            turns: self.request_turns(index, user_content),
        };

        let outcome = async {
            tracing::info!(turns = request.turns.len(), "opening stream");
            let opened = tokio::select! {
                biased;
                _ = handle.token().cancelled() => Err(TransportError::Aborted),
                opened = self.transport.open_stream(request) => opened,
            };
            match opened {
                Ok(stream) => {
                    self.processor
                        .run(stream, handle.token(), &self.store, index)
                        .await
                }
                Err(error) => self.processor.abandon(error, &self.store, index),
            }
        }
        .instrument(span)
        .await;

        self.controller.release(&handle);
        outcome
    }

    /// `send_message` followed by `handle_stream_response`.
    pub async fn ask(&self, content: &str) -> Result<StreamOutcome, ChatError> {
        let index = self.send_message(content)?;
        Ok(self.handle_stream_response(index, content.trim()).await)
    }

    /// Cancel the in-flight reply, keeping whatever content it already has.
    pub async fn cancel_stream(&self) -> CancelOutcome {
        self.controller
            .cancel(
                self.transport.as_ref(),
                &self.store,
                self.store.conversation_id(),
                &self.phrases,
            )
            .await
    }

    fn request_turns(&self, index: usize, user_content: &str) -> Vec<ChatTurn> {
        let mut turns = Vec::with_capacity(self.context_turns + 1);
        if self.context_turns > 0 {
            // Skip the user message right before the placeholder.
            let history = self.store.messages();
            let end = index.saturating_sub(1).min(history.len());
            let start = end.saturating_sub(self.context_turns);
            turns.extend(
                history[start..end]
                    .iter()
                    .filter(|m| !m.content.is_empty())
                    .map(Message::to_turn),
            );
        }
        turns.push(Message::user(user_content).to_turn());
        turns
    }

    // -----------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------

    /// Fresh conversation id and empty transcript. Any running read loop
    /// is signalled and detaches from the store.
    pub fn reset_session(&self) -> ConversationId {
        self.controller.abort();
        let id = self.store.reset();
        tracing::info!(conversation_id = %id, "session reset");
        id
    }

    /// Like `reset_session`, but the new transcript opens with the
    /// configured welcome message.
    pub fn clear_conversation(&self) -> ConversationId {
        self.controller.abort();
        let id = self.store.clear(self.welcome_message.as_deref());
        tracing::info!(conversation_id = %id, "conversation cleared");
        id
    }

    pub fn set_conversation_id(&self, id: ConversationId) {
        self.store.set_conversation_id(id);
    }

    pub fn reset_messages(&self, messages: Vec<Message>) -> Result<(), ChatError> {
        Ok(self.store.reset_messages(messages)?)
    }

    /// The messages before the current one, at most [`CONTEXT_WINDOW`].
    pub fn context_messages(&self) -> Vec<Message> {
        self.store.context_messages(CONTEXT_WINDOW)
    }

    // -----------------------------------------------------------------
    // Pending message
    // -----------------------------------------------------------------

    /// Park a message to be sent once the consumer is ready.
    pub fn set_pending_message(&self, content: impl Into<String>) {
        *self.lock_pending() = Some(content.into());
    }

    pub fn take_pending_message(&self) -> Option<String> {
        self.lock_pending().take()
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<String>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
