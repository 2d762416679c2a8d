// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Message store contract.
//
// Ordered transcript with:
// - de-duplication of back-to-back identical (role, content) inserts
// - a single designated streaming slot, always the last message
// - bulk compaction to the most recent tail at a configured ceiling
// - explicit observer notifications, one per state transition
// - persistence through the two-tier write policy

use crate::config::StoreConfig;
use crate::message::Message;
use crate::session::{
    ConversationId, ConversationSession, InMemoryPersistence, SessionPersistence, WritePolicy,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

// ---------------------------------------------------------------------------
// Events and errors
// ---------------------------------------------------------------------------

/// A logically distinct store transition, delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A message was appended at `index`.
    MessageAdded { index: usize },
    /// The streaming message at `index` has new content.
    ContentUpdated { index: usize },
    /// The streaming message at `index` received its final content and
    /// is no longer streaming.
    StreamFinalized { index: usize },
    /// The oldest `removed` messages were pruned.
    Compacted { removed: usize },
    /// The whole session was replaced.
    Reset { conversation_id: ConversationId },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("a stream is already active at index {0}")]
    StreamActive(usize),

    #[error("message {0} is not the active stream")]
    NotStreaming(usize),

    #[error("streaming messages can only be created with begin_stream")]
    StreamingInsert,
}

pub type SubscriptionId = u64;

type Subscriber = Arc<dyn Fn(&StoreEvent) + Send + Sync>;

// ---------------------------------------------------------------------------
// MessageStore
// ---------------------------------------------------------------------------

struct StoreState {
    session: ConversationSession,
    streaming_index: Option<usize>,
}

/// The single source of truth for the transcript.
///
/// All mutation during streaming goes through `update_content` and
/// `finalize`; nothing else may toggle `is_streaming`.
pub struct MessageStore {
    state: Mutex<StoreState>,
    subscribers: Mutex<Vec<(SubscriptionId, Subscriber)>>,
    next_subscription: AtomicU64,
    writer: WritePolicy,
    max_messages: usize,
    compact_to: usize,
}

impl MessageStore {
    /// Open the store, restoring the persisted session if there is a
    /// readable one. Otherwise a fresh session is created and saved.
    pub fn open(config: &StoreConfig, backend: Arc<dyn SessionPersistence>) -> Self {
        let writer = WritePolicy::new(backend, config.session_key.clone(), config.persist_debounce());
        let session = restore_session(&writer);

        // `load_config` validates these, but a hand-built StoreConfig may not.
        let max_messages = config.max_messages.max(2);
        let compact_to = config.compact_to.clamp(1, max_messages - 1);
        if (max_messages, compact_to) != (config.max_messages, config.compact_to) {
            tracing::warn!(
                max_messages = config.max_messages,
                compact_to = config.compact_to,
                using_max = max_messages,
                using_compact_to = compact_to,
                "compaction bounds out of range, clamped"
            );
        }

        let store = Self {
            state: Mutex::new(StoreState {
                session,
                streaming_index: None,
            }),
            subscribers: Mutex::new(Vec::new()),
            next_subscription: AtomicU64::new(1),
            writer,
            max_messages,
            compact_to,
        };
        store.flush();
        store
    }

    /// Store backed by process memory only.
    pub fn in_memory(config: &StoreConfig) -> Self {
        Self::open(config, Arc::new(InMemoryPersistence::new()))
    }

    // -----------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------

    pub fn conversation_id(&self) -> ConversationId {
        self.lock_state().session.conversation_id
    }

    pub fn messages(&self) -> Vec<Message> {
        self.lock_state().session.messages.clone()
    }

    pub fn message(&self, index: usize) -> Option<Message> {
        self.lock_state().session.messages.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock_state().session.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Index of the active stream, if any.
    pub fn streaming_index(&self) -> Option<usize> {
        self.lock_state().streaming_index
    }

    /// Number of messages flagged as streaming. Always 0 or 1.
    pub fn streaming_count(&self) -> usize {
        self.lock_state()
            .session
            .messages
            .iter()
            .filter(|m| m.is_streaming)
            .count()
    }

    /// The messages preceding the last one, at most `limit` of them.
    ///
    /// The last message is usually the turn currently being sent.
    pub fn context_messages(&self, limit: usize) -> Vec<Message> {
        let state = self.lock_state();
        let messages = &state.session.messages;
        let end = messages.len().saturating_sub(1);
        let start = end.saturating_sub(limit);
        messages[start..end].to_vec()
    }

    // -----------------------------------------------------------------
    // Inserts
    // -----------------------------------------------------------------

    /// Append a non-streaming message.
    ///
    /// Returns `Ok(None)` when the message is a back-to-back duplicate of
    /// the last one and was not stored.
    pub fn add_message(&self, message: Message) -> Result<Option<usize>, StoreError> {
        if message.is_streaming {
            return Err(StoreError::StreamingInsert);
        }

        let mut events = Vec::new();
        let (index, blob) = {
            let mut state = self.lock_state();
            if let Some(active) = state.streaming_index {
                return Err(StoreError::StreamActive(active));
            }
            let duplicate = state
                .session
                .messages
                .last()
                .is_some_and(|last| last.same_identity(&message));
            if duplicate {
                tracing::debug!(role = %message.role, "duplicate message not stored");
                return Ok(None);
            }

            if let Some(removed) = self.compact_locked(&mut state) {
                events.push(StoreEvent::Compacted { removed });
            }
            state.session.messages.push(message);
            let index = state.session.messages.len() - 1;
            events.push(StoreEvent::MessageAdded { index });
            (index, self.blob_locked(&state))
        };

        // Compaction is a bulk change and is flushed right away.
        let compacted = events.len() > 1;
        self.persist(blob, compacted);
        self.publish_all(&events);
        Ok(Some(index))
    }

    /// Append the empty assistant placeholder and designate it as the
    /// single streaming slot.
    pub fn begin_stream(&self) -> Result<usize, StoreError> {
        let mut events = Vec::new();
        let (index, blob) = {
            let mut state = self.lock_state();
            if let Some(active) = state.streaming_index {
                return Err(StoreError::StreamActive(active));
            }
            if let Some(removed) = self.compact_locked(&mut state) {
                events.push(StoreEvent::Compacted { removed });
            }
            state.session.messages.push(Message::streaming_placeholder());
            let index = state.session.messages.len() - 1;
            state.streaming_index = Some(index);
            events.push(StoreEvent::MessageAdded { index });
            (index, self.blob_locked(&state))
        };

        // Streaming-state transition: never debounced.
        self.persist(blob, true);
        self.publish_all(&events);
        Ok(index)
    }

    // -----------------------------------------------------------------
    // Streaming path
    // -----------------------------------------------------------------

    /// Replace the content of the active streaming message.
    ///
    /// Returns `Ok(false)` when the content is unchanged (no notification,
    /// no write).
    pub fn update_content(&self, index: usize, content: &str) -> Result<bool, StoreError> {
        let blob = {
            let mut state = self.lock_state();
            if state.streaming_index != Some(index) {
                return Err(StoreError::NotStreaming(index));
            }
            let message = &mut state.session.messages[index];
            if message.content == content {
                return Ok(false);
            }
            message.content = content.to_string();
            self.blob_locked(&state)
        };

        self.persist(blob, false);
        self.publish(&StoreEvent::ContentUpdated { index });
        Ok(true)
    }

    /// Terminal update for the streaming message at `index`: sets its final
    /// content, clears `is_streaming` and the streaming slot, and flushes.
    ///
    /// Idempotent: returns `false` (and changes nothing) if `index` is not
    /// the active stream, e.g. because it was already finalized.
    pub fn finalize(&self, index: usize, content: &str) -> bool {
        let blob = {
            let mut state = self.lock_state();
            if state.streaming_index != Some(index) {
                return false;
            }
            let message = &mut state.session.messages[index];
            message.content = content.to_string();
            message.is_streaming = false;
            state.streaming_index = None;
            self.blob_locked(&state)
        };

        self.persist(blob, true);
        self.publish(&StoreEvent::StreamFinalized { index });
        true
    }

    // -----------------------------------------------------------------
    // Session management
    // -----------------------------------------------------------------

    /// Replace the session wholesale with a fresh one (new id, empty
    /// transcript). Also the hook for environment-level reloads.
    pub fn reset(&self) -> ConversationId {
        self.replace_session(ConversationSession::new())
    }

    /// Fresh session whose transcript starts with `welcome`, if given.
    pub fn clear(&self, welcome: Option<&str>) -> ConversationId {
        let mut session = ConversationSession::new();
        if let Some(text) = welcome {
            session.messages.push(Message::assistant(text));
        }
        self.replace_session(session)
    }

    /// Replace the transcript, keeping the conversation id.
    pub fn reset_messages(&self, messages: Vec<Message>) -> Result<(), StoreError> {
        let blob = {
            let mut state = self.lock_state();
            if let Some(active) = state.streaming_index {
                return Err(StoreError::StreamActive(active));
            }
            state.session.messages = messages
                .into_iter()
                .map(|mut m| {
                    m.is_streaming = false;
                    m
                })
                .collect();
            self.blob_locked(&state)
        };
        self.persist(blob, true);
        let conversation_id = self.conversation_id();
        self.publish(&StoreEvent::Reset { conversation_id });
        Ok(())
    }

    pub fn set_conversation_id(&self, id: ConversationId) {
        let blob = {
            let mut state = self.lock_state();
            state.session.conversation_id = id;
            self.blob_locked(&state)
        };
        self.persist(blob, true);
    }

    /// Force an immediate write of the current session.
    pub fn flush(&self) {
        let blob = {
            let state = self.lock_state();
            self.blob_locked(&state)
        };
        self.persist(blob, true);
    }

    // -----------------------------------------------------------------
    // Observers
    // -----------------------------------------------------------------

    /// Register a callback invoked once per store transition.
    ///
    /// Callbacks run after the store lock is released, so they may read
    /// from the store.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&StoreEvent) + Send + Sync + 'static,
    {
        let id = self.next_subscription.fetch_add(1, Ordering::Relaxed);
        self.lock_subscribers().push((id, Arc::new(callback)));
        id
    }

    /// Returns `false` if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.lock_subscribers();
        let before = subscribers.len();
        subscribers.retain(|(sid, _)| *sid != id);
        subscribers.len() != before
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn replace_session(&self, session: ConversationSession) -> ConversationId {
        let conversation_id = session.conversation_id;
        let blob = {
            let mut state = self.lock_state();
            if let Some(index) = state.streaming_index.take() {
                tracing::info!(index, "session replaced while a stream was active");
            }
            state.session = session;
            self.blob_locked(&state)
        };
        self.persist(blob, true);
        self.publish(&StoreEvent::Reset { conversation_id });
        conversation_id
    }

    /// Prune to the most recent `compact_to` messages once the ceiling is
    /// reached. Caller holds the lock and guarantees no stream is active.
    fn compact_locked(&self, state: &mut StoreState) -> Option<usize> {
        let len = state.session.messages.len();
        if len < self.max_messages {
            return None;
        }
        let removed = len.saturating_sub(self.compact_to);
        if removed == 0 {
            return None;
        }
        state.session.messages.drain(..removed);
        tracing::debug!(removed, kept = self.compact_to, "transcript compacted");
        Some(removed)
    }

    fn blob_locked(&self, state: &StoreState) -> Option<String> {
        match state.session.to_blob() {
            Ok(blob) => Some(blob),
            Err(e) => {
                tracing::warn!(error = %e, "failed to serialize session");
                None
            }
        }
    }

    fn persist(&self, blob: Option<String>, immediate: bool) {
        let Some(blob) = blob else { return };
        if immediate {
            self.writer.flush(&blob);
        } else {
            self.writer.schedule(blob);
        }
    }

    fn publish(&self, event: &StoreEvent) {
        self.publish_all(std::slice::from_ref(event));
    }

    fn publish_all(&self, events: &[StoreEvent]) {
        let subscribers: Vec<Subscriber> = self
            .lock_subscribers()
            .iter()
            .map(|(_, s)| Arc::clone(s))
            .collect();
        for event in events {
            for subscriber in &subscribers {
                subscriber(event);
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_subscribers(&self) -> MutexGuard<'_, Vec<(SubscriptionId, Subscriber)>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Load the persisted session, demoting any message left streaming by an
/// interrupted run.
fn restore_session(writer: &WritePolicy) -> ConversationSession {
    let blob = match writer.load() {
        Ok(Some(blob)) => blob,
        Ok(None) => return ConversationSession::new(),
        Err(e) => {
            tracing::warn!(key = %writer.key(), error = %e, "session storage unreadable, starting fresh");
            return ConversationSession::new();
        }
    };

    match ConversationSession::from_blob(&blob) {
        Ok(mut session) => {
            for message in session.messages.iter_mut().filter(|m| m.is_streaming) {
                message.is_streaming = false;
            }
            tracing::debug!(
                conversation_id = %session.conversation_id,
                messages = session.messages.len(),
                "session restored"
            );
            session
        }
        Err(e) => {
            tracing::warn!(key = %writer.key(), error = %e, "stored session is corrupt, starting fresh");
            ConversationSession::new()
        }
    }
}
