// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Cancellation controller
//
// One token per in-flight request. Cancelling signals the token so the
// read loop stops at its next suspension point, tells the backend to stop
// generating (best effort), and finalizes the streaming message locally
// whether or not the backend call succeeded.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;

use crate::config::Phrases;
use crate::session::ConversationId;
use crate::store::MessageStore;
use crate::transport::ChatTransport;

/// Content left behind by a cancel: the accumulated content verbatim, or
/// the interrupted phrase if nothing real had arrived yet.
pub fn interrupted_content(current: &str, phrases: &Phrases) -> String {
    if phrases.is_placeholder_or_empty(current) {
        phrases.interrupted.clone()
    } else {
        current.to_string()
    }
}

/// Token handed to one read loop.
#[derive(Debug, Clone)]
pub struct StreamToken {
    generation: u64,
    token: CancellationToken,
}

impl StreamToken {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelOutcome {
    /// A read loop was running and has been signalled.
    pub signalled: bool,
    /// The backend acknowledged the cancel.
    pub backend_notified: bool,
    /// Index of the message this call finalized, if it was still streaming.
    pub finalized: Option<usize>,
}

#[derive(Default)]
struct Current {
    generation: u64,
    token: Option<CancellationToken>,
}

#[derive(Default)]
pub struct CancellationController {
    current: Mutex<Current>,
}

impl CancellationController {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the token for a new request. A token still registered from
    /// an earlier request is cancelled first.
    pub fn begin(&self) -> StreamToken {
        let mut current = self.lock();
        if let Some(stale) = current.token.take() {
            tracing::warn!("previous stream token still registered, cancelling it");
            stale.cancel();
        }
        current.generation += 1;
        let token = CancellationToken::new();
        current.token = Some(token.clone());
        StreamToken {
            generation: current.generation,
            token,
        }
    }

    /// Drop the registration for `handle` once its read loop is done.
    /// A newer registration is left alone.
    pub fn release(&self, handle: &StreamToken) {
        let mut current = self.lock();
        if current.generation == handle.generation {
            current.token = None;
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock().token.is_some()
    }

    /// Signal the current token, if any. Returns whether one was signalled.
    pub fn abort(&self) -> bool {
        match self.lock().token.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Full user-initiated cancel of the streaming message.
    pub async fn cancel(
        &self,
        transport: &dyn ChatTransport,
        store: &MessageStore,
        conversation_id: ConversationId,
        phrases: &Phrases,
    ) -> CancelOutcome {
        let signalled = self.abort();

        let backend_notified = match transport.cancel(conversation_id).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(conversation_id = %conversation_id, error = %e, "backend cancel failed");
                false
            }
        };

        let finalized = store.streaming_index().and_then(|index| {
            let current = store.message(index).map(|m| m.content).unwrap_or_default();
            let content = interrupted_content(&current, phrases);
            store.finalize(index, &content).then_some(index)
        });

        tracing::info!(
            conversation_id = %conversation_id,
            signalled,
            backend_notified,
            finalized = ?finalized,
            "stream cancel handled"
        );

        CancelOutcome {
            signalled,
            backend_notified,
            finalized,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Current> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
