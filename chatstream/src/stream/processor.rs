// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream processor
//
// The read loop for one assistant message. Pulls chunks from the
// transport, frames and applies them in arrival order, pushes every
// content change to the store, and is the single place the stream is
// finalized. Returns as soon as the message is final; lines still
// buffered at that point are discarded with the framer.

use std::ops::ControlFlow;

use bytes::Bytes;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use crate::cancel::interrupted_content;
use crate::config::{Labels, Phrases};
use crate::store::MessageStore;
use crate::transport::TransportError;

use super::accumulator::ContentAccumulator;
use super::framer::LineFramer;
use super::types::{FinishReason, Step};

/// How a read loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamOutcome {
    pub reason: FinishReason,
    /// Final content of the message as stored.
    pub content: String,
    /// `false` when someone else finalized the message first (a concurrent
    /// cancel) and this loop's final update was a no-op.
    pub finalized: bool,
}

enum Read {
    Chunk(Bytes),
    End,
    Failed(TransportError),
}

#[derive(Debug, Clone)]
pub struct StreamProcessor {
    labels: Labels,
    phrases: Phrases,
}

impl StreamProcessor {
    pub fn new(labels: Labels, phrases: Phrases) -> Self {
        Self { labels, phrases }
    }

    /// Drive `input` into the streaming message at `index` until a
    /// terminal signal, end of input, a transport failure, or `token` is
    /// cancelled.
    pub async fn run<S>(
        &self,
        mut input: S,
        token: &CancellationToken,
        store: &MessageStore,
        index: usize,
    ) -> StreamOutcome
    where
        S: Stream<Item = Result<Bytes, TransportError>> + Unpin,
    {
        let mut framer = LineFramer::new();
        let mut acc = self.accumulator();
        let mut chunks = 0usize;

        loop {
            // Cancellation is checked at every suspension point.
            let read = tokio::select! {
                biased;
                _ = token.cancelled() => Read::Failed(TransportError::Aborted),
                next = input.next() => match next {
                    Some(Ok(bytes)) => Read::Chunk(bytes),
                    Some(Err(e)) => Read::Failed(e),
                    None => Read::End,
                },
            };

            let chunk = match read {
                Read::Chunk(chunk) => chunk,
                Read::End => break,
                Read::Failed(error) => return self.fail(error, &mut acc, store, index),
            };
            chunks += 1;

            for line in framer.feed(&chunk) {
                let step = acc.feed_line(&line);
                if let ControlFlow::Break(outcome) = self.commit(step, store, index) {
                    return outcome;
                }
            }
        }

        tracing::debug!(index, chunks, pending = framer.pending(), "input ended");
        for line in framer.finish() {
            let step = acc.feed_line(&line);
            if let ControlFlow::Break(outcome) = self.commit(step, store, index) {
                return outcome;
            }
        }

        let step = acc.end_of_input();
        match self.commit(step, store, index) {
            ControlFlow::Break(outcome) => outcome,
            ControlFlow::Continue(()) => settled(store, index, FinishReason::EndOfInput),
        }
    }

    /// Finalize the message at `index` for a request that failed before
    /// any stream was opened.
    pub fn abandon(&self, error: TransportError, store: &MessageStore, index: usize) -> StreamOutcome {
        let mut acc = self.accumulator();
        self.fail(error, &mut acc, store, index)
    }

    fn accumulator(&self) -> ContentAccumulator {
        ContentAccumulator::new(self.labels.clone(), self.phrases.clone())
    }

    /// An abort keeps what was accumulated (or the interrupted phrase); a
    /// genuine failure replaces it with the failure text.
    fn fail(
        &self,
        error: TransportError,
        acc: &mut ContentAccumulator,
        store: &MessageStore,
        index: usize,
    ) -> StreamOutcome {
        let (content, reason) = if error.is_abort() {
            tracing::info!(index, "stream cancelled");
            (interrupted_content(acc.content(), &self.phrases), FinishReason::Cancelled)
        } else {
            tracing::warn!(index, error = %error, "stream read failed");
            (self.phrases.request_failed(&error.detail()), FinishReason::TransportFailed)
        };

        let step = acc.force_finalize(content, reason);
        match self.commit(step, store, index) {
            ControlFlow::Break(outcome) => outcome,
            ControlFlow::Continue(()) => settled(store, index, reason),
        }
    }

    fn commit(&self, step: Step, store: &MessageStore, index: usize) -> ControlFlow<StreamOutcome> {
        match step {
            Step::Unchanged => ControlFlow::Continue(()),
            Step::Updated(content) => match store.update_content(index, &content) {
                Ok(_) => ControlFlow::Continue(()),
                Err(e) => {
                    tracing::info!(index, error = %e, "stream detached from store");
                    ControlFlow::Break(settled(store, index, FinishReason::Detached))
                }
            },
            Step::Finalized { content, reason } => {
                if store.finalize(index, &content) {
                    tracing::info!(index, reason = %reason, len = content.len(), "stream finalized");
                    ControlFlow::Break(StreamOutcome {
                        reason,
                        content,
                        finalized: true,
                    })
                } else {
                    tracing::debug!(index, reason = %reason, "stream was already finalized");
                    ControlFlow::Break(settled(store, index, reason))
                }
            }
        }
    }
}

/// Outcome for a message this loop did not finalize itself.
fn settled(store: &MessageStore, index: usize, reason: FinishReason) -> StreamOutcome {
    StreamOutcome {
        reason,
        content: store.message(index).map(|m| m.content).unwrap_or_default(),
        finalized: false,
    }
}
