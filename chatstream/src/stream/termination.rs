// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Termination policy
//
// Several terminal signals can fire close together (completion event,
// `status: completed`, `[DONE]`). Each is evaluated on its own against the
// accumulator state; the first one that decides to finalize wins and
// everything after it is ignored by the accumulator.

use crate::config::{Labels, Phrases};

use super::types::FinishReason;

/// A signal that may end the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// `event: conversation.message.completed`
    MessageCompleted,
    /// `data: [DONE]` or empty `data:`
    StreamEnd,
    /// Input ran out without any terminal signal.
    EndOfInput,
    /// Knowledge-recall short-circuit carrying the decoded slice, if any.
    Knowledge(Option<String>),
    /// `status: "completed"`
    StatusCompleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Finalize { content: String, reason: FinishReason },
}

/// Read-only view of the accumulator at the moment a signal arrives.
#[derive(Debug, Clone, Copy)]
pub struct Buffers<'a> {
    pub reasoning: &'a str,
    pub answer: &'a str,
    /// Currently rendered content of the streaming message.
    pub content: &'a str,
    /// Last `{"error": ...}` message seen on this stream.
    pub backend_error: Option<&'a str>,
}

impl Buffers<'_> {
    fn has_text(&self) -> bool {
        !self.reasoning.is_empty() || !self.answer.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct TerminationPolicy {
    labels: Labels,
    phrases: Phrases,
}

impl TerminationPolicy {
    pub fn new(labels: Labels, phrases: Phrases) -> Self {
        Self { labels, phrases }
    }

    pub fn labels(&self) -> &Labels {
        &self.labels
    }

    pub fn phrases(&self) -> &Phrases {
        &self.phrases
    }

    pub fn evaluate(&self, signal: Signal, buffers: Buffers<'_>) -> Decision {
        match signal {
            // The backend may emit this before anything real has arrived.
            Signal::MessageCompleted => {
                if self.phrases.is_placeholder_or_empty(buffers.content) {
                    tracing::debug!("premature completion event ignored");
                    Decision::Continue
                } else {
                    finalize(buffers.content.to_string(), FinishReason::MessageCompleted)
                }
            }
            Signal::StreamEnd => finalize(self.composed_or_current(buffers), FinishReason::StreamEnd),
            Signal::EndOfInput => {
                finalize(self.composed_or_current(buffers), FinishReason::EndOfInput)
            }
            Signal::Knowledge(slice) => finalize(
                slice.unwrap_or_else(|| self.phrases.knowledge_found.clone()),
                FinishReason::KnowledgeRecall,
            ),
            Signal::StatusCompleted => {
                let content = if buffers.has_text() {
                    self.labels.compose(buffers.reasoning, buffers.answer)
                } else if self.phrases.is_placeholder_or_empty(buffers.content) {
                    self.phrases.completion_failed.clone()
                } else {
                    buffers.content.to_string()
                };
                finalize(content, FinishReason::StatusCompleted)
            }
        }
    }

    fn composed_or_current(&self, buffers: Buffers<'_>) -> String {
        if buffers.has_text() {
            return self.labels.compose(buffers.reasoning, buffers.answer);
        }
        match buffers.backend_error {
            Some(error) if self.phrases.is_placeholder_or_empty(buffers.content) => {
                self.phrases.request_failed(error)
            }
            _ => buffers.content.to_string(),
        }
    }
}

fn finalize(content: String, reason: FinishReason) -> Decision {
    Decision::Finalize { content, reason }
}
