// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Content accumulator
//
// Per-request state machine over the two text channels. Buffers only
// grow; the rendered content is recomputed after every append. Once a
// terminal decision has been taken every further frame is ignored.

use crate::config::{Labels, Phrases};

use super::classifier::classify;
use super::payload::{decode, Decoded};
use super::termination::{Buffers, Decision, Signal, TerminationPolicy};
use super::types::{FinishReason, Frame, Payload, Step, MESSAGE_COMPLETED_EVENT};

#[derive(Debug, Clone)]
pub struct ContentAccumulator {
    reasoning: String,
    answer: String,
    content: String,
    backend_error: Option<String>,
    terminal: bool,
    policy: TerminationPolicy,
}

impl ContentAccumulator {
    pub fn new(labels: Labels, phrases: Phrases) -> Self {
        Self {
            reasoning: String::new(),
            answer: String::new(),
            content: String::new(),
            backend_error: None,
            terminal: false,
            policy: TerminationPolicy::new(labels, phrases),
        }
    }

    pub fn reasoning(&self) -> &str {
        &self.reasoning
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    /// Content as last pushed to the streaming message.
    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal
    }

    /// Classify, decode, and apply one complete line.
    pub fn feed_line(&mut self, line: &str) -> Step {
        match classify(line) {
            Some(frame) => self.apply_frame(frame),
            None => Step::Unchanged,
        }
    }

    pub fn apply_frame(&mut self, frame: Frame) -> Step {
        if self.terminal {
            return Step::Unchanged;
        }
        match frame {
            Frame::Event { kind } if kind == MESSAGE_COMPLETED_EVENT => {
                self.signal(Signal::MessageCompleted)
            }
            Frame::Event { kind } => {
                tracing::trace!(event = %kind, "event frame ignored");
                Step::Unchanged
            }
            Frame::Data { payload } => match decode(&payload) {
                Decoded::StreamEnd => self.signal(Signal::StreamEnd),
                Decoded::Payload(payload) => self.apply_payload(payload),
                Decoded::Malformed => Step::Unchanged,
            },
        }
    }

    pub fn apply_payload(&mut self, payload: Payload) -> Step {
        if self.terminal {
            return Step::Unchanged;
        }
        match payload {
            Payload::Answer { reasoning, content } => {
                if reasoning.is_none() && content.is_none() {
                    return Step::Unchanged;
                }
                if let Some(fragment) = reasoning {
                    self.reasoning.push_str(&fragment);
                }
                if let Some(fragment) = content {
                    self.answer.push_str(&fragment);
                }
                self.content = self.policy.labels().compose(&self.reasoning, &self.answer);
                Step::Updated(self.content.clone())
            }
            Payload::Knowledge { slice } => self.signal(Signal::Knowledge(slice)),
            Payload::InProgress => {
                if !self.content.is_empty() {
                    return Step::Unchanged;
                }
                self.content = self.policy.phrases().thinking.clone();
                Step::Updated(self.content.clone())
            }
            Payload::Completed => self.signal(Signal::StatusCompleted),
            Payload::Error { message } => {
                self.backend_error = Some(message);
                Step::Unchanged
            }
            Payload::Inert => Step::Unchanged,
        }
    }

    /// The input ended without a terminal signal.
    pub fn end_of_input(&mut self) -> Step {
        if self.terminal {
            return Step::Unchanged;
        }
        self.signal(Signal::EndOfInput)
    }

    /// Terminate with content decided outside the frame protocol
    /// (cancellation, transport failure).
    pub fn force_finalize(&mut self, content: String, reason: FinishReason) -> Step {
        if self.terminal {
            return Step::Unchanged;
        }
        self.finish(content, reason)
    }

    fn signal(&mut self, signal: Signal) -> Step {
        let buffers = Buffers {
            reasoning: &self.reasoning,
            answer: &self.answer,
            content: &self.content,
            backend_error: self.backend_error.as_deref(),
        };
        match self.policy.evaluate(signal, buffers) {
            Decision::Continue => Step::Unchanged,
            Decision::Finalize { content, reason } => self.finish(content, reason),
        }
    }

    fn finish(&mut self, content: String, reason: FinishReason) -> Step {
        self.terminal = true;
        self.content = content.clone();
        Step::Finalized { content, reason }
    }
}
