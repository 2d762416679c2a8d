// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Frames recovered from lines, payload shapes recovered from frames, and
// the steps the accumulator hands to the read loop.

use std::fmt;

pub const EVENT_PREFIX: &str = "event:";
pub const DATA_PREFIX: &str = "data:";

/// `data:` payload that marks the end of the stream.
pub const DONE_SENTINEL: &str = "[DONE]";

/// Explicit completion event emitted by the backend.
pub const MESSAGE_COMPLETED_EVENT: &str = "conversation.message.completed";

// ---------------------------------------------------------------------------
// Frames
// ---------------------------------------------------------------------------

/// One classified unit of the streaming protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// `event: <kind>`
    Event { kind: String },
    /// `data: <payload>` with the prefix, one space, and surrounding
    /// whitespace removed.
    Data { payload: String },
}

// ---------------------------------------------------------------------------
// Payload shapes
// ---------------------------------------------------------------------------

/// Decoded `data:` payload, by shape.
///
/// Variants are listed in dispatch precedence order; the backend's payloads
/// are loosely typed and several fields can co-occur.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// `role == "assistant" && type == "answer"`: incremental fragments.
    /// Empty fragments are normalized to `None`.
    Answer {
        reasoning: Option<String>,
        content: Option<String>,
    },
    /// `role == "assistant" && type == "knowledge"`: always terminal.
    /// `slice` is the first recalled chunk's text, if it could be decoded.
    Knowledge { slice: Option<String> },
    /// `status == "in_progress"`
    InProgress,
    /// `status == "completed"`
    Completed,
    /// `{"error": ...}`: the backend gave up upstream. Not terminal on its
    /// own; the stream usually just closes afterwards.
    Error { message: String },
    /// Recognized but carries nothing for the transcript (verbose/system
    /// diagnostics, other statuses, unknown shapes).
    Inert,
}

// ---------------------------------------------------------------------------
// Accumulator steps
// ---------------------------------------------------------------------------

/// Why a stream stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// `event: conversation.message.completed` with real content.
    MessageCompleted,
    /// `data: [DONE]` or an empty `data:` payload.
    StreamEnd,
    /// Input ended without an explicit terminal signal.
    EndOfInput,
    /// Knowledge-recall short-circuit.
    KnowledgeRecall,
    /// `status: "completed"`.
    StatusCompleted,
    /// User-initiated cancel.
    Cancelled,
    /// Genuine transport failure.
    TransportFailed,
    /// The message stopped being the active stream underneath the read
    /// loop (finalized by a concurrent cancel, or the session was reset).
    Detached,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FinishReason::MessageCompleted => "message_completed",
            FinishReason::StreamEnd => "stream_end",
            FinishReason::EndOfInput => "end_of_input",
            FinishReason::KnowledgeRecall => "knowledge_recall",
            FinishReason::StatusCompleted => "status_completed",
            FinishReason::Cancelled => "cancelled",
            FinishReason::TransportFailed => "transport_failed",
            FinishReason::Detached => "detached",
        };
        f.write_str(s)
    }
}

/// What the read loop must do after feeding one frame to the accumulator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Nothing observable changed.
    Unchanged,
    /// Push this rendered content to the streaming message.
    Updated(String),
    /// Terminal: issue the final store update and stop reading.
    Finalized { content: String, reason: FinishReason },
}

impl Step {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Step::Finalized { .. })
    }
}
