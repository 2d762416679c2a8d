// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Payload decoder
//
// Parses `data:` payloads and sorts them into the closed set of shapes in
// `Payload`. Backends interleave non-JSON and partial lines, so a parse
// failure drops the frame instead of failing the stream.

use serde::Deserialize;
use serde_json::Value;

use super::types::{Payload, DONE_SENTINEL};

const KNOWLEDGE_RECALL: &str = "knowledge_recall";

/// Result of decoding one `data:` payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    /// `[DONE]` or an empty payload.
    StreamEnd,
    Payload(Payload),
    /// Not JSON; the frame is dropped.
    Malformed,
}

pub fn decode(payload: &str) -> Decoded {
    if payload.is_empty() || payload == DONE_SENTINEL {
        return Decoded::StreamEnd;
    }

    match serde_json::from_str::<Value>(payload) {
        Ok(value) => Decoded::Payload(shape_of(&value)),
        Err(e) => {
            tracing::debug!(error = %e, len = payload.len(), "dropping undecodable data frame");
            Decoded::Malformed
        }
    }
}

/// Dispatch in precedence order: answer, knowledge, in_progress,
/// completed, error, then everything else is inert.
fn shape_of(value: &Value) -> Payload {
    let field = |name: &str| value.get(name).and_then(Value::as_str);

    if field("role") == Some("assistant") {
        match field("type") {
            Some("answer") => {
                return Payload::Answer {
                    reasoning: non_empty(field("reasoning_content")),
                    content: non_empty(field("content")),
                }
            }
            Some("knowledge") => {
                return Payload::Knowledge {
                    slice: field("content").and_then(decode_knowledge),
                }
            }
            _ => {}
        }
    }

    match field("status") {
        Some("in_progress") => Payload::InProgress,
        Some("completed") => Payload::Completed,
        _ => match value.get("error") {
            Some(error) => {
                tracing::warn!(error = %error, "backend sent an error frame");
                let message = match error.as_str() {
                    Some(text) => text.to_string(),
                    None => error.to_string(),
                };
                Payload::Error { message }
            }
            None => Payload::Inert,
        },
    }
}

fn non_empty(s: Option<&str>) -> Option<String> {
    s.filter(|s| !s.is_empty()).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Nested knowledge payload
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
struct KnowledgeEnvelope {
    msg_type: Option<String>,
    /// JSON-encoded `RecallData`.
    data: Option<String>,
}

#[derive(Deserialize)]
struct RecallData {
    #[serde(default)]
    chunks: Vec<RecallChunk>,
}

#[derive(Deserialize)]
struct RecallChunk {
    slice: Option<String>,
}

/// Extract the first recalled chunk's `slice` from a knowledge `content`
/// string. `None` on any decode failure, a non-recall `msg_type`, no
/// chunks, or an empty slice.
pub fn decode_knowledge(content: &str) -> Option<String> {
    let envelope: KnowledgeEnvelope = match serde_json::from_str(content) {
        Ok(e) => e,
        Err(e) => {
            tracing::debug!(error = %e, "knowledge content is not valid JSON");
            return None;
        }
    };
    if envelope.msg_type.as_deref() != Some(KNOWLEDGE_RECALL) {
        return None;
    }

    let data: RecallData = match serde_json::from_str(envelope.data.as_deref()?) {
        Ok(d) => d,
        Err(e) => {
            tracing::debug!(error = %e, "knowledge recall data is not valid JSON");
            return None;
        }
    };

    data.chunks
        .into_iter()
        .next()
        .and_then(|chunk| chunk.slice)
        .filter(|slice| !slice.is_empty())
}
