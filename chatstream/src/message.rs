// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Transcript message types
//
// `Message` is what the store holds and the renderer draws. `ChatTurn`
// is the stripped-down `{role, content}` pair sent to the backend.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role of a transcript participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single message in the transcript.
///
/// Identity is the `(role, content)` pair at insertion time; there is no
/// synthetic id. Only the store's finalize path may flip `is_streaming`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default)]
    pub is_streaming: bool,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            is_streaming: false,
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            is_streaming: false,
        }
    }

    /// Empty assistant message that the accumulator fills in.
    pub fn streaming_placeholder() -> Self {
        Self {
            role: Role::Assistant,
            content: String::new(),
            is_streaming: true,
        }
    }

    /// Same logical message for de-duplication purposes.
    pub fn same_identity(&self, other: &Message) -> bool {
        self.role == other.role && self.content == other.content
    }

    pub fn to_turn(&self) -> ChatTurn {
        ChatTurn {
            role: self.role,
            content: self.content.clone(),
        }
    }
}

/// One `{role, content}` turn of an outbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: Role,
    pub content: String,
}
