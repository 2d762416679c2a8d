// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::time::Duration;

use super::defaults::*;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level parsed and validated chatstream config.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Contract version. Always "v1".
    pub version: String,
    pub backend: BackendConfig,
    pub store: StoreConfig,
    pub labels: Labels,
    pub phrases: Phrases,
    /// Greeting inserted by `clear_conversation`, if any.
    pub welcome_message: Option<String>,
}

// ---------------------------------------------------------------------------
// Backend (outbound transport)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct BackendConfig {
    /// Scheme + host (+ port), without a trailing slash.
    pub base_url: String,
    pub stream_path: String,
    pub cancel_path: String,
    /// Overall request timeout enforced by the transport.
    pub timeout_ms: u64,
    /// Sent as `Authorization: Bearer <key>` when present.
    pub api_key: Option<String>,
}

impl BackendConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            stream_path: DEFAULT_STREAM_PATH.to_string(),
            cancel_path: DEFAULT_CANCEL_PATH.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            api_key: None,
        }
    }

    pub fn stream_url(&self) -> String {
        format!("{}{}", self.base_url, self.stream_path)
    }

    pub fn cancel_url(&self) -> String {
        format!("{}{}", self.base_url, self.cancel_path)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Once the transcript holds this many messages it is compacted
    /// before the next insert.
    pub max_messages: usize,
    /// How many of the most recent messages survive compaction.
    pub compact_to: usize,
    /// Coalescing window for low-priority persistence writes.
    pub persist_debounce_ms: u64,
    /// Fixed key under which the session blob is persisted.
    pub session_key: String,
    /// Directory for file persistence. `None` keeps the session in memory.
    pub data_dir: Option<PathBuf>,
    /// Prior messages included as context in outbound requests.
    pub context_turns: usize,
}

impl StoreConfig {
    pub fn persist_debounce(&self) -> Duration {
        Duration::from_millis(self.persist_debounce_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_messages: DEFAULT_MAX_MESSAGES,
            compact_to: DEFAULT_COMPACT_TO,
            persist_debounce_ms: DEFAULT_PERSIST_DEBOUNCE_MS,
            session_key: DEFAULT_SESSION_KEY.to_string(),
            data_dir: None,
            context_turns: 0,
        }
    }
}

// ---------------------------------------------------------------------------
// Rendering vocabulary
// ---------------------------------------------------------------------------

/// Channel labels used in the composite content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Labels {
    pub reasoning: String,
    pub answer: String,
}

impl Labels {
    /// Render both channels as one string:
    /// `"<reasoning>: {reasoning}\n<answer>: {answer}"`.
    pub fn compose(&self, reasoning: &str, answer: &str) -> String {
        format!(
            "{}: {reasoning}\n{}: {answer}",
            self.reasoning, self.answer
        )
    }
}

impl Default for Labels {
    fn default() -> Self {
        Self {
            reasoning: DEFAULT_REASONING_LABEL.to_string(),
            answer: DEFAULT_ANSWER_LABEL.to_string(),
        }
    }
}

/// Fixed user-facing strings substituted by the accumulator and the
/// cancellation path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Phrases {
    /// Transient placeholder shown before real content arrives.
    pub thinking: String,
    /// Final content when a cancel lands before any real content.
    pub interrupted: String,
    /// Final content when the backend completes without producing anything.
    pub completion_failed: String,
    /// Fallback for an undecodable knowledge-recall payload.
    pub knowledge_found: String,
    /// Prefix of the transport-failure message.
    pub request_failed: String,
    /// Used in place of an empty transport error message.
    pub retry_later: String,
}

impl Phrases {
    /// True when `content` carries nothing but the placeholder (or nothing).
    pub fn is_placeholder_or_empty(&self, content: &str) -> bool {
        content.is_empty() || content == self.thinking
    }

    /// `"<request_failed>: <detail>"`, falling back to `retry_later`.
    pub fn request_failed(&self, detail: &str) -> String {
        let detail = detail.trim();
        if detail.is_empty() {
            format!("{}: {}", self.request_failed, self.retry_later)
        } else {
            format!("{}: {detail}", self.request_failed)
        }
    }
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            thinking: DEFAULT_THINKING.to_string(),
            interrupted: DEFAULT_INTERRUPTED.to_string(),
            completion_failed: DEFAULT_COMPLETION_FAILED.to_string(),
            knowledge_found: DEFAULT_KNOWLEDGE_FOUND.to_string(),
            request_failed: DEFAULT_REQUEST_FAILED.to_string(),
            retry_later: DEFAULT_RETRY_LATER.to_string(),
        }
    }
}
