// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Built-in defaults for every optional config field.

pub const DEFAULT_STREAM_PATH: &str = "/api/chat/stream/";
pub const DEFAULT_CANCEL_PATH: &str = "/api/chat/cancel/";
pub const DEFAULT_TIMEOUT_MS: u64 = 60_000;

/// Compaction ceiling for the transcript.
pub const DEFAULT_MAX_MESSAGES: usize = 50;
/// Number of most recent messages kept when the ceiling is hit.
pub const DEFAULT_COMPACT_TO: usize = 20;
pub const DEFAULT_PERSIST_DEBOUNCE_MS: u64 = 100;
pub const DEFAULT_SESSION_KEY: &str = "chatSession";

pub const DEFAULT_REASONING_LABEL: &str = "Reasoning";
pub const DEFAULT_ANSWER_LABEL: &str = "Answer";

pub const DEFAULT_THINKING: &str = "Thinking...";
pub const DEFAULT_INTERRUPTED: &str = "Output interrupted";
pub const DEFAULT_COMPLETION_FAILED: &str =
    "Sorry, I can't reply right now. Please try again later.";
pub const DEFAULT_KNOWLEDGE_FOUND: &str = "Found relevant information";
pub const DEFAULT_REQUEST_FAILED: &str = "AI request failed";
pub const DEFAULT_RETRY_LATER: &str = "please try again later";
