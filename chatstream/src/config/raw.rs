// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
//
// Kept apart from the public config structs so that interpolation,
// defaulting, and validation happen in one place (the loader).

use serde::Deserialize;
use std::path::PathBuf;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfig {
    pub chatstream: String,
    pub backend: RawBackendConfig,
    pub store: Option<RawStoreConfig>,
    pub labels: Option<RawLabels>,
    pub phrases: Option<RawPhrases>,
    pub welcome_message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawBackendConfig {
    pub base_url: String,
    pub stream_path: Option<String>,
    pub cancel_path: Option<String>,
    pub timeout_ms: Option<u64>,
    pub api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawStoreConfig {
    pub max_messages: Option<usize>,
    pub compact_to: Option<usize>,
    pub persist_debounce_ms: Option<u64>,
    pub session_key: Option<String>,
    pub data_dir: Option<PathBuf>,
    pub context_turns: Option<usize>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawLabels {
    pub reasoning: Option<String>,
    pub answer: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawPhrases {
    pub thinking: Option<String>,
    pub interrupted: Option<String>,
    pub completion_failed: Option<String>,
    pub knowledge_found: Option<String>,
    pub request_failed: Option<String>,
    pub retry_later: Option<String>,
}
