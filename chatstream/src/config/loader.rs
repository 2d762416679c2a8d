// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use super::defaults::*;
use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a chatstream config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Parse YAML into raw deserialization types
/// 3. Validate required fields and values
/// 4. Resolve variable interpolation in string fields
/// 5. Fill defaults and build the typed Config struct
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.chatstream != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported contract version \"{}\", expected \"v1\"",
            raw.chatstream
        )));
    }

    let backend = build_backend_config(raw.backend)?;
    let store = build_store_config(raw.store)?;
    let labels = build_labels(raw.labels)?;
    let phrases = build_phrases(raw.phrases)?;
    let welcome_message = raw
        .welcome_message
        .map(|w| resolve_variables(&w))
        .transpose()?
        .filter(|w| !w.trim().is_empty());

    tracing::debug!(source = %source.describe(), base_url = %backend.base_url, "config parsed");

    Ok(Config {
        version: raw.chatstream,
        backend,
        store,
        labels,
        phrases,
        welcome_message,
    })
}

fn build_backend_config(raw: raw::RawBackendConfig) -> Result<BackendConfig, ConfigError> {
    let base_url = resolve_variables(raw.base_url.trim())?;
    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(ConfigError::Validation(format!(
            "backend.base_url \"{base_url}\" must start with http:// or https://"
        )));
    }
    let base_url = base_url.trim_end_matches('/').to_string();

    let stream_path = build_path("stream_path", raw.stream_path, DEFAULT_STREAM_PATH)?;
    let cancel_path = build_path("cancel_path", raw.cancel_path, DEFAULT_CANCEL_PATH)?;

    let timeout_ms = raw.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "backend.timeout_ms must be > 0".into(),
        ));
    }

    let api_key = raw
        .api_key
        .map(|k| resolve_variables(&k))
        .transpose()?
        .filter(|k| !k.is_empty());

    Ok(BackendConfig {
        base_url,
        stream_path,
        cancel_path,
        timeout_ms,
        api_key,
    })
}

fn build_path(name: &str, raw: Option<String>, default: &str) -> Result<String, ConfigError> {
    let path = match raw {
        Some(p) => resolve_variables(&p)?,
        None => return Ok(default.to_string()),
    };
    if !path.starts_with('/') {
        return Err(ConfigError::Validation(format!(
            "backend.{name} \"{path}\" must start with '/'"
        )));
    }
    Ok(path)
}

fn build_store_config(raw: Option<raw::RawStoreConfig>) -> Result<StoreConfig, ConfigError> {
    let raw = match raw {
        Some(r) => r,
        None => return Ok(StoreConfig::default()),
    };

    let max_messages = raw.max_messages.unwrap_or(DEFAULT_MAX_MESSAGES);
    if max_messages < 2 {
        return Err(ConfigError::Validation(format!(
            "store.max_messages must be >= 2, got {max_messages}"
        )));
    }

    let compact_to = raw
        .compact_to
        .unwrap_or_else(|| DEFAULT_COMPACT_TO.min(max_messages - 1));
    if compact_to == 0 || compact_to >= max_messages {
        return Err(ConfigError::Validation(format!(
            "store.compact_to must be in [1, {}], got {compact_to}",
            max_messages - 1
        )));
    }

    let session_key = match raw.session_key {
        Some(k) => resolve_variables(k.trim())?,
        None => DEFAULT_SESSION_KEY.to_string(),
    };
    if session_key.is_empty()
        || !session_key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "store.session_key \"{session_key}\" must be non-empty and contain only [A-Za-z0-9_-]"
        )));
    }

    Ok(StoreConfig {
        max_messages,
        compact_to,
        persist_debounce_ms: raw
            .persist_debounce_ms
            .unwrap_or(DEFAULT_PERSIST_DEBOUNCE_MS),
        session_key,
        data_dir: raw.data_dir,
        context_turns: raw.context_turns.unwrap_or(0),
    })
}

fn build_labels(raw: Option<raw::RawLabels>) -> Result<Labels, ConfigError> {
    let defaults = Labels::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };
    Ok(Labels {
        reasoning: non_empty("labels.reasoning", raw.reasoning, defaults.reasoning)?,
        answer: non_empty("labels.answer", raw.answer, defaults.answer)?,
    })
}

fn build_phrases(raw: Option<raw::RawPhrases>) -> Result<Phrases, ConfigError> {
    let defaults = Phrases::default();
    let raw = match raw {
        Some(r) => r,
        None => return Ok(defaults),
    };
    Ok(Phrases {
        thinking: non_empty("phrases.thinking", raw.thinking, defaults.thinking)?,
        interrupted: non_empty("phrases.interrupted", raw.interrupted, defaults.interrupted)?,
        completion_failed: non_empty(
            "phrases.completion_failed",
            raw.completion_failed,
            defaults.completion_failed,
        )?,
        knowledge_found: non_empty(
            "phrases.knowledge_found",
            raw.knowledge_found,
            defaults.knowledge_found,
        )?,
        request_failed: non_empty(
            "phrases.request_failed",
            raw.request_failed,
            defaults.request_failed,
        )?,
        retry_later: non_empty("phrases.retry_later", raw.retry_later, defaults.retry_later)?,
    })
}

/// Substituted phrases must be non-empty, otherwise "no content" and
/// "fallback content" become indistinguishable.
fn non_empty(name: &str, value: Option<String>, default: String) -> Result<String, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => {
            let v = resolve_variables(&v)?;
            if v.trim().is_empty() {
                return Err(ConfigError::Validation(format!("{name} must not be empty")));
            }
            Ok(v)
        }
    }
}
