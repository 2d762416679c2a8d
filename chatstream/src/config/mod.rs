// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Config loader and validator
//
// Loads chatstream.yaml, validates structure, resolves variable
// interpolation, and fills defaults for every optional field.

mod defaults;
mod error;
mod interpolation;
mod loader;
mod raw;
mod source;
mod types;

pub use defaults::*;
pub use error::ConfigError;
pub use interpolation::resolve_variables;
pub use loader::load_config;
pub use source::{ConfigSource, FileSource, StringSource};
pub use types::{BackendConfig, Config, Labels, Phrases, StoreConfig};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    fn with_env<F: FnOnce()>(name: &str, value: &str, f: F) {
        let _guard = ENV_MUTEX.lock().unwrap();
        let previous = std::env::var(name).ok();
        std::env::set_var(name, value);
        f();
        match previous {
            Some(value) => std::env::set_var(name, value),
            None => std::env::remove_var(name),
        }
    }

    const FULL_YAML: &str = r#"chatstream: v1

backend:
  base_url: "https://chat.example.com/"
  stream_path: "/v3/chat/stream"
  cancel_path: "/v3/chat/cancel"
  timeout_ms: 15000

store:
  max_messages: 30
  compact_to: 10
  persist_debounce_ms: 250
  session_key: "campusChat"
  data_dir: "/var/lib/chatstream"
  context_turns: 4

labels:
  reasoning: "Thought process"
  answer: "Final answer"

phrases:
  thinking: "Working on it..."
  interrupted: "Stopped"

welcome_message: "Hello, how can I help?"
"#;

    const MINIMAL_YAML: &str = r#"chatstream: v1
backend:
  base_url: "http://127.0.0.1:8000"
"#;

    fn load(yaml: &str) -> Result<Config, ConfigError> {
        load_config(&StringSource::new(yaml))
    }

    fn validation_message(yaml: &str) -> String {
        match load(yaml) {
            Err(ConfigError::Validation(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    // ---------------------------------------------------------------
    // Valid configs
    // ---------------------------------------------------------------

    #[test]
    fn full_config_parses_into_typed_struct() {
        let config = load(FULL_YAML).unwrap();

        assert_eq!(config.version, "v1");
        assert_eq!(config.backend.base_url, "https://chat.example.com");
        assert_eq!(
            config.backend.stream_url(),
            "https://chat.example.com/v3/chat/stream"
        );
        assert_eq!(
            config.backend.cancel_url(),
            "https://chat.example.com/v3/chat/cancel"
        );
        assert_eq!(config.backend.timeout_ms, 15000);
        assert!(config.backend.api_key.is_none());

        assert_eq!(config.store.max_messages, 30);
        assert_eq!(config.store.compact_to, 10);
        assert_eq!(config.store.persist_debounce_ms, 250);
        assert_eq!(config.store.session_key, "campusChat");
        assert_eq!(
            config.store.data_dir.as_deref(),
            Some(std::path::Path::new("/var/lib/chatstream"))
        );
        assert_eq!(config.store.context_turns, 4);

        assert_eq!(config.labels.reasoning, "Thought process");
        assert_eq!(config.labels.answer, "Final answer");
        assert_eq!(config.phrases.thinking, "Working on it...");
        assert_eq!(config.phrases.interrupted, "Stopped");
        // Unset phrases keep their defaults
        assert_eq!(config.phrases.completion_failed, DEFAULT_COMPLETION_FAILED);
        assert_eq!(
            config.welcome_message.as_deref(),
            Some("Hello, how can I help?")
        );
    }

    #[test]
    fn minimal_config_fills_defaults() {
        let config = load(MINIMAL_YAML).unwrap();

        assert_eq!(config.backend.stream_path, DEFAULT_STREAM_PATH);
        assert_eq!(config.backend.cancel_path, DEFAULT_CANCEL_PATH);
        assert_eq!(config.backend.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(config.store, StoreConfig::default());
        assert_eq!(config.labels, Labels::default());
        assert_eq!(config.phrases, Phrases::default());
        assert!(config.welcome_message.is_none());
    }

    #[test]
    fn api_key_is_interpolated_from_environment() {
        let yaml = r#"chatstream: v1
backend:
  base_url: "http://localhost:8000"
  api_key: "${CHATSTREAM_TEST_API_KEY}"
"#;
        with_env("CHATSTREAM_TEST_API_KEY", "sk-test-123", || {
            let config = load(yaml).unwrap();
            assert_eq!(config.backend.api_key.as_deref(), Some("sk-test-123"));
        });
    }

    #[test]
    fn undefined_variable_fails_loading() {
        let yaml = r#"chatstream: v1
backend:
  base_url: "http://localhost:8000"
  api_key: "${CHATSTREAM_TEST_DEFINITELY_UNSET}"
"#;
        let _guard = ENV_MUTEX.lock().unwrap();
        let err = load(yaml).unwrap_err();
        assert!(matches!(err, ConfigError::UndefinedVariable { .. }));
    }

    #[test]
    fn compact_to_default_is_clamped_below_small_ceiling() {
        let yaml = r#"chatstream: v1
backend:
  base_url: "http://localhost:8000"
store:
  max_messages: 8
"#;
        let config = load(yaml).unwrap();
        assert_eq!(config.store.compact_to, 7);
    }

    // ---------------------------------------------------------------
    // Rejected configs
    // ---------------------------------------------------------------

    #[test]
    fn wrong_version_rejected() {
        let msg = validation_message(
            "chatstream: v2\nbackend:\n  base_url: \"http://localhost\"\n",
        );
        assert!(msg.contains("v2"), "got: {msg}");
    }

    #[test]
    fn missing_file_reports_its_path() {
        let source = FileSource::new("/nonexistent/chatstream.yaml");
        let err = load_config(&source).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/chatstream.yaml"));
    }

    #[test]
    fn missing_backend_is_a_yaml_error() {
        let err = load("chatstream: v1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Yaml(_)));
    }

    #[test]
    fn unknown_field_is_a_yaml_error() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\n  retries: 3\n";
        assert!(matches!(load(yaml).unwrap_err(), ConfigError::Yaml(_)));
    }

    #[test]
    fn non_http_base_url_rejected() {
        let msg = validation_message("chatstream: v1\nbackend:\n  base_url: \"ftp://host\"\n");
        assert!(msg.contains("base_url"), "got: {msg}");
    }

    #[test]
    fn relative_stream_path_rejected() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\n  stream_path: \"api/chat\"\n";
        let msg = validation_message(yaml);
        assert!(msg.contains("stream_path"), "got: {msg}");
    }

    #[test]
    fn zero_timeout_rejected() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\n  timeout_ms: 0\n";
        let msg = validation_message(yaml);
        assert!(msg.contains("timeout_ms"), "got: {msg}");
    }

    #[test]
    fn compact_to_must_be_below_ceiling() {
        let yaml = r#"chatstream: v1
backend:
  base_url: "http://x"
store:
  max_messages: 10
  compact_to: 10
"#;
        let msg = validation_message(yaml);
        assert!(msg.contains("compact_to"), "got: {msg}");
    }

    #[test]
    fn tiny_ceiling_rejected() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\nstore:\n  max_messages: 1\n";
        let msg = validation_message(yaml);
        assert!(msg.contains("max_messages"), "got: {msg}");
    }

    #[test]
    fn session_key_with_path_separator_rejected() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\nstore:\n  session_key: \"../escape\"\n";
        let msg = validation_message(yaml);
        assert!(msg.contains("session_key"), "got: {msg}");
    }

    #[test]
    fn blank_phrase_rejected() {
        let yaml = "chatstream: v1\nbackend:\n  base_url: \"http://x\"\nphrases:\n  interrupted: \"  \"\n";
        let msg = validation_message(yaml);
        assert!(msg.contains("phrases.interrupted"), "got: {msg}");
    }

    // ---------------------------------------------------------------
    // Rendering helpers
    // ---------------------------------------------------------------

    #[test]
    fn labels_compose_both_channels() {
        let labels = Labels::default();
        assert_eq!(labels.compose("A", "B"), "Reasoning: A\nAnswer: B");
        assert_eq!(labels.compose("", ""), "Reasoning: \nAnswer: ");
    }

    #[test]
    fn request_failed_uses_retry_fallback_for_blank_detail() {
        let phrases = Phrases::default();
        assert_eq!(
            phrases.request_failed("connection refused"),
            "AI request failed: connection refused"
        );
        assert_eq!(
            phrases.request_failed(""),
            "AI request failed: please try again later"
        );
    }

    #[test]
    fn placeholder_detection() {
        let phrases = Phrases::default();
        assert!(phrases.is_placeholder_or_empty(""));
        assert!(phrases.is_placeholder_or_empty(DEFAULT_THINKING));
        assert!(!phrases.is_placeholder_or_empty("partial answer"));
    }
}
