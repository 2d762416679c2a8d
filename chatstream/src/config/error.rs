// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config from {origin}: {source}")]
    Io {
        origin: String,
        #[source]
        source: std::io::Error,
    },

    #[error("config is not valid chatstream YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    Validation(String),

    #[error("config references ${{{name}}} but it is not set in the environment")]
    UndefinedVariable { name: String },
}
