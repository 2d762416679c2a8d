// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use super::error::ConfigError;

/// Where the YAML text comes from. The loader only sees this trait, so
/// tests hand it inline content.
pub trait ConfigSource {
    fn load(&self) -> Result<String, ConfigError>;

    /// Origin shown in errors and log lines.
    fn describe(&self) -> String;
}

pub struct FileSource {
    pub path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl ConfigSource for FileSource {
    fn load(&self) -> Result<String, ConfigError> {
        std::fs::read_to_string(&self.path).map_err(|source| ConfigError::Io {
            origin: self.describe(),
            source,
        })
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

/// Inline YAML.
pub struct StringSource {
    pub content: String,
}

impl StringSource {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

impl ConfigSource for StringSource {
    fn load(&self) -> Result<String, ConfigError> {
        Ok(self.content.clone())
    }

    fn describe(&self) -> String {
        "<inline>".to_string()
    }
}
