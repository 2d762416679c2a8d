// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

use super::error::ConfigError;

/// Substitute `${NAME}` references from the process environment.
pub fn resolve_variables(input: &str) -> Result<String, ConfigError> {
    resolve_with(input, |name| std::env::var(name).ok())
}

/// Same as [`resolve_variables`] with an injected lookup.
///
/// An unterminated `${` or an empty `${}` is kept literally.
pub(crate) fn resolve_with<F>(input: &str, lookup: F) -> Result<String, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(0) => {
                out.push_str("${}");
                rest = &after[1..];
            }
            Some(end) => {
                let name = &after[..end];
                let value = lookup(name).ok_or_else(|| ConfigError::UndefinedVariable {
                    name: name.to_string(),
                })?;
                out.push_str(&value);
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    Ok(out)
}
