// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Frame classifier
//
// A lightweight subset of event-stream framing: only `event:` and `data:`
// fields are recognized. `id:`, `retry:`, comments, and blank lines are
// noise and are dropped.

use super::types::{Frame, DATA_PREFIX, EVENT_PREFIX};

/// Interpret one complete line.
///
/// - `event: <kind>` -> `Frame::Event` (kind trimmed)
/// - `data: <payload>` -> `Frame::Data`: exactly one prefix and one
///   following space are removed, then the rest is trimmed
/// - anything else -> `None`
pub fn classify(line: &str) -> Option<Frame> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(rest) = line.strip_prefix(EVENT_PREFIX) {
        return Some(Frame::Event {
            kind: rest.trim().to_string(),
        });
    }

    if let Some(rest) = line.strip_prefix(DATA_PREFIX) {
        let rest = rest.strip_prefix(' ').unwrap_or(rest);
        return Some(Frame::Data {
            payload: rest.trim().to_string(),
        });
    }

    None
}
