// Copyright 2026 The Parapet Project
// SPDX-License-Identifier: Apache-2.0

// Line framer
//
// Transport chunks do not align with line boundaries. Bytes are carried
// across `feed` calls and a line is only decoded once its terminating
// '\n' has arrived, so a multi-byte character split between two chunks is
// never decoded in halves: the UTF-8 encoding of '\n' cannot occur inside
// a multi-byte sequence.

/// Splits a byte stream into complete `\n`-terminated lines.
#[derive(Debug, Default)]
pub struct LineFramer {
    buf: Vec<u8>,
    /// Bytes at the front of `buf` already handed out as lines.
    consumed: usize,
}

impl LineFramer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `chunk` and return the lines it completes, in order.
    ///
    /// The returned iterator is lazy: lines are cut from the carry buffer
    /// as it is advanced. Lines left unread stay buffered and are returned
    /// by the next `feed`, so no line is lost or returned twice.
    pub fn feed(&mut self, chunk: &[u8]) -> Lines<'_> {
        if self.consumed > 0 {
            self.buf.drain(..self.consumed);
            self.consumed = 0;
        }
        self.buf.extend_from_slice(chunk);
        Lines { framer: self }
    }

    /// End of input: every remaining complete line, then the unterminated
    /// trailing fragment if it is non-empty.
    pub fn finish(&mut self) -> Vec<String> {
        let mut lines: Vec<String> = self.feed(&[]).collect();
        let rest = &self.buf[self.consumed..];
        if !rest.is_empty() {
            lines.push(decode_line(rest));
        }
        self.buf.clear();
        self.consumed = 0;
        lines
    }

    /// Bytes held back waiting for a line terminator.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.consumed
    }
}

/// Complete lines cut from a [`LineFramer`]'s carry buffer.
pub struct Lines<'a> {
    framer: &'a mut LineFramer,
}

impl Iterator for Lines<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let framer = &mut *self.framer;
        let rest = &framer.buf[framer.consumed..];
        let end = rest.iter().position(|b| *b == b'\n')?;
        let line = decode_line(&rest[..end]);
        framer.consumed += end + 1;
        Some(line)
    }
}

fn decode_line(bytes: &[u8]) -> String {
    let bytes = bytes.strip_suffix(b"\r").unwrap_or(bytes);
    String::from_utf8_lossy(bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed_all(framer: &mut LineFramer, chunks: &[&[u8]]) -> Vec<String> {
        let mut out = Vec::new();
        for chunk in chunks {
            out.extend(framer.feed(chunk));
        }
        out
    }

    #[test]
    fn complete_lines_are_returned_in_order() {
        let mut framer = LineFramer::new();
        let lines: Vec<String> = framer.feed(b"data: a\ndata: b\n").collect();
        assert_eq!(lines, vec!["data: a", "data: b"]);
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn partial_line_is_held_back() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"data: {\"con").count(), 0);
        assert_eq!(framer.pending(), 11);
        let lines: Vec<String> = framer.feed(b"tent\":1}\n").collect();
        assert_eq!(lines, vec!["data: {\"content\":1}"]);
    }

    #[test]
    fn empty_line_between_frames_is_preserved() {
        let mut framer = LineFramer::new();
        let lines: Vec<String> = framer.feed(b"event: x\n\ndata: y\n").collect();
        assert_eq!(lines, vec!["event: x", "", "data: y"]);
    }

    #[test]
    fn crlf_terminators_are_stripped() {
        let mut framer = LineFramer::new();
        let lines = feed_all(&mut framer, &[b"data: a\r", b"\ndata: b\r\n"]);
        assert_eq!(lines, vec!["data: a", "data: b"]);
    }

    #[test]
    fn multibyte_character_split_across_chunks() {
        let text = "data: 你好\n".as_bytes();
        // Split inside the three-byte encoding of the first character.
        let mut framer = LineFramer::new();
        let lines = feed_all(&mut framer, &[&text[..7], &text[7..]]);
        assert_eq!(lines, vec!["data: 你好"]);
    }

    #[test]
    fn one_byte_at_a_time() {
        let text = "data: héllo\nevent: done\n".as_bytes();
        let mut framer = LineFramer::new();
        let chunks: Vec<&[u8]> = text.chunks(1).collect();
        let lines = feed_all(&mut framer, &chunks);
        assert_eq!(lines, vec!["data: héllo", "event: done"]);
    }

    #[test]
    fn unread_lines_are_returned_by_next_feed() {
        let mut framer = LineFramer::new();
        let first = framer.feed(b"a\nb\n").next();
        assert_eq!(first.as_deref(), Some("a"));
        let rest: Vec<String> = framer.feed(b"c\n").collect();
        assert_eq!(rest, vec!["b", "c"]);
    }

    #[test]
    fn finish_returns_unterminated_fragment() {
        let mut framer = LineFramer::new();
        assert_eq!(framer.feed(b"data: [DONE]").count(), 0);
        assert_eq!(framer.finish(), vec!["data: [DONE]"]);
        assert_eq!(framer.pending(), 0);
        assert!(framer.finish().is_empty());
    }
}
