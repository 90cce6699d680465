// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Incremental line-buffered parser for newline-delimited JSON on an agent
//! subprocess's stdout. Each complete line is parsed as one JSON value;
//! malformed lines are skipped rather than failing the whole stream, since a
//! partially-written line at EOF is expected, not exceptional.

#[derive(Debug, Default)]
pub struct JsonlParser {
    line_buf: Vec<u8>,
}

impl JsonlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of raw bytes, returning every complete JSON value found.
    /// Partial trailing data is retained for the next call.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<serde_json::Value> {
        self.line_buf.extend_from_slice(chunk);
        let mut values = Vec::new();
        loop {
            let Some(pos) = self.line_buf.iter().position(|&b| b == b'\n') else {
                break;
            };
            let line: Vec<u8> = self.line_buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            if let Ok(value) = serde_json::from_slice(line) {
                values.push(value);
            }
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_complete_lines_across_chunks() {
        let mut parser = JsonlParser::new();
        let first = parser.feed(b"{\"a\":1}\n{\"b\":");
        assert_eq!(first.len(), 1);
        let second = parser.feed(b"2}\n");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0]["b"], 2);
    }

    #[test]
    fn skips_malformed_lines() {
        let mut parser = JsonlParser::new();
        let values = parser.feed(b"not json\n{\"ok\":true}\n");
        assert_eq!(values.len(), 1);
        assert_eq!(values[0]["ok"], true);
    }
}
