// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Incremental reassembly of newline-delimited lines from arbitrary chunks.
//!
//! Bytes are accepted in whatever pieces the producer writes them. Complete
//! lines are returned as soon as their `\n` arrives; the unterminated remainder
//! is kept until the next chunk or until [`LineSplitter::finish`] is called at
//! end of input, which yields it as a final line.
//!
//! A trailing `\r` is dropped from every line so `\r\n` input produces the same
//! messages as `\n` input. Invalid UTF-8 is replaced with U+FFFD.

/// Stateful line splitter. One instance per input stream.
#[derive(Debug, Default)]
pub struct LineSplitter {
    partial: Vec<u8>,
}

impl LineSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds a chunk and returns every line it completes, in input order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        let mut rest = chunk;

        while let Some(pos) = rest.iter().position(|b| *b == b'\n') {
            let (head, tail) = rest.split_at(pos);
            if self.partial.is_empty() {
                lines.push(decode(head));
            } else {
                self.partial.extend_from_slice(head);
                lines.push(decode(&self.partial));
                self.partial.clear();
            }
            rest = &tail[1..];
        }

        self.partial.extend_from_slice(rest);
        lines
    }

    /// Ends the input. Returns the unterminated final line, if any.
    pub fn finish(&mut self) -> Option<String> {
        if self.partial.is_empty() {
            return None;
        }
        let line = decode(&self.partial);
        self.partial.clear();
        Some(line)
    }
}

fn decode(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
