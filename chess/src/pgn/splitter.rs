//! Streaming segmentation of a PGN byte stream into game records.

use std::io::{self, BufRead};

/// Splits a PGN stream into one string per game record.
///
/// A record ends where the next tag-pair block begins: a line whose first
/// non-blank character is `[`, seen after the current record's movetext has
/// started and outside any `{ ... }` comment. Blank lines never end a record,
/// so comments containing empty lines stay intact.
///
/// At end of stream, a record that never reached its movetext is discarded
/// and counted in [`GameSplitter::discarded`].
pub struct GameSplitter<R> {
    reader: R,
    line: Vec<u8>,
    current: String,
    has_tags: bool,
    has_movetext: bool,
    comment_open: bool,
    first_line: bool,
    discarded: u64,
    done: bool,
}

impl<R: BufRead> GameSplitter<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::with_capacity(256),
            current: String::new(),
            has_tags: false,
            has_movetext: false,
            comment_open: false,
            first_line: true,
            discarded: 0,
            done: false,
        }
    }

    /// Number of trailing incomplete records dropped so far.
    pub fn discarded(&self) -> u64 {
        self.discarded
    }

    fn take_record(&mut self) -> Option<String> {
        let has_movetext = self.has_movetext;
        let has_tags = self.has_tags;
        let record = std::mem::take(&mut self.current);
        self.has_tags = false;
        self.has_movetext = false;
        self.comment_open = false;

        if has_movetext {
            return Some(record.trim_end().to_string());
        }
        if has_tags {
            self.discarded += 1;
            tracing::warn!(
                bytes = record.len(),
                "Discarding incomplete trailing record with no move list"
            );
        }
        None
    }

    /// Track `{ ... }` comment state across a movetext line.
    fn scan_comments(&mut self, line: &str) {
        let mut in_line_comment = false;
        for c in line.chars() {
            match c {
                '{' if !self.comment_open && !in_line_comment => self.comment_open = true,
                '}' if self.comment_open => self.comment_open = false,
                ';' if !self.comment_open => in_line_comment = true,
                _ => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for GameSplitter<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            self.line.clear();
            let read = match self.reader.read_until(b'\n', &mut self.line) {
                Ok(n) => n,
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            };

            if read == 0 {
                self.done = true;
                return self.take_record().map(Ok);
            }

            let mut text = String::from_utf8_lossy(&self.line).into_owned();
            if self.first_line {
                self.first_line = false;
                if let Some(stripped) = text.strip_prefix('\u{feff}') {
                    text = stripped.to_string();
                }
            }

            let trimmed = text.trim_start();
            if trimmed.starts_with('%') {
                continue;
            }

            let is_tag_line = trimmed.starts_with('[') && !self.comment_open;
            if is_tag_line && self.has_movetext {
                let finished = self.take_record();
                self.current.push_str(&text);
                self.has_tags = true;
                if finished.is_some() {
                    return finished.map(Ok);
                }
                continue;
            }

            if is_tag_line && !self.has_movetext {
                self.has_tags = true;
            } else if !trimmed.is_empty() || self.comment_open {
                if !trimmed.is_empty() {
                    self.has_movetext = true;
                }
                self.scan_comments(trimmed);
            }

            if !self.current.is_empty() || !trimmed.is_empty() {
                self.current.push_str(&text);
            }
        }
    }
}
