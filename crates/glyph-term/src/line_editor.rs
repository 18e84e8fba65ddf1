// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! In-place line editing with UTF-8-aware cursor movement, persistent
//! history, and slash-command tab completion (§4.B).

use std::fs;
use std::path::{Path, PathBuf};

use crate::key::Key;

const MAX_HISTORY_ENTRIES: usize = 1000;

/// A UTF-8 text buffer with a cursor always on a codepoint boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Buffer {
    bytes: Vec<u8>,
    cursor: usize,
}

fn is_continuation_byte(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}

impl Buffer {
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.bytes).unwrap_or("")
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn set(&mut self, text: &str) {
        self.bytes = text.as_bytes().to_vec();
        self.cursor = self.bytes.len();
    }

    pub fn clear(&mut self) {
        self.bytes.clear();
        self.cursor = 0;
    }

    pub fn insert_char(&mut self, c: char) {
        let mut tmp = [0u8; 4];
        let s = c.encode_utf8(&mut tmp);
        self.bytes.splice(self.cursor..self.cursor, s.bytes());
        self.cursor += s.len();
    }

    /// Moves the cursor left by one whole codepoint.
    pub fn cursor_left(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        while self.cursor > 0 && is_continuation_byte(self.bytes[self.cursor]) {
            self.cursor -= 1;
        }
    }

    /// Moves the cursor right by one whole codepoint.
    pub fn cursor_right(&mut self) {
        if self.cursor >= self.bytes.len() {
            return;
        }
        self.cursor += 1;
        while self.cursor < self.bytes.len() && is_continuation_byte(self.bytes[self.cursor]) {
            self.cursor += 1;
        }
    }

    pub fn cursor_home(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor_end(&mut self) {
        self.cursor = self.bytes.len();
    }

    /// Removes the codepoint immediately before the cursor (backspace).
    pub fn backspace(&mut self) {
        if self.cursor == 0 {
            return;
        }
        let start = self.prev_boundary(self.cursor);
        self.bytes.drain(start..self.cursor);
        self.cursor = start;
    }

    /// Removes the codepoint at the cursor (delete).
    pub fn delete(&mut self) {
        if self.cursor >= self.bytes.len() {
            return;
        }
        let end = self.next_boundary(self.cursor);
        self.bytes.drain(self.cursor..end);
    }

    /// ctrl_k: truncate from the cursor to the end of the line.
    pub fn kill_to_end(&mut self) {
        self.bytes.truncate(self.cursor);
    }

    /// ctrl_u: delete from the start of the line to the cursor.
    pub fn kill_to_start(&mut self) {
        self.bytes.drain(0..self.cursor);
        self.cursor = 0;
    }

    /// ctrl_w: delete the previous word — skip trailing spaces, then the
    /// non-space run before them.
    pub fn delete_previous_word(&mut self) {
        let mut i = self.cursor;
        while i > 0 && self.bytes[i - 1] == b' ' {
            i -= 1;
        }
        while i > 0 && self.bytes[i - 1] != b' ' {
            i -= 1;
        }
        self.bytes.drain(i..self.cursor);
        self.cursor = i;
    }

    fn prev_boundary(&self, from: usize) -> usize {
        let mut i = from - 1;
        while i > 0 && is_continuation_byte(self.bytes[i]) {
            i -= 1;
        }
        i
    }

    fn next_boundary(&self, from: usize) -> usize {
        let mut i = from + 1;
        while i < self.bytes.len() && is_continuation_byte(self.bytes[i]) {
            i += 1;
        }
        i
    }
}

/// Outcome of feeding one key into the editor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    /// Still editing; redraw the buffer.
    Continue,
    /// Enter was pressed with a non-empty line — the committed text.
    Submit(String),
    /// ctrl_d on an empty buffer.
    Eof,
    /// ctrl_l: clear screen and reinstall the layout.
    ClearScreen,
    /// ctrl_c: line cleared, no exit.
    Interrupted,
}

/// Drives a [`Buffer`] plus history/completion state across key events.
pub struct LineEditor {
    buffer: Buffer,
    history: Vec<String>,
    history_path: Option<PathBuf>,
    /// Index into `history` while browsing with up/down; `None` at the
    /// not-yet-committed current line.
    history_cursor: Option<usize>,
    /// The line being composed before history browsing started, restored
    /// when the user navigates back past the most recent entry.
    pending_line: String,
}

impl LineEditor {
    pub fn new() -> Self {
        Self {
            buffer: Buffer::default(),
            history: Vec::new(),
            history_path: None,
            history_cursor: None,
            pending_line: String::new(),
        }
    }

    /// Loads persisted history from `path` (newline-separated, last
    /// [`MAX_HISTORY_ENTRIES`] kept); subsequent appends are persisted there.
    pub fn with_history_file(mut self, path: PathBuf) -> Self {
        if let Ok(text) = fs::read_to_string(&path) {
            self.history = text.lines().map(str::to_string).collect();
            let len = self.history.len();
            if len > MAX_HISTORY_ENTRIES {
                self.history.drain(0..len - MAX_HISTORY_ENTRIES);
            }
        }
        self.history_path = Some(path);
        self
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Feeds one decoded key into the editor. `completions` supplies the
    /// fixed slash-command table used for tab completion.
    pub fn handle_key(&mut self, key: Key, completions: &[&str]) -> EditOutcome {
        match key {
            Key::Char(c) => {
                self.buffer.insert_char(c);
                self.history_cursor = None;
            }
            Key::Backspace => self.buffer.backspace(),
            Key::Delete => self.buffer.delete(),
            Key::Left => self.buffer.cursor_left(),
            Key::Right => self.buffer.cursor_right(),
            Key::Home => self.buffer.cursor_home(),
            Key::End => self.buffer.cursor_end(),
            Key::Ctrl('a') => self.buffer.cursor_home(),
            Key::Ctrl('e') => self.buffer.cursor_end(),
            Key::Ctrl('k') => self.buffer.kill_to_end(),
            Key::Ctrl('u') => self.buffer.kill_to_start(),
            Key::Ctrl('w') => self.buffer.delete_previous_word(),
            Key::Ctrl('l') => return EditOutcome::ClearScreen,
            Key::Ctrl('c') => {
                self.buffer.clear();
                self.history_cursor = None;
                return EditOutcome::Interrupted;
            }
            Key::Ctrl('d') => {
                if self.buffer.is_empty() {
                    return EditOutcome::Eof;
                }
                self.buffer.delete();
            }
            Key::Up => self.history_prev(),
            Key::Down => self.history_next(),
            Key::Tab => self.complete(completions),
            Key::Enter => {
                if self.buffer.is_empty() {
                    return EditOutcome::Continue;
                }
                let line = self.buffer.as_str().to_string();
                self.commit_to_history(&line);
                self.buffer.clear();
                self.history_cursor = None;
                return EditOutcome::Submit(line);
            }
            _ => {}
        }
        EditOutcome::Continue
    }

    fn commit_to_history(&mut self, line: &str) {
        if line.is_empty() || self.history.last().map(String::as_str) == Some(line) {
            return;
        }
        self.history.push(line.to_string());
        if self.history.len() > MAX_HISTORY_ENTRIES {
            self.history.remove(0);
        }
        if let Some(path) = &self.history_path {
            let text = self.history.join("\n") + "\n";
            let _ = fs::write(path, text);
        }
    }

    fn history_prev(&mut self) {
        if self.history.is_empty() {
            return;
        }
        let next_idx = match self.history_cursor {
            None => {
                self.pending_line = self.buffer.as_str().to_string();
                self.history.len() - 1
            }
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.history_cursor = Some(next_idx);
        self.buffer.set(&self.history[next_idx]);
    }

    fn history_next(&mut self) {
        match self.history_cursor {
            None => {}
            Some(i) if i + 1 < self.history.len() => {
                self.history_cursor = Some(i + 1);
                self.buffer.set(&self.history[i + 1]);
            }
            Some(_) => {
                self.history_cursor = None;
                self.buffer.set(&self.pending_line);
            }
        }
    }

    /// Only applies to a line starting with `/`. Finds every completion
    /// sharing the current prefix, computes their longest common prefix, and
    /// extends the buffer if that's longer than what's already typed.
    fn complete(&mut self, completions: &[&str]) {
        let line = self.buffer.as_str();
        if !line.starts_with('/') {
            return;
        }
        let matches: Vec<&str> = completions.iter().copied().filter(|c| c.starts_with(line)).collect();
        if matches.is_empty() {
            return;
        }
        let lcp = longest_common_prefix(&matches);
        if lcp.len() > line.len() {
            self.buffer.set(&lcp);
        }
    }
}

impl Default for LineEditor {
    fn default() -> Self {
        Self::new()
    }
}

fn longest_common_prefix(items: &[&str]) -> String {
    let mut prefix = items[0].to_string();
    for item in &items[1..] {
        let common = prefix.chars().zip(item.chars()).take_while(|(a, b)| a == b).count();
        prefix.truncate(prefix.char_indices().nth(common).map(|(i, _)| i).unwrap_or(prefix.len()));
    }
    prefix
}

/// Default history file location: `~/.config/<app>/history`.
pub fn default_history_path(app_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join(app_name).join("history"))
}

pub fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}
