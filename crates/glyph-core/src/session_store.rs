// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! JSONL-backed session persistence: append-only during a turn, replayed
//! in full on resume.

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Write as _};
use std::path::PathBuf;

use glyph_model::{Message, ToolCall};
use serde::{Deserialize, Serialize};

use crate::session::{estimate_total_tokens, Session};

const RESUME_BUDGET_FRACTION: f32 = 0.80;
const MAX_SESSIONS_LISTED: usize = 20;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Record {
    Meta { id: String, model: String, provider: String, created_at: i64 },
    Text { role: String, content: String },
    ToolUse { tool_calls: Vec<RecordToolCall> },
    ToolResult { tool_call_id: String, content: String },
    Summary { text: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordToolCall {
    id: String,
    function: RecordFunction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RecordFunction {
    name: String,
    arguments: String,
}

pub struct SessionStore {
    dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub id: String,
    pub model: String,
    pub summary: Option<String>,
    pub created_at: i64,
}

/// Computes a timestamp-sortable session id from a Unix epoch time: a direct
/// civil-from-days algorithm, no external date library, no locale.
pub fn session_id_from_unix_time(unix_secs: i64) -> String {
    let days = unix_secs.div_euclid(86_400);
    let secs_of_day = unix_secs.rem_euclid(86_400);
    let (y, m, d) = civil_from_days(days);
    let hh = secs_of_day / 3600;
    let mm = (secs_of_day % 3600) / 60;
    let ss = secs_of_day % 60;
    format!("{y:04}{m:02}{d:02}-{hh:02}{mm:02}{ss:02}")
}

/// Howard Hinnant's `civil_from_days`: days since the Unix epoch -> (y, m, d).
fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719_468;
    let era = if z >= 0 { z } else { z - 146_096 } / 146_097;
    let doe = (z - era * 146_097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146_096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}.jsonl"))
    }

    fn append_line(&self, id: &str, record: &Record) -> std::io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut file = OpenOptions::new().create(true).append(true).open(self.path_for(id))?;
        let line = serde_json::to_string(record).expect("Record serializes");
        writeln!(file, "{line}")
    }

    pub fn create(&self, id: &str, model: &str, provider: &str, created_at: i64) -> std::io::Result<()> {
        self.append_line(id, &Record::Meta { id: id.to_string(), model: model.into(), provider: provider.into(), created_at })
    }

    pub fn append_message(&self, id: &str, msg: &Message) -> std::io::Result<()> {
        let record = match msg {
            Message::Text { role, content } => Record::Text { role: role.as_str().to_string(), content: content.clone() },
            Message::ToolUse { calls } => Record::ToolUse {
                tool_calls: calls
                    .iter()
                    .map(|c| RecordToolCall {
                        id: c.id.clone(),
                        function: RecordFunction { name: c.name.clone(), arguments: c.arguments.clone() },
                    })
                    .collect(),
            },
            Message::ToolResult { call_id, content } => {
                Record::ToolResult { tool_call_id: call_id.clone(), content: content.clone() }
            }
        };
        self.append_line(id, &record)
    }

    pub fn append_summary(&self, id: &str, text: &str) -> std::io::Result<()> {
        self.append_line(id, &Record::Summary { text: text.to_string() })
    }

    /// Loads a session by id, reconstructing live history. Stored system
    /// messages are skipped — the caller's current system prompt wins.
    /// Corrupt lines are skipped without aborting the load.
    pub fn load(&self, id: &str) -> std::io::Result<Vec<Message>> {
        let file = File::open(self.path_for(id))?;
        let reader = BufReader::new(file);
        let mut messages = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let Ok(record) = serde_json::from_str::<Record>(&line) else { continue };
            match record {
                Record::Meta { .. } => {}
                Record::Text { role, content } => {
                    if role == "system" {
                        continue;
                    }
                    messages.push(match role.as_str() {
                        "user" => Message::user(content),
                        _ => Message::assistant(content),
                    });
                }
                Record::ToolUse { tool_calls } => {
                    messages.push(Message::ToolUse {
                        calls: tool_calls
                            .into_iter()
                            .map(|c| ToolCall { id: c.id, name: c.function.name, arguments: c.function.arguments })
                            .collect(),
                    });
                }
                Record::ToolResult { tool_call_id, content } => {
                    messages.push(Message::ToolResult { call_id: tool_call_id, content });
                }
                Record::Summary { text } => {
                    messages.push(Message::assistant(format!("[Previous conversation summary] {text}")));
                }
            }
        }
        Ok(messages)
    }

    /// Resumes a session: loads it, prepends `system_prompt`, then applies a
    /// recency-truncation budget trim (no LLM call — walk backward from the
    /// tail, advance to the next user-message boundary, drop everything
    /// before that index).
    pub fn resume(&self, id: &str, system_prompt: Message, max_tokens: usize) -> std::io::Result<Session> {
        let mut messages = self.load(id)?;
        let mut loaded = Vec::with_capacity(messages.len() + 1);
        loaded.push(system_prompt);
        loaded.append(&mut messages);

        let trimmed = budget_trim(loaded, max_tokens);
        let mut session = Session::new(id, max_tokens);
        session.replace_messages(trimmed);
        Ok(session)
    }

    /// Greatest (most recent) session id present, for `--continue`.
    pub fn latest_id(&self) -> std::io::Result<Option<String>> {
        let ids = self.list_ids()?;
        Ok(ids.into_iter().max())
    }

    fn list_ids(&self) -> std::io::Result<Vec<String>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if entry.path().extension().and_then(|e| e.to_str()) == Some("jsonl") {
                    ids.push(stem.to_string());
                }
            }
        }
        Ok(ids)
    }

    /// Lists the most recent sessions (descending), parsing only `meta` and
    /// `summary` lines to keep this cheap even for large logs.
    pub fn list(&self) -> std::io::Result<Vec<SessionSummary>> {
        let mut ids = self.list_ids()?;
        ids.sort_by(|a, b| b.cmp(a));
        ids.truncate(MAX_SESSIONS_LISTED);

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let file = match File::open(self.path_for(&id)) {
                Ok(f) => f,
                Err(_) => continue,
            };
            let mut model = String::new();
            let mut created_at = 0i64;
            let mut summary = None;
            for line in BufReader::new(file).lines().map_while(Result::ok) {
                if let Ok(Record::Meta { model: m, created_at: c, .. }) = serde_json::from_str(&line) {
                    model = m;
                    created_at = c;
                } else if let Ok(Record::Summary { text }) = serde_json::from_str(&line) {
                    summary = Some(text);
                }
            }
            out.push(SessionSummary { id, model, summary, created_at });
        }
        Ok(out)
    }
}

fn budget_trim(messages: Vec<Message>, max_tokens: usize) -> Vec<Message> {
    if max_tokens == 0 || messages.len() <= 1 {
        return messages;
    }
    let budget = (RESUME_BUDGET_FRACTION * max_tokens as f32) as usize;
    let total = estimate_total_tokens(&messages);
    if total <= budget {
        return messages;
    }

    let mut acc = 0usize;
    let mut start = messages.len();
    while start > 1 {
        let tok = (messages[start - 1].char_len() + 3) / 4 + 4;
        if acc > budget {
            break;
        }
        acc += tok;
        start -= 1;
    }
    while start < messages.len() {
        if matches!(&messages[start], Message::Text { role: glyph_model::Role::User, .. }) {
            break;
        }
        start += 1;
    }
    if start == 0 || start >= messages.len() {
        return messages;
    }

    let mut kept = Vec::with_capacity(messages.len() - start + 1);
    kept.push(messages[0].clone());
    kept.extend(messages[start..].iter().cloned());
    kept
}
