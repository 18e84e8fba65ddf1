// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Two distinct compaction paths: an automatic, purely mechanical drop of
//! old history when the context window fills up (§4.F.5), and a
//! user-initiated `/compact` that asks the model for a summary (§4.F.6).

use glyph_model::{Message, Role};

use crate::session::{estimate_total_tokens, Session};

const AUTO_COMPACT_TRIGGER_FRACTION: f32 = 0.85;
const AUTO_COMPACT_BUDGET_FRACTION: f32 = 0.70;
const MIN_HISTORY_FOR_AUTO_COMPACT: usize = 6;
const MANUAL_COMPACT_SYSTEM_PROMPT: &str =
    "You are a context compaction assistant. Summarize the following conversation \
     concisely, preserving technical details, decisions, file names, and anything \
     needed to continue the work.";
const TOOL_RESULT_DUMP_CAP: usize = 500;

/// Outcome of an automatic compaction pass, used to render the
/// `[context compacted: ...]` status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompactionReport {
    pub dropped: usize,
    pub kept: usize,
    pub kept_tokens: usize,
}

impl CompactionReport {
    pub fn status_line(&self) -> String {
        format!(
            "[context compacted: dropped {} messages, kept {} (~{}k tokens)]",
            self.dropped,
            self.kept,
            self.kept_tokens / 1000
        )
    }
}

/// Runs the mechanical auto-compaction check the agent loop invokes on
/// every iteration. Returns `None` when no compaction was needed (history
/// too short, no context limit, or below the trigger threshold).
pub fn maybe_auto_compact(session: &mut Session) -> Option<CompactionReport> {
    if session.messages.len() <= MIN_HISTORY_FOR_AUTO_COMPACT || session.max_tokens == 0 {
        return None;
    }

    let total = estimate_total_tokens(&session.messages);
    if (total as f32) < AUTO_COMPACT_TRIGGER_FRACTION * session.max_tokens as f32 {
        return None;
    }

    let budget = (AUTO_COMPACT_BUDGET_FRACTION * session.max_tokens as f32) as usize;

    // Walk backward from the end, accumulating until the budget is exhausted.
    let mut acc = 0usize;
    let mut start = session.messages.len();
    while start > 1 {
        let tok = (session.messages[start - 1].char_len() + 3) / 4 + 4;
        if acc + tok > budget {
            break;
        }
        acc += tok;
        start -= 1;
    }

    // Advance forward to the next `user` text message boundary so we never
    // split a tool_use/tool_result pair.
    while start < session.messages.len() {
        if matches!(&session.messages[start], Message::Text { role: Role::User, .. }) {
            break;
        }
        start += 1;
    }

    if start <= 1 || start >= session.messages.len() {
        return None;
    }

    let dropped = start - 1;
    let mut kept = Vec::with_capacity(session.messages.len() - dropped);
    kept.push(session.messages[0].clone());
    kept.extend(session.messages[start..].iter().cloned());

    session.replace_messages(kept);

    Some(CompactionReport { dropped, kept: session.messages.len(), kept_tokens: session.token_count })
}

/// Produce the `(system, user)` request pair for a user-initiated `/compact`.
/// The caller drives the actual LLM call; this function only linearizes history.
pub fn build_manual_compaction_request(messages: &[Message]) -> (String, String) {
    (MANUAL_COMPACT_SYSTEM_PROMPT.to_string(), linearize_for_summary(messages))
}

fn linearize_for_summary(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        match msg {
            Message::Text { role, content } => {
                out.push_str(&format!("[{}] {}\n", role.as_str(), content));
            }
            Message::ToolUse { calls } => {
                for call in calls {
                    out.push_str(&format!("[tool_call] {}({})\n", call.name, call.arguments));
                }
            }
            Message::ToolResult { content, .. } => {
                let truncated = if content.len() > TOOL_RESULT_DUMP_CAP {
                    format!("{}...", &content[..TOOL_RESULT_DUMP_CAP])
                } else {
                    content.clone()
                };
                out.push_str(&format!("[tool_result] {truncated}\n"));
            }
        }
    }
    out
}

/// Replace `messages` with `[original_system, assistant: summary]` after a
/// manual `/compact`, preserving the system prompt at index 0.
pub fn apply_manual_compaction(messages: &mut Vec<Message>, summary: &str) {
    let system = messages.first().cloned();
    messages.clear();
    if let Some(sys) = system {
        messages.push(sys);
    }
    messages.push(Message::assistant(format!("[Previous conversation summary] {summary}")));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filler(n: usize) -> String {
        "x".repeat(n)
    }

    #[test]
    fn skips_short_history() {
        let mut s = Session::new("x", 1000);
        s.push(Message::system("sys"));
        s.push(Message::user("hi"));
        assert!(maybe_auto_compact(&mut s).is_none());
    }

    #[test]
    fn skips_when_no_context_limit() {
        let mut s = Session::new("x", 0);
        for i in 0..20 {
            s.push(Message::user(format!("msg {i}")));
        }
        assert!(maybe_auto_compact(&mut s).is_none());
    }

    #[test]
    fn skips_below_trigger_threshold() {
        let mut s = Session::new("x", 1_000_000);
        s.push(Message::system("sys"));
        for i in 0..10 {
            s.push(Message::user(format!("msg {i}")));
        }
        assert!(maybe_auto_compact(&mut s).is_none());
    }

    #[test]
    fn compacts_and_preserves_system_prompt() {
        let mut s = Session::new("x", 200);
        s.push(Message::system("sys"));
        for i in 0..30 {
            s.push(Message::user(filler(50) + &i.to_string()));
        }
        let report = maybe_auto_compact(&mut s).expect("should compact");
        assert!(report.dropped > 0);
        assert!(matches!(&s.messages[0], Message::Text { role: Role::System, .. }));
    }

    #[test]
    fn compaction_never_splits_tool_use_result_pair() {
        let mut s = Session::new("x", 150);
        s.push(Message::system("sys"));
        for i in 0..10 {
            s.push(Message::user(filler(40) + &i.to_string()));
            s.push(Message::ToolUse {
                calls: vec![glyph_model::ToolCall {
                    id: format!("c{i}"),
                    name: "read_file".into(),
                    arguments: "{}".into(),
                }],
            });
            s.push(Message::ToolResult { call_id: format!("c{i}"), content: filler(40) });
        }
        maybe_auto_compact(&mut s);
        // Every ToolUse in the surviving history must be followed by its ToolResult.
        for (idx, msg) in s.messages.iter().enumerate() {
            if let Message::ToolUse { calls } = msg {
                let next = &s.messages[idx + 1];
                if let Message::ToolResult { call_id, .. } = next {
                    assert_eq!(call_id, &calls[0].id);
                } else {
                    panic!("ToolUse not immediately followed by its ToolResult");
                }
            }
        }
    }

    #[test]
    fn manual_compaction_linearizes_and_truncates_tool_results() {
        let messages = vec![
            Message::system("sys"),
            Message::user("do the thing"),
            Message::ToolResult { call_id: "1".into(), content: filler(600) },
        ];
        let (_sys, dump) = build_manual_compaction_request(&messages);
        assert!(dump.contains("[user] do the thing"));
        assert!(dump.contains("..."));
    }

    #[test]
    fn apply_manual_compaction_keeps_system_then_summary() {
        let mut messages = vec![Message::system("sys"), Message::user("a"), Message::assistant("b")];
        apply_manual_compaction(&mut messages, "short summary");
        assert_eq!(messages.len(), 2);
        assert!(matches!(&messages[0], Message::Text { role: Role::System, .. }));
        if let Message::Text { content, .. } = &messages[1] {
            assert!(content.contains("short summary"));
        } else {
            panic!("expected text message");
        }
    }
}
