// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

/// Who a `Text` message is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// A single tool invocation requested by the model, or recorded in history.
///
/// `arguments` is kept as a raw JSON string rather than a parsed `Value`;
/// the registry is the only place that parses it, per-tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// One entry in the conversation history.
///
/// Index 0 of any history is always `Text { role: System, .. }`. A `ToolUse`
/// is always eventually followed by one `ToolResult` per call whose
/// `call_id` correlates back to that `ToolUse`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind")]
pub enum Message {
    Text { role: Role, content: String },
    ToolUse { calls: Vec<ToolCall> },
    ToolResult { call_id: String, content: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Message::Text { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Message::Text { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Message::Text { role: Role::Assistant, content: content.into() }
    }

    /// Rough length in UTF-8 bytes, used by token-budget estimation.
    pub fn char_len(&self) -> usize {
        match self {
            Message::Text { content, .. } => content.len(),
            Message::ToolUse { calls } => {
                calls.iter().map(|c| c.name.len() + c.arguments.len()).sum()
            }
            Message::ToolResult { content, .. } => content.len(),
        }
    }
}

/// Minimal interface the core consumes for a loaded skill (§1 scope: the
/// skills loader itself — a markdown-frontmatter scanner — is an external
/// collaborator; only this shape crosses the boundary).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SkillInfo {
    pub name: String,
    pub description: String,
    /// Always-on skills are concatenated into the system prompt unconditionally.
    pub always: bool,
    pub available: bool,
    pub content: String,
}
