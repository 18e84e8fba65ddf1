// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::sync::Arc;

use crate::policy::{PermissionLevel, Risk};
use crate::{Tool, ToolCall, ToolOutput};

/// A tool schema handed to the model provider.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// Per-tool output truncation budget: `(max_chars, max_lines)`. `None` means
/// no bound on that axis. Applied centrally here, after dispatch, keyed by
/// exact tool name — never inside the tool itself.
fn truncation_budget(tool_name: &str) -> (usize, Option<usize>) {
    match tool_name {
        "read_file" | "load_skill" => (50_000, None),
        "execute_bash" => (30_000, Some(256)),
        "search_files" => (20_000, Some(200)),
        "list_files" => (20_000, Some(500)),
        "write_file" => (1_000, None),
        _ => (30_000, None),
    }
}

fn is_continuation_byte(b: u8) -> bool {
    b & 0b1100_0000 == 0b1000_0000
}

/// Largest char boundary at or before `idx`.
fn floor_char_boundary(bytes: &[u8], idx: usize) -> usize {
    let mut i = idx.min(bytes.len());
    while i > 0 && is_continuation_byte(bytes[i]) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or after `idx`.
fn ceil_char_boundary(bytes: &[u8], idx: usize) -> usize {
    let mut i = idx.min(bytes.len());
    while i < bytes.len() && is_continuation_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// Keeps the first and last `max_chars / 2` characters, dropping the middle.
/// Splits on char boundaries so multibyte UTF-8 is never cut mid-codepoint.
fn truncate_middle_chars(text: &str, max_chars: usize) -> String {
    let bytes = text.as_bytes();
    let half = max_chars / 2;
    let head_end = floor_char_boundary(bytes, half);
    let tail_start = ceil_char_boundary(bytes, bytes.len().saturating_sub(half));
    let removed = text[head_end..tail_start].chars().count();
    format!(
        "{}\n\n[WARNING: output truncated — {removed} characters removed from middle]\n\n{}",
        &text[..head_end],
        &text[tail_start..]
    )
}

/// Keeps the first and last `max_lines / 2` lines, dropping the middle.
fn truncate_middle_lines(text: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let half = max_lines / 2;
    let tail_start = lines.len() - half;
    let removed = lines.len() - 2 * half;
    format!(
        "{}\n\n[WARNING: output truncated — {removed} lines removed from middle]\n\n{}",
        lines[..half].join("\n"),
        lines[tail_start..].join("\n")
    )
}

/// Truncates the char budget first, then the line budget, so a tool whose
/// output is both too long and too many lines ends up within both bounds.
fn head_tail_truncate(text: &str, max_chars: usize, max_lines: Option<usize>) -> String {
    let char_capped = if text.len() > max_chars { truncate_middle_chars(text, max_chars) } else { text.to_string() };

    match max_lines {
        Some(n) if char_capped.lines().count() > n => truncate_middle_lines(&char_capped, n),
        _ => char_capped,
    }
}

/// Central registry holding all available tools and gating their execution
/// against a caller-supplied permission level. `dispatch_agent` is not
/// registered here — sub-agent dispatch is routed by the agent loop directly.
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.tools.insert(tool.name().to_string(), Arc::new(tool));
    }

    /// Register an already-shared tool, e.g. one borrowed from another
    /// registry when building a filtered subset.
    pub fn register_arc(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    pub fn risk_of(&self, name: &str) -> Option<Risk> {
        self.tools.get(name).map(|t| t.risk())
    }

    pub fn schemas(&self) -> Vec<ToolSchema> {
        let mut schemas: Vec<ToolSchema> = self
            .tools
            .values()
            .map(|t| ToolSchema {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters_schema(),
            })
            .collect();
        schemas.sort_by(|a, b| a.name.cmp(&b.name));
        schemas
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Dispatch a tool call, gating it against `level` first. A denial is
    /// returned as an error-flagged [`ToolOutput`], never a hard stop — the
    /// model sees it as ordinary tool output and can adjust.
    pub fn execute(&self, call: &ToolCall, level: PermissionLevel) -> ToolOutput {
        let tool = match self.tools.get(&call.name) {
            Some(t) => t,
            None => return ToolOutput::err(&call.id, format!("Error: unknown tool: {}", call.name)),
        };

        if !level.allows(tool.risk()) {
            return ToolOutput::err(
                &call.id,
                format!("Permission denied: {} requires a higher permission level", call.name),
            );
        }

        let output = tool.execute(call);
        let (max_chars, max_lines) = truncation_budget(&call.name);
        if output.content.len() > max_chars || max_lines.is_some_and(|n| output.content.lines().count() > n) {
            ToolOutput { content: head_tail_truncate(&output.content, max_chars, max_lines), ..output }
        } else {
            output
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::tool::{Tool, ToolCall, ToolOutput};

    struct EchoTool {
        name: &'static str,
        risk: Risk,
    }

    impl Tool for EchoTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn parameters_schema(&self) -> Value {
            json!({ "type": "object" })
        }
        fn risk(&self) -> Risk {
            self.risk
        }
        fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, format!("echo:{}", call.args))
        }
    }

    fn reg_with(name: &'static str, risk: Risk) -> ToolRegistry {
        let mut reg = ToolRegistry::new();
        reg.register(EchoTool { name, risk });
        reg
    }

    #[test]
    fn register_and_get() {
        let reg = reg_with("echo", Risk::Safe);
        assert!(reg.get("echo").is_some());
    }

    #[test]
    fn get_unknown_returns_none() {
        let reg = ToolRegistry::new();
        assert!(reg.get("nope").is_none());
    }

    #[test]
    fn execute_known_tool_succeeds() {
        let reg = reg_with("echo", Risk::Safe);
        let call = ToolCall { id: "1".into(), name: "echo".into(), args: json!({"x":1}) };
        let out = reg.execute(&call, PermissionLevel::All);
        assert!(!out.is_error);
        assert!(out.content.starts_with("echo:"));
    }

    #[test]
    fn execute_unknown_tool_returns_error() {
        let reg = ToolRegistry::new();
        let call = ToolCall { id: "x".into(), name: "missing".into(), args: json!({}) };
        let out = reg.execute(&call, PermissionLevel::All);
        assert!(out.is_error);
        assert!(out.content.contains("unknown tool"));
    }

    #[test]
    fn safe_only_denies_dangerous_tool() {
        let reg = reg_with("execute_bash", Risk::Dangerous);
        let call = ToolCall { id: "1".into(), name: "execute_bash".into(), args: json!({}) };
        let out = reg.execute(&call, PermissionLevel::SafeOnly);
        assert!(out.is_error);
        assert!(out.content.contains("Permission denied"));
    }

    #[test]
    fn none_denies_even_safe_tool() {
        let reg = reg_with("read_file", Risk::Safe);
        let call = ToolCall { id: "1".into(), name: "read_file".into(), args: json!({}) };
        let out = reg.execute(&call, PermissionLevel::None);
        assert!(out.is_error);
    }

    #[test]
    fn truncation_budget_matches_table() {
        assert_eq!(truncation_budget("read_file"), (50_000, None));
        assert_eq!(truncation_budget("execute_bash"), (30_000, Some(256)));
        assert_eq!(truncation_budget("search_files"), (20_000, Some(200)));
        assert_eq!(truncation_budget("list_files"), (20_000, Some(500)));
        assert_eq!(truncation_budget("write_file"), (1_000, None));
        assert_eq!(truncation_budget("load_skill"), (50_000, None));
        assert_eq!(truncation_budget("something_else"), (30_000, None));
    }

    #[test]
    fn head_tail_truncate_respects_char_budget() {
        let text = "x".repeat(100);
        let out = head_tail_truncate(&text, 20, None);
        assert!(out.len() < text.len());
        assert!(out.contains("characters removed from middle"));
    }

    #[test]
    fn head_tail_truncate_char_split_is_half_and_half() {
        let text = format!("{}{}", "a".repeat(50), "b".repeat(50));
        let out = head_tail_truncate(&text, 20, None);
        let (prefix, _) = out.split_once("\n\n[WARNING:").unwrap();
        assert_eq!(prefix, "a".repeat(10));
        assert!(out.ends_with(&"b".repeat(10)));
    }

    #[test]
    fn head_tail_truncate_never_panics_on_multibyte_boundary() {
        // half = 23/2 = 11, an odd byte offset that lands mid-codepoint in
        // this all-two-byte-char string — exercises the boundary walk.
        let text = "é".repeat(60);
        let out = head_tail_truncate(&text, 23, None);
        assert!(out.contains("characters removed from middle"));
    }

    #[test]
    fn head_tail_truncate_respects_line_budget() {
        let text: String = (0..300).map(|i| format!("line{i}\n")).collect();
        let out = head_tail_truncate(&text, 1_000_000, Some(10));
        assert!(out.contains("lines removed from middle"));
        assert!(out.contains("line0"));
        assert!(out.contains("line299"));
    }

    #[test]
    fn head_tail_truncate_applies_char_budget_before_line_budget() {
        // Capping chars first collapses this to a handful of lines, well
        // under the line budget, so the line pass never fires a second marker.
        let text: String = (0..300).map(|i| format!("line{i}\n")).collect();
        let out = head_tail_truncate(&text, 10, Some(50));
        assert_eq!(out.matches("WARNING").count(), 1);
    }

    #[test]
    fn execute_truncates_oversized_output() {
        struct BigTool;
        impl Tool for BigTool {
            fn name(&self) -> &str {
                "write_file"
            }
            fn description(&self) -> &str {
                "big"
            }
            fn parameters_schema(&self) -> Value {
                json!({})
            }
            fn risk(&self) -> Risk {
                Risk::Write
            }
            fn execute(&self, call: &ToolCall) -> ToolOutput {
                ToolOutput::ok(&call.id, "y".repeat(5_000))
            }
        }
        let mut reg = ToolRegistry::new();
        reg.register(BigTool);
        let call = ToolCall { id: "1".into(), name: "write_file".into(), args: json!({}) };
        let out = reg.execute(&call, PermissionLevel::All);
        assert!(out.content.len() < 5_000);
    }
}
