// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Side-effect injection for [`crate::agent_loop::AgentLoop`].
//!
//! Passed as a single borrowed argument rather than read from a process-wide
//! context, so the loop stays unit-testable: every callback a test doesn't
//! care about can be left as the default no-op.

use std::sync::Arc;

use glyph_model::Message;
use glyph_tools::{PermissionLevel, ToolCall};

/// Runs a sub-agent to completion and returns its final text. Owned and
/// cloneable so verbose-mode tool execution can hand a copy to each worker
/// thread it spawns.
pub type DispatchAgentFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Callbacks the agent loop invokes at well-defined points. Every field has
/// a default no-op so callers only wire up what they need.
pub struct Hooks<'a> {
    /// A text chunk streamed from the model. No-op in silent mode.
    pub on_chunk: &'a mut dyn FnMut(&str),
    /// Called once the LLM call settles (success or final error), to stop a spinner.
    pub on_llm_end: &'a mut dyn FnMut(),
    /// Called after retries for an HTTP error are exhausted.
    pub on_http_error: &'a mut dyn FnMut(u16, &str),
    /// Called with the pending tool calls; returns the effective permission
    /// level for this round (may prompt the user interactively).
    pub on_tool_calls: &'a mut dyn FnMut(&[ToolCall]) -> PermissionLevel,
    /// Called once per tool result, for display.
    pub on_tool_result: &'a mut dyn FnMut(&str, &str, bool),
    /// Called when the loop-detection ring finds a repeating pattern;
    /// returns the steering message to enqueue. Absent falls back to the
    /// default warning text.
    pub on_loop_detected: Option<&'a mut dyn FnMut() -> String>,
    /// Called once per iteration to persist a message as it's appended.
    pub persist: &'a mut dyn FnMut(&Message),
    /// One-line status notices (context compaction, etc).
    pub on_status: &'a mut dyn FnMut(&str),
    /// Runs a sub-agent to completion and returns its final text.
    pub dispatch_agent: DispatchAgentFn,
}

pub fn noop_chunk(_: &str) {}
pub fn noop_llm_end() {}
pub fn noop_http_error(_: u16, _: &str) {}
pub fn noop_persist(_: &Message) {}
pub fn noop_status(_: &str) {}

pub const DEFAULT_LOOP_WARNING: &str = "[SYSTEM WARNING: You appear to be stuck in a loop, \
repeating the same tool calls. Try a different approach, read the error messages carefully, \
or ask the user for guidance.]";
