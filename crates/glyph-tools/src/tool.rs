// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use crate::policy::Risk;

/// A single tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    /// Opaque identifier returned by the model (forwarded verbatim).
    pub id: String,
    pub name: String,
    /// Parsed JSON arguments.
    pub args: Value,
}

/// The result of executing a tool.
///
/// Per the dispatch contract, failures are never a control-flow error —
/// they are returned AS the result text (prefixed `"Error"` or
/// `"Permission denied"`) with `is_error` set so callers can render them
/// distinctly; the LLM still sees them as ordinary tool output.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub call_id: String,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutput {
    pub fn ok(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: content.into(), is_error: false }
    }

    pub fn err(call_id: impl Into<String>, msg: impl Into<String>) -> Self {
        Self { call_id: call_id.into(), content: msg.into(), is_error: true }
    }
}

/// Describes the shape of a tool's text output, for context-aware truncation
/// (§4.C). The concrete numeric budgets are keyed by exact tool name per the
/// table in §4.C, not by category — this only decides *where* to cut
/// (head/tail windowing vs. a hard cut) for a given tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputCategory {
    /// Terminal / process output: keep a head and tail window.
    HeadTail,
    /// Ordered match list: keep the leading matches.
    MatchList,
    /// File content: keep a head and tail window around the middle.
    FileContent,
    /// Generic text: hard-truncate, no special windowing.
    #[default]
    Generic,
}

/// Trait every built-in tool implements. Execution is synchronous and
/// blocking — tool bodies (shell spawn/wait, file I/O, subprocess spawn/wait)
/// are one of the three suspension points the concurrency model names; they
/// run on the calling thread (main thread in silent mode, a dedicated worker
/// thread per call in verbose mode).
pub trait Tool: Send + Sync {
    fn name(&self) -> &str;
    fn description(&self) -> &str;
    fn parameters_schema(&self) -> Value;
    /// §4.C risk classification: fixed per tool, gates execution against the
    /// caller's [`crate::policy::PermissionLevel`].
    fn risk(&self) -> Risk;
    fn output_category(&self) -> OutputCategory {
        OutputCategory::Generic
    }
    /// Execute the tool. Errors are wrapped in [`ToolOutput::err`], never
    /// returned as `Result::Err`.
    fn execute(&self, call: &ToolCall) -> ToolOutput;
}
