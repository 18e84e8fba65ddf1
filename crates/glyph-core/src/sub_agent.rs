// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A thin wrapper around [`crate::agent_loop::run`] for `dispatch_agent`:
//! a fresh two-message history, silent mode, and a tool set that excludes
//! `dispatch_agent` and `load_skill` so sub-agents can't nest.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use glyph_model::{Message, ModelProvider};
use glyph_tools::{PermissionLevel, ToolRegistry};

use crate::agent_loop::{self, AgentLoopConfig, AgentOutcome};
use crate::hooks::{noop_chunk, noop_http_error, noop_llm_end, noop_persist, noop_status, Hooks};
use crate::session::Session;

pub const SUB_AGENT_PROMPT: &str = "You are a focused sub-agent. Complete the given task directly \
using the available tools and report your final result as plain text. Do not ask the user \
clarifying questions — make reasonable assumptions and proceed.";

const DEFAULT_SUB_AGENT_MAX_ITERATIONS: usize = 50;

pub struct SubAgentResult {
    pub text: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// Runs a sub-agent to completion. Never returns an error — every failure
/// mode is converted into a synthesized text result.
pub fn run_sub_agent(
    task: &str,
    model: &dyn ModelProvider,
    tools: Arc<ToolRegistry>,
    cancel: &AtomicBool,
    max_iterations: Option<usize>,
) -> SubAgentResult {
    let mut session = Session::new("sub-agent", 128_000);
    session.push(Message::system(SUB_AGENT_PROMPT));
    session.push(Message::user(task));

    let config = AgentLoopConfig {
        max_iterations: max_iterations.unwrap_or(DEFAULT_SUB_AGENT_MAX_ITERATIONS),
        permission: PermissionLevel::All,
        silent: true,
        allow_dispatch_agent: false,
    };

    let mut on_chunk = noop_chunk;
    let mut on_llm_end = noop_llm_end;
    let mut on_http_error = noop_http_error;
    let mut on_tool_calls = |_calls: &[glyph_tools::ToolCall]| config.permission;
    let mut on_tool_result = noop_tool_result_owned;
    let mut persist = noop_persist;
    let mut on_status = noop_status;
    let no_nested_dispatch: crate::hooks::DispatchAgentFn =
        Arc::new(|_task: &str| "Error: sub-agents cannot dispatch further sub-agents".to_string());

    let mut hooks = Hooks {
        on_chunk: &mut on_chunk,
        on_llm_end: &mut on_llm_end,
        on_http_error: &mut on_http_error,
        on_tool_calls: &mut on_tool_calls,
        on_tool_result: &mut on_tool_result,
        on_loop_detected: None,
        persist: &mut persist,
        on_status: &mut on_status,
        dispatch_agent: no_nested_dispatch,
    };

    let outcome = agent_loop::run(&mut session, tools, model, cancel, &config, &mut hooks);

    let text = match outcome {
        AgentOutcome::ReturnedText(text) => text,
        AgentOutcome::Cancelled => "[Cancelled]".to_string(),
        AgentOutcome::HitLimit => "Sub-agent reached iteration limit without producing a final response.".to_string(),
        AgentOutcome::HttpError { .. } => "Sub-agent error: no response".to_string(),
    };

    SubAgentResult { text, prompt_tokens: 0, completion_tokens: 0 }
}

fn noop_tool_result_owned(_: &str, _: &str, _: bool) {}
