// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Chain execution (§4.H): run each step through the agent loop with a
//! substituted prompt and filtered tool set, propagating `{previous}`.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use glyph_core::agent_loop::{self, AgentLoopConfig, AgentOutcome};
use glyph_core::hooks::Hooks;
use glyph_core::session::Session;
use glyph_model::{Message, ModelProvider};
use glyph_tools::{PermissionLevel, Risk, ToolRegistry};

use crate::chain::{ChainSpec, Step};
use crate::template::substitute_vars;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    Completed(String),
    Cancelled,
    Aborted(String),
}

fn risk_rank(r: Risk) -> u8 {
    match r {
        Risk::Safe => 0,
        Risk::Write => 1,
        Risk::Dangerous => 2,
    }
}

/// Highest risk among the tools any step's filter resolves to. Used to
/// prompt the user once, before running any step.
pub fn chain_max_risk(spec: &ChainSpec, registry: &ToolRegistry) -> Option<Risk> {
    spec.steps
        .iter()
        .flat_map(|step| resolve_tool_names(step, registry))
        .filter_map(|name| registry.risk_of(&name))
        .max_by_key(|r| risk_rank(*r))
}

fn resolve_tool_names(step: &Step, registry: &ToolRegistry) -> Vec<String> {
    match &step.tool_filter {
        None => registry.names(),
        Some(filter) => registry.names().into_iter().filter(|n| filter.contains(n)).collect(),
    }
}

fn build_step_registry(step: &Step, full: &ToolRegistry) -> ToolRegistry {
    let mut filtered = ToolRegistry::new();
    for name in resolve_tool_names(step, full) {
        if let Some(tool) = full.get(&name) {
            filtered.register_arc(tool.clone());
        }
    }
    filtered
}

/// Last assistant text in history, used to recover output on `HitLimit`.
fn last_assistant_text(messages: &[Message]) -> Option<String> {
    messages.iter().rev().find_map(|m| match m {
        Message::Text { role: glyph_model::Role::Assistant, content } => Some(content.clone()),
        _ => None,
    })
}

/// Concatenated tool results, as a `HitLimit` fallback when no assistant
/// text was ever produced.
fn concat_tool_results(messages: &[Message]) -> String {
    messages
        .iter()
        .filter_map(|m| match m {
            Message::ToolResult { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Runs every step of `spec` in order, reusing one [`Hooks`] record across
/// steps — `on_status` is called with `"step '<name>' starting"` so a
/// caller's spinner label can be updated per step without rebuilding hooks.
pub fn run_chain(
    spec: &ChainSpec,
    task: &str,
    tools: &ToolRegistry,
    model: &dyn ModelProvider,
    cancel: &AtomicBool,
    permission: PermissionLevel,
    hooks: &mut Hooks,
) -> ChainOutcome {
    let mut previous = String::new();

    for step in &spec.steps {
        (hooks.on_status)(&format!("step '{}' starting", step.name));

        let prompt = substitute_vars(&step.prompt_template, task, &previous);
        let mut session = Session::new(format!("chain-{}", step.name), 0);
        session.push(Message::system(prompt));
        session.push(Message::user(task));

        let step_tools = Arc::new(build_step_registry(step, tools));
        let config = AgentLoopConfig {
            max_iterations: step.max_iterations as usize,
            permission,
            silent: false,
            allow_dispatch_agent: true,
        };

        let outcome = agent_loop::run(&mut session, step_tools, model, cancel, &config, hooks);

        match outcome {
            AgentOutcome::ReturnedText(text) => previous = text,
            AgentOutcome::Cancelled => return ChainOutcome::Cancelled,
            AgentOutcome::HttpError { status, message } => {
                return ChainOutcome::Aborted(format!("step '{}' failed: HTTP {status}: {message}", step.name));
            }
            AgentOutcome::HitLimit => {
                if let Some(text) = last_assistant_text(&session.messages) {
                    previous = text;
                } else {
                    let fallback = concat_tool_results(&session.messages);
                    if fallback.is_empty() {
                        return ChainOutcome::Aborted(format!("step '{}' hit its iteration limit with no output", step.name));
                    }
                    previous = fallback;
                }
            }
        }
    }

    ChainOutcome::Completed(previous)
}

/// Prints the step plan instead of executing, for `--dry-run`.
pub fn dry_run_plan(spec: &ChainSpec) -> String {
    let mut out = String::new();
    if let Some(name) = &spec.name {
        out.push_str(&format!("chain: {name}\n"));
    }
    for (i, step) in spec.steps.iter().enumerate() {
        let filter = step.tool_filter.as_ref().map(|f| f.join(", ")).unwrap_or_else(|| "all".to_string());
        out.push_str(&format!("{}. {} (tools: {}, max_iterations: {})\n", i + 1, step.name, filter, step.max_iterations));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::parse_chain;
    use glyph_core::hooks::{noop_chunk, noop_http_error, noop_llm_end, noop_persist, noop_status};
    use glyph_model::mock::ScriptedProvider;
    use glyph_model::provider::{CompletionOutcome, CompletionResponse};

    fn text_outcome(s: &str) -> CompletionOutcome {
        CompletionOutcome { response: CompletionResponse::Text(s.to_string()), usage: None }
    }

    fn noop_hooks<'a>(
        on_chunk: &'a mut dyn FnMut(&str),
        on_llm_end: &'a mut dyn FnMut(),
        on_http_error: &'a mut dyn FnMut(u16, &str),
        on_tool_calls: &'a mut dyn FnMut(&[glyph_tools::ToolCall]) -> PermissionLevel,
        on_tool_result: &'a mut dyn FnMut(&str, &str, bool),
        persist: &'a mut dyn FnMut(&Message),
        on_status: &'a mut dyn FnMut(&str),
        dispatch: glyph_core::hooks::DispatchAgentFn,
    ) -> Hooks<'a> {
        Hooks {
            on_chunk,
            on_llm_end,
            on_http_error,
            on_tool_calls,
            on_tool_result,
            on_loop_detected: None,
            persist,
            on_status,
            dispatch_agent: dispatch,
        }
    }

    #[test]
    fn two_step_chain_propagates_previous() {
        let spec = parse_chain("## a\n{task}\n## b\n{previous}\n").unwrap();
        let model = ScriptedProvider::new(vec![text_outcome("A-out"), text_outcome("final")]);
        let tools = ToolRegistry::new();
        let cancel = AtomicBool::new(false);

        let mut on_chunk = noop_chunk;
        let mut on_llm_end = noop_llm_end;
        let mut on_http_error = noop_http_error;
        let mut on_tool_calls = |_: &[glyph_tools::ToolCall]| PermissionLevel::All;
        let mut on_tool_result = |_: &str, _: &str, _: bool| {};
        let mut persist = noop_persist;
        let mut on_status = noop_status;
        let dispatch: glyph_core::hooks::DispatchAgentFn = Arc::new(|_| String::new());
        let mut hooks = noop_hooks(
            &mut on_chunk,
            &mut on_llm_end,
            &mut on_http_error,
            &mut on_tool_calls,
            &mut on_tool_result,
            &mut persist,
            &mut on_status,
            dispatch,
        );

        let outcome = run_chain(&spec, "X", &tools, &model, &cancel, PermissionLevel::All, &mut hooks);

        assert_eq!(outcome, ChainOutcome::Completed("final".to_string()));
    }

    #[test]
    fn dry_run_lists_all_steps() {
        let spec = parse_chain("---\nname: demo\n---\n## a\ntools: read_file\nmax_iterations: 3\n\ndo {task}\n## b\n\ndo {previous}\n").unwrap();
        let plan = dry_run_plan(&spec);
        assert!(plan.contains("chain: demo"));
        assert!(plan.contains("1. a (tools: read_file, max_iterations: 3)"));
        assert!(plan.contains("2. b (tools: all, max_iterations: 10)"));
    }
}
