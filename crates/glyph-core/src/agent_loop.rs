// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The agentic loop: LLM call, tool execution, loop detection, compaction —
//! repeated until the model returns plain text, the iteration cap is hit,
//! a cancel is observed, or an unrecoverable HTTP error surfaces.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use glyph_model::provider::{CompletionOutcome, CompletionResponse};
use glyph_model::{Message, ModelProvider, Role, ToolSchema as ModelToolSchema};
use glyph_tools::{dispatch_agent_schema, PermissionLevel, Risk, ToolOutput, ToolRegistry};

use crate::compact::maybe_auto_compact;
use crate::hooks::{DispatchAgentFn, Hooks, DEFAULT_LOOP_WARNING};
use crate::session::Session;

const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);
const LOOP_RING_SIZE: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentOutcome {
    ReturnedText(String),
    HitLimit,
    Cancelled,
    HttpError { status: u16, message: String },
}

pub struct AgentLoopConfig {
    pub max_iterations: usize,
    pub permission: PermissionLevel,
    /// Silent mode runs tool calls sequentially on the calling thread and
    /// discards streamed text; verbose mode spawns one worker thread per
    /// tool call and forwards streamed text via `on_chunk`.
    pub silent: bool,
    /// Whether `dispatch_agent` is advertised in this run's tool schema.
    /// `false` for sub-agent runs, which must not be able to nest further
    /// sub-agents (§4.C).
    pub allow_dispatch_agent: bool,
}

/// Run the agent loop to completion against `session`'s history.
pub fn run(
    session: &mut Session,
    tools: Arc<ToolRegistry>,
    model: &dyn ModelProvider,
    cancel: &AtomicBool,
    config: &AgentLoopConfig,
    hooks: &mut Hooks,
) -> AgentOutcome {
    let mut steering: Vec<String> = Vec::new();
    let mut ring = [0u64; LOOP_RING_SIZE];
    let mut ring_count: usize = 0;
    let mut iterations = 0usize;
    let mut first_iteration = true;

    loop {
        if cancel.load(Ordering::Acquire) {
            return AgentOutcome::Cancelled;
        }
        if iterations >= config.max_iterations {
            return AgentOutcome::HitLimit;
        }
        iterations += 1;

        for text in steering.drain(..) {
            let msg = Message::user(text);
            (hooks.persist)(&msg);
            session.push(msg);
        }

        let mut tool_schemas = tools.schemas();
        if config.allow_dispatch_agent {
            tool_schemas.push(dispatch_agent_schema());
        }
        let schemas: Vec<ModelToolSchema> = tool_schemas
            .into_iter()
            .map(|s| ModelToolSchema { name: s.name, description: s.description, parameters: s.parameters })
            .collect();

        match call_with_retry(model, &session.messages, &schemas, cancel, hooks, config.silent) {
            LlmCallResult::Cancelled => {
                (hooks.on_llm_end)();
                return AgentOutcome::Cancelled;
            }
            LlmCallResult::Failed { status, message } => {
                (hooks.on_llm_end)();
                (hooks.on_http_error)(status, &message);
                if first_iteration {
                    if matches!(session.messages.last(), Some(Message::Text { role: Role::User, .. })) {
                        session.messages.pop();
                        session.recalculate_tokens();
                    }
                }
                return AgentOutcome::HttpError { status, message };
            }
            LlmCallResult::Outcome(outcome) => {
                (hooks.on_llm_end)();
                first_iteration = false;

                match outcome.response {
                    CompletionResponse::Text(text) => {
                        let msg = Message::assistant(text.clone());
                        (hooks.persist)(&msg);
                        session.push(msg);
                        return AgentOutcome::ReturnedText(text);
                    }
                    CompletionResponse::HttpError { .. } => unreachable!("handled by call_with_retry"),
                    CompletionResponse::ToolCalls(calls) => {
                        let schema_calls: Vec<glyph_tools::ToolCall> =
                            calls.iter().map(to_registry_call).collect();
                        let effective = (hooks.on_tool_calls)(&schema_calls);

                        let tool_use = Message::ToolUse { calls: calls.clone() };
                        (hooks.persist)(&tool_use);
                        session.push(tool_use);

                        if cancel.load(Ordering::Acquire) {
                            return AgentOutcome::Cancelled;
                        }

                        let results: Vec<ToolOutput> = if effective == PermissionLevel::None {
                            calls.iter().map(|c| ToolOutput::err(&c.id, "Permission denied by user.")).collect()
                        } else if config.silent {
                            execute_silent(&calls, &tools, effective, &hooks.dispatch_agent)
                        } else {
                            execute_verbose(calls.clone(), tools.clone(), effective, cancel, hooks.dispatch_agent.clone())
                        };

                        for (call, result) in calls.iter().zip(results.iter()) {
                            (hooks.on_tool_result)(&call.name, &result.content, result.is_error);
                            let tr = Message::ToolResult { call_id: call.id.clone(), content: result.content.clone() };
                            (hooks.persist)(&tr);
                            session.push(tr);

                            let h = call_hash(&call.name, &call.arguments);
                            ring[ring_count % LOOP_RING_SIZE] = h;
                            ring_count += 1;
                        }

                        if loop_detected(&ring, ring_count) {
                            let warning = match hooks.on_loop_detected.as_deref_mut() {
                                Some(f) => f(),
                                None => DEFAULT_LOOP_WARNING.to_string(),
                            };
                            steering.push(warning);
                        }

                        if let Some(report) = maybe_auto_compact(session) {
                            (hooks.on_status)(&report.status_line());
                        }
                    }
                }
            }
        }
    }
}

enum LlmCallResult {
    Outcome(CompletionOutcome),
    Cancelled,
    Failed { status: u16, message: String },
}

fn call_with_retry(
    model: &dyn ModelProvider,
    history: &[Message],
    schemas: &[ModelToolSchema],
    cancel: &AtomicBool,
    hooks: &mut Hooks,
    silent: bool,
) -> LlmCallResult {
    let mut attempt = 0u32;
    loop {
        let outcome = {
            let mut on_chunk = |s: &str| {
                if !silent {
                    (hooks.on_chunk)(s);
                }
            };
            model.complete(history, schemas, &mut on_chunk)
        };

        match &outcome.response {
            CompletionResponse::HttpError { status, message } => {
                let status = *status;
                let retryable = match status {
                    429 => attempt < 3,
                    s if s >= 500 => attempt < 1,
                    _ => false,
                };
                if !retryable {
                    return LlmCallResult::Failed { status, message: message.clone() };
                }
                let delay = match status {
                    429 => Duration::from_secs(1u64 << attempt),
                    _ => Duration::from_millis(500),
                };
                if !sleep_checking_cancel(delay, cancel) {
                    return LlmCallResult::Cancelled;
                }
                attempt += 1;
            }
            _ => return LlmCallResult::Outcome(outcome),
        }
    }
}

/// Sleeps `duration` in small slices, polling `cancel`. Returns `false` if
/// cancellation was observed before the full duration elapsed.
fn sleep_checking_cancel(duration: Duration, cancel: &AtomicBool) -> bool {
    let mut remaining = duration;
    while remaining > Duration::ZERO {
        if cancel.load(Ordering::Acquire) {
            return false;
        }
        let step = remaining.min(CANCEL_POLL_INTERVAL);
        std::thread::sleep(step);
        remaining -= step;
    }
    !cancel.load(Ordering::Acquire)
}

fn to_registry_call(call: &glyph_model::ToolCall) -> glyph_tools::ToolCall {
    let args = serde_json::from_str(&call.arguments).unwrap_or(serde_json::Value::Object(Default::default()));
    glyph_tools::ToolCall { id: call.id.clone(), name: call.name.clone(), args }
}

fn parse_task_arg(arguments: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(arguments).ok()?.get("task")?.as_str().map(str::to_string)
}

/// Risk lookup that also covers `dispatch_agent`, which is never a
/// registered [`glyph_tools::Tool`] and so never appears in `tools.risk_of`.
fn risk_of_call(name: &str, tools: &ToolRegistry) -> Option<Risk> {
    if name == "dispatch_agent" {
        Some(Risk::Dangerous)
    } else {
        tools.risk_of(name)
    }
}

fn execute_silent(
    calls: &[glyph_model::ToolCall],
    tools: &ToolRegistry,
    level: PermissionLevel,
    dispatch: &DispatchAgentFn,
) -> Vec<ToolOutput> {
    calls.iter().map(|call| run_one(call, tools, level, dispatch)).collect()
}

/// Spawns one detached worker thread per allowed call, polling every 50 ms
/// for cancellation. Unfinished slots on cancel are filled with
/// `[Cancelled]`; their threads are abandoned, not joined — acceptable
/// because the tools they run are pure and short-lived.
fn execute_verbose(
    calls: Vec<glyph_model::ToolCall>,
    tools: Arc<ToolRegistry>,
    level: PermissionLevel,
    cancel: &AtomicBool,
    dispatch: DispatchAgentFn,
) -> Vec<ToolOutput> {
    let n = calls.len();
    let slots: Arc<Vec<Mutex<Option<ToolOutput>>>> = Arc::new((0..n).map(|_| Mutex::new(None)).collect());
    let done: Arc<Vec<AtomicBool>> = Arc::new((0..n).map(|_| AtomicBool::new(false)).collect());

    for (i, call) in calls.iter().enumerate() {
        let allowed = risk_of_call(&call.name, &tools).is_some_and(|r| level.allows(r));
        if !allowed {
            *slots[i].lock().unwrap() =
                Some(ToolOutput::err(&call.id, format!("Permission denied: {} requires full tool access", call.name)));
            done[i].store(true, Ordering::Release);
            continue;
        }

        let call = call.clone();
        let tools = tools.clone();
        let slots = slots.clone();
        let done = done.clone();
        let dispatch = dispatch.clone();

        let spawned = std::thread::Builder::new().spawn(move || {
            let out = run_one(&call, &tools, level, &dispatch);
            *slots[i].lock().unwrap() = Some(out);
            done[i].store(true, Ordering::Release);
        });

        if spawned.is_err() {
            // Thread spawn failed: run synchronously on the main thread so
            // the call still completes, at the cost of this slot not being
            // cancellable mid-flight.
            let out = run_one(&calls[i], &tools, level, &dispatch);
            *slots[i].lock().unwrap() = Some(out);
            done[i].store(true, Ordering::Release);
        }
    }

    loop {
        if cancel.load(Ordering::Acquire) {
            break;
        }
        if done.iter().all(|d| d.load(Ordering::Acquire)) {
            break;
        }
        std::thread::sleep(CANCEL_POLL_INTERVAL);
    }

    calls
        .iter()
        .enumerate()
        .map(|(i, call)| slots[i].lock().unwrap().take().unwrap_or_else(|| ToolOutput::err(&call.id, "[Cancelled]")))
        .collect()
}

fn run_one(
    call: &glyph_model::ToolCall,
    tools: &ToolRegistry,
    level: PermissionLevel,
    dispatch: &DispatchAgentFn,
) -> ToolOutput {
    if call.name == "dispatch_agent" {
        if !level.allows(Risk::Dangerous) {
            return ToolOutput::err(&call.id, "Permission denied: dispatch_agent requires full tool access");
        }
        match parse_task_arg(&call.arguments) {
            Some(task) => ToolOutput::ok(&call.id, dispatch(&task)),
            None => ToolOutput::err(&call.id, "Error: missing 'task' argument"),
        }
    } else {
        tools.execute(&to_registry_call(call), level)
    }
}

fn fnv1a64(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

fn call_hash(name: &str, arguments: &str) -> u64 {
    let mut buf = Vec::with_capacity(name.len() + 1 + arguments.len());
    buf.extend_from_slice(name.as_bytes());
    buf.push(0x7C);
    buf.extend_from_slice(arguments.as_bytes());
    fnv1a64(&buf)
}

fn window_entries(ring: &[u64; LOOP_RING_SIZE], count: usize, window: usize) -> Vec<u64> {
    (0..window).map(|i| ring[(count - window + i) % LOOP_RING_SIZE]).collect()
}

fn loop_detected(ring: &[u64; LOOP_RING_SIZE], count: usize) -> bool {
    let window = count.min(LOOP_RING_SIZE);
    if window < 4 {
        return false;
    }
    let entries = window_entries(ring, count, window);
    for l in [1usize, 2, 3] {
        if window % l == 0 && window / l >= 2 {
            let first = &entries[..l];
            if entries.chunks(l).all(|chunk| chunk == first) {
                return true;
            }
        }
    }
    false
}
