// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod agent_loop;
pub mod compact;
pub mod hooks;
pub mod prompts;
pub mod reactive;
pub mod runtime_context;
pub mod session;
pub mod session_store;
pub mod sub_agent;
#[cfg(test)]
mod tests;

pub use agent_loop::{AgentLoopConfig, AgentOutcome};
pub use compact::{apply_manual_compaction, build_manual_compaction_request, maybe_auto_compact, CompactionReport};
pub use hooks::{DispatchAgentFn, Hooks};
pub use prompts::system_prompt;
pub use reactive::{Phase, ReactiveState, TokenUsage};
pub use runtime_context::AgentRuntimeContext;
pub use session::Session;
pub use session_store::{session_id_from_unix_time, SessionSummary, SessionStore};
pub use sub_agent::{run_sub_agent, SubAgentResult, SUB_AGENT_PROMPT};
