// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! System prompt assembly: `base_prompt + (autonomous_suffix if yolo) +
//! skills_section`, built from [`crate::runtime_context::AgentRuntimeContext`].

use crate::runtime_context::AgentRuntimeContext;

mod guidelines {
    pub fn general() -> &'static str {
        "- Be concise and precise. Use tools instead of guessing.\n\
         - Prefer `search_files` over `execute_bash` with grep/find for locating code.\n\
         - Read a file with `read_file` before writing it; `write_file` replaces the whole file."
    }

    pub fn tool_usage() -> &'static str {
        "- `execute_bash` and `dispatch_agent` are dangerous-risk and may require permission.\n\
         - `dispatch_agent` spawns a focused sub-agent for an isolated task; prefer it over doing \
           broad exploratory work inline when the result can be summarized as text.\n\
         - `load_skill` fetches the full body of an on-demand skill by name."
    }
}

const AUTONOMOUS_SUFFIX: &str = "\n\nYou are operating in autonomous (yolo) mode: all tool \
permissions are pre-granted. Proceed without asking for confirmation, but remain as careful as \
if every action required approval.";

fn base_prompt() -> String {
    format!(
        "You are an interactive coding agent operating in a terminal. You can read and write \
         files, run shell commands, search the codebase, and dispatch focused sub-agents, all \
         via tool calls. Respond in plain text; call a tool when you need information or need to \
         make a change.\n\n\
         Guidelines:\n{}\n{}",
        guidelines::general(),
        guidelines::tool_usage()
    )
}

fn skills_section(ctx: &AgentRuntimeContext) -> Option<String> {
    if ctx.skills.is_empty() {
        return None;
    }
    let mut out = String::from("\n\nAvailable skills (use `load_skill` to fetch the full body):\n");
    for skill in ctx.skills.iter() {
        if skill.always {
            out.push_str(&format!("\n--- {} ---\n{}\n", skill.name, skill.content));
        } else {
            out.push_str(&format!("- {}: {}\n", skill.name, skill.description));
        }
    }
    Some(out)
}

/// Build the effective system prompt for a new session.
pub fn system_prompt(ctx: &AgentRuntimeContext, yolo: bool) -> String {
    if let Some(ov) = &ctx.system_prompt_override {
        return ov.clone();
    }

    let mut prompt = base_prompt();

    if let Some(note) = &ctx.project_context_file {
        prompt.push_str("\n\n--- Project context ---\n");
        prompt.push_str(note);
    }
    if let Some(git) = &ctx.git_context_note {
        prompt.push_str("\n\n");
        prompt.push_str(git);
    }
    if let Some(ci) = &ctx.ci_context_note {
        prompt.push_str("\n\n");
        prompt.push_str(ci);
    }
    if yolo {
        prompt.push_str(AUTONOMOUS_SUFFIX);
    }
    if let Some(skills) = skills_section(ctx) {
        prompt.push_str(&skills);
    }
    if let Some(extra) = &ctx.append_system_prompt {
        prompt.push_str("\n\n");
        prompt.push_str(extra);
    }

    prompt
}
