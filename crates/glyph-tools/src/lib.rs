// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Built-in tools and the registry that dispatches them under a permission gate.

pub mod builtin;
pub mod policy;
pub mod registry;
pub mod tool;

pub use policy::{PermissionLevel, Risk};
pub use registry::{ToolRegistry, ToolSchema};
pub use tool::{OutputCategory, Tool, ToolCall, ToolOutput};

pub use builtin::execute_bash::ExecuteBashTool;
pub use builtin::list_files::ListFilesTool;
pub use builtin::load_skill::LoadSkillTool;
pub use builtin::read_file::ReadFileTool;
pub use builtin::search_files::SearchFilesTool;
pub use builtin::write_file::WriteFileTool;

/// Names of the tools available to a top-level agent, in the order they
/// should be presented to the model. Sub-agents see only the first five:
/// no nested dispatch, no skill loading.
pub const SUB_AGENT_TOOL_NAMES: &[&str] =
    &["execute_bash", "read_file", "write_file", "list_files", "search_files"];

/// Schema for `dispatch_agent`, the one tool name in [`SUB_AGENT_TOOL_NAMES`]'s
/// complement that is never registered in any [`ToolRegistry`] — the agent
/// loop routes it directly to sub-agent execution instead of `registry.execute`.
/// Top-level callers append this to `ToolRegistry::schemas()` before handing
/// the tool list to the model; sub-agent runs must not.
pub fn dispatch_agent_schema() -> ToolSchema {
    ToolSchema {
        name: "dispatch_agent".to_string(),
        description: "Delegate a self-contained task to a fresh sub-agent and return its final \
            text result. The sub-agent has its own conversation history and tool access \
            (execute_bash, read_file, write_file, list_files, search_files) but cannot dispatch \
            further sub-agents or load skills."
            .to_string(),
        parameters: serde_json::json!({
            "type": "object",
            "properties": {
                "task": {
                    "type": "string",
                    "description": "The task for the sub-agent to complete, as a self-contained instruction."
                }
            },
            "required": ["task"]
        }),
    }
}

/// Build the default registry with every built-in tool except `dispatch_agent`,
/// which is not a registered [`Tool`] — the agent loop routes it directly to
/// sub-agent execution.
pub fn default_registry(skills: std::sync::Arc<[glyph_model::SkillInfo]>) -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(ExecuteBashTool::default());
    registry.register(ReadFileTool);
    registry.register(WriteFileTool);
    registry.register(ListFilesTool);
    registry.register(SearchFilesTool);
    registry.register(LoadSkillTool::new(skills));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_contains_all_six_tools() {
        let reg = default_registry(std::sync::Arc::from(Vec::new().into_boxed_slice()));
        let mut names = reg.names();
        names.sort();
        assert_eq!(
            names,
            vec!["execute_bash", "list_files", "load_skill", "read_file", "search_files", "write_file"]
        );
    }

    #[test]
    fn sub_agent_tool_names_excludes_dispatch_and_skill() {
        assert_eq!(SUB_AGENT_TOOL_NAMES.len(), 5);
        assert!(!SUB_AGENT_TOOL_NAMES.contains(&"dispatch_agent"));
        assert!(!SUB_AGENT_TOOL_NAMES.contains(&"load_skill"));
    }

    #[test]
    fn dispatch_agent_schema_declares_required_task_param() {
        let schema = dispatch_agent_schema();
        assert_eq!(schema.name, "dispatch_agent");
        assert_eq!(schema.parameters["required"], serde_json::json!(["task"]));
        assert_eq!(schema.parameters["properties"]["task"]["type"], "string");
    }
}
