// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Tool that loads a named skill's full content into the conversation context.
//!
//! The model calls this after recognising that a user request matches one of
//! the skills listed in the system prompt's skills section. The registry-scoped
//! active skill list is looked up by name; the skill's body (frontmatter
//! already stripped) is returned, or an error string naming the skills that
//! do exist.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::debug;

use glyph_model::SkillInfo;

use crate::policy::Risk;
use crate::tool::{Tool, ToolCall, ToolOutput};

fn build_description(skills: &[SkillInfo]) -> String {
    if skills.is_empty() {
        return "Load a named skill's full instructions into context. \
                No skills are currently available."
            .to_string();
    }

    let skill_list: String = skills
        .iter()
        .filter(|s| s.available)
        .map(|s| {
            format!(
                "  <skill>\n    <name>{}</name>\n    <description>{}</description>\n  </skill>",
                s.name,
                s.description.trim()
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Load the full instructions for a named skill into the conversation context.\n\n\
         Call this tool when the user's request matches a skill description.\n\n\
         <available_skills>\n{skill_list}\n</available_skills>"
    )
}

/// Tool that loads a named skill's full content on demand.
pub struct LoadSkillTool {
    skills: Arc<[SkillInfo]>,
    description: String,
}

impl LoadSkillTool {
    pub fn new(skills: Arc<[SkillInfo]>) -> Self {
        let description = build_description(&skills);
        Self { skills, description }
    }
}

impl Tool for LoadSkillTool {
    fn name(&self) -> &str {
        "load_skill"
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "name": { "type": "string", "description": "The name of the skill to load" }
            },
            "required": ["name"],
            "additionalProperties": false
        })
    }

    fn risk(&self) -> Risk {
        Risk::Safe
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let name = match call.args.get("name").and_then(|v| v.as_str()) {
            Some(n) => n.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'name' argument"),
        };

        debug!(skill = %name, "load_skill tool");

        match self.skills.iter().find(|s| s.name == name && s.available) {
            Some(skill) => ToolOutput::ok(&call.id, skill.content.trim_end().to_string()),
            None => {
                let available: Vec<&str> =
                    self.skills.iter().filter(|s| s.available).map(|s| s.name.as_str()).collect();
                ToolOutput::err(
                    &call.id,
                    format!(
                        "Error: skill \"{name}\" not found. Available skills: {}",
                        if available.is_empty() { "(none)".to_string() } else { available.join(", ") }
                    ),
                )
            }
        }
    }
}
