// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Discovers `SKILL.md` files and turns them into [`glyph_model::SkillInfo`]
//! for the system-prompt injection hook in `glyph_core::prompts`.
//!
//! Project-local skills under `./.zaica/skills/<name>/SKILL.md` override a
//! user-global skill of the same name.

use std::collections::HashMap;
use std::path::Path;

use glyph_model::SkillInfo;
use tracing::warn;

/// Scans the user-global skills directory and the project-local override
/// directory, returning one [`SkillInfo`] per distinct name (local wins).
pub fn discover_skills(project_root: &Path, app_name: &str) -> Vec<SkillInfo> {
    let mut by_name: HashMap<String, SkillInfo> = HashMap::new();

    if let Some(config) = dirs::config_dir() {
        scan_dir(&config.join(app_name).join("skills"), &mut by_name);
    }
    scan_dir(&project_root.join(".zaica").join("skills"), &mut by_name);

    let mut skills: Vec<SkillInfo> = by_name.into_values().collect();
    skills.sort_by(|a, b| a.name.cmp(&b.name));
    skills
}

fn scan_dir(dir: &Path, by_name: &mut HashMap<String, SkillInfo>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let skill_md = path.join("SKILL.md");
        let Ok(raw) = std::fs::read_to_string(&skill_md) else { continue };
        let dir_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
        match parse_skill_file(&raw, &dir_name) {
            Some(skill) => {
                by_name.insert(skill.name.clone(), skill);
            }
            None => warn!(path = %skill_md.display(), "failed to parse SKILL.md frontmatter, skipping"),
        }
    }
}

#[derive(Debug, Default, serde::Deserialize)]
struct Frontmatter {
    name: Option<String>,
    description: Option<String>,
    #[serde(default)]
    always: bool,
}

fn parse_skill_file(raw: &str, dir_name: &str) -> Option<SkillInfo> {
    let (frontmatter, body) = split_frontmatter(raw)?;
    let meta: Frontmatter = serde_yaml::from_str(&frontmatter).ok()?;
    let description = meta.description?;
    Some(SkillInfo {
        name: meta.name.unwrap_or_else(|| dir_name.to_string()),
        description,
        always: meta.always,
        available: true,
        content: body.trim().to_string(),
    })
}

/// Splits a `---\n...\n---\n` YAML frontmatter block from the rest of the
/// document. Returns `None` when there's no well-formed block.
fn split_frontmatter(raw: &str) -> Option<(String, String)> {
    let rest = raw.strip_prefix("---\n")?;
    let end = rest.find("\n---")?;
    let frontmatter = rest[..end].to_string();
    let body = rest[end + 4..].trim_start_matches('\n').to_string();
    Some((frontmatter, body))
}
