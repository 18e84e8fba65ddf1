// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::Risk;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct ListFilesTool;

impl Tool for ListFilesTool {
    fn name(&self) -> &str {
        "list_files"
    }

    fn description(&self) -> &str {
        "List directory contents. depth: default 2, max 5. limit: 500 entries by default.\n\
         Excludes .git/ target/ node_modules/. Directories have a trailing /."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the directory" },
                "depth": { "type": "integer", "description": "Maximum recursion depth (default 2, max 5)" },
                "limit": { "type": "integer", "description": "Maximum number of entries to return (default 500)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn risk(&self) -> Risk {
        Risk::Safe
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'path' argument"),
        };
        let depth = call.args.get("depth").and_then(|v| v.as_u64()).unwrap_or(2).min(5) as usize;
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(500) as usize;

        debug!(path = %path, depth, limit, "list_files tool");

        match std::fs::metadata(&path) {
            Ok(m) if m.is_dir() => {}
            Ok(_) => return ToolOutput::err(&call.id, format!("Error: not a directory: {path}")),
            Err(e) => return ToolOutput::err(&call.id, format!("Error: {e}")),
        }

        let mut entries: Vec<String> = Vec::new();
        let mut truncated = false;
        collect_entries(&path, &path, 0, depth, limit, &mut entries, &mut truncated);

        if entries.is_empty() {
            return ToolOutput::ok(&call.id, "(empty directory)");
        }

        let mut output = entries.join("\n");
        if truncated {
            output.push_str(&format!("\n...[output truncated at {} entries]", limit));
        }
        ToolOutput::ok(&call.id, output)
    }
}

static EXCLUDED_DIRS: &[&str] = &[".git", "target", "node_modules", ".svn", "__pycache__"];

fn is_excluded(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name)
}

fn relative_path(base: &str, full: &str) -> String {
    full.strip_prefix(base).map(|s| s.trim_start_matches('/').to_string()).unwrap_or_else(|| full.to_string())
}

fn collect_entries(
    base: &str,
    dir: &str,
    current_depth: usize,
    max_depth: usize,
    limit: usize,
    entries: &mut Vec<String>,
    truncated: &mut bool,
) {
    if entries.len() >= limit {
        *truncated = true;
        return;
    }
    let rd = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(_) => return,
    };

    let mut children: Vec<(String, bool)> = Vec::new();
    for entry in rd.flatten() {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        children.push((name, is_dir));
    }
    children.sort_by(|(a, a_dir), (b, b_dir)| b_dir.cmp(a_dir).then(a.cmp(b)));

    for (name, is_dir) in children {
        if entries.len() >= limit {
            *truncated = true;
            return;
        }
        let full_path = format!("{}/{}", dir.trim_end_matches('/'), name);
        let rel = relative_path(base, &full_path);
        if is_dir {
            entries.push(format!("{}/", rel));
            if current_depth < max_depth && !is_excluded(&name) {
                collect_entries(base, &full_path, current_depth + 1, max_depth, limit, entries, truncated);
            }
        } else {
            entries.push(rel);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "l1".into(), name: "list_files".into(), args }
    }

    #[test]
    fn lists_directory_contents() {
        let out = ListFilesTool.execute(&call(json!({"path": "/tmp"})));
        assert!(!out.is_error, "{}", out.content);
    }

    #[test]
    fn dirs_have_trailing_slash() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/glyph_listdir_{}_{n}", std::process::id());
        std::fs::create_dir_all(format!("{dir}/subdir")).unwrap();
        std::fs::write(format!("{dir}/file.txt"), "x").unwrap();
        let out = ListFilesTool.execute(&call(json!({"path": dir})));
        assert!(out.content.contains("subdir/"));
        assert!(out.content.contains("file.txt"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_path_is_error() {
        let out = ListFilesTool.execute(&call(json!({})));
        assert!(out.is_error);
    }

    #[test]
    fn depth_zero_shows_only_immediate_children() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/glyph_listdir_depth_{}_{n}", std::process::id());
        std::fs::create_dir_all(format!("{dir}/subdir/nested")).unwrap();
        std::fs::write(format!("{dir}/top.txt"), "x").unwrap();
        std::fs::write(format!("{dir}/subdir/inner.txt"), "x").unwrap();
        let out = ListFilesTool.execute(&call(json!({"path": dir, "depth": 0})));
        assert!(out.content.contains("top.txt"));
        assert!(!out.content.contains("inner.txt"));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn nonexistent_dir_is_error() {
        let out = ListFilesTool.execute(&call(json!({"path": "/tmp/glyph_no_such_dir_xyzzy_99999"})));
        assert!(out.is_error);
    }
}
