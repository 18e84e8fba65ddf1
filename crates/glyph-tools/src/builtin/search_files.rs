// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::Risk;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Thin wrapper over `rg` (falling back to `grep`) with sensible codebase
/// defaults: always excludes .git/, target/, node_modules/, dist/, __pycache__/.
pub struct SearchFilesTool;

impl Tool for SearchFilesTool {
    fn name(&self) -> &str {
        "search_files"
    }

    fn description(&self) -> &str {
        "Searches the codebase with ripgrep (falls back to grep) with standard\n\
         exclusions: .git/ target/ node_modules/ dist/ __pycache__/ *.lock\n\
         query: regex. include: glob file filter. case_sensitive: true. limit: 100."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": { "type": "string", "description": "Pattern or text to search for (supports regex)" },
                "path": { "type": "string", "description": "Directory to search in (default: current directory)" },
                "include": { "type": "string", "description": "Glob filter for file types, e.g. '*.rs'" },
                "case_sensitive": { "type": "boolean", "description": "Case-sensitive search (default true)" },
                "limit": { "type": "integer", "description": "Maximum number of matches to return (default 100)" }
            },
            "required": ["query"],
            "additionalProperties": false
        })
    }

    fn risk(&self) -> Risk {
        Risk::Safe
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::MatchList
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let query = match call.args.get("query").and_then(|v| v.as_str()) {
            Some(q) => q.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'query' argument"),
        };
        let path = call.args.get("path").and_then(|v| v.as_str()).unwrap_or(".").to_string();
        let include = call.args.get("include").and_then(|v| v.as_str()).map(str::to_string);
        let case_sensitive =
            call.args.get("case_sensitive").and_then(|v| v.as_bool()).unwrap_or(true);
        let limit = call.args.get("limit").and_then(|v| v.as_u64()).unwrap_or(100) as usize;

        debug!(query = %query, path = %path, "search_files tool");

        let has_rg = std::process::Command::new("which")
            .arg("rg")
            .stdin(std::process::Stdio::null())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false);

        let output = if has_rg {
            let mut args = vec![
                "--vimgrep".to_string(),
                "--color".to_string(),
                "never".to_string(),
                "--no-heading".to_string(),
                "--glob".to_string(),
                "!.git/**".to_string(),
                "--glob".to_string(),
                "!target/**".to_string(),
                "--glob".to_string(),
                "!node_modules/**".to_string(),
                "--glob".to_string(),
                "!dist/**".to_string(),
                "--glob".to_string(),
                "!__pycache__/**".to_string(),
                "--glob".to_string(),
                "!*.lock".to_string(),
            ];
            if !case_sensitive {
                args.push("--ignore-case".to_string());
            }
            if let Some(glob) = &include {
                args.push("-g".to_string());
                args.push(glob.clone());
            }
            args.push(query.clone());
            args.push(path.clone());

            std::process::Command::new("rg").args(&args).stdin(std::process::Stdio::null()).output()
        } else {
            let mut cmd_parts = vec!["grep -rn".to_string()];
            if !case_sensitive {
                cmd_parts.push("-i".to_string());
            }
            cmd_parts.push(
                "--exclude-dir=.git --exclude-dir=target --exclude-dir=node_modules --exclude-dir=dist"
                    .to_string(),
            );
            if let Some(glob) = &include {
                cmd_parts.push(format!("--include={glob}"));
            }
            cmd_parts.push(shell_escape(&query));
            cmd_parts.push(shell_escape(&path));

            std::process::Command::new("sh")
                .arg("-c")
                .arg(cmd_parts.join(" "))
                .stdin(std::process::Stdio::null())
                .output()
        };

        match output {
            Ok(out) => {
                let text = String::from_utf8_lossy(&out.stdout);
                let lines: Vec<&str> = text.lines().take(limit).collect();
                if lines.is_empty() {
                    ToolOutput::ok(&call.id, "(no matches)")
                } else {
                    let total = text.lines().count();
                    let mut result = lines.join("\n");
                    if total > limit {
                        result.push_str(&format!("\n...[{} more matches not shown]", total - limit));
                    }
                    ToolOutput::ok(&call.id, result)
                }
            }
            Err(e) => ToolOutput::err(&call.id, format!("Error: {e}")),
        }
    }
}

fn shell_escape(s: &str) -> String {
    format!("'{}'", s.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "s1".into(), name: "search_files".into(), args }
    }

    #[test]
    fn finds_matches_in_own_source() {
        let out = SearchFilesTool.execute(&call(json!({
            "query": "SearchFilesTool",
            "path": "/root/crate/crates/glyph-tools/src"
        })));
        assert!(!out.is_error, "{}", out.content);
        assert!(!out.content.contains("(no matches)"));
    }

    #[test]
    fn missing_query_is_error() {
        let out = SearchFilesTool.execute(&call(json!({})));
        assert!(out.is_error);
    }

    #[test]
    fn no_matches_reports_empty() {
        let out = SearchFilesTool.execute(&call(json!({
            "query": "zzz_no_such_token_zzz_12345",
            "path": "/root/crate/crates/glyph-tools/src"
        })));
        assert!(!out.is_error);
        assert!(out.content.contains("(no matches)"));
    }
}
