// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::Risk;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Default number of lines returned when the caller does not specify a limit.
const DEFAULT_LINE_LIMIT: usize = 200;

pub struct ReadFileTool;

impl Tool for ReadFileTool {
    fn name(&self) -> &str {
        "read_file"
    }

    fn description(&self) -> &str {
        "Reads a file. Default: 200 lines from the start.\n\
         Lines are formatted as L{n}:content (1-indexed).\n\
         When more lines exist, a pagination notice shows the next offset.\n\
         Use search_files to find the relevant region first, then read only\n\
         those lines with offset+limit."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" },
                "offset": { "type": "integer", "description": "1-indexed line number to start reading from (default 1)" },
                "limit": { "type": "integer", "description": "Maximum number of lines to return (default 200)" }
            },
            "required": ["path"],
            "additionalProperties": false
        })
    }

    fn risk(&self) -> Risk {
        Risk::Safe
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::FileContent
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'path' argument"),
        };
        let offset = call.args.get("offset").and_then(|v| v.as_u64()).unwrap_or(1) as usize;
        let limit = call
            .args
            .get("limit")
            .and_then(|v| v.as_u64())
            .unwrap_or(DEFAULT_LINE_LIMIT as u64) as usize;

        debug!(path = %path, offset, limit, "read_file tool");

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => return ToolOutput::err(&call.id, format!("Error: {e}")),
        };

        if has_binary_content(&bytes) {
            return ToolOutput::err(&call.id, "Error: binary file, cannot read as text");
        }

        let text = String::from_utf8_lossy(&bytes);
        let start = offset.saturating_sub(1);
        let all_lines: Vec<&str> = text.lines().collect();
        let total = all_lines.len();

        let selected: Vec<String> = all_lines
            .iter()
            .enumerate()
            .skip(start)
            .take(limit)
            .map(|(i, line)| format!("L{}:{}", i + 1, line))
            .collect();

        let last_shown = start + selected.len();
        let mut content = selected.join("\n");

        if last_shown < total {
            content.push_str(&format!(
                "\n...[{} more lines — showing L{}-L{} of {}; use offset={} to continue]",
                total - last_shown,
                offset,
                offset + selected.len().saturating_sub(1),
                total,
                last_shown + 1
            ));
        }

        ToolOutput::ok(&call.id, content)
    }
}

/// Samples up to 4096 bytes to decide if the content is binary: a null byte,
/// or more than 30% non-printable bytes outside TAB/LF/CR/space..~, is binary.
fn has_binary_content(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    let sample = &bytes[..bytes.len().min(4096)];
    if sample.contains(&0u8) {
        return true;
    }
    let non_printable = sample.iter().filter(|&&b| b < 9 || (b > 13 && b < 32)).count();
    non_printable * 100 / sample.len() > 30
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "r1".into(), name: "read_file".into(), args }
    }

    fn tmp_file(content: &str) -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let path = format!("/tmp/glyph_read_file_test_{}_{n}.txt", std::process::id());
        std::fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn reads_file_with_line_numbers() {
        let path = tmp_file("alpha\nbeta\ngamma\n");
        let out = ReadFileTool.execute(&call(json!({"path": path})));
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("L1:alpha"));
        assert!(out.content.contains("L3:gamma"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn offset_and_limit_work() {
        let path = tmp_file("line1\nline2\nline3\nline4\nline5\n");
        let out = ReadFileTool.execute(&call(json!({"path": path, "offset": 2, "limit": 2})));
        assert!(!out.is_error);
        assert!(out.content.contains("L2:line2"));
        assert!(out.content.contains("L3:line3"));
        assert!(!out.content.contains("L1:"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn missing_file_is_error() {
        let out = ReadFileTool.execute(&call(json!({"path": "/tmp/glyph_no_such_file_xyz.txt"})));
        assert!(out.is_error);
    }

    #[test]
    fn missing_path_argument_is_error() {
        let out = ReadFileTool.execute(&call(json!({})));
        assert!(out.is_error);
    }

    #[test]
    fn pagination_notice_when_more_lines_exist() {
        let path = tmp_file("a\nb\nc\nd\ne\n");
        let out = ReadFileTool.execute(&call(json!({"path": path, "limit": 2})));
        assert!(!out.is_error);
        assert!(out.content.contains("offset=3"), "{}", out.content);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn binary_file_is_rejected() {
        let path = tmp_file("");
        std::fs::write(&path, b"\x00\x01\x02binary").unwrap();
        let out = ReadFileTool.execute(&call(json!({"path": path})));
        assert!(out.is_error);
        let _ = std::fs::remove_file(&path);
    }
}
