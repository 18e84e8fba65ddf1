// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::{json, Value};
use tracing::debug;

use crate::policy::Risk;
use crate::tool::{Tool, ToolCall, ToolOutput};

pub struct WriteFileTool;

impl Tool for WriteFileTool {
    fn name(&self) -> &str {
        "write_file"
    }

    fn description(&self) -> &str {
        "Writes a file to the local filesystem, overwriting it if it exists.\n\
         Creates parent directories automatically.\n\
         Set append=true to add to the end of an existing file instead of overwriting."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "path": { "type": "string", "description": "Absolute or relative path to the file" },
                "content": { "type": "string", "description": "Content to write to the file" },
                "append": { "type": "boolean", "description": "If true, append instead of overwriting (default false)" }
            },
            "required": ["path", "content"]
        })
    }

    fn risk(&self) -> Risk {
        Risk::Write
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let path = match call.args.get("path").and_then(|v| v.as_str()) {
            Some(p) => p.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'path' argument"),
        };
        let content = match call.args.get("content").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'content' argument"),
        };
        let should_append = call.args.get("append").and_then(|v| v.as_bool()).unwrap_or(false);

        debug!(path = %path, append = should_append, "write_file tool");

        if let Some(parent) = std::path::Path::new(&path).parent() {
            if !parent.as_os_str().is_empty() {
                let _ = std::fs::create_dir_all(parent);
            }
        }

        let result = if should_append {
            use std::io::Write;
            std::fs::OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .and_then(|mut f| f.write_all(content.as_bytes()))
        } else {
            std::fs::write(&path, &content)
        };

        match result {
            Ok(()) => {
                let verb = if should_append { "appended" } else { "wrote" };
                ToolOutput::ok(&call.id, format!("{verb} {} bytes to {path}", content.len()))
            }
            Err(e) => ToolOutput::err(&call.id, format!("Error: {e}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(args: Value) -> ToolCall {
        ToolCall { id: "w1".into(), name: "write_file".into(), args }
    }

    fn tmp_path() -> String {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        format!("/tmp/glyph_write_test_{}_{n}.txt", std::process::id())
    }

    #[test]
    fn write_creates_file() {
        let path = tmp_path();
        let out = WriteFileTool.execute(&call(json!({"path": path, "content": "hello write"})));
        assert!(!out.is_error, "{}", out.content);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "hello write");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn append_adds_to_file() {
        let path = tmp_path();
        let w1 = WriteFileTool.execute(&call(json!({"path": path, "content": "first\n"})));
        assert!(!w1.is_error, "{}", w1.content);
        let w2 = WriteFileTool
            .execute(&call(json!({"path": path, "content": "second\n", "append": true})));
        assert!(!w2.is_error, "{}", w2.content);
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("first") && contents.contains("second"));
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_creates_parent_dirs() {
        use std::sync::atomic::{AtomicU32, Ordering};
        static CTR: AtomicU32 = AtomicU32::new(0);
        let n = CTR.fetch_add(1, Ordering::Relaxed);
        let dir = format!("/tmp/glyph_write_nested_{}_{n}", std::process::id());
        let path = format!("{dir}/sub/file.txt");
        let out = WriteFileTool.execute(&call(json!({"path": path, "content": "nested"})));
        assert!(!out.is_error, "{}", out.content);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[test]
    fn missing_path_is_error() {
        let out = WriteFileTool.execute(&call(json!({"content": "x"})));
        assert!(out.is_error);
    }

    #[test]
    fn missing_content_is_error() {
        let out = WriteFileTool.execute(&call(json!({"path": "/tmp/x.txt"})));
        assert!(out.is_error);
    }

    #[test]
    fn risk_is_write() {
        assert_eq!(WriteFileTool.risk(), Risk::Write);
    }
}
