// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
#[cfg(unix)]
use std::os::unix::process::CommandExt;
use std::process::Stdio;
use std::sync::mpsc;
use std::time::Duration;

use serde_json::{json, Value};
use tracing::debug;

use crate::policy::Risk;
use crate::tool::{OutputCategory, Tool, ToolCall, ToolOutput};

/// Built-in tool that runs a shell command (§4.C "Shell tool").
pub struct ExecuteBashTool {
    pub timeout_secs: u64,
}

impl Default for ExecuteBashTool {
    fn default() -> Self {
        Self { timeout_secs: 30 }
    }
}

impl Tool for ExecuteBashTool {
    fn name(&self) -> &str {
        "execute_bash"
    }

    fn description(&self) -> &str {
        "Execute a shell command and return its combined stdout+stderr.\n\
         'command' is required and may be any bash one-liner. The command runs\n\
         in its own process group with stdin attached to /dev/null; if it does\n\
         not finish within the timeout it is killed (SIGKILL) along with any\n\
         children it spawned."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "The shell command to run" },
                "workdir": { "type": "string", "description": "Working directory (optional)" },
                "timeout_secs": { "type": "integer", "description": "Timeout override in seconds (optional)" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    fn risk(&self) -> Risk {
        Risk::Dangerous
    }

    fn output_category(&self) -> OutputCategory {
        OutputCategory::HeadTail
    }

    fn execute(&self, call: &ToolCall) -> ToolOutput {
        let command = match call.args.get("command").and_then(|v| v.as_str()) {
            Some(c) => c.to_string(),
            None => return ToolOutput::err(&call.id, "Error: missing 'command' argument"),
        };
        let workdir = call.args.get("workdir").and_then(|v| v.as_str()).map(str::to_string);
        let timeout_secs =
            call.args.get("timeout_secs").and_then(|v| v.as_u64()).unwrap_or(self.timeout_secs);

        debug!(cmd = %command, timeout_secs, "executing execute_bash tool");
        run_with_timeout(&command, workdir.as_deref(), timeout_secs, &call.id)
    }
}

fn run_with_timeout(command: &str, workdir: Option<&str>, timeout_secs: u64, call_id: &str) -> ToolOutput {
    let mut cmd = std::process::Command::new("bash");
    cmd.arg("-c").arg(command);
    cmd.stdin(Stdio::null());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    if let Some(wd) = workdir {
        cmd.current_dir(wd);
    }
    // setsid() detaches the child into its own session/process group so the
    // timeout path below can kill the whole group, not just the direct child.
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }

    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => return ToolOutput::err(call_id, format!("Error: spawn failed: {e}")),
    };
    let pid = child.id() as libc::pid_t;

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = child.wait_with_output();
        let _ = tx.send(result);
    });

    match rx.recv_timeout(Duration::from_secs(timeout_secs)) {
        Ok(Ok(output)) => format_output(output, false, call_id),
        Ok(Err(e)) => ToolOutput::err(call_id, format!("Error: {e}")),
        Err(mpsc::RecvTimeoutError::Timeout) => {
            #[cfg(unix)]
            unsafe {
                libc::kill(-pid, libc::SIGKILL);
            }
            // Give the reaper thread a moment to collect the now-dead child.
            match rx.recv_timeout(Duration::from_secs(5)) {
                Ok(Ok(output)) => format_output(output, true, call_id),
                _ => ToolOutput::err(
                    call_id,
                    format!("Error: command killed after {timeout_secs}s (no output collected)"),
                ),
            }
        }
        Err(mpsc::RecvTimeoutError::Disconnected) => {
            ToolOutput::err(call_id, "Error: execute_bash worker thread vanished")
        }
    }
}

fn format_output(output: std::process::Output, timed_out: bool, call_id: &str) -> ToolOutput {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

    let killed = timed_out
        || output.status.code() == Some(137)
        || (output.status.code().is_none() && cfg!(unix));

    let mut content = if !stdout.is_empty() && !stderr.is_empty() {
        format!("{stdout}\n[stderr]\n{stderr}")
    } else if !stdout.is_empty() {
        stdout
    } else if !stderr.is_empty() {
        stderr
    } else {
        String::new()
    };

    if killed {
        if content.is_empty() {
            content = "--- TIMEOUT: command killed ---".to_string();
        } else {
            content.push_str("\n--- TIMEOUT: command killed ---");
        }
        return ToolOutput::err(call_id, content);
    }

    if content.is_empty() {
        content = "(no output)".to_string();
    }

    if output.status.success() {
        ToolOutput::ok(call_id, content)
    } else {
        ToolOutput::err(call_id, content)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn call(id: &str, args: Value) -> ToolCall {
        ToolCall { id: id.into(), name: "execute_bash".into(), args }
    }

    #[test]
    fn executes_echo_and_returns_stdout() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({"command": "echo hello"})));
        assert!(!out.is_error, "{}", out.content);
        assert!(out.content.contains("hello"));
    }

    #[test]
    fn stdout_and_stderr_both_captured() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({"command": "echo out && echo err >&2"})));
        assert!(out.content.contains("out"));
        assert!(out.content.contains("err"));
    }

    #[test]
    fn workdir_changes_cwd() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({"command": "pwd", "workdir": "/tmp"})));
        assert!(!out.is_error);
        assert!(out.content.trim().ends_with("tmp"));
    }

    #[test]
    fn nonzero_exit_is_error() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({"command": "exit 2"})));
        assert!(out.is_error);
    }

    #[test]
    fn missing_command_argument_is_error() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({})));
        assert!(out.is_error);
        assert!(out.content.contains("command"));
    }

    #[test]
    fn empty_output_reports_no_output_marker() {
        let t = ExecuteBashTool::default();
        let out = t.execute(&call("1", json!({"command": "true"})));
        assert_eq!(out.content, "(no output)");
    }

    #[test]
    fn timeout_kills_command_and_marks_error() {
        let t = ExecuteBashTool { timeout_secs: 1 };
        let out = t.execute(&call("1", json!({"command": "sleep 10"})));
        assert!(out.is_error);
        assert!(out.content.contains("TIMEOUT"));
    }
}
