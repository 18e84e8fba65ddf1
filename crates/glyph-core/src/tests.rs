// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! End-to-end scenarios for the agentic loop, driven through
//! [`crate::agent_loop::run`] with a scripted model and a registry of fake
//! tools, mirroring the scenario table the loop design was validated
//! against.
#[cfg(test)]
mod agent_loop_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    use glyph_model::mock::ScriptedProvider;
    use glyph_model::provider::{CompletionOutcome, CompletionResponse, Usage};
    use glyph_model::{Message, Role, ToolCall as ModelToolCall};
    use glyph_tools::{OutputCategory, PermissionLevel, Risk, Tool, ToolCall, ToolOutput, ToolRegistry};

    use crate::agent_loop::{self, AgentLoopConfig, AgentOutcome};
    use crate::hooks::{noop_chunk, noop_http_error, noop_llm_end, noop_persist, noop_status, Hooks};
    use crate::session::Session;

    struct FakeReader {
        response: &'static str,
    }
    impl Tool for FakeReader {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "fake reader"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn risk(&self) -> Risk {
            Risk::Safe
        }
        fn output_category(&self) -> OutputCategory {
            OutputCategory::FileContent
        }
        fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::ok(&call.id, self.response)
        }
    }

    struct AlwaysErrorTool;
    impl Tool for AlwaysErrorTool {
        fn name(&self) -> &str {
            "read_file"
        }
        fn description(&self) -> &str {
            "always errors"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn risk(&self) -> Risk {
            Risk::Safe
        }
        fn execute(&self, call: &ToolCall) -> ToolOutput {
            ToolOutput::err(&call.id, "err")
        }
    }

    struct SleepyTool {
        label: &'static str,
        sleep: Duration,
    }
    impl Tool for SleepyTool {
        fn name(&self) -> &str {
            self.label
        }
        fn description(&self) -> &str {
            "sleeps then returns"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({"type": "object"})
        }
        fn risk(&self) -> Risk {
            Risk::Safe
        }
        fn execute(&self, call: &ToolCall) -> ToolOutput {
            std::thread::sleep(self.sleep);
            ToolOutput::ok(&call.id, format!("{}-done", self.label))
        }
    }

    fn base_session() -> Session {
        let mut s = Session::new("test", 0);
        s.push(Message::system("sp"));
        s.push(Message::user("hi"));
        s
    }

    fn run_with(
        session: &mut Session,
        tools: Arc<ToolRegistry>,
        model: &dyn glyph_model::ModelProvider,
        cancel: &AtomicBool,
        config: &AgentLoopConfig,
    ) -> AgentOutcome {
        let mut on_chunk = noop_chunk;
        let mut on_llm_end = noop_llm_end;
        let mut on_http_error = noop_http_error;
        let mut on_tool_calls = |_: &[ToolCall]| config.permission;
        let mut on_tool_result = |_: &str, _: &str, _: bool| {};
        let mut persist = noop_persist;
        let mut on_status = noop_status;
        let dispatch: crate::hooks::DispatchAgentFn = Arc::new(|_| "unused".to_string());
        let mut hooks = Hooks {
            on_chunk: &mut on_chunk,
            on_llm_end: &mut on_llm_end,
            on_http_error: &mut on_http_error,
            on_tool_calls: &mut on_tool_calls,
            on_tool_result: &mut on_tool_result,
            on_loop_detected: None,
            persist: &mut persist,
            on_status: &mut on_status,
            dispatch_agent: dispatch,
        };
        agent_loop::run(session, tools, model, cancel, config, &mut hooks)
    }

    fn text_outcome(text: &str, usage: Option<Usage>) -> CompletionOutcome {
        CompletionOutcome { response: CompletionResponse::Text(text.to_string()), usage }
    }

    fn tool_calls_outcome(calls: Vec<ModelToolCall>) -> CompletionOutcome {
        CompletionOutcome { response: CompletionResponse::ToolCalls(calls), usage: None }
    }

    /// Scenario 1: simple text turn.
    #[test]
    fn scenario_simple_text_turn() {
        let model = ScriptedProvider::new(vec![text_outcome(
            "hello",
            Some(Usage { prompt: 10, completion: 2, reasoning: None, cache_read: None, cache_write: None }),
        )]);
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 5, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };

        let outcome = run_with(&mut session, tools, &model, &cancel, &config);

        assert_eq!(outcome, AgentOutcome::ReturnedText("hello".to_string()));
        assert!(matches!(session.messages.last(), Some(Message::Text { role: Role::Assistant, content }) if content == "hello"));
    }

    /// Scenario 2: tool call then text.
    #[test]
    fn scenario_tool_then_text() {
        let model = ScriptedProvider::new(vec![
            tool_calls_outcome(vec![ModelToolCall {
                id: "t1".into(),
                name: "read_file".into(),
                arguments: "{\"path\":\"a.txt\"}".into(),
            }]),
            text_outcome("done", None),
        ]);
        let mut session = base_session();
        let mut registry = ToolRegistry::new();
        registry.register(FakeReader { response: "HELLO" });
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 5, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };

        let outcome = run_with(&mut session, Arc::new(registry), &model, &cancel, &config);

        assert_eq!(outcome, AgentOutcome::ReturnedText("done".to_string()));
        let suffix = &session.messages[session.messages.len() - 3..];
        assert!(matches!(&suffix[0], Message::ToolUse { calls } if calls[0].id == "t1"));
        assert!(matches!(&suffix[1], Message::ToolResult { call_id, content } if call_id == "t1" && content == "HELLO"));
        assert!(matches!(&suffix[2], Message::Text { role: Role::Assistant, content } if content == "done"));
    }

    /// Scenario 3: loop detection triggers steering after 4 repeats.
    #[test]
    fn scenario_loop_detection_injects_steering() {
        let repeated_call = || {
            tool_calls_outcome(vec![ModelToolCall {
                id: "t".into(),
                name: "read_file".into(),
                arguments: "{\"path\":\"a.txt\"}".into(),
            }])
        };
        let model = ScriptedProvider::new(vec![
            repeated_call(),
            repeated_call(),
            repeated_call(),
            repeated_call(),
            text_outcome("give up", None),
        ]);
        let mut session = base_session();
        let mut registry = ToolRegistry::new();
        registry.register(AlwaysErrorTool);
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 10, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };

        let outcome = run_with(&mut session, Arc::new(registry), &model, &cancel, &config);

        assert_eq!(outcome, AgentOutcome::ReturnedText("give up".to_string()));
        let steering_count = session
            .messages
            .iter()
            .filter(|m| matches!(m, Message::Text { role: Role::User, content } if content.contains("stuck in a loop")))
            .count();
        assert_eq!(steering_count, 1);
    }

    /// Scenario 4: 429 then success, with real backoff elapsed.
    #[test]
    fn scenario_retry_then_success() {
        let model = ScriptedProvider::new(vec![
            CompletionOutcome {
                response: CompletionResponse::HttpError { status: 429, message: "rate limited".into() },
                usage: None,
            },
            text_outcome("ok", None),
        ]);
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 5, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };

        let start = Instant::now();
        let outcome = run_with(&mut session, tools, &model, &cancel, &config);
        let elapsed = start.elapsed();

        assert_eq!(outcome, AgentOutcome::ReturnedText("ok".to_string()));
        assert!(elapsed >= Duration::from_millis(950), "expected >= 1s backoff, got {elapsed:?}");
    }

    /// Scenario 5: cancel during tool join leaves one result `[Cancelled]`.
    #[test]
    fn scenario_cancel_during_tool_join() {
        let model = ScriptedProvider::new(vec![tool_calls_outcome(vec![
            ModelToolCall { id: "a".into(), name: "fast".into(), arguments: "{}".into() },
            ModelToolCall { id: "b".into(), name: "slow".into(), arguments: "{}".into() },
        ])]);
        let mut session = base_session();
        let mut registry = ToolRegistry::new();
        registry.register(SleepyTool { label: "fast", sleep: Duration::from_millis(20) });
        registry.register(SleepyTool { label: "slow", sleep: Duration::from_secs(2) });
        let cancel = Arc::new(AtomicBool::new(false));
        let config = AgentLoopConfig {
            max_iterations: 5,
            permission: PermissionLevel::All,
            silent: false,
            allow_dispatch_agent: true,
        };

        let cancel_clone = cancel.clone();
        std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(100));
            cancel_clone.store(true, Ordering::Release);
        });

        let outcome = run_with(&mut session, Arc::new(registry), &model, &cancel, &config);

        assert_eq!(outcome, AgentOutcome::Cancelled);
        let results: Vec<&Message> = session.messages.iter().filter(|m| matches!(m, Message::ToolResult { .. })).collect();
        assert_eq!(results.len(), 2);
        assert!(matches!(results[0], Message::ToolResult { content, .. } if content == "fast-done"));
        assert!(matches!(results[1], Message::ToolResult { content, .. } if content == "[Cancelled]"));
    }

    /// Iteration cap of 0 returns `HitLimit` with zero LLM calls.
    #[test]
    fn zero_iteration_cap_hits_limit_without_llm_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        struct CountingProvider(Arc<AtomicUsize>);
        impl glyph_model::ModelProvider for CountingProvider {
            fn name(&self) -> &str {
                "counting"
            }
            fn model_name(&self) -> &str {
                "counting-model"
            }
            fn complete(
                &self,
                _history: &[Message],
                _tools: &[glyph_model::provider::ToolSchema],
                _on_chunk: &mut dyn FnMut(&str),
            ) -> CompletionOutcome {
                self.0.fetch_add(1, Ordering::Relaxed);
                text_outcome("unreachable", None)
            }
        }
        let model = CountingProvider(calls.clone());
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 0, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };

        let outcome = run_with(&mut session, tools, &model, &cancel, &config);

        assert_eq!(outcome, AgentOutcome::HitLimit);
        assert_eq!(calls.load(Ordering::Relaxed), 0);
    }

    /// The model sees `dispatch_agent` in its tool schema only when the
    /// loop config allows it — sub-agent runs must not advertise it.
    #[test]
    fn dispatch_agent_schema_advertised_only_when_allowed() {
        struct RecordingProvider(Mutex<Vec<String>>);
        impl glyph_model::ModelProvider for RecordingProvider {
            fn name(&self) -> &str {
                "recording"
            }
            fn model_name(&self) -> &str {
                "recording-model"
            }
            fn complete(
                &self,
                _history: &[Message],
                tools: &[glyph_model::provider::ToolSchema],
                _on_chunk: &mut dyn FnMut(&str),
            ) -> CompletionOutcome {
                self.0.lock().unwrap().push(tools.iter().map(|t| t.name.clone()).collect::<Vec<_>>().join(","));
                text_outcome("done", None)
            }
        }

        let model = RecordingProvider(Mutex::new(Vec::new()));
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let cancel = AtomicBool::new(false);
        let config =
            AgentLoopConfig { max_iterations: 5, permission: PermissionLevel::All, silent: true, allow_dispatch_agent: true };
        run_with(&mut session, tools, &model, &cancel, &config);
        assert!(model.0.lock().unwrap()[0].contains("dispatch_agent"));

        let model = RecordingProvider(Mutex::new(Vec::new()));
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let config = AgentLoopConfig {
            max_iterations: 5,
            permission: PermissionLevel::All,
            silent: true,
            allow_dispatch_agent: false,
        };
        run_with(&mut session, tools, &model, &cancel, &config);
        assert!(!model.0.lock().unwrap()[0].contains("dispatch_agent"));
    }

    /// Under `SafeOnly`, a `dispatch_agent` call is denied rather than run.
    #[test]
    fn safe_only_denies_dispatch_agent() {
        let model = ScriptedProvider::new(vec![
            tool_calls_outcome(vec![ModelToolCall {
                id: "t".into(),
                name: "dispatch_agent".into(),
                arguments: "{\"task\":\"do it\"}".into(),
            }]),
            text_outcome("done", None),
        ]);
        let mut session = base_session();
        let tools = Arc::new(ToolRegistry::new());
        let cancel = AtomicBool::new(false);
        let config = AgentLoopConfig {
            max_iterations: 5,
            permission: PermissionLevel::SafeOnly,
            silent: true,
            allow_dispatch_agent: true,
        };

        run_with(&mut session, tools, &model, &cancel, &config);

        let denied = session.messages.iter().any(
            |m| matches!(m, Message::ToolResult { content, .. } if content.contains("Permission denied") && content.contains("dispatch_agent")),
        );
        assert!(denied);
    }

    /// Permission level `None` denies the whole round without executing tools.
    #[test]
    fn permission_none_denies_without_executing() {
        let executed = Arc::new(Mutex::new(false));
        struct FlagTool(Arc<Mutex<bool>>);
        impl Tool for FlagTool {
            fn name(&self) -> &str {
                "read_file"
            }
            fn description(&self) -> &str {
                "flags execution"
            }
            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({"type": "object"})
            }
            fn risk(&self) -> Risk {
                Risk::Safe
            }
            fn execute(&self, call: &ToolCall) -> ToolOutput {
                *self.0.lock().unwrap() = true;
                ToolOutput::ok(&call.id, "ran")
            }
        }

        let model = ScriptedProvider::new(vec![
            tool_calls_outcome(vec![ModelToolCall { id: "t".into(), name: "read_file".into(), arguments: "{}".into() }]),
            text_outcome("done", None),
        ]);
        let mut session = base_session();
        let mut registry = ToolRegistry::new();
        registry.register(FlagTool(executed.clone()));
        let cancel = AtomicBool::new(false);
        let config = AgentLoopConfig {
            max_iterations: 5,
            permission: PermissionLevel::None,
            silent: true,
            allow_dispatch_agent: true,
        };

        run_with(&mut session, Arc::new(registry), &model, &cancel, &config);

        assert!(!*executed.lock().unwrap());
        let denied = session
            .messages
            .iter()
            .any(|m| matches!(m, Message::ToolResult { content, .. } if content == "Permission denied by user."));
        assert!(denied);
    }
}
