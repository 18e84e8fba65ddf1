// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Mutex;

use crate::provider::{CompletionOutcome, CompletionResponse, ModelProvider, ToolSchema, Usage};
use crate::types::Message;

/// Deterministic mock provider. Echoes the last user message back as the
/// assistant response, with a small fixed usage report.
#[derive(Default)]
pub struct EchoProvider;

impl ModelProvider for EchoProvider {
    fn name(&self) -> &str {
        "mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn complete(
        &self,
        history: &[Message],
        _tools: &[ToolSchema],
        on_chunk: &mut dyn FnMut(&str),
    ) -> CompletionOutcome {
        let reply = history
            .iter()
            .rev()
            .find_map(|m| match m {
                Message::Text { role: crate::types::Role::User, content } => Some(content.clone()),
                _ => None,
            })
            .unwrap_or_else(|| "[no input]".into());
        let text = format!("MOCK: {reply}");
        on_chunk(&text);
        CompletionOutcome {
            response: CompletionResponse::Text(text),
            usage: Some(Usage { prompt: 10, completion: 2, ..Default::default() }),
        }
    }
}

/// A pre-scripted provider for unit and integration tests. Each call to
/// `complete` pops the next outcome from the front of the queue. Used to
/// drive the exact scenarios in the agentic-loop test suite (retry, loop
/// detection, cancellation, tool dispatch).
pub struct ScriptedProvider {
    outcomes: Mutex<Vec<CompletionOutcome>>,
}

impl ScriptedProvider {
    pub fn new(outcomes: Vec<CompletionOutcome>) -> Self {
        Self { outcomes: Mutex::new(outcomes) }
    }
}

impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted-mock"
    }
    fn model_name(&self) -> &str {
        "mock-model"
    }

    fn complete(
        &self,
        _history: &[Message],
        _tools: &[ToolSchema],
        on_chunk: &mut dyn FnMut(&str),
    ) -> CompletionOutcome {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            return CompletionOutcome {
                response: CompletionResponse::HttpError {
                    status: 0,
                    message: "scripted provider exhausted".into(),
                },
                usage: None,
            };
        }
        let outcome = outcomes.remove(0);
        if let CompletionResponse::Text(t) = &outcome.response {
            on_chunk(t);
        }
        outcome
    }
}
