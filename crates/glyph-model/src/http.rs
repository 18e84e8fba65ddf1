// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A single, minimal OpenAI-compatible chat-completions client.
//!
//! Wire-format fidelity to any specific vendor API is out of scope; this
//! exists so the workspace has one real, runnable [`ModelProvider`] rather
//! than only the mock. It performs a single non-streaming HTTP POST and
//! reports the whole response body to `on_chunk` at once — a conforming
//! implementation would parse the provider's SSE stream and call `on_chunk`
//! per delta, but that wire format is the out-of-scope part.

use serde_json::{json, Value};

use crate::provider::{CompletionOutcome, CompletionResponse, ModelProvider, ToolSchema, Usage};
use crate::types::{Message, ToolCall};

pub struct HttpProvider {
    client: reqwest::blocking::Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl HttpProvider {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::blocking::Client::new(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    fn message_to_wire(m: &Message) -> Value {
        match m {
            Message::Text { role, content } => json!({ "role": role.as_str(), "content": content }),
            Message::ToolUse { calls } => json!({
                "role": "assistant",
                "content": null,
                "tool_calls": calls.iter().map(|c| json!({
                    "id": c.id,
                    "type": "function",
                    "function": { "name": c.name, "arguments": c.arguments },
                })).collect::<Vec<_>>(),
            }),
            Message::ToolResult { call_id, content } => {
                json!({ "role": "tool", "tool_call_id": call_id, "content": content })
            }
        }
    }
}

impl ModelProvider for HttpProvider {
    fn name(&self) -> &str {
        "http"
    }
    fn model_name(&self) -> &str {
        &self.model
    }

    fn complete(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
        on_chunk: &mut dyn FnMut(&str),
    ) -> CompletionOutcome {
        let body = json!({
            "model": self.model,
            "messages": history.iter().map(Self::message_to_wire).collect::<Vec<_>>(),
            "tools": tools.iter().map(|t| json!({
                "type": "function",
                "function": { "name": t.name, "description": t.description, "parameters": t.parameters },
            })).collect::<Vec<_>>(),
        });

        let resp = match self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
        {
            Ok(r) => r,
            Err(e) => {
                return CompletionOutcome {
                    response: CompletionResponse::HttpError { status: 0, message: e.to_string() },
                    usage: None,
                }
            }
        };

        let status = resp.status().as_u16();
        if !(200..300).contains(&status) {
            let message = resp.text().unwrap_or_default();
            return CompletionOutcome {
                response: CompletionResponse::HttpError { status, message },
                usage: None,
            };
        }

        let parsed: Value = match resp.json() {
            Ok(v) => v,
            Err(e) => {
                return CompletionOutcome {
                    response: CompletionResponse::HttpError { status: 0, message: e.to_string() },
                    usage: None,
                }
            }
        };

        let choice = &parsed["choices"][0]["message"];
        let usage = parsed.get("usage").map(|u| Usage {
            prompt: u["prompt_tokens"].as_u64().unwrap_or(0),
            completion: u["completion_tokens"].as_u64().unwrap_or(0),
            reasoning: u["reasoning_tokens"].as_u64(),
            cache_read: u["cache_read_tokens"].as_u64(),
            cache_write: u["cache_write_tokens"].as_u64(),
        });

        if let Some(calls) = choice["tool_calls"].as_array().filter(|c| !c.is_empty()) {
            let tool_calls = calls
                .iter()
                .map(|c| ToolCall {
                    id: c["id"].as_str().unwrap_or_default().to_string(),
                    name: c["function"]["name"].as_str().unwrap_or_default().to_string(),
                    arguments: c["function"]["arguments"].as_str().unwrap_or_default().to_string(),
                })
                .collect();
            return CompletionOutcome { response: CompletionResponse::ToolCalls(tool_calls), usage };
        }

        let text = choice["content"].as_str().unwrap_or_default().to_string();
        on_chunk(&text);
        CompletionOutcome { response: CompletionResponse::Text(text), usage }
    }
}
