// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use crate::types::Message;

/// Token usage reported alongside a completion, when the provider supplies it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub prompt: u64,
    pub completion: u64,
    pub reasoning: Option<u64>,
    pub cache_read: Option<u64>,
    pub cache_write: Option<u64>,
}

/// What a single streaming completion call produced.
#[derive(Debug, Clone)]
pub enum CompletionResponse {
    Text(String),
    ToolCalls(Vec<crate::types::ToolCall>),
    HttpError { status: u16, message: String },
}

#[derive(Debug, Clone)]
pub struct CompletionOutcome {
    pub response: CompletionResponse,
    pub usage: Option<Usage>,
}

/// Schema for a tool the model may call, as sent to the provider.
#[derive(Debug, Clone)]
pub struct ToolSchema {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The streaming chat-completion client the agentic loop drives.
///
/// This is an external collaborator (§1): core code only ever calls
/// `complete`, blocking the calling thread for the duration of one HTTP
/// exchange, and forwards text chunks to `on_chunk` as they arrive. There is
/// no cooperative-async suspension point here — the call simply blocks the
/// worker thread that issued it, matching the rest of the concurrency model.
pub trait ModelProvider: Send + Sync {
    fn name(&self) -> &str;
    fn model_name(&self) -> &str;

    /// Perform one streaming completion call.
    ///
    /// `on_chunk` is invoked with each text delta as it streams in; in
    /// silent mode callers pass a no-op closure. The call returns only after
    /// the server signals completion (or the connection errors) — streaming
    /// reads are never interrupted mid-byte (spec's cancellation model
    /// observes cancellation only once this call returns).
    fn complete(
        &self,
        history: &[Message],
        tools: &[ToolSchema],
        on_chunk: &mut dyn FnMut(&str),
    ) -> CompletionOutcome;
}
