// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: ToolsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider identifier. Run `glyph list-providers` for the full list.
    pub provider: String,
    /// Model name forwarded to the provider API.
    pub name: String,
    /// Environment variable that holds the API key (read at runtime).
    pub api_key_env: Option<String>,
    /// Base URL override, e.g. for a local proxy.
    pub base_url: Option<String>,
    /// Context window size in tokens, used for compaction thresholds (§4.F.5).
    pub max_context_tokens: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: "mock".into(),
            name: "mock-model".into(),
            api_key_env: None,
            base_url: None,
            max_context_tokens: 128_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Maximum loop iterations for the top-level REPL agent before `hit_limit`.
    pub max_iterations: u32,
    /// Maximum loop iterations for a sub-agent (§4.G default: 50).
    pub sub_agent_max_iterations: u32,
    /// Default max_iterations for a chain step that doesn't set one (§4.H).
    pub chain_step_max_iterations: u16,
    /// `--infinity` sets this to true at runtime, removing the iteration cap
    /// and shell timeout; not itself persisted to config files.
    #[serde(skip)]
    pub infinity: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            sub_agent_max_iterations: 50,
            chain_step_max_iterations: 10,
            infinity: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Shell tool timeout in seconds (§4.C, default 30).
    pub shell_timeout_secs: u64,
    #[serde(default = "default_true")]
    pub combine_stdout_stderr: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { shell_timeout_secs: 30, combine_stdout_stderr: true }
    }
}
