// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Chain file parsing (§4.H): a markdown-like document, optional `---`
//! frontmatter setting `name`, body split into `## `-prefixed steps.

/// A single chain step: name, optional tool filter, iteration cap, and a
/// prompt template supporting `{task}`/`{previous}` substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub tool_filter: Option<Vec<String>>,
    pub max_iterations: u16,
    pub prompt_template: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSpec {
    pub name: Option<String>,
    pub steps: Vec<Step>,
}

const DEFAULT_MAX_ITERATIONS: u16 = 10;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainParseError {
    #[error("step '{0}' has an empty prompt")]
    EmptyPrompt(String),
    #[error("chain file has no steps")]
    EmptyChain,
}

/// Parse a chain file's full text into a [`ChainSpec`].
pub fn parse_chain(input: &str) -> Result<ChainSpec, ChainParseError> {
    let (name, body) = split_frontmatter(input);

    let mut steps = Vec::new();
    for block in split_steps(body) {
        steps.push(parse_step(block)?);
    }

    if steps.is_empty() {
        return Err(ChainParseError::EmptyChain);
    }

    Ok(ChainSpec { name, steps })
}

fn split_frontmatter(input: &str) -> (Option<String>, &str) {
    let trimmed = input.trim_start();
    if !trimmed.starts_with("---") {
        return (None, input);
    }
    let after_open = &trimmed[3..];
    let Some(close_idx) = after_open.find("\n---") else {
        return (None, input);
    };
    let frontmatter = &after_open[..close_idx];
    let body_start = close_idx + 4;
    let body = after_open[body_start..].trim_start_matches('\n');

    let mut name = None;
    for line in frontmatter.lines() {
        if let Some((key, value)) = line.split_once(':') {
            if key.trim() == "name" {
                name = Some(value.trim().to_string());
            }
        }
    }
    (name, body)
}

/// Split the body on `\n## ` boundaries, dropping anything before the first
/// step heading (there should be none once frontmatter is removed).
fn split_steps(body: &str) -> Vec<&str> {
    let body = body.trim_start();
    if body.is_empty() {
        return Vec::new();
    }
    let marked = format!("\n{body}");
    marked
        .split("\n## ")
        .skip(1)
        .map(|s| s.trim_end())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_step(block: &str) -> Result<Step, ChainParseError> {
    let mut lines = block.lines();
    let name = lines.next().unwrap_or_default().trim().to_string();

    let mut tool_filter = None;
    let mut max_iterations = DEFAULT_MAX_ITERATIONS;
    let mut prompt_lines: Vec<&str> = Vec::new();
    let mut in_config = true;

    for line in lines {
        if in_config {
            if line.trim().is_empty() {
                in_config = false;
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                match key.trim() {
                    "tools" => {
                        tool_filter = Some(value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect());
                        continue;
                    }
                    "max_iterations" => {
                        if let Ok(n) = value.trim().parse() {
                            max_iterations = n;
                        }
                        continue;
                    }
                    _ => {
                        // Not a recognized config line: config section ended implicitly.
                        in_config = false;
                    }
                }
            } else {
                in_config = false;
            }
        }
        if !in_config {
            prompt_lines.push(line);
        }
    }

    let prompt_template = prompt_lines.join("\n").trim().to_string();
    if prompt_template.is_empty() {
        return Err(ChainParseError::EmptyPrompt(name));
    }

    Ok(Step { name, tool_filter, max_iterations, prompt_template })
}
