// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Variable substitution for chain step prompt templates (§4.H): literal
//! `{task}` and `{previous}` only, no general templating engine.

/// Replace literal `{task}` with `task` and `{previous}` with `previous`.
/// A template with neither literal returns its input unchanged.
pub fn substitute_vars(template: &str, task: &str, previous: &str) -> String {
    template.replace("{task}", task).replace("{previous}", previous)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_both_placeholders() {
        let out = substitute_vars("Analyze {task}.\nPrior: {previous}", "the repo", "A-out");
        assert_eq!(out, "Analyze the repo.\nPrior: A-out");
    }

    #[test]
    fn no_placeholders_returns_unchanged() {
        let out = substitute_vars("plain text", "task", "previous");
        assert_eq!(out, "plain text");
    }

    #[test]
    fn repeated_placeholder_substitutes_every_occurrence() {
        let out = substitute_vars("{task} and {task} again", "X", "");
        assert_eq!(out, "X and X again");
    }
}
