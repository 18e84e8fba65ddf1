// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! CLI surface (§6): a positional prompt plus a small, fixed flag set.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "glyph", version, about = "An interactive terminal coding agent")]
pub struct Cli {
    /// The user prompt for single-shot mode. Omit to start an interactive session.
    pub prompt: Option<String>,

    /// Resume the most recently created session.
    #[arg(long, short = 'c')]
    pub r#continue: bool,

    /// Resume a named session by id.
    #[arg(long)]
    pub session: Option<String>,

    /// Run a chain file. Requires the prompt positional (passed as `{task}`).
    #[arg(long)]
    pub chain: Option<PathBuf>,

    /// Print the chain step plan and exit, instead of running it.
    #[arg(long)]
    pub dry_run: bool,

    /// Print the resolved configuration as JSON and exit.
    #[arg(long)]
    pub dump_config: bool,

    /// Auto-grant all tool permissions without prompting.
    #[arg(long)]
    pub yolo: bool,

    /// Remove the iteration cap and the shell command timeout.
    #[arg(long)]
    pub infinity: bool,

    /// Write a default config file to the user config directory and exit.
    #[arg(long)]
    pub init: bool,

    /// Explicit config file path, merged last (highest priority).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Verbosity: repeat for more (-v, -vv).
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}
