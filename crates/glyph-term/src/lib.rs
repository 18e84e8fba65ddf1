// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Terminal presentation layer: raw termios control, key decoding, the
//! in-place line editor, and the three-zone layout with its spinner thread.

pub mod key;
pub mod line_editor;
pub mod prompt;
pub mod raw_io;
pub mod terminal_io;

pub use key::{next_key, Key};
pub use line_editor::{default_history_path, Buffer, EditOutcome, LineEditor};
pub use prompt::{pick_session, read_permission_choice, PromptChoice, SessionEntry};
pub use raw_io::{ByteSource, Mode, RawTerminal};
pub use terminal_io::{resize_pending, Layout, TerminalIO};
