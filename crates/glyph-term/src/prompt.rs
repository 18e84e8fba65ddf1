// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The permission prompt and the session picker: small raw-mode
//! single-purpose readers built on top of [`crate::raw_io::ByteSource`]
//! (§4.B).

use std::io;

use crate::raw_io::{ByteSource, Mode, RawTerminal};

/// Mirrors `glyph_core::permission::PermissionLevel` without a crate
/// dependency back onto core; the caller converts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptChoice {
    All,
    SafeOnly,
    None,
    /// ESC: none, and the cross-thread cancel flag should be set.
    NoneAndCancel,
}

/// Reads one byte (switching to raw mode and back) and maps it to a
/// [`PromptChoice`]. Also recognises two-byte Cyrillic sequences for
/// н/Н/д/Д (all), ы/Ы (safe_only), т/Т (none).
pub fn read_permission_choice(term: &mut RawTerminal) -> io::Result<PromptChoice> {
    let previous = term.mode();
    term.set_mode(Mode::Raw)?;
    let choice = read_permission_choice_from(term);
    term.set_mode(previous)?;
    choice
}

fn read_permission_choice_from(source: &mut impl ByteSource) -> io::Result<PromptChoice> {
    let Some(b0) = source.read_byte()? else {
        return Ok(PromptChoice::None);
    };
    match b0 {
        b'y' | b'Y' => Ok(PromptChoice::All),
        b's' | b'S' => Ok(PromptChoice::SafeOnly),
        b'n' | b'N' | 0x03 => Ok(PromptChoice::None),
        0x1B => Ok(PromptChoice::NoneAndCancel),
        0xD0 | 0xD1 => decode_cyrillic_choice(b0, source),
        _ => Ok(PromptChoice::None),
    }
}

/// Decodes the second byte of a two-byte Cyrillic UTF-8 sequence and maps
/// the codepoint to a permission choice.
fn decode_cyrillic_choice(b0: u8, source: &mut impl ByteSource) -> io::Result<PromptChoice> {
    let Some(b1) = source.read_byte()? else {
        return Ok(PromptChoice::None);
    };
    let codepoint = (((b0 & 0x1F) as u32) << 6) | (b1 & 0x3F) as u32;
    Ok(match codepoint {
        0x043D | 0x041D | 0x0434 | 0x0414 => PromptChoice::All, // н/Н/д/Д
        0x044B | 0x042B => PromptChoice::SafeOnly,              // ы/Ы
        0x0442 | 0x0422 => PromptChoice::None,                  // т/Т
        _ => PromptChoice::None,
    })
}

/// One selectable row in the session picker.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub id: String,
    pub label: String,
}

/// Renders `entries` as an in-place arrow-navigable list starting at
/// `input_row - entries.len()` and returns the selected index, or `None` on
/// ESC/Ctrl-C/`q`.
pub fn pick_session(term: &mut RawTerminal, entries: &[SessionEntry]) -> io::Result<Option<usize>> {
    if entries.is_empty() {
        return Ok(None);
    }
    let previous = term.mode();
    term.set_mode(Mode::Raw)?;
    let result = run_picker(term, entries);
    term.set_mode(previous)?;
    result
}

fn run_picker(term: &mut RawTerminal, entries: &[SessionEntry]) -> io::Result<Option<usize>> {
    let mut selected = 0usize;
    render_picker(term, entries, selected)?;
    loop {
        let Some(b) = term.read_byte()? else {
            return Ok(None);
        };
        match b {
            b'q' | 0x03 => return Ok(None),
            0x0D | 0x0A => return Ok(Some(selected)),
            0x1B => match decode_picker_escape(term)? {
                PickerKey::Up => selected = selected.saturating_sub(1),
                PickerKey::Down => selected = (selected + 1).min(entries.len() - 1),
                PickerKey::Cancel => return Ok(None),
                PickerKey::Other => {}
            },
            _ => {}
        }
        render_picker(term, entries, selected)?;
    }
}

enum PickerKey {
    Up,
    Down,
    Cancel,
    Other,
}

fn decode_picker_escape(term: &mut RawTerminal) -> io::Result<PickerKey> {
    use std::time::Duration;
    let Some(b1) = term.read_byte_timeout(Duration::from_millis(100))? else {
        return Ok(PickerKey::Cancel);
    };
    if b1 != b'[' {
        return Ok(PickerKey::Other);
    }
    match term.read_byte_timeout(Duration::from_millis(100))? {
        Some(b'A') => Ok(PickerKey::Up),
        Some(b'B') => Ok(PickerKey::Down),
        _ => Ok(PickerKey::Other),
    }
}

fn render_picker(term: &RawTerminal, entries: &[SessionEntry], selected: usize) -> io::Result<()> {
    let mut out = String::from("\x1b7\r\n");
    for (i, entry) in entries.iter().enumerate() {
        let marker = if i == selected { ">" } else { " " };
        out.push_str(&format!("\x1b[2K{} {}: {}\r\n", marker, entry.id, entry.label));
    }
    out.push_str("\x1b8");
    term.write_raw(out.as_bytes())
}
