// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Decode a byte stream from a raw-mode terminal into [`Key`] events:
//! control bytes, CSI/SS3 escape sequences (including kitty's `u` form),
//! and UTF-8 codepoints (§4.B).

use std::io;
use std::time::Duration;

use crate::raw_io::ByteSource;

const ESC_TIMEOUT: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Enter,
    Tab,
    Backspace,
    Delete,
    Up,
    Down,
    Left,
    Right,
    Home,
    End,
    Ctrl(char),
    Esc,
    Eof,
}

/// Ctrl+latin mapping for kitty-protocol Cyrillic (ЙЦУКЕН) codepoints, so a
/// user on a Cyrillic keyboard layout gets the same Ctrl+key shortcuts.
fn cyrillic_ctrl_alias(codepoint: u32) -> Option<char> {
    Some(match codepoint {
        0x0444 | 0x0424 => 'a', // ф/Ф -> a
        0x0446 | 0x0426 => 'w', // ц/Ц -> w
        0x0441 | 0x0421 => 'c', // с/С -> c
        0x0432 | 0x0412 => 'd', // в/В -> d
        0x0443 | 0x0423 => 'e', // у/У -> e
        0x043b | 0x041b => 'k', // л/Л -> k
        0x0434 | 0x0414 => 'l', // д/Д -> l
        0x0433 | 0x0413 => 'u', // г/Г -> u
        _ => return None,
    })
}

/// Reads the next `Key` off `source`, blocking for the first byte.
/// Returns `Ok(None)` on EOF with an empty buffer at the call site is *not*
/// distinguished here — callers map a bare `ctrl_d` on an empty line to EOF.
pub fn next_key(source: &mut impl ByteSource) -> io::Result<Option<Key>> {
    let Some(b0) = source.read_byte()? else {
        return Ok(None);
    };
    Ok(Some(decode_first_byte(b0, source)?))
}

fn decode_first_byte(b0: u8, source: &mut impl ByteSource) -> io::Result<Key> {
    match b0 {
        0x7F => Ok(Key::Backspace),
        0x1B => decode_escape(source),
        0x0D | 0x0A => Ok(Key::Enter),
        0x09 => Ok(Key::Tab),
        0x00..=0x1F => Ok(Key::Ctrl((b'a' + (b0 - 1)) as char)),
        0x20..=0x7E => Ok(Key::Char(b0 as char)),
        _ => decode_utf8_continuation(b0, source),
    }
}

fn decode_escape(source: &mut impl ByteSource) -> io::Result<Key> {
    let Some(b1) = source.read_byte_timeout(ESC_TIMEOUT)? else {
        return Ok(Key::Esc);
    };
    match b1 {
        b'[' => decode_csi(source),
        b'O' => decode_ss3(source),
        _ => Ok(Key::Esc),
    }
}

fn decode_ss3(source: &mut impl ByteSource) -> io::Result<Key> {
    match source.read_byte_timeout(ESC_TIMEOUT)? {
        Some(b'A') => Ok(Key::Up),
        Some(b'B') => Ok(Key::Down),
        Some(b'C') => Ok(Key::Right),
        Some(b'D') => Ok(Key::Left),
        Some(b'H') => Ok(Key::Home),
        Some(b'F') => Ok(Key::End),
        _ => Ok(Key::Esc),
    }
}

/// Accumulates up to four `;`-separated u32 params, terminated by a final
/// byte (`A-Z`, `~`, or `u`), dispatching per the final byte.
fn decode_csi(source: &mut impl ByteSource) -> io::Result<Key> {
    let mut params: Vec<u32> = vec![0];
    loop {
        let Some(b) = source.read_byte_timeout(ESC_TIMEOUT)? else {
            return Ok(Key::Esc);
        };
        match b {
            b'0'..=b'9' => {
                let d = (b - b'0') as u32;
                if let Some(last) = params.last_mut() {
                    *last = last.saturating_mul(10).saturating_add(d);
                }
            }
            b';' => {
                if params.len() < 4 {
                    params.push(0);
                }
            }
            _ => return Ok(dispatch_csi_final(b, &params)),
        }
    }
}

fn dispatch_csi_final(final_byte: u8, params: &[u32]) -> Key {
    match final_byte {
        b'A' => Key::Up,
        b'B' => Key::Down,
        b'C' => Key::Right,
        b'D' => Key::Left,
        b'H' => Key::Home,
        b'F' => Key::End,
        b'~' => match params.first().copied().unwrap_or(0) {
            1 => Key::Home,
            3 => Key::Delete,
            4 => Key::End,
            _ => Key::Esc,
        },
        b'u' => decode_kitty(params),
        _ => Key::Esc,
    }
}

fn decode_kitty(params: &[u32]) -> Key {
    let codepoint = params.first().copied().unwrap_or(0);
    let modifier = params.get(1).copied().unwrap_or(1);
    let is_ctrl = modifier >= 1 && (modifier - 1) & 0b100 != 0;

    if is_ctrl {
        if let Some(c) = char::from_u32(codepoint) {
            if c.is_ascii_lowercase() {
                return Key::Ctrl(c);
            }
            if let Some(latin) = cyrillic_ctrl_alias(codepoint) {
                return Key::Ctrl(latin);
            }
        }
    }
    match char::from_u32(codepoint) {
        Some(c) => Key::Char(c),
        None => Key::Esc,
    }
}

fn decode_utf8_continuation(b0: u8, source: &mut impl ByteSource) -> io::Result<Key> {
    let extra = if b0 & 0b1110_0000 == 0b1100_0000 {
        1
    } else if b0 & 0b1111_0000 == 0b1110_0000 {
        2
    } else if b0 & 0b1111_1000 == 0b1111_0000 {
        3
    } else {
        return Ok(Key::Char(char::REPLACEMENT_CHARACTER));
    };

    let mut buf = vec![b0];
    for _ in 0..extra {
        match source.read_byte()? {
            Some(b) => buf.push(b),
            None => return Ok(Key::Char(char::REPLACEMENT_CHARACTER)),
        }
    }
    match std::str::from_utf8(&buf) {
        Ok(s) => Ok(Key::Char(s.chars().next().unwrap_or(char::REPLACEMENT_CHARACTER))),
        Err(_) => Ok(Key::Char(char::REPLACEMENT_CHARACTER)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raw_io::FakeBytes;
    use std::collections::VecDeque;

    fn fake(bytes: &[u8]) -> FakeBytes {
        FakeBytes { bytes: VecDeque::from(bytes.to_vec()) }
    }

    #[test]
    fn plain_ascii_char() {
        let mut s = fake(b"x");
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Char('x')));
    }

    #[test]
    fn control_byte_maps_to_ctrl_key() {
        let mut s = fake(&[0x01]); // Ctrl-A
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Ctrl('a')));
    }

    #[test]
    fn del_is_backspace() {
        let mut s = fake(&[0x7F]);
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Backspace));
    }

    #[test]
    fn bare_esc_with_no_followup_is_esc() {
        let mut s = fake(&[0x1B]);
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Esc));
    }

    #[test]
    fn csi_arrow_up() {
        let mut s = fake(b"\x1b[A");
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Up));
    }

    #[test]
    fn csi_tilde_delete() {
        let mut s = fake(b"\x1b[3~");
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Delete));
    }

    #[test]
    fn ss3_arrow_left() {
        let mut s = fake(b"\x1bOD");
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Left));
    }

    #[test]
    fn kitty_ctrl_a_via_codepoint() {
        // ESC [ 97 ; 5 u  -> codepoint 'a', modifier 5 (ctrl = bit 2 of mod-1 = 4)
        let mut s = fake(b"\x1b[97;5u");
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Ctrl('a')));
    }

    #[test]
    fn kitty_ctrl_cyrillic_f_maps_to_ctrl_a() {
        // Cyrillic ф = U+0444 under Ctrl maps to the same event as Ctrl+A.
        let mut s = fake("\x1b[1092;5u".as_bytes());
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Ctrl('a')));
    }

    #[test]
    fn two_byte_utf8_codepoint() {
        // 'é' = U+00E9 = 0xC3 0xA9
        let mut s = fake(&[0xC3, 0xA9]);
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Char('é')));
    }

    #[test]
    fn enter_key() {
        let mut s = fake(&[0x0D]);
        assert_eq!(next_key(&mut s).unwrap(), Some(Key::Enter));
    }

    #[test]
    fn eof_returns_none() {
        let mut s = fake(&[]);
        assert_eq!(next_key(&mut s).unwrap(), None);
    }
}
