// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Direct termios/ioctl control of the controlling terminal: the three mode
//! presets (cooked/raw/stream), byte-level reads with an optional timeout,
//! and the raw/text output surfaces (§4.A).

use std::io::{self, Read, Write};
use std::os::unix::io::RawFd;
use std::time::Duration;

/// The three termios presets a session cycles through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Default inherited mode, restored at exit.
    Cooked,
    /// Used to read a line or a single key: echo/canonical/signals off.
    Raw,
    /// Used while the model streams output: OPOST stays on so `\n` still
    /// translates, but input (echo, canonical) stays suppressed.
    Stream,
}

/// Owns the controlling terminal's fd and termios state across mode changes.
pub struct RawTerminal {
    fd: RawFd,
    original: libc::termios,
    current: Mode,
}

impl RawTerminal {
    /// Opens `/dev/tty` and snapshots its original termios so it can be
    /// restored on drop regardless of which mode was active.
    pub fn open() -> io::Result<Self> {
        let fd = unsafe { libc::open(c"/dev/tty".as_ptr(), libc::O_RDWR) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        let original = get_termios(fd)?;
        Ok(Self { fd, original, current: Mode::Cooked })
    }

    pub fn fd(&self) -> RawFd {
        self.fd
    }

    pub fn mode(&self) -> Mode {
        self.current
    }

    /// ioctl(TIOCGWINSZ); falls back to 80x24 when the call fails (e.g. not a tty).
    pub fn size(&self) -> (u16, u16) {
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        let rc = unsafe { libc::ioctl(self.fd, libc::TIOCGWINSZ, &mut ws) };
        if rc != 0 || ws.ws_row == 0 || ws.ws_col == 0 {
            (24, 80)
        } else {
            (ws.ws_row, ws.ws_col)
        }
    }

    pub fn set_mode(&mut self, mode: Mode) -> io::Result<()> {
        if self.current == mode {
            return Ok(());
        }
        let mut t = self.original;
        match mode {
            Mode::Cooked => {}
            Mode::Raw => {
                unsafe { libc::cfmakeraw(&mut t) };
                t.c_cc[libc::VMIN] = 1;
                t.c_cc[libc::VTIME] = 0;
            }
            Mode::Stream => {
                t.c_lflag &= !(libc::ECHO | libc::ICANON | libc::ISIG);
                t.c_oflag |= libc::OPOST;
                t.c_cc[libc::VMIN] = 1;
                t.c_cc[libc::VTIME] = 0;
            }
        }
        set_termios(self.fd, &t)?;
        self.current = mode;
        Ok(())
    }

    /// Blocking single-byte read (VMIN=1 in raw/stream mode).
    pub fn read_byte(&self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        let n = unsafe { libc::read(self.fd, buf.as_mut_ptr() as *mut libc::c_void, 1) };
        if n < 0 {
            return Err(io::Error::last_os_error());
        }
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(buf[0]))
    }

    /// Single-byte read bounded by `timeout`; used to disambiguate a bare ESC
    /// from the start of an escape sequence (100 ms per §4.B).
    pub fn read_byte_timeout(&self, timeout: Duration) -> io::Result<Option<u8>> {
        let mut pfd = libc::pollfd { fd: self.fd, events: libc::POLLIN, revents: 0 };
        let ms = timeout.as_millis().min(i32::MAX as u128) as i32;
        let rc = unsafe { libc::poll(&mut pfd, 1, ms) };
        if rc < 0 {
            return Err(io::Error::last_os_error());
        }
        if rc == 0 {
            return Ok(None);
        }
        self.read_byte()
    }

    /// Pass escape sequences straight through.
    pub fn write_raw(&self, bytes: &[u8]) -> io::Result<()> {
        let mut out = unsafe { std::fs::File::from_raw_fd(dup(self.fd)?) };
        out.write_all(bytes)
    }

    /// Translate `\n` -> `\r\n`; required whenever OPOST may be off.
    pub fn write_text(&self, text: &str) -> io::Result<()> {
        let mut translated = String::with_capacity(text.len());
        for ch in text.chars() {
            if ch == '\n' {
                translated.push('\r');
            }
            translated.push(ch);
        }
        self.write_raw(translated.as_bytes())
    }
}

impl Drop for RawTerminal {
    fn drop(&mut self) {
        let _ = set_termios(self.fd, &self.original);
        unsafe {
            libc::close(self.fd);
        }
    }
}

fn dup(fd: RawFd) -> io::Result<RawFd> {
    let new_fd = unsafe { libc::dup(fd) };
    if new_fd < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(new_fd)
    }
}

fn get_termios(fd: RawFd) -> io::Result<libc::termios> {
    let mut t: libc::termios = unsafe { std::mem::zeroed() };
    let rc = unsafe { libc::tcgetattr(fd, &mut t) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(t)
}

fn set_termios(fd: RawFd, t: &libc::termios) -> io::Result<()> {
    let rc = unsafe { libc::tcsetattr(fd, libc::TCSANOW, t) };
    if rc != 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(())
    }
}

use std::os::unix::io::FromRawFd;

/// A byte source abstraction so key decoding can be tested without a real tty.
pub trait ByteSource {
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn read_byte_timeout(&mut self, timeout: Duration) -> io::Result<Option<u8>>;
}

impl ByteSource for RawTerminal {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        RawTerminal::read_byte(self)
    }
    fn read_byte_timeout(&mut self, timeout: Duration) -> io::Result<Option<u8>> {
        RawTerminal::read_byte_timeout(self, timeout)
    }
}

/// A fixed queue of bytes, for deterministic unit tests of key decoding.
#[cfg(test)]
pub struct FakeBytes {
    pub bytes: std::collections::VecDeque<u8>,
}

#[cfg(test)]
impl ByteSource for FakeBytes {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.bytes.pop_front())
    }
    fn read_byte_timeout(&mut self, _timeout: Duration) -> io::Result<Option<u8>> {
        Ok(self.bytes.pop_front())
    }
}
