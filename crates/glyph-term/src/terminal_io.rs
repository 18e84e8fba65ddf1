// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Owns the terminal's physical layout: scroll region, status bar, and the
//! background spinner thread that also doubles as an ESC-cancel poller
//! (§4.A).

use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::raw_io::{ByteSource, Mode, RawTerminal};

const SPINNER_FRAMES: [&str; 10] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"];
const SPINNER_INTERVAL: Duration = Duration::from_millis(80);
const ESC_FOLLOWUP: Duration = Duration::from_millis(100);
const LINE_CAP: usize = 256;

/// A fixed-capacity line written by one thread, read by another: length uses
/// release/acquire ordering, bytes are plain `AtomicU8` so the reader never
/// observes a torn write past the published length.
struct AtomicLine {
    bytes: [AtomicU8; LINE_CAP],
    len: AtomicUsize,
}

impl AtomicLine {
    fn new() -> Self {
        Self {
            bytes: std::array::from_fn(|_| AtomicU8::new(0)),
            len: AtomicUsize::new(0),
        }
    }

    fn set(&self, text: &str) {
        let bytes = text.as_bytes();
        let n = bytes.len().min(LINE_CAP);
        self.len.store(0, Ordering::Release);
        for (slot, b) in self.bytes.iter().zip(bytes.iter()).take(n) {
            slot.store(*b, Ordering::Relaxed);
        }
        self.len.store(n, Ordering::Release);
    }

    fn read(&self) -> String {
        let n = self.len.load(Ordering::Acquire);
        let buf: Vec<u8> = self.bytes[..n].iter().map(|b| b.load(Ordering::Relaxed)).collect();
        String::from_utf8_lossy(&buf).into_owned()
    }
}

static RESIZE_PENDING: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigwinch(_sig: libc::c_int) {
    RESIZE_PENDING.store(true, Ordering::Relaxed);
}

/// Installs a SIGWINCH handler that sets a process-wide flag, checked by
/// callers at the top of every input-loop turn.
pub fn install_sigwinch_handler() {
    unsafe {
        libc::signal(libc::SIGWINCH, on_sigwinch as libc::sighandler_t);
    }
}

pub fn resize_pending() -> bool {
    RESIZE_PENDING.swap(false, Ordering::Relaxed)
}

/// Computed row assignments for the fixed three-zone layout.
#[derive(Debug, Clone, Copy)]
pub struct Layout {
    pub rows: u16,
    pub cols: u16,
    pub scroll_top: u16,
    pub scroll_bottom: u16,
    pub separator_top: u16,
    pub input_row: u16,
    pub separator_bottom: u16,
    pub status_row: u16,
}

impl Layout {
    fn compute(rows: u16, cols: u16) -> Self {
        let rows = rows.max(5);
        Self {
            rows,
            cols,
            scroll_top: 1,
            scroll_bottom: rows - 4,
            separator_top: rows - 3,
            input_row: rows - 2,
            separator_bottom: rows - 1,
            status_row: rows,
        }
    }
}

/// Owns the terminal mode, the fixed layout, the status-bar buffers, and the
/// spinner/cancel-poll background thread.
pub struct TerminalIO {
    term: Arc<std::sync::Mutex<RawTerminal>>,
    layout: std::sync::Mutex<Layout>,
    status_static: Arc<AtomicLine>,
    status_label: Arc<AtomicLine>,
    cancel_requested: Arc<AtomicBool>,
    spinner_running: Arc<AtomicBool>,
    spinner_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
    rows_atomic: Arc<AtomicU16>,
}

impl TerminalIO {
    pub fn open() -> std::io::Result<Self> {
        let mut term = RawTerminal::open()?;
        term.set_mode(Mode::Cooked)?;
        let (rows, cols) = term.size();
        let layout = Layout::compute(rows, cols);
        install_sigwinch_handler();

        let io = Self {
            term: Arc::new(std::sync::Mutex::new(term)),
            layout: std::sync::Mutex::new(layout),
            status_static: Arc::new(AtomicLine::new()),
            status_label: Arc::new(AtomicLine::new()),
            cancel_requested: Arc::new(AtomicBool::new(false)),
            spinner_running: Arc::new(AtomicBool::new(false)),
            spinner_handle: std::sync::Mutex::new(None),
            rows_atomic: Arc::new(AtomicU16::new(rows)),
        };
        io.install_layout();
        Ok(io)
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        self.cancel_requested.clone()
    }

    pub fn clear_cancel(&self) {
        self.cancel_requested.store(false, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    pub fn layout(&self) -> Layout {
        *self.layout.lock().unwrap()
    }

    pub fn set_mode(&self, mode: Mode) -> std::io::Result<()> {
        self.term.lock().unwrap().set_mode(mode)
    }

    /// Re-reads terminal size, recomputes the layout, and redraws the scroll
    /// region + separators. Called at open and whenever SIGWINCH fires.
    pub fn install_layout(&self) {
        let (rows, cols) = self.term.lock().unwrap().size();
        let layout = Layout::compute(rows, cols);
        *self.layout.lock().unwrap() = layout;
        self.rows_atomic.store(rows, Ordering::Relaxed);

        let term = self.term.lock().unwrap();
        let _ = term.write_raw(format!("\x1b[{};{}r", layout.scroll_top, layout.scroll_bottom).as_bytes());
        let sep = "─".repeat(layout.cols as usize);
        let _ = term.write_raw(
            format!(
                "\x1b7\x1b[{};1H\x1b[2K\x1b[2m{}\x1b[0m\x1b[{};1H\x1b[2K\x1b[2m{}\x1b[0m\x1b8",
                layout.separator_top, sep, layout.separator_bottom, sep
            )
            .as_bytes(),
        );
    }

    /// `model │ used/limit (N%) │ perm │ cancel? │ H:MM:SS`
    pub fn set_status_static(&self, text: &str) {
        self.status_static.set(text);
    }

    pub fn set_status_label(&self, text: &str) {
        self.status_label.set(text);
    }

    /// Redraws the reserved status row without disturbing scroll output:
    /// cursor-save, move, write, cursor-restore.
    fn render_status(&self, glyph: &str) {
        let layout = self.layout();
        let label = self.status_label.read();
        let status = self.status_static.read();
        let line = if label.is_empty() {
            status
        } else {
            format!("{} {}  {}", glyph, label, status)
        };
        let term = self.term.lock().unwrap();
        let _ = term.write_raw(
            format!("\x1b7\x1b[{};1H\x1b[2K{}\x1b8", layout.status_row, line).as_bytes(),
        );
    }

    /// Starts the single persistent background thread: redraws the status
    /// row every 80ms cycling through the braille frames, and polls
    /// `/dev/tty` for a bare ESC to request cancellation.
    pub fn start_spinner(&self, label: &str) {
        if self.spinner_running.swap(true, Ordering::AcqRel) {
            return;
        }
        self.set_status_label(label);
        let term = self.term.clone();
        let status_static = self.status_static.clone();
        let status_label = self.status_label.clone();
        let cancel = self.cancel_requested.clone();
        let running = self.spinner_running.clone();
        let layout_rows = self.rows_atomic.clone();

        let handle = std::thread::spawn(move || {
            let mut frame_idx = 0usize;
            while running.load(Ordering::Acquire) {
                let glyph = if cancel.load(Ordering::Acquire) {
                    "✗"
                } else {
                    SPINNER_FRAMES[frame_idx % SPINNER_FRAMES.len()]
                };
                frame_idx = frame_idx.wrapping_add(1);

                let label = status_label.read();
                let status = status_static.read();
                let rows = layout_rows.load(Ordering::Relaxed).max(5);
                let line = format!("{} {}  {}", glyph, label, status);
                {
                    let t = term.lock().unwrap();
                    let _ = t.write_raw(format!("\x1b7\x1b[{};1H\x1b[2K{}\x1b8", rows, line).as_bytes());

                    if let Ok(Some(b)) = t.read_byte_timeout(Duration::from_millis(0)) {
                        if b == 0x1B {
                            if t.read_byte_timeout(ESC_FOLLOWUP).unwrap_or(None).is_none() {
                                cancel.store(true, Ordering::Release);
                                status_label.set("Cancelling...");
                            }
                        }
                    }
                }
                std::thread::sleep(SPINNER_INTERVAL);
            }
        });
        *self.spinner_handle.lock().unwrap() = Some(handle);
    }

    /// Stops the spinner thread and does a final redraw with the static
    /// payload (no glyph/label), mirroring `on_llm_end`.
    pub fn stop_spinner(&self) {
        if !self.spinner_running.swap(false, Ordering::AcqRel) {
            return;
        }
        if let Some(handle) = self.spinner_handle.lock().unwrap().take() {
            let _ = handle.join();
        }
        self.set_status_label("");
        self.render_status("");
    }

    pub fn write_text(&self, text: &str) -> std::io::Result<()> {
        self.term.lock().unwrap().write_text(text)
    }

    pub fn write_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        self.term.lock().unwrap().write_raw(bytes)
    }

    /// Reads a single raw byte from the controlling terminal, used by the
    /// permission prompt and session picker while the spinner is stopped.
    pub fn read_byte(&self) -> std::io::Result<Option<u8>> {
        self.term.lock().unwrap().read_byte()
    }

    /// Prompts for a permission choice on the controlling terminal. Call
    /// this only while the spinner is stopped — both read the same fd.
    pub fn read_permission_choice(&self) -> std::io::Result<crate::prompt::PromptChoice> {
        let mut term = self.term.lock().unwrap();
        crate::prompt::read_permission_choice(&mut term)
    }

    /// Runs the session picker on the controlling terminal.
    pub fn pick_session(&self, entries: &[crate::prompt::SessionEntry]) -> std::io::Result<Option<usize>> {
        let mut term = self.term.lock().unwrap();
        crate::prompt::pick_session(&mut term, entries)
    }
}

impl ByteSource for TerminalIO {
    fn read_byte(&mut self) -> std::io::Result<Option<u8>> {
        self.term.lock().unwrap().read_byte()
    }
    fn read_byte_timeout(&mut self, timeout: Duration) -> std::io::Result<Option<u8>> {
        self.term.lock().unwrap().read_byte_timeout(timeout)
    }
}
