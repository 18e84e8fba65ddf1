// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! A small, single-threaded event → reducer → watcher dataflow graph, used
//! by the REPL driver to keep the status bar consistent with the agent
//! loop's hook callouts without scattering imperative refresh calls.
//!
//! Deliberately not generic over arbitrary event/store types: the vocabulary
//! is fixed (§4.E), so this is a concrete struct with one method per event
//! rather than a type-erased registry — simpler to reason about at this
//! scale and there is exactly one instance per REPL run.

use glyph_tools::PermissionLevel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Streaming,
    ExecutingTools,
    AwaitingPermission,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt: u64,
    pub completion: u64,
}

impl TokenUsage {
    pub fn total(&self) -> u64 {
        self.prompt + self.completion
    }
}

/// The fixed set of stores §4.E names, plus the watcher hooks a driver
/// installs to react to their changes. Watchers only touch terminal-atomic
/// buffers; they never reach into history or perform blocking I/O.
pub struct ReactiveState<'a> {
    pub tokens: TokenUsage,
    pub permission: PermissionLevel,
    pub term_rows: u16,
    pub term_cols: u16,
    pub phase: Phase,
    pub cancelled: bool,

    on_tokens_changed: Option<Box<dyn FnMut(TokenUsage) + 'a>>,
    on_permission_changed: Option<Box<dyn FnMut(PermissionLevel) + 'a>>,
    on_resized: Option<Box<dyn FnMut(u16, u16) + 'a>>,
    on_phase_changed: Option<Box<dyn FnMut(Phase) + 'a>>,
    on_cancelled: Option<Box<dyn FnMut() + 'a>>,
}

impl<'a> Default for ReactiveState<'a> {
    fn default() -> Self {
        Self {
            tokens: TokenUsage::default(),
            permission: PermissionLevel::SafeOnly,
            term_rows: 24,
            term_cols: 80,
            phase: Phase::Idle,
            cancelled: false,
            on_tokens_changed: None,
            on_permission_changed: None,
            on_resized: None,
            on_phase_changed: None,
            on_cancelled: None,
        }
    }
}

impl<'a> ReactiveState<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn watch_tokens(&mut self, f: impl FnMut(TokenUsage) + 'a) {
        self.on_tokens_changed = Some(Box::new(f));
    }
    pub fn watch_permission(&mut self, f: impl FnMut(PermissionLevel) + 'a) {
        self.on_permission_changed = Some(Box::new(f));
    }
    pub fn watch_resize(&mut self, f: impl FnMut(u16, u16) + 'a) {
        self.on_resized = Some(Box::new(f));
    }
    pub fn watch_phase(&mut self, f: impl FnMut(Phase) + 'a) {
        self.on_phase_changed = Some(Box::new(f));
    }
    pub fn watch_cancel(&mut self, f: impl FnMut() + 'a) {
        self.on_cancelled = Some(Box::new(f));
    }

    /// `tokens_received`: accumulate usage, derive `total_tokens`, re-render.
    pub fn emit_tokens_received(&mut self, prompt: u64, completion: u64) {
        self.tokens.prompt += prompt;
        self.tokens.completion += completion;
        if let Some(w) = self.on_tokens_changed.as_mut() {
            w(self.tokens);
        }
    }

    /// `permission_granted`: set the effective permission level.
    pub fn emit_permission_granted(&mut self, level: PermissionLevel) {
        self.permission = level;
        if let Some(w) = self.on_permission_changed.as_mut() {
            w(level);
        }
    }

    /// `terminal_resized`: update geometry; watcher re-layouts.
    pub fn emit_terminal_resized(&mut self, rows: u16, cols: u16) {
        self.term_rows = rows;
        self.term_cols = cols;
        if let Some(w) = self.on_resized.as_mut() {
            w(rows, cols);
        }
    }

    /// `phase_changed`: set phase; clears `cancelled` on transition to idle.
    pub fn emit_phase_changed(&mut self, phase: Phase) {
        self.phase = phase;
        if phase == Phase::Idle {
            self.cancelled = false;
        }
        if let Some(w) = self.on_phase_changed.as_mut() {
            w(phase);
        }
    }

    /// `cancel_requested`: latch the cancelled flag.
    pub fn emit_cancel_requested(&mut self) {
        self.cancelled = true;
        if let Some(w) = self.on_cancelled.as_mut() {
            w();
        }
    }

    /// `user_message_sent`: resets per-turn counters owned by the caller.
    pub fn emit_user_message_sent(&mut self) {
        self.tokens = TokenUsage::default();
        self.cancelled = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn tokens_received_accumulates_and_derives_total() {
        let mut state = ReactiveState::new();
        state.emit_tokens_received(10, 2);
        state.emit_tokens_received(5, 1);
        assert_eq!(state.tokens, TokenUsage { prompt: 15, completion: 3 });
        assert_eq!(state.tokens.total(), 18);
    }

    #[test]
    fn phase_changed_to_idle_clears_cancelled() {
        let mut state = ReactiveState::new();
        state.emit_cancel_requested();
        assert!(state.cancelled);
        state.emit_phase_changed(Phase::Idle);
        assert!(!state.cancelled);
    }

    #[test]
    fn phase_changed_to_non_idle_preserves_cancelled() {
        let mut state = ReactiveState::new();
        state.emit_cancel_requested();
        state.emit_phase_changed(Phase::ExecutingTools);
        assert!(state.cancelled);
    }

    #[test]
    fn watcher_runs_after_reducer_settles() {
        let mut state = ReactiveState::new();
        let seen = Rc::new(RefCell::new(TokenUsage::default()));
        let seen2 = seen.clone();
        state.watch_tokens(move |t| *seen2.borrow_mut() = t);
        state.emit_tokens_received(3, 4);
        assert_eq!(*seen.borrow(), TokenUsage { prompt: 3, completion: 4 });
    }

    #[test]
    fn user_message_sent_resets_per_turn_counters() {
        let mut state = ReactiveState::new();
        state.emit_tokens_received(10, 2);
        state.emit_cancel_requested();
        state.emit_user_message_sent();
        assert_eq!(state.tokens.total(), 0);
        assert!(!state.cancelled);
    }

    #[test]
    fn resize_updates_geometry() {
        let mut state = ReactiveState::new();
        state.emit_terminal_resized(40, 120);
        assert_eq!((state.term_rows, state.term_cols), (40, 120));
    }
}
