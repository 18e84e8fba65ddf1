// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Environment detection: project root, git state, CI provider, and the
//! project context file, assembled into the runtime-context notes
//! `glyph_core::prompts::system_prompt` appends.

use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::time::Duration;

const MAX_CONTEXT_FILE_BYTES: usize = 32 * 1024;
const GIT_COMMAND_TIMEOUT: Duration = Duration::from_millis(800);

/// Walk up from the current directory looking for `.git`; falls back to the
/// current directory if none is found.
pub fn find_project_root() -> std::io::Result<PathBuf> {
    let start = std::env::current_dir()?;
    let mut current = start.as_path();
    loop {
        if current.join(".git").exists() {
            return std::fs::canonicalize(current);
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }
    std::fs::canonicalize(&start)
}

#[derive(Debug, Default, Clone)]
pub struct GitContext {
    pub branch: Option<String>,
    pub commit: Option<String>,
    pub dirty_count: usize,
}

/// Collects git metadata by spawning `git` with a hard timeout; returns an
/// empty context if git is missing, the directory isn't a repo, or the
/// commands don't finish in time.
pub fn collect_git_context(project_root: &Path) -> GitContext {
    let branch = run_git_timed(&["rev-parse", "--abbrev-ref", "HEAD"], project_root);
    let commit = run_git_timed(&["rev-parse", "--short", "HEAD"], project_root);
    let dirty_count =
        run_git_timed(&["status", "--porcelain"], project_root).map(|s| s.lines().count()).unwrap_or(0);
    GitContext { branch, commit, dirty_count }
}

fn run_git_timed(args: &[&str], dir: &Path) -> Option<String> {
    let dir = dir.to_path_buf();
    let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let result = std::process::Command::new("git").args(&args).current_dir(&dir).output();
        let _ = tx.send(result);
    });
    let output = rx.recv_timeout(GIT_COMMAND_TIMEOUT).ok()?.ok()?;
    if !output.status.success() {
        return None;
    }
    let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

pub fn git_context_note(ctx: &GitContext) -> Option<String> {
    if ctx.branch.is_none() && ctx.commit.is_none() {
        return None;
    }
    let mut note = String::from("--- Git context ---\n");
    if let Some(b) = &ctx.branch {
        note.push_str(&format!("branch: {b}\n"));
    }
    if let Some(c) = &ctx.commit {
        note.push_str(&format!("commit: {c}\n"));
    }
    note.push_str(&format!("uncommitted changes: {}\n", ctx.dirty_count));
    Some(note)
}

#[derive(Debug, Default, Clone)]
pub struct CiContext {
    pub provider: Option<String>,
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Detects the current CI provider from well-known environment variables.
pub fn detect_ci_context() -> CiContext {
    let mut ctx = CiContext::default();
    if std::env::var("GITHUB_ACTIONS").as_deref() == Ok("true") {
        ctx.provider = Some("GitHub Actions".to_string());
        ctx.branch = std::env::var("GITHUB_REF_NAME").ok();
        ctx.commit = std::env::var("GITHUB_SHA").ok();
    } else if std::env::var("GITLAB_CI").as_deref() == Ok("true") {
        ctx.provider = Some("GitLab CI".to_string());
        ctx.branch = std::env::var("CI_COMMIT_REF_NAME").ok();
        ctx.commit = std::env::var("CI_COMMIT_SHA").ok();
    } else if std::env::var("CIRCLECI").as_deref() == Ok("true") {
        ctx.provider = Some("CircleCI".to_string());
        ctx.branch = std::env::var("CIRCLE_BRANCH").ok();
        ctx.commit = std::env::var("CIRCLE_SHA1").ok();
    }
    ctx
}

pub fn ci_context_note(ctx: &CiContext) -> Option<String> {
    let provider = ctx.provider.as_ref()?;
    let mut note = format!("--- CI context ---\nprovider: {provider}\n");
    if let Some(b) = &ctx.branch {
        note.push_str(&format!("branch: {b}\n"));
    }
    if let Some(c) = &ctx.commit {
        note.push_str(&format!("commit: {c}\n"));
    }
    Some(note)
}

/// Loads the first existing project context file, capped at 32 KiB.
pub fn load_project_context_file(project_root: &Path) -> Option<String> {
    let candidates =
        [project_root.join(".glyph").join("context.md"), project_root.join("AGENTS.md"), project_root.join("CLAUDE.md")];

    for path in &candidates {
        let Ok(bytes) = std::fs::read(path) else { continue };
        let content = if bytes.len() > MAX_CONTEXT_FILE_BYTES {
            String::from_utf8_lossy(&bytes[..MAX_CONTEXT_FILE_BYTES]).trim_end().to_string()
        } else {
            String::from_utf8_lossy(&bytes).trim().to_string()
        };
        if !content.is_empty() {
            return Some(content);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_project_root_returns_a_directory() {
        let root = find_project_root().expect("should not fail");
        assert!(root.is_dir());
    }

    #[test]
    fn git_context_note_none_when_empty() {
        assert!(git_context_note(&GitContext::default()).is_none());
    }

    #[test]
    fn git_context_note_reports_dirty_count() {
        let ctx = GitContext { branch: Some("main".into()), commit: Some("abc123".into()), dirty_count: 3 };
        let note = git_context_note(&ctx).unwrap();
        assert!(note.contains("branch: main"));
        assert!(note.contains("uncommitted changes: 3"));
    }

    #[test]
    fn ci_context_note_none_outside_ci() {
        assert!(ci_context_note(&CiContext::default()).is_none());
    }

    #[test]
    fn load_project_context_file_reads_agents_md() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("AGENTS.md"), "Project notes").unwrap();
        let content = load_project_context_file(dir.path());
        assert_eq!(content.as_deref(), Some("Project notes"));
    }

    #[test]
    fn load_project_context_file_none_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_project_context_file(dir.path()).is_none());
    }
}
