// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;
mod context;
mod skills;

use std::io::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use anyhow::Context as _;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use glyph_config::Config;
use glyph_core::{
    agent_loop, session_id_from_unix_time, system_prompt, AgentLoopConfig, AgentOutcome,
    AgentRuntimeContext, DispatchAgentFn, Hooks, ReactiveState, Session, SessionStore,
};
use glyph_model::{http::HttpProvider, mock::EchoProvider, Message, ModelProvider};
use glyph_term::key::{self};
use glyph_term::line_editor::{default_history_path, EditOutcome, LineEditor};
use glyph_term::prompt::{PromptChoice, SessionEntry};
use glyph_term::raw_io::Mode;
use glyph_term::terminal_io::TerminalIO;
use glyph_tools::{ExecuteBashTool, PermissionLevel, ToolRegistry, SUB_AGENT_TOOL_NAMES};

const APP_NAME: &str = "glyph";

/// Exit words recognised by the REPL (§4.I): the plain ones, their Russian
/// translations, and the ЙЦУКЕН mistypes a QWERTY user produces when their
/// keyboard layout is set to Russian without noticing.
const EXIT_WORDS: &[&str] =
    &["/exit", "/quit", "/q", "/выход", "/выйти", "/в", "/учше", "/йгше", "/й"];
const SLASH_COMMANDS: &[&str] =
    &["/exit", "/quit", "/q", "/help", "/tools", "/skills", "/usage", "/sessions", "/compact"];

fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();
    let interactive = cli.prompt.is_none() && cli.chain.is_none();
    init_logging(cli.verbose, interactive);

    if cli.init {
        return handle_init();
    }

    let mut config = glyph_config::load(cli.config.as_deref())?;
    config.agent.infinity = cli.infinity;

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let project_root = context::find_project_root().unwrap_or_else(|_| PathBuf::from("."));
    let git_ctx = context::collect_git_context(&project_root);
    let ci_ctx = context::detect_ci_context();
    let skills = skills::discover_skills(&project_root, APP_NAME);

    let runtime_ctx = AgentRuntimeContext {
        project_root: Some(project_root.clone()),
        git_context_note: context::git_context_note(&git_ctx),
        ci_context_note: context::ci_context_note(&ci_ctx),
        project_context_file: context::load_project_context_file(&project_root),
        append_system_prompt: None,
        system_prompt_override: None,
        skills: Arc::from(skills.into_boxed_slice()),
    };

    let model: Arc<dyn ModelProvider> = build_model(&config)?;
    let tools = Arc::new(build_registry(&config, &runtime_ctx));

    let exit_code = if let Some(chain_path) = cli.chain.clone() {
        run_chain_mode(&cli, &chain_path, &config, tools, model)?
    } else if let Some(prompt) = cli.prompt.clone() {
        run_single_shot(&cli, &config, &runtime_ctx, tools, model, prompt)?
    } else {
        run_interactive(&cli, &config, &runtime_ctx, tools, model)?
    };

    std::process::exit(exit_code);
}

/// Suppresses tracing output during an interactive REPL session (escape
/// sequences on stderr would corrupt the fixed-layout terminal) unless the
/// caller opts in via `GLYPH_LOG_FILE`. Headless runs (single-shot, `--chain`,
/// CI) always log to stderr, scaled by `-v`/`-vv`.
fn init_logging(verbosity: u8, interactive: bool) {
    if interactive {
        if let Ok(log_path) = std::env::var("GLYPH_LOG_FILE") {
            use std::sync::Mutex;
            if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
                let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
                let _ = tracing_subscriber::registry()
                    .with(fmt::layer().with_target(true).with_ansi(false).with_writer(Mutex::new(file)))
                    .with(filter)
                    .try_init();
                return;
            }
        }
        let _ = tracing_subscriber::registry().with(tracing_subscriber::filter::LevelFilter::OFF).try_init();
        return;
    }

    let level = match verbosity {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn handle_init() -> anyhow::Result<()> {
    let dir = dirs::config_dir().context("could not determine user config directory")?.join(APP_NAME);
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("config.yaml");
    if path.exists() {
        println!("Config already exists at {}", path.display());
        return Ok(());
    }
    let default = Config::default();
    std::fs::write(&path, serde_yaml::to_string(&default)?)?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}

fn build_model(config: &Config) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match config.model.provider.as_str() {
        "mock" => Ok(Arc::new(EchoProvider::default())),
        _ => {
            let api_key = match &config.model.api_key_env {
                Some(var) => std::env::var(var)
                    .with_context(|| format!("model provider '{}' requires env var {var}", config.model.provider))?,
                None => String::new(),
            };
            let base_url = config
                .model
                .base_url
                .clone()
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
            Ok(Arc::new(HttpProvider::new(base_url, api_key, config.model.name.clone())))
        }
    }
}

/// Builds the top-level registry, then overrides `execute_bash`'s timeout:
/// the configured shell timeout normally, or an effectively unbounded one
/// under `--infinity`. `ToolRegistry::register` overwrites by name, so this
/// needs no new registry API.
fn build_registry(config: &Config, runtime_ctx: &AgentRuntimeContext) -> ToolRegistry {
    let mut registry = glyph_tools::default_registry(runtime_ctx.skills.clone());
    let timeout_secs = if config.agent.infinity { 315_360_000 } else { config.tools.shell_timeout_secs };
    registry.register(ExecuteBashTool { timeout_secs });
    registry
}

fn filtered_sub_agent_registry(full: &ToolRegistry) -> Arc<ToolRegistry> {
    let mut sub = ToolRegistry::new();
    for name in SUB_AGENT_TOOL_NAMES {
        if let Some(tool) = full.get(name) {
            sub.register_arc(tool);
        }
    }
    Arc::new(sub)
}

/// Builds the `dispatch_agent` hook: a fresh sub-agent run, restricted to
/// [`SUB_AGENT_TOOL_NAMES`], sharing the live model. `DispatchAgentFn` is
/// `'static`, so the model must be captured by an owned `Arc`, not borrowed.
fn build_dispatch_agent(
    tools: &ToolRegistry,
    model: Arc<dyn ModelProvider>,
    max_iterations: usize,
) -> DispatchAgentFn {
    let sub_tools = filtered_sub_agent_registry(tools);
    Arc::new(move |task: &str| {
        let cancel = AtomicBool::new(false);
        let result = glyph_core::run_sub_agent(task, model.as_ref(), sub_tools.clone(), &cancel, Some(max_iterations));
        result.text
    })
}

fn unix_now() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

fn sessions_dir() -> PathBuf {
    dirs::config_dir().unwrap_or_else(|| PathBuf::from(".")).join(APP_NAME).join("sessions")
}

// ── `--chain` headless dispatch ──────────────────────────────────────────────

fn run_chain_mode(
    cli: &cli::Cli,
    chain_path: &std::path::Path,
    config: &Config,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
) -> anyhow::Result<i32> {
    let raw = std::fs::read_to_string(chain_path)
        .with_context(|| format!("reading chain file {}", chain_path.display()))?;
    let spec = glyph_ci::parse_chain(&raw).map_err(|e| anyhow::anyhow!("{e}"))?;

    if cli.dry_run {
        glyph_ci::write_stdout(&glyph_ci::dry_run_plan(&spec));
        return Ok(0);
    }

    let task = cli
        .prompt
        .clone()
        .context("--chain requires the prompt positional, passed to each step as {task}")?;

    let permission = if cli.yolo { PermissionLevel::All } else { PermissionLevel::SafeOnly };
    let cancel = AtomicBool::new(false);
    let dispatch_agent = build_dispatch_agent(&tools, model.clone(), config.agent.sub_agent_max_iterations as usize);

    let mut persist = |_msg: &Message| {};
    let mut on_status = |msg: &str| glyph_ci::write_progress(msg);
    let mut hooks = Hooks {
        on_chunk: &mut |chunk: &str| glyph_ci::write_stdout(chunk),
        on_llm_end: &mut || {},
        on_http_error: &mut |status: u16, message: &str| {
            glyph_ci::write_stderr(&format!("http error {status}: {message}"))
        },
        on_tool_calls: &mut |_calls: &[glyph_tools::ToolCall]| permission,
        on_tool_result: &mut |name: &str, _content: &str, is_error: bool| {
            let marker = if is_error { "error" } else { "ok" };
            glyph_ci::write_progress(&format!("[ci:tool] {name} ({marker})"))
        },
        on_loop_detected: None,
        persist: &mut persist,
        on_status: &mut on_status,
        dispatch_agent,
    };

    let outcome = glyph_ci::run_chain(&spec, &task, &tools, model.as_ref(), &cancel, permission, &mut hooks);
    match outcome {
        glyph_ci::ChainOutcome::Completed(text) => {
            glyph_ci::finalise_stdout(&text);
            Ok(0)
        }
        glyph_ci::ChainOutcome::Cancelled => {
            glyph_ci::write_stderr("chain cancelled");
            Ok(1)
        }
        glyph_ci::ChainOutcome::Aborted(msg) => {
            glyph_ci::write_stderr(&format!("chain aborted: {msg}"));
            Ok(1)
        }
    }
}

// ── Single-shot mode ──────────────────────────────────────────────────────────

fn run_single_shot(
    cli: &cli::Cli,
    config: &Config,
    runtime_ctx: &AgentRuntimeContext,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    prompt: String,
) -> anyhow::Result<i32> {
    let store = SessionStore::new(sessions_dir());
    let session_id = session_id_from_unix_time(unix_now());
    store.create(&session_id, model.model_name(), model.name(), unix_now())?;

    let sys_prompt = system_prompt(runtime_ctx, cli.yolo);
    let max_tokens = config.model.max_context_tokens as usize;
    let mut session = Session::new(session_id.clone(), max_tokens);
    session.push(Message::system(sys_prompt.clone()));
    store.append_message(&session_id, &Message::system(sys_prompt))?;
    session.push(Message::user(prompt.clone()));
    store.append_message(&session_id, &Message::user(prompt))?;

    let permission = if cli.yolo { PermissionLevel::All } else { PermissionLevel::SafeOnly };
    let cancel = AtomicBool::new(false);
    let dispatch_agent = build_dispatch_agent(&tools, model.clone(), config.agent.sub_agent_max_iterations as usize);

    let mut persist = |msg: &Message| {
        let _ = store.append_message(&session_id, msg);
    };
    let mut on_status = |_msg: &str| {};
    let mut hooks = Hooks {
        on_chunk: &mut |chunk: &str| {
            print!("{chunk}");
            let _ = std::io::stdout().flush();
        },
        on_llm_end: &mut || println!(),
        on_http_error: &mut |status: u16, message: &str| eprintln!("http error {status}: {message}"),
        on_tool_calls: &mut |_calls: &[glyph_tools::ToolCall]| permission,
        on_tool_result: &mut |_name: &str, _content: &str, _is_error: bool| {},
        on_loop_detected: None,
        persist: &mut persist,
        on_status: &mut on_status,
        dispatch_agent,
    };

    let loop_config = AgentLoopConfig {
        max_iterations: if cli.infinity { usize::MAX } else { config.agent.max_iterations as usize },
        permission,
        silent: false,
        allow_dispatch_agent: true,
    };

    let outcome = agent_loop::run(&mut session, tools, model.as_ref(), &cancel, &loop_config, &mut hooks);
    match outcome {
        AgentOutcome::ReturnedText(_) => Ok(0),
        AgentOutcome::HitLimit => {
            eprintln!("iteration limit reached without a final answer");
            Ok(1)
        }
        AgentOutcome::Cancelled => {
            eprintln!("cancelled");
            Ok(1)
        }
        AgentOutcome::HttpError { status, message } => {
            eprintln!("http error {status}: {message}");
            Ok(1)
        }
    }
}

// ── Interactive REPL ─────────────────────────────────────────────────────────

fn run_interactive(
    cli: &cli::Cli,
    config: &Config,
    runtime_ctx: &AgentRuntimeContext,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
) -> anyhow::Result<i32> {
    let mut term = TerminalIO::open().context("opening controlling terminal")?;
    let store = SessionStore::new(sessions_dir());
    let sys_prompt = system_prompt(runtime_ctx, cli.yolo);
    let max_tokens = config.model.max_context_tokens as usize;

    let (session_id, mut session) = resolve_session(cli, &store, &sys_prompt, max_tokens)?;

    let mut editor = LineEditor::new();
    if let Some(path) = default_history_path(APP_NAME) {
        editor = editor.with_history_file(path);
    }

    let mut reactive = ReactiveState::new();
    reactive.permission = if cli.yolo { PermissionLevel::All } else { PermissionLevel::SafeOnly };
    let mut granted_once = cli.yolo;
    let started_at = Instant::now();

    term.set_status_static(&status_line(&session, &reactive, model.as_ref(), started_at));

    loop {
        if glyph_term::terminal_io::resize_pending() {
            term.install_layout();
            let layout = term.layout();
            reactive.emit_terminal_resized(layout.rows, layout.cols);
        }

        term.set_mode(Mode::Raw)?;
        let key_event = key::next_key(&mut term)?;
        term.set_mode(Mode::Cooked)?;

        let Some(key_event) = key_event else { break };
        match editor.handle_key(key_event, SLASH_COMMANDS) {
            EditOutcome::Continue => continue,
            EditOutcome::Eof => break,
            EditOutcome::Interrupted => {
                term.write_text("^C\r\n")?;
                continue;
            }
            EditOutcome::ClearScreen => {
                term.install_layout();
                continue;
            }
            EditOutcome::Submit(line) => {
                let line = line.trim().to_string();
                if line.is_empty() {
                    continue;
                }
                term.write_text(&format!("{line}\r\n"))?;

                if EXIT_WORDS.contains(&line.as_str()) {
                    break;
                }
                if line.starts_with('/') {
                    handle_slash_command(&line, &term, &tools, &store, &session_id, &mut session, model.as_ref())?;
                    continue;
                }

                run_turn(
                    &line,
                    &term,
                    &mut session,
                    &session_id,
                    tools.clone(),
                    model.clone(),
                    &store,
                    &mut reactive,
                    &mut granted_once,
                    cli,
                    config,
                )?;
                term.set_status_static(&status_line(&session, &reactive, model.as_ref(), started_at));
            }
        }
    }

    Ok(0)
}

/// `model │ used/limit (N%) │ perm │ cancel? │ H:MM:SS`, per the terminal
/// layout's reserved status row. Token usage comes straight from the
/// session's own running count, not a duplicate counter in `ReactiveState`.
fn status_line(session: &Session, reactive: &ReactiveState, model: &dyn ModelProvider, started_at: Instant) -> String {
    let perm = match reactive.permission {
        PermissionLevel::All => "all",
        PermissionLevel::SafeOnly => "safe-only",
        PermissionLevel::None => "none",
    };
    let pct = (session.context_fraction() * 100.0).round() as u32;
    let elapsed = started_at.elapsed().as_secs();
    let (h, m, s) = (elapsed / 3600, (elapsed % 3600) / 60, elapsed % 60);
    let cancel_marker = if reactive.cancelled { " │ cancelled" } else { "" };
    format!(
        "{} │ {}/{} ({pct}%) │ perm:{perm}{cancel_marker} │ {h}:{m:02}:{s:02}",
        model.model_name(),
        session.token_count,
        session.max_tokens,
    )
}

fn resolve_session(
    cli: &cli::Cli,
    store: &SessionStore,
    sys_prompt: &str,
    max_tokens: usize,
) -> anyhow::Result<(String, Session)> {
    let resume_id = if cli.r#continue { store.latest_id()? } else { cli.session.clone() };

    if let Some(id) = resume_id {
        let session = store.resume(&id, Message::system(sys_prompt), max_tokens)?;
        return Ok((id, session));
    }

    let id = session_id_from_unix_time(unix_now());
    store.create(&id, "unknown", "unknown", unix_now())?;
    let mut session = Session::new(id.clone(), max_tokens);
    session.push(Message::system(sys_prompt));
    store.append_message(&id, &Message::system(sys_prompt))?;
    Ok((id, session))
}

#[allow(clippy::too_many_arguments)]
fn handle_slash_command(
    line: &str,
    term: &TerminalIO,
    tools: &ToolRegistry,
    store: &SessionStore,
    session_id: &str,
    session: &mut Session,
    model: &dyn ModelProvider,
) -> anyhow::Result<()> {
    match line {
        "/help" => {
            term.write_text("Commands: /help /tools /skills /usage /sessions /compact /exit\r\n")?;
        }
        "/tools" => {
            let names = tools.names().join(", ");
            term.write_text(&format!("{names}\r\n"))?;
        }
        "/skills" => {
            term.write_text("(skills are listed in the system prompt)\r\n")?;
        }
        "/usage" => {
            let pct = (session.context_fraction() * 100.0).round() as u32;
            term.write_text(&format!(
                "{} / {} tokens ({pct}%)\r\n",
                session.token_count, session.max_tokens
            ))?;
        }
        "/sessions" => {
            let summaries = store.list()?;
            let entries: Vec<SessionEntry> = summaries
                .iter()
                .map(|s| SessionEntry {
                    id: s.id.clone(),
                    label: format!("{} ({})", s.id, s.summary.as_deref().unwrap_or(&s.model)),
                })
                .collect();
            if let Some(idx) = term.pick_session(&entries)? {
                term.write_text(&format!("picked: {}\r\n", entries[idx].id))?;
            }
        }
        "/compact" => {
            let (sys, dump) = glyph_core::build_manual_compaction_request(&session.messages);
            let request = [Message::system(sys), Message::user(dump)];
            let outcome = model.complete(&request, &[], &mut |_chunk: &str| {});
            if let glyph_model::CompletionResponse::Text(summary) = outcome.response {
                glyph_core::apply_manual_compaction(&mut session.messages, &summary);
                session.recalculate_tokens();
                store.append_summary(session_id, &summary)?;
                term.write_text("[context compacted]\r\n")?;
            } else {
                term.write_text("[compact failed: model did not return text]\r\n")?;
            }
        }
        _ => {
            term.write_text(&format!("unknown command: {line}\r\n"))?;
        }
    }
    Ok(())
}

/// Runs one user turn through the agent loop with verbose hooks that mirror
/// the REPL's spinner, permission prompt, and tool-line rendering (§4.I).
#[allow(clippy::too_many_arguments)]
fn run_turn(
    line: &str,
    term: &TerminalIO,
    session: &mut Session,
    session_id: &str,
    tools: Arc<ToolRegistry>,
    model: Arc<dyn ModelProvider>,
    store: &SessionStore,
    reactive: &mut ReactiveState,
    granted_once: &mut bool,
    cli: &cli::Cli,
    config: &Config,
) -> anyhow::Result<()> {
    session.push(Message::user(line.to_string()));
    store.append_message(session_id, &Message::user(line.to_string()))?;

    term.clear_cancel();
    reactive.emit_user_message_sent();
    let cancel = term.cancel_flag();

    term.start_spinner("Thinking...");

    let dispatch_agent = build_dispatch_agent(&tools, model.clone(), config.agent.sub_agent_max_iterations as usize);
    let yolo = cli.yolo;

    let mut persist = |msg: &Message| {
        let _ = store.append_message(session_id, msg);
    };
    let mut on_chunk = |chunk: &str| {
        let _ = term.write_text(chunk);
    };
    let mut on_llm_end = || term.stop_spinner();
    let mut on_http_error = |status: u16, message: &str| {
        let _ = term.write_text(&format!("\r\n[http error {status}: {message}]\r\n"));
    };
    let mut on_tool_calls = |calls: &[glyph_tools::ToolCall]| -> PermissionLevel {
        let names: Vec<String> = calls.iter().map(|c| format!("{}({})", c.name, key_arg(c))).collect();
        let _ = term.write_text(&format!("\r\n✦ {}\r\n", names.join(", ")));
        if yolo || *granted_once {
            return PermissionLevel::All;
        }
        term.stop_spinner();
        let choice = term.read_permission_choice().unwrap_or(PromptChoice::None);
        term.start_spinner("Working...");
        match choice {
            PromptChoice::All => {
                *granted_once = true;
                PermissionLevel::All
            }
            PromptChoice::SafeOnly => PermissionLevel::SafeOnly,
            PromptChoice::None => PermissionLevel::None,
            PromptChoice::NoneAndCancel => {
                cancel.store(true, Ordering::Release);
                PermissionLevel::None
            }
        }
    };
    let mut on_tool_result = |name: &str, content: &str, is_error: bool| {
        let preview: String = content.chars().take(1024).collect();
        if is_error || preview.starts_with("Error") || preview.starts_with("Permission denied") {
            let _ = term.write_text(&format!("◇ \x1b[31m{name}: {preview}\x1b[0m\r\n"));
        } else {
            let _ = term.write_text(&format!("◇ {preview}\r\n"));
        }
    };
    let mut on_status = |msg: &str| {
        let _ = term.write_text(&format!("{msg}\r\n"));
    };

    let mut hooks = Hooks {
        on_chunk: &mut on_chunk,
        on_llm_end: &mut on_llm_end,
        on_http_error: &mut on_http_error,
        on_tool_calls: &mut on_tool_calls,
        on_tool_result: &mut on_tool_result,
        on_loop_detected: None,
        persist: &mut persist,
        on_status: &mut on_status,
        dispatch_agent,
    };

    let loop_config = AgentLoopConfig {
        max_iterations: if cli.infinity { usize::MAX } else { config.agent.max_iterations as usize },
        permission: if yolo { PermissionLevel::All } else { PermissionLevel::SafeOnly },
        silent: false,
        allow_dispatch_agent: true,
    };

    let term_cancel = term.cancel_flag();
    let outcome = agent_loop::run(session, tools, model.as_ref(), &term_cancel, &loop_config, &mut hooks);
    term.stop_spinner();

    match outcome {
        AgentOutcome::ReturnedText(_) => {}
        AgentOutcome::HitLimit => {
            term.write_text("[iteration limit reached]\r\n")?;
        }
        AgentOutcome::Cancelled => {
            term.write_text("[cancelled]\r\n")?;
        }
        AgentOutcome::HttpError { status, message } => {
            term.write_text(&format!("[http error {status}: {message}]\r\n"))?;
        }
    }
    Ok(())
}

/// Picks a short display value for the first salient argument of a tool call,
/// shown next to its name in the `✦ ToolName(arg)` tool-call line.
fn key_arg(call: &glyph_tools::ToolCall) -> String {
    let field = match call.name.as_str() {
        "read_file" | "write_file" | "list_files" => "path",
        "search_files" => "pattern",
        "execute_bash" => "command",
        "load_skill" => "name",
        _ => "",
    };
    call.args
        .get(field)
        .and_then(|v| v.as_str())
        .map(|s| s.chars().take(60).collect::<String>())
        .unwrap_or_default()
}
