// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Entry point: wires the already-built library crates into the transport
//! runtime (§4.G) and the Telegram ingress loop (§4.H).

mod cli;
mod classify;
mod engines;
mod lockfile;
mod systemd;
mod threadmap;

use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use takopi_audit::{AuditKind, AuditLog, AuditRecord};
use takopi_channels::telegram::{
    render_markdown, BotIdentity, ChatKind, HttpTelegramBot, IngressAdapter, QueuedTelegramClient,
    TelegramIncoming, TelegramIncomingMessage, TelegramPriority,
};
use takopi_config::Config;
use takopi_engine::run_options::{apply_run_options_async, EngineRunOptions};
use takopi_engine::OnEvent;
use takopi_events::TakopiEvent;
use takopi_integrations::{LocalWhisperTranscriber, Transcriber, WhisperConfig};
use takopi_model::ThreadJob;
use takopi_render::ExecProgressRenderer;
use takopi_router::AutoRouter;
use takopi_scheduler::{DoneEvent, RunJob, ThreadScheduler};

use cli::{Cli, Commands, DaemonCommands};
use classify::{classify, ShortcutSet};
use threadmap::ThreadMap;

const MAX_PROGRESS_ACTIONS: usize = 20;
const LONG_POLL_TIMEOUT_S: u32 = 30;
const PRIVATE_CHAT_RPS: f64 = 1.0;
const GROUP_CHAT_RPS: f64 = 0.5;

fn init_logging(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "warn" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn data_dir() -> Result<std::path::PathBuf> {
    let base = dirs::data_dir().context("could not determine a data directory")?;
    let dir = base.join("takopi");
    std::fs::create_dir_all(&dir).context("failed to create takopi data directory")?;
    Ok(dir)
}

fn run_daemon_command(command: DaemonCommands) -> Result<i32> {
    match command {
        DaemonCommands::Install { enable, start, force } => {
            systemd::daemon_install(enable, start, force)?;
            Ok(0)
        }
        DaemonCommands::Uninstall { stop } => {
            systemd::daemon_uninstall(stop)?;
            Ok(0)
        }
        DaemonCommands::Status => systemd::daemon_status(),
        DaemonCommands::Logs { follow, lines } => systemd::daemon_logs(follow, lines),
    }
}

fn command_menu(router: &AutoRouter) -> Vec<serde_json::Value> {
    let mut commands = vec![
        serde_json::json!({"command": "new", "description": "Start a fresh session"}),
        serde_json::json!({"command": "workspaces", "description": "List configured workspaces"}),
        serde_json::json!({"command": "workspace", "description": "Switch to a workspace by name"}),
        serde_json::json!({"command": "sessions", "description": "List known sessions"}),
        serde_json::json!({"command": "drop", "description": "Forget a remembered session"}),
    ];
    for entry in router.entries() {
        commands.push(serde_json::json!({
            "command": entry.engine.as_str(),
            "description": format!("Route this turn to {}", entry.engine),
        }));
    }
    commands
}

/// Shared state `run_job` and the ingress loop both need. Held behind an
/// `Arc` so the scheduler's `run_job` closure can capture it independently
/// of the main loop.
struct RunContext {
    client: Arc<QueuedTelegramClient<HttpTelegramBot>>,
    router: Arc<AutoRouter>,
    audit: Arc<AuditLog>,
    threads: Arc<ThreadMap>,
    scheduler: Arc<OnceLock<Arc<ThreadScheduler>>>,
    project: Option<String>,
}

fn scheduler_handle(cell: &Arc<OnceLock<Arc<ThreadScheduler>>>) -> Arc<ThreadScheduler> {
    cell.get().cloned().expect("scheduler initialized before any job runs")
}

/// Runs one engine turn end to end: placeholder message, streaming LOW
/// progress edits, the final HIGH edit, resume-token persistence, clearing
/// the scheduler's busy gate, and an audit trail (§4.G steps 4-7).
async fn run_job(ctx: Arc<RunContext>, job: ThreadJob) {
    let started = Instant::now();
    let chat_id = job.chat_id;
    let user_msg_id = job.user_msg_id;
    let prompt = job.text.clone();
    let resume_token = job.resume_token.clone();
    let engine_override = job.engine_override.clone();
    let mode = job.mode.clone();

    let placeholder = ExecProgressRenderer::new(MAX_PROGRESS_ACTIONS).render_progress(0.0);
    let sent = match ctx
        .client
        .send_message(chat_id, placeholder, Some(user_msg_id), TelegramPriority::High, None)
        .await
    {
        Ok(value) => value,
        Err(err) => {
            error!(%err, "failed to send placeholder message");
            return;
        }
    };
    let Some(message_id) = sent.get("message_id").and_then(|v| v.as_i64()) else {
        error!("sendMessage response carried no message_id");
        return;
    };

    let runner = if resume_token.is_none() {
        if let Some(engine) = &engine_override {
            match ctx.router.entry_for_engine(Some(engine.as_str())) {
                Ok(entry) if entry.available => Some(entry.runner.clone()),
                Ok(entry) => {
                    let issue = entry.issue.clone().unwrap_or_else(|| "engine unavailable".to_string());
                    ctx.client
                        .edit_message_text(chat_id, message_id, format!("error · {issue}"), TelegramPriority::High, None, false)
                        .await;
                    None
                }
                Err(err) => {
                    ctx.client
                        .edit_message_text(chat_id, message_id, format!("error · {err}"), TelegramPriority::High, None, false)
                        .await;
                    None
                }
            }
        } else {
            match ctx.router.runner_for(None) {
                Ok(runner) => Some(runner),
                Err(err) => {
                    ctx.client
                        .edit_message_text(chat_id, message_id, format!("error · {err}"), TelegramPriority::High, None, false)
                        .await;
                    None
                }
            }
        }
    } else {
        match ctx.router.runner_for(resume_token.as_ref()) {
            Ok(runner) => Some(runner),
            Err(err) => {
                ctx.client
                    .edit_message_text(chat_id, message_id, format!("error · {err}"), TelegramPriority::High, None, false)
                    .await;
                None
            }
        }
    };
    let Some(runner) = runner else { return };

    let renderer = Arc::new(tokio::sync::Mutex::new(
        ExecProgressRenderer::new(MAX_PROGRESS_ACTIONS).with_resume_formatter({
            let router = Arc::clone(&ctx.router);
            move |token| router.format_resume(token).unwrap_or_default()
        }),
    ));
    let fresh_run_gate = resume_token.is_none().then(|| Arc::new(DoneEvent::new()));

    let on_event: OnEvent<'_> = {
        let ctx = Arc::clone(&ctx);
        let renderer = Arc::clone(&renderer);
        let fresh_run_gate = fresh_run_gate.clone();
        Box::new(move |event: TakopiEvent| {
            let ctx = Arc::clone(&ctx);
            let renderer = Arc::clone(&renderer);
            let fresh_run_gate = fresh_run_gate.clone();
            Box::pin(async move {
                if let TakopiEvent::SessionStarted { resume, .. } = &event {
                    if let Some(gate) = fresh_run_gate {
                        scheduler_handle(&ctx.scheduler).note_thread_known(resume, gate).await;
                    }
                }
                let mut r = renderer.lock().await;
                if r.note_event(&event) {
                    let text = r.render_progress(started.elapsed().as_secs_f64());
                    drop(r);
                    ctx.client
                        .edit_message_text(
                            chat_id,
                            message_id,
                            text,
                            TelegramPriority::Low,
                            Some(tokio::time::Instant::now() + Duration::from_millis(500)),
                            false,
                        )
                        .await;
                }
                Ok(())
            })
        })
    };

    let run_options = match mode {
        Some(mode) => EngineRunOptions { mode: Some(mode), ..Default::default() },
        None => EngineRunOptions::default(),
    };

    let result = apply_run_options_async(run_options, runner.run(&prompt, resume_token.clone(), on_event)).await;

    let (status, answer, final_resume) = match &result {
        Ok(run_result) => (
            if run_result.ok { "done" } else { "error" },
            run_result.answer.clone(),
            Some(run_result.resume.clone()),
        ),
        Err(err) => ("error", err.to_string(), resume_token.clone()),
    };

    let plain_answer = render_markdown(&answer).text;
    let final_text = {
        let r = renderer.lock().await;
        r.render_final(started.elapsed().as_secs_f64(), &plain_answer, status)
    };
    let _ = ctx
        .client
        .edit_message_text(chat_id, message_id, final_text, TelegramPriority::High, None, true)
        .await;

    if let Some(token) = &final_resume {
        // Thread identity is tracked per (chat, project); the thread map's
        // forum-topic axis is left at `None` here — takopi doesn't route
        // topics to distinct engine sessions yet.
        if let Err(err) = ctx.threads.set(chat_id, ctx.project.as_deref(), None, token) {
            warn!(%err, "failed to persist resume token");
        }
        scheduler_handle(&ctx.scheduler).clear_busy(token);
    }

    let audit_kind = if matches!(result, Ok(ref r) if r.ok) {
        AuditKind::RunCompleted
    } else {
        AuditKind::from("run_failed")
    };
    let mut record = AuditRecord::new(audit_kind, chat_id, chrono::Utc::now())
        .with_message_id(message_id)
        .with_text(answer);
    if let Some(token) = &final_resume {
        record = record.with_engine(token.engine.as_str());
    }
    if let Err(err) = ctx.audit.append(record) {
        warn!(%err, "failed to append audit record");
    }
}

/// `/new`, `/workspaces`, `/sessions`, `/drop <engine>`, `/workspace <name>` —
/// handled directly against the chat rather than dispatched to an engine.
async fn handle_daemon_command(
    ctx: &RunContext,
    chat_id: i64,
    user_msg_id: i64,
    config: &Config,
    command: classify::DaemonCommand,
) -> Result<(), takopi_channels::telegram::TelegramError> {
    let reply = match command {
        classify::DaemonCommand::New => "Starting a new session on your next message.".to_string(),
        classify::DaemonCommand::Workspaces => {
            if config.workspaces.is_empty() {
                "No workspaces configured.".to_string()
            } else {
                let mut names: Vec<&str> = config.workspaces.keys().map(String::as_str).collect();
                names.sort_unstable();
                format!("Workspaces: {}", names.join(", "))
            }
        }
        classify::DaemonCommand::Workspace(name) => {
            if config.workspaces.contains_key(&name) {
                format!("Switched to workspace `{name}`.")
            } else {
                format!("Unknown workspace `{name}`. Use /workspaces to list them.")
            }
        }
        classify::DaemonCommand::Sessions => match ctx.threads.get(chat_id, ctx.project.as_deref(), None) {
            Some(token) => format!("Current session: {}:{}", token.engine, token.value),
            None => "No session remembered for this chat yet.".to_string(),
        },
        classify::DaemonCommand::Drop(engine) => format!("Dropped remembered session for `{engine}` (if any)."),
    };
    ctx.client
        .send_message(chat_id, reply, Some(user_msg_id), TelegramPriority::High, None)
        .await
        .map(|_| ())
}

async fn handle_incoming(
    ctx: &Arc<RunContext>,
    scheduler: &Arc<ThreadScheduler>,
    config: &Config,
    shortcuts: &ShortcutSet,
    transcriber: &Arc<dyn Transcriber>,
    msg: TelegramIncomingMessage,
) -> Result<()> {
    let text = if let Some(voice) = &msg.voice {
        match ctx.client.download_voice(&voice.file_id).await {
            Ok(bytes) => transcriber.transcribe(&bytes).await.unwrap_or_else(|err| {
                warn!(%err, "voice transcription failed");
                String::new()
            }),
            Err(err) => {
                warn!(%err, "voice download failed");
                String::new()
            }
        }
    } else {
        msg.text.clone()
    };
    if text.trim().is_empty() {
        return Ok(());
    }

    let classified = classify(&text, shortcuts);
    if let Some(command) = classified.daemon_command {
        handle_daemon_command(ctx, msg.chat_id, msg.message_id, config, command).await?;
        return Ok(());
    }

    let resume_token = if classified.engine_override.is_some() {
        None
    } else {
        ctx.router
            .resolve_resume(Some(classified.text.as_str()), msg.reply_to_text.as_deref())
            .or_else(|| ctx.threads.get(msg.chat_id, ctx.project.as_deref(), None))
    };

    let mut job = ThreadJob::new(msg.chat_id, msg.message_id, classified.text)
        .with_resume(resume_token)
        .with_engine_override(classified.engine_override);
    job.mode = classified.mode_override;

    scheduler.enqueue(job).await;
    Ok(())
}

async fn run_bridge(config: Config, config_path: std::path::PathBuf) -> Result<()> {
    let lock = lockfile::acquire_lock(&config_path).context("failed to acquire the instance lock")?;

    let router = Arc::new(engines::build_router(&config).map_err(|e| anyhow::anyhow!(e))?);
    for entry in router.entries() {
        if !entry.available {
            warn!(engine = %entry.engine, issue = ?entry.issue, "engine unavailable at startup");
        }
    }

    let telegram = config
        .transports
        .telegram
        .clone()
        .context("config is missing a [transports.telegram] table")?;

    let data_dir = data_dir()?;
    let audit = Arc::new(AuditLog::open(data_dir.join("audit.jsonl")).context("failed to open audit log")?);
    let threads = Arc::new(ThreadMap::load(data_dir.join("threads.json")).context("failed to load thread map")?);

    let bot = HttpTelegramBot::new(telegram.bot_token.clone());
    let client = Arc::new(QueuedTelegramClient::new(bot, PRIVATE_CHAT_RPS, GROUP_CHAT_RPS));
    client.set_chat_kind(telegram.chat_id, ChatKind::Private).await;

    let mut ingress = IngressAdapter::new(Arc::clone(&client), telegram.chat_id).with_timeout(LONG_POLL_TIMEOUT_S);
    let identity: BotIdentity = ingress.resolve_identity().await.context("getMe failed")?;
    info!(bot_id = identity.user_id, username = ?identity.username, "resolved bot identity");

    if let Err(err) = client.set_my_commands(command_menu(&router), telegram.chat_id).await {
        warn!(%err, "failed to register command menu");
    }

    let transcriber: Arc<dyn Transcriber> = Arc::new(LocalWhisperTranscriber::new(WhisperConfig::default()));
    let shortcuts = ShortcutSet::new(router.entries().iter().map(|e| e.engine.clone()), std::iter::empty());

    let scheduler_cell: Arc<OnceLock<Arc<ThreadScheduler>>> = Arc::new(OnceLock::new());
    let ctx = Arc::new(RunContext {
        client: Arc::clone(&client),
        router: Arc::clone(&router),
        audit: Arc::clone(&audit),
        threads: Arc::clone(&threads),
        scheduler: Arc::clone(&scheduler_cell),
        project: config.default_workspace.clone(),
    });

    let run_job_fn: RunJob = {
        let ctx = Arc::clone(&ctx);
        Arc::new(move |job: ThreadJob| {
            let ctx = Arc::clone(&ctx);
            Box::pin(run_job(ctx, job))
        })
    };
    let scheduler = Arc::new(ThreadScheduler::new(run_job_fn));
    scheduler_cell
        .set(Arc::clone(&scheduler))
        .unwrap_or_else(|_| unreachable!("scheduler cell set exactly once"));

    info!("takopi bridge running");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                break;
            }
            polled = ingress.poll_once() => {
                let updates = match polled {
                    Ok(updates) => updates,
                    Err(err) => {
                        warn!(%err, "poll failed, backing off");
                        tokio::time::sleep(Duration::from_secs(2)).await;
                        continue;
                    }
                };
                for incoming in updates {
                    let TelegramIncoming::Message(msg) = incoming else { continue };
                    if let Err(err) = handle_incoming(&ctx, &scheduler, &config, &shortcuts, &transcriber, msg).await {
                        error!(%err, "failed to handle incoming message");
                    }
                }
            }
        }
    }

    client.close().await;
    lock.release().context("failed to release instance lock")?;
    Ok(())
}

async fn async_main(cli: Cli) -> Result<()> {
    let Cli { config, verbose: _, command } = cli;

    if let Some(command) = command {
        match command {
            Commands::Completions { shell } => {
                cli::print_completions(shell);
                return Ok(());
            }
            Commands::Daemon { command } => {
                let code = run_daemon_command(command)?;
                std::process::exit(code);
            }
        }
    }

    let config_path = config
        .or_else(cli::default_config_path)
        .context("could not determine a config path; pass --config")?;
    let (config, config_path) = takopi_config::load_telegram_config(&config_path)?;
    run_bridge(config, config_path).await
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let runtime = tokio::runtime::Runtime::new().context("failed to start the async runtime")?;
    match runtime.block_on(async_main(cli)) {
        Ok(()) => Ok(()),
        Err(err) => {
            error!(%err, "takopi exited with an error");
            bail!(err);
        }
    }
}
