// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-crate integration tests exercising the bridge pipeline end to end
//! through its public library surface: config parsing, engine routing,
//! thread persistence, scheduling, and the audit log.

use std::sync::Arc;

use chrono::Utc;
use takopi_audit::{AuditKind, AuditLog, AuditRecord};
use takopi_config::{load_telegram_config, parse_workspaces, Config};
use takopi_engine::runners::claude::ClaudeRunner;
use takopi_engine::runners::codex::CodexRunner;
use takopi_engine::EngineRunner;
use takopi_model::{EngineId, ResumeToken, ThreadJob};
use takopi_router::{AutoRouter, RunnerEntry};
use takopi_scheduler::ThreadScheduler;

fn router_with_two_engines() -> AutoRouter {
    let codex: Arc<dyn EngineRunner> = Arc::new(CodexRunner::new("codex", vec![]));
    let claude: Arc<dyn EngineRunner> = Arc::new(ClaudeRunner::new("claude", None));
    AutoRouter::new(
        vec![RunnerEntry::new("codex", codex), RunnerEntry::new("claude", claude)],
        "codex",
    )
    .unwrap()
}

/// A config file on disk, through workspace resolution, down to a router
/// able to dispatch — the shape of bridge startup minus the actual engine
/// exec.
#[test]
fn config_loads_into_workspaces_and_a_dispatchable_router() {
    let config_dir = tempfile::tempdir().unwrap();
    let config_path = config_dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
        default_engine = "codex"

        [transports.telegram]
        bot_token = "123456:ABC-token"
        chat_id = 42

        [workspaces]
        main = "."
        "#,
    )
    .unwrap();

    let (config, loaded_path) = load_telegram_config(&config_path).unwrap();
    assert_eq!(loaded_path, config_path);
    assert_eq!(config.default_engine.as_deref(), Some("codex"));
    let telegram = config.transports.telegram.as_ref().unwrap();
    assert_eq!(telegram.chat_id, 42);

    let workspaces = parse_workspaces(&config, &config_path, false).unwrap();
    assert_eq!(workspaces.len(), 1);
    assert_eq!(workspaces[0].name, "main");

    let router = router_with_two_engines();
    let runner = router.runner_for(None).unwrap();
    assert_eq!(runner.engine(), "codex");
}

/// A reply containing a resume marker should route back to the engine that
/// produced it, and persisting that resolution should survive a reload.
#[test]
fn resume_marker_in_reply_resolves_through_router() {
    let router = router_with_two_engines();
    let token = router.extract_resume(Some("resume: claude:session-9")).unwrap();
    assert_eq!(token, ResumeToken::new("claude", "session-9"));

    let runner = router.runner_for(Some(&token)).unwrap();
    assert_eq!(runner.engine(), "claude");
}

/// Two turns on the same resume token must execute strictly in order even
/// when enqueued back to back, and the audit log must carry one record per
/// turn with a consistent chat id.
#[tokio::test]
async fn scheduler_serializes_turns_and_audit_log_records_each_one() {
    let audit_dir = tempfile::tempdir().unwrap();
    let audit = Arc::new(AuditLog::open(audit_dir.path().join("audit.jsonl")).unwrap());

    let seen = Arc::new(std::sync::Mutex::new(Vec::new()));
    let audit_for_job = Arc::clone(&audit);
    let seen_for_job = Arc::clone(&seen);
    let run_job: takopi_scheduler::RunJob = Arc::new(move |job: ThreadJob| {
        let audit = Arc::clone(&audit_for_job);
        let seen = Arc::clone(&seen_for_job);
        Box::pin(async move {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            audit
                .append(
                    AuditRecord::new(AuditKind::RunCompleted, job.chat_id, Utc::now())
                        .with_message_id(job.user_msg_id)
                        .with_text(job.text.clone()),
                )
                .unwrap();
            seen.lock().unwrap().push(job.text);
        })
    });

    let scheduler = ThreadScheduler::new(run_job);
    let token = ResumeToken::new("codex", "shared-session");

    scheduler
        .enqueue(ThreadJob::new(1, 100, "first").with_resume(Some(token.clone())))
        .await;
    scheduler
        .enqueue(ThreadJob::new(1, 101, "second").with_resume(Some(token)))
        .await;

    tokio::time::sleep(std::time::Duration::from_millis(60)).await;

    assert_eq!(seen.lock().unwrap().as_slice(), ["first", "second"]);

    let content = std::fs::read_to_string(audit_dir.path().join("audit.jsonl")).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        let value: serde_json::Value = serde_json::from_str(line).unwrap();
        assert_eq!(value["kind"], "run_completed");
        assert_eq!(value["chat_id"], 1);
    }
}

/// A bot token embedded in audited text must never reach disk unredacted,
/// regardless of which part of the pipeline produced the text.
#[test]
fn audit_log_redacts_bot_tokens_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let log = AuditLog::open(dir.path().join("audit.jsonl")).unwrap();

    log.append(
        AuditRecord::new(AuditKind::OutgoingMessage, 1, Utc::now())
            .with_text("https://api.telegram.org/bot123456789:ABCdefGHIjklMNOpqrSTUvwxYZ012345678/sendMessage"),
    )
    .unwrap();

    let content = std::fs::read_to_string(dir.path().join("audit.jsonl")).unwrap();
    assert!(!content.contains("ABCdefGHIjklMNOpqrSTUvwxYZ012345678"));
}

/// An engine marked unavailable at router-construction time must still
/// participate in resume-marker recognition (a reply can still name it) but
/// refuse dispatch.
#[test]
fn unavailable_engine_still_recognized_but_not_dispatchable() {
    let codex: Arc<dyn EngineRunner> = Arc::new(CodexRunner::new("codex", vec![]));
    let claude: Arc<dyn EngineRunner> = Arc::new(ClaudeRunner::new("claude", None));
    let router = AutoRouter::new(
        vec![
            RunnerEntry::new("codex", codex),
            RunnerEntry::new("claude", claude).unavailable("`claude` was not found on PATH"),
        ],
        "codex",
    )
    .unwrap();

    let token = router.extract_resume(Some("resume: claude:old-session")).unwrap();
    assert_eq!(token.engine, EngineId::new("claude"));

    let err = router.runner_for(Some(&token)).unwrap_err();
    assert!(err.to_string().contains("not found on PATH"));
}

/// A minimal config with no engine-specific tables must still parse and
/// fall back to every documented default.
#[test]
fn config_defaults_apply_when_file_is_nearly_empty() {
    let config = Config::default();
    assert!(config.default_engine.is_none());
    assert!(config.transports.telegram.is_none());
    assert!(config.workspaces.is_empty());
}
