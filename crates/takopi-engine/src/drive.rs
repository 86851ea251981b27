// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::Notify;
use tracing::debug;

use takopi_events::{EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

use crate::process::terminate;
use crate::runner::{OnEvent, RunResult, RunnerError};

/// Spawn `cmd`, write `prompt` to its stdin if given, and fold its stdout
/// JSONL through `translate` — dispatching each produced [`TakopiEvent`] to
/// `on_event` as soon as it's parsed (not buffered to the end) so a caller
/// streaming live progress sees it immediately.
///
/// Shared by every per-engine runner (§4.A) so the process lifecycle —
/// isolate, feed stdin, drain stderr to the debug log, reap the child —
/// is identical regardless of which engine CLI is behind it; only
/// `translate` differs.
pub async fn drive(
    engine: &'static str,
    cmd: Command,
    prompt: Option<&str>,
    on_event: OnEvent<'_>,
    translate: impl FnMut(&mut EventFactory, &Value) -> Vec<TakopiEvent>,
) -> Result<RunResult, RunnerError> {
    drive_cancelable(engine, cmd, prompt, on_event, translate, None).await
}

/// Like [`drive`], but cooperatively aborts the run (I6: soft-terminate,
/// then hard-kill past the grace window) when `cancel` fires — used to
/// back a user-issued stop command.
pub async fn drive_cancelable(
    engine: &'static str,
    mut cmd: Command,
    prompt: Option<&str>,
    mut on_event: OnEvent<'_>,
    mut translate: impl FnMut(&mut EventFactory, &Value) -> Vec<TakopiEvent>,
    cancel: Option<Arc<Notify>>,
) -> Result<RunResult, RunnerError> {
    let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;

    if let Some(prompt) = prompt {
        if let Some(mut stdin) = child.stdin.take() {
            let prompt = prompt.to_string();
            tokio::spawn(async move {
                let _ = stdin.write_all(prompt.as_bytes()).await;
                let _ = stdin.shutdown().await;
            });
        }
    }

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let stderr_task = tokio::spawn(async move {
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(engine, stderr = %line, "engine stderr");
        }
    });

    let mut factory = EventFactory::new(engine);
    let mut result: Option<RunResult> = None;

    let mut lines = BufReader::new(stdout).lines();
    loop {
        let next = if let Some(cancel) = &cancel {
            tokio::select! {
                next = lines.next_line() => next.map_err(|e| RunnerError::Process(e.to_string()))?,
                _ = cancel.notified() => {
                    let _ = stderr_task.await;
                    terminate(&mut child).await;
                    return Err(RunnerError::Process("run cancelled".into()));
                }
            }
        } else {
            lines
                .next_line()
                .await
                .map_err(|e| RunnerError::Process(e.to_string()))?
        };
        let Some(raw) = next else { break };
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        debug!(engine, line = %trimmed, "jsonl");
        let Ok(data) = serde_json::from_str::<Value>(trimmed) else {
            debug!(engine, line = %trimmed, "invalid json line");
            continue;
        };
        for event in translate(&mut factory, &data) {
            if let TakopiEvent::Completed {
                resume,
                ok,
                answer,
                error,
                ..
            } = &event
            {
                result = Some(RunResult {
                    resume: resume
                        .clone()
                        .or_else(|| factory.resume().cloned())
                        .unwrap_or_else(|| ResumeToken::new(engine, "unknown")),
                    ok: *ok,
                    answer: answer.clone(),
                    error: error.clone(),
                });
            }
            on_event(event).await.map_err(RunnerError::EventHandler)?;
        }
    }

    let _ = stderr_task.await;
    let status = child
        .wait()
        .await
        .map_err(|e| RunnerError::Process(e.to_string()))?;

    match result {
        Some(result) => Ok(result),
        None if status.success() => Err(RunnerError::NoOutput),
        None => Err(RunnerError::Process(format!(
            "engine process exited with {status}"
        ))),
    }
}
