// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::process::Stdio;

use async_trait::async_trait;
use regex::Regex;
use tokio::process::Command;

use takopi_events::{ActionKind, EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

use crate::run_options;
use crate::runner::{EngineRunner, OnEvent, RunResult, RunnerError};
use crate::schemas::cursor::{decode_event, ContentBlock, CursorEvent};

pub const ENGINE: &str = "cursor";

/// Per-run state carried across `cursor-agent`'s JSONL lines: the resume
/// token this run resolves to, and any in-progress thinking text collected
/// so the final answer can fold reasoning into a blockquote the way the
/// renderer expects a single `completed.answer` string.
pub struct CursorRunState {
    pub factory: EventFactory,
    thinking_buffer: String,
    thinking_blocks: Vec<String>,
}

impl CursorRunState {
    fn new(engine: &str) -> Self {
        Self {
            factory: EventFactory::new(engine),
            thinking_buffer: String::new(),
            thinking_blocks: Vec::new(),
        }
    }
}

/// `cursor-agent` needs a pseudo-tty to run non-interactively; `script -qfc
/// "<cmd>" /dev/null` gives it one without actually attaching takopi's own
/// terminal. `build_args` returns the argv for `script`, not for
/// `cursor-agent` directly.
pub struct CursorRunner {
    pub model: Option<String>,
    pub workspace: Option<String>,
}

impl CursorRunner {
    pub fn new(model: Option<String>, workspace: Option<String>) -> Self {
        Self { model, workspace }
    }

    pub fn new_state(&self, _prompt: &str, _resume: Option<ResumeToken>) -> CursorRunState {
        CursorRunState::new(ENGINE)
    }

    fn shell_quote(value: &str) -> String {
        format!("'{}'", value.replace('\'', "'\\''"))
    }

    pub fn build_args(
        &self,
        prompt: &str,
        resume: Option<&ResumeToken>,
        _state: &CursorRunState,
    ) -> Vec<String> {
        let opts = run_options::current();
        let mut parts = vec!["agent".to_string(), "-p".to_string()];

        if let Some(workspace) = &self.workspace {
            parts.push("--workspace".into());
            parts.push(Self::shell_quote(workspace));
        }
        if let Some(model) = opts.model.as_ref().or(self.model.as_ref()) {
            parts.push("--model".into());
            parts.push(Self::shell_quote(model));
        }
        if let Some(resume) = resume {
            parts.push("--resume".into());
            parts.push(Self::shell_quote(&resume.value));
        }
        parts.push(Self::shell_quote(prompt));

        vec!["-qfc".into(), parts.join(" "), "/dev/null".into()]
    }
}

fn render_thinking_blocks(blocks: &[String]) -> String {
    let mut out = String::new();
    for block in blocks {
        out.push_str("> **Thinking**\n");
        for line in block.lines() {
            out.push_str("> ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

/// Translate one decoded [`CursorEvent`] into [`TakopiEvent`]s, folding
/// accumulated thinking text into the eventual `completed.answer`.
pub fn translate_cursor_event(
    event: CursorEvent,
    title: &str,
    state: &mut CursorRunState,
) -> Vec<TakopiEvent> {
    let mut out = Vec::new();
    match event {
        CursorEvent::Session { session_id, .. } => {
            let token = ResumeToken::new(ENGINE, session_id);
            if let Ok(started) = state.factory.started(token, Some(title.to_string()), None) {
                out.push(started);
            }
        }
        CursorEvent::Thinking { subtype, text, .. } => match subtype.as_str() {
            "delta" => {
                if let Some(text) = text {
                    if state.thinking_buffer.is_empty() {
                        out.push(state.factory.action_started(
                            "thinking",
                            ActionKind::Thinking,
                            "Thinking".to_string(),
                            None,
                        ));
                    }
                    state.thinking_buffer.push_str(&text);
                }
            }
            "completed" => {
                out.push(state.factory.action_completed(
                    "thinking",
                    ActionKind::Thinking,
                    "Thinking",
                    None,
                    Some(true),
                    None,
                    None,
                ));
                if !state.thinking_buffer.is_empty() {
                    state
                        .thinking_blocks
                        .push(std::mem::take(&mut state.thinking_buffer));
                }
            }
            _ => {}
        },
        CursorEvent::ToolCall {
            id, name, args, ..
        } => {
            out.push(state.factory.action_started(id, ActionKind::Tool, name, Some(args)));
        }
        CursorEvent::ToolResult { id, ok, output, .. } => {
            out.push(state.factory.action_completed(
                id,
                ActionKind::Tool,
                "",
                output.map(serde_json::Value::String),
                ok,
                None,
                None,
            ));
        }
        CursorEvent::AssistantResponse { message, .. } => {
            for block in message.content {
                if let ContentBlock::Text { text } = block {
                    out.push(state.factory.action_started(
                        "assistant",
                        ActionKind::Note,
                        text,
                        None,
                    ));
                }
            }
        }
        CursorEvent::Result {
            is_error,
            result,
            ..
        } => {
            let preamble = render_thinking_blocks(&state.thinking_blocks);
            let answer = format!("{preamble}{}", result.unwrap_or_default());
            if is_error {
                out.push(state.factory.completed_error(answer));
            } else {
                out.push(state.factory.completed_ok(answer, None));
            }
        }
        CursorEvent::Other => {}
    }
    out
}

fn resume_regex() -> Regex {
    Regex::new(r"agent --resume ([A-Za-z0-9._-]+)").expect("valid regex")
}

#[async_trait]
impl EngineRunner for CursorRunner {
    fn engine(&self) -> &str {
        ENGINE
    }

    fn format_resume(&self, token: &ResumeToken) -> String {
        format!("`agent --resume {}`", token.value)
    }

    fn extract_resume(&self, text: &str) -> Option<ResumeToken> {
        resume_regex()
            .captures(text)
            .map(|caps| ResumeToken::new(ENGINE, caps[1].to_string()))
    }

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        mut on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let mut state = self.new_state(prompt, resume.clone());
        let args = self.build_args(prompt, resume.as_ref(), &state);

        let mut cmd = Command::new("script");
        cmd.args(&args);
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(RunnerError::Spawn)?;
        let stdout = child.stdout.take().expect("piped stdout");
        let stderr = child.stderr.take().expect("piped stderr");

        let stderr_task = tokio::spawn(crate::stream::drain_stderr(stderr, ENGINE));

        let mut result: Option<RunResult> = None;
        let mut lines = tokio::io::AsyncBufReadExt::lines(tokio::io::BufReader::new(stdout));
        while let Some(raw) = lines
            .next_line()
            .await
            .map_err(|e| RunnerError::Process(e.to_string()))?
        {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            let Ok(event) = decode_event(trimmed) else {
                continue;
            };
            for takopi_event in translate_cursor_event(event, "Cursor", &mut state) {
                if let TakopiEvent::Completed {
                    resume: completed_resume,
                    ok,
                    answer,
                    error,
                    ..
                } = &takopi_event
                {
                    result = Some(RunResult {
                        resume: completed_resume
                            .clone()
                            .or_else(|| state.factory.resume().cloned())
                            .unwrap_or_else(|| ResumeToken::new(ENGINE, "unknown")),
                        ok: *ok,
                        answer: answer.clone(),
                        error: error.clone(),
                    });
                }
                on_event(takopi_event).await.map_err(RunnerError::EventHandler)?;
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resume_format_and_extract_round_trip() {
        let runner = CursorRunner::new(None, None);
        let token = ResumeToken::new(ENGINE, "abc-123-def");
        assert_eq!(runner.format_resume(&token), "`agent --resume abc-123-def`");
        assert_eq!(runner.extract_resume("`agent --resume abc-123-def`"), Some(token.clone()));
        assert_eq!(runner.extract_resume("agent --resume abc-123-def"), Some(token));
    }

    #[test]
    fn extract_resume_ignores_other_engines() {
        let runner = CursorRunner::new(None, None);
        assert!(runner.extract_resume("`claude --resume xyz`").is_none());
    }

    #[test]
    fn build_args_new_session_wraps_with_script() {
        let runner = CursorRunner::new(None, Some("/home/user/project".into()));
        let state = runner.new_state("hello", None);
        let args = runner.build_args("hello", None, &state);
        assert_eq!(args[0], "-qfc");
        assert_eq!(args[2], "/dev/null");
        assert!(args[1].contains("agent"));
        assert!(args[1].contains("-p"));
        assert!(args[1].contains("--workspace"));
        assert!(args[1].contains("/home/user/project"));
        assert!(args[1].contains("hello"));
    }

    #[test]
    fn build_args_with_resume() {
        let runner = CursorRunner::new(None, None);
        let resume = ResumeToken::new(ENGINE, "session-abc-123");
        let state = runner.new_state("hi", Some(resume.clone()));
        let args = runner.build_args("hi", Some(&resume), &state);
        assert!(args[1].contains("--resume"));
        assert!(args[1].contains("session-abc-123"));
    }

    #[test]
    fn build_args_with_model() {
        let runner = CursorRunner::new(Some("Claude-4-Opus".into()), None);
        let state = runner.new_state("hi", None);
        let args = runner.build_args("hi", None, &state);
        assert!(args[1].contains("--model"));
        assert!(args[1].contains("Claude-4-Opus"));
    }

    #[test]
    fn translate_thinking_blocks_fold_into_answer() {
        let mut state = CursorRunState::new(ENGINE);
        let mut events = Vec::new();
        events.extend(translate_cursor_event(
            CursorEvent::Thinking {
                subtype: "delta".into(),
                text: Some("Analyzing the request...".into()),
                session_id: "test-session".into(),
                timestamp_ms: Some(1000),
            },
            "Cursor",
            &mut state,
        ));
        events.extend(translate_cursor_event(
            CursorEvent::Thinking {
                subtype: "completed".into(),
                text: None,
                session_id: "test-session".into(),
                timestamp_ms: Some(1100),
            },
            "Cursor",
            &mut state,
        ));
        events.extend(translate_cursor_event(
            CursorEvent::AssistantResponse {
                message: crate::schemas::cursor::AssistantMessage {
                    role: "assistant".into(),
                    content: vec![ContentBlock::Text {
                        text: "Here is the answer.".into(),
                    }],
                },
                session_id: "test-session".into(),
            },
            "Cursor",
            &mut state,
        ));
        events.extend(translate_cursor_event(
            CursorEvent::Result {
                subtype: "success".into(),
                result: Some("Here is the answer.".into()),
                session_id: "test-session".into(),
                duration_ms: Some(500),
                duration_api_ms: Some(400),
                is_error: false,
            },
            "Cursor",
            &mut state,
        ));

        let completed = events
            .iter()
            .find_map(|e| match e {
                TakopiEvent::Completed { ok, answer, .. } => Some((*ok, answer.clone())),
                _ => None,
            })
            .unwrap();
        assert!(completed.0);
        assert!(completed.1.contains("> **"));
        assert!(completed.1.contains("Thinking"));
        assert!(completed.1.contains("Analyzing the request"));
        assert!(completed.1.contains("Here is the answer"));
    }
}
