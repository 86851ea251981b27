// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use takopi_events::{ActionKind, EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

use crate::drive::drive;
use crate::process::isolated_command;
use crate::run_options;
use crate::runner::{EngineRunner, OnEvent, RunResult, RunnerError};
use crate::translate::translate_generic;

pub const ENGINE: &str = "pi";

/// One decoded line of `pi`'s session JSONL. `pi` identifies a session by
/// the path of the transcript file it's appending to, not by a UUID the
/// process prints — [`PiStreamState::resume`] carries that path.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum PiEvent {
    #[serde(rename = "message_end")]
    MessageEnd { message: Value },
    #[serde(other)]
    Other,
}

/// Per-run state carried across `pi` JSONL lines: the resume token this
/// run's transcript file resolves to.
pub struct PiStreamState {
    pub resume: ResumeToken,
}

/// Working directory a fresh `pi` run was launched from. Only meaningful
/// the first time a session starts — once resumed, the transcript already
/// encodes its own working directory and restating it would be misleading
/// if takopi's cwd has since changed.
fn run_base_dir() -> PathBuf {
    std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub struct PiRunner {
    pub extra_args: Vec<String>,
    pub model: Option<String>,
    pub provider: Option<String>,
}

impl PiRunner {
    pub fn new(extra_args: Vec<String>, model: Option<String>, provider: Option<String>) -> Self {
        Self {
            extra_args,
            model,
            provider,
        }
    }

    pub fn build_args(&self, _prompt: &str, resume: Option<&ResumeToken>, _state: &PiStreamState) -> Vec<String> {
        let opts = run_options::current();
        let mut args = self.extra_args.clone();

        if let Some(model) = opts.model.as_ref().or(self.model.as_ref()) {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(provider) = &self.provider {
            args.push("--provider".into());
            args.push(provider.clone());
        }
        if let Some(resume) = resume {
            args.push("--resume".into());
            args.push(resume.value.clone());
        }
        args
    }

    /// Translate one decoded `pi` event into [`TakopiEvent`]s.
    ///
    /// `resume` is the token the *caller* asked to resume, `None` for a
    /// fresh session. `found_session` is `Some` once this run has already
    /// emitted `session.started` for `state.resume` — further messages
    /// don't restate it.
    pub fn translate(
        &self,
        event: PiEvent,
        state: &PiStreamState,
        resume: Option<&ResumeToken>,
        found_session: Option<&Path>,
    ) -> Vec<TakopiEvent> {
        let mut factory = EventFactory::new(ENGINE);
        let mut out = Vec::new();

        match event {
            PiEvent::MessageEnd { message } => {
                if found_session.is_none() {
                    let mut meta = serde_json::Map::new();
                    if resume.is_none() {
                        meta.insert(
                            "run_base_dir".into(),
                            json!(run_base_dir().display().to_string()),
                        );
                    }
                    let meta_value = if meta.is_empty() {
                        None
                    } else {
                        Some(Value::Object(meta))
                    };
                    if let Ok(started) = factory.started(state.resume.clone(), None, meta_value) {
                        out.push(started);
                    }
                }

                if let Some(content) = message.get("content").and_then(Value::as_array) {
                    for block in content {
                        if let Some(text) = block.get("text").and_then(Value::as_str) {
                            out.push(factory.action_started(
                                "assistant",
                                ActionKind::Note,
                                text.to_string(),
                                None,
                            ));
                        }
                    }
                }
            }
            PiEvent::Other => {}
        }
        out
    }
}

#[async_trait]
impl EngineRunner for PiRunner {
    fn engine(&self) -> &str {
        ENGINE
    }

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let state = PiStreamState {
            resume: resume
                .clone()
                .unwrap_or_else(|| ResumeToken::new(ENGINE, "session.jsonl")),
        };
        let args = self.build_args(prompt, resume.as_ref(), &state);
        let cmd = isolated_command("pi", &args);
        let mut found_session = false;
        drive(ENGINE, cmd, Some(prompt), on_event, move |factory, value| {
            let mut events = match serde_json::from_value::<PiEvent>(value.clone()) {
                Ok(event) => self.translate(
                    event,
                    &state,
                    resume.as_ref(),
                    found_session.then_some(Path::new("")),
                ),
                Err(_) => Vec::new(),
            };
            if events.iter().any(|e| matches!(e, TakopiEvent::SessionStarted { .. })) {
                found_session = true;
                // Mirror the started state into the shared factory so a
                // later generic "result"/"done" line can close out the run
                // through the normal resume-token invariant.
                let _ = factory.started(state.resume.clone(), None, None);
            }
            if let Some("result") | Some("done") | Some("completed") =
                value.get("type").and_then(Value::as_str)
            {
                events.extend(translate_generic(factory, value, "session_id"));
            }
            events
        })
        .await
    }
}
