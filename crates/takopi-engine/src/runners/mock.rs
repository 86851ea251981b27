// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use takopi_events::{EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

use crate::runner::{EngineRunner, OnEvent, RunResult, RunnerError};

/// One scripted step a [`ScriptRunner`] replays.
pub enum ScriptStep {
    /// Emit a pre-built event verbatim, bypassing the run's own factory —
    /// useful for asserting a translator passes an engine-native event
    /// through untouched.
    Emit(TakopiEvent),
    /// End the run successfully with `answer`.
    Return { answer: String },
    /// End the run with a failure.
    Fail { error: String },
}

/// A fake [`EngineRunner`] that replays a fixed script instead of spawning a
/// subprocess — the contract-testing double every real runner is checked
/// against (it must behave exactly like this one: `session.started` first,
/// scripted events in order, exactly one terminal `completed`).
pub struct ScriptRunner {
    engine: String,
    resume_value: String,
    script: Vec<ScriptStep>,
}

impl ScriptRunner {
    pub fn new(script: Vec<ScriptStep>, engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            resume_value: "mock-session".to_string(),
            script,
        }
    }

    pub fn with_resume_value(mut self, value: impl Into<String>) -> Self {
        self.resume_value = value.into();
        self
    }
}

#[async_trait]
impl EngineRunner for ScriptRunner {
    fn engine(&self) -> &str {
        &self.engine
    }

    async fn run(
        &self,
        _prompt: &str,
        resume: Option<ResumeToken>,
        mut on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let mut factory = EventFactory::new(self.engine.as_str());
        let token = resume.unwrap_or_else(|| ResumeToken::new(self.engine.as_str(), &self.resume_value));

        let started = factory
            .started(token.clone(), None, None)
            .map_err(|e| RunnerError::Process(e.to_string()))?;
        on_event(started).await.map_err(RunnerError::EventHandler)?;

        for step in &self.script {
            match step {
                ScriptStep::Emit(event) => {
                    on_event(event.clone()).await.map_err(RunnerError::EventHandler)?;
                }
                ScriptStep::Return { answer } => {
                    let completed = factory.completed_ok(answer.clone(), None);
                    on_event(completed).await.map_err(RunnerError::EventHandler)?;
                    return Ok(RunResult {
                        resume: token,
                        ok: true,
                        answer: answer.clone(),
                        error: None,
                    });
                }
                ScriptStep::Fail { error } => {
                    let completed = factory.completed_error(error.clone());
                    on_event(completed).await.map_err(RunnerError::EventHandler)?;
                    return Ok(RunResult {
                        resume: token,
                        ok: false,
                        answer: String::new(),
                        error: Some(error.clone()),
                    });
                }
            }
        }

        Err(RunnerError::NoOutput)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use takopi_events::{ActionInfo, ActionKind};
    use takopi_model::EngineId;

    fn action_started(id: &str, kind: ActionKind, title: &str) -> TakopiEvent {
        TakopiEvent::ActionStarted {
            engine: EngineId::new("codex"),
            action: ActionInfo {
                id: id.to_string(),
                kind,
                title: title.to_string(),
                detail: None,
            },
        }
    }

    fn action_completed(id: &str, kind: ActionKind, title: &str, ok: bool) -> TakopiEvent {
        TakopiEvent::ActionCompleted {
            engine: EngineId::new("codex"),
            action: ActionInfo {
                id: id.to_string(),
                kind,
                title: title.to_string(),
                detail: None,
            },
            ok: Some(ok),
            message: None,
            level: None,
        }
    }

    #[tokio::test]
    async fn session_started_is_first_and_order_is_preserved() {
        let script = vec![
            ScriptStep::Emit(action_started("a-1", ActionKind::Command, "echo ok")),
            ScriptStep::Emit(action_completed("a-1", ActionKind::Command, "echo ok", true)),
            ScriptStep::Return {
                answer: "done".into(),
            },
        ];
        let runner = ScriptRunner::new(script, "codex").with_resume_value("abc123");

        let seen = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let on_event: OnEvent<'_> = Box::new(move |event| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.lock().await.push(event);
                Ok(())
            })
        });

        let result = runner.run("hi", None, on_event).await.unwrap();
        let seen = seen.lock().await;

        assert!(matches!(seen[0], TakopiEvent::SessionStarted { .. }));
        assert!(matches!(seen[1], TakopiEvent::ActionStarted { .. }));
        assert!(matches!(seen[2], TakopiEvent::ActionCompleted { .. }));
        assert!(matches!(seen[3], TakopiEvent::Completed { .. }));
        assert_eq!(result.resume.value, "abc123");
    }

    #[tokio::test]
    async fn resume_matches_session_started() {
        let runner = ScriptRunner::new(
            vec![ScriptStep::Return {
                answer: "ok".into(),
            }],
            "codex",
        )
        .with_resume_value("sid");

        let seen = std::sync::Arc::new(tokio::sync::Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let on_event: OnEvent<'_> = Box::new(move |event| {
            let seen = seen_clone.clone();
            Box::pin(async move {
                seen.lock().await.push(event);
                Ok(())
            })
        });

        let result = runner.run("hello", None, on_event).await.unwrap();
        let seen = seen.lock().await;
        let session = seen
            .iter()
            .find(|e| matches!(e, TakopiEvent::SessionStarted { .. }))
            .unwrap();
        match session {
            TakopiEvent::SessionStarted { resume, .. } => assert_eq!(resume, &result.resume),
            _ => unreachable!(),
        }
    }

    #[tokio::test]
    async fn event_handler_error_aborts_the_run() {
        let runner = ScriptRunner::new(
            vec![ScriptStep::Return {
                answer: "ok".into(),
            }],
            "codex",
        );

        let on_event: OnEvent<'_> =
            Box::new(|_event| Box::pin(async move { Err(anyhow::anyhow!("boom")) }));

        let err = runner.run("hello", None, on_event).await.unwrap_err();
        assert!(matches!(err, RunnerError::EventHandler(_)));
        assert!(err.to_string().contains("boom"));
    }
}
