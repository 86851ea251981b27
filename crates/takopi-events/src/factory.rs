// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;
use thiserror::Error;

use takopi_model::{EngineId, ResumeToken};

use crate::event::{ActionInfo, ActionKind, TakopiEvent};

/// Errors raised when a translator violates the per-run resume-token
/// invariant (I1, I3). These are programmer errors in a translator, not
/// runtime conditions callers are expected to recover from — they mirror
/// the `RuntimeError` raised by the reference factory.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventFactoryError {
    #[error("resume token is for engine {token_engine}, but this factory is bound to {bound_engine}")]
    EngineMismatch {
        bound_engine: String,
        token_engine: String,
    },
    #[error("resume token mismatch: already started with a different token")]
    ResumeMismatch,
}

/// Stateful per-run object bound to one [`EngineId`].
///
/// Centralizes the per-run resume-token invariant so engine-specific
/// translators never have to be trusted to maintain it themselves: call
/// [`EventFactory::started`] once, then [`EventFactory::action_started`]/
/// [`EventFactory::action_updated`]/[`EventFactory::action_completed`] any
/// number of times, then exactly one of [`EventFactory::completed`],
/// [`EventFactory::completed_ok`], or [`EventFactory::completed_error`].
pub struct EventFactory {
    engine: EngineId,
    resume: Option<ResumeToken>,
}

impl EventFactory {
    pub fn new(engine: impl Into<EngineId>) -> Self {
        Self {
            engine: engine.into(),
            resume: None,
        }
    }

    pub fn engine(&self) -> &EngineId {
        &self.engine
    }

    /// The resume token memoized by a prior [`EventFactory::started`] call,
    /// if any.
    pub fn resume(&self) -> Option<&ResumeToken> {
        self.resume.as_ref()
    }

    /// Emit `session.started`, memoizing its resume token.
    ///
    /// Errors if `token.engine` doesn't match this factory's engine, or if
    /// a different token was already memoized by an earlier call.
    pub fn started(
        &mut self,
        token: ResumeToken,
        title: Option<String>,
        meta: Option<Value>,
    ) -> Result<TakopiEvent, EventFactoryError> {
        if token.engine != self.engine {
            return Err(EventFactoryError::EngineMismatch {
                bound_engine: self.engine.to_string(),
                token_engine: token.engine.to_string(),
            });
        }
        if let Some(existing) = &self.resume {
            if existing != &token {
                return Err(EventFactoryError::ResumeMismatch);
            }
        }
        self.resume = Some(token.clone());
        Ok(TakopiEvent::SessionStarted {
            engine: self.engine.clone(),
            resume: token,
            title,
            meta,
        })
    }

    pub fn action_started(
        &self,
        action_id: impl Into<String>,
        kind: impl Into<ActionKind>,
        title: impl Into<String>,
        detail: Option<Value>,
    ) -> TakopiEvent {
        TakopiEvent::ActionStarted {
            engine: self.engine.clone(),
            action: ActionInfo {
                id: action_id.into(),
                kind: kind.into(),
                title: title.into(),
                detail,
            },
        }
    }

    pub fn action_updated(
        &self,
        action_id: impl Into<String>,
        kind: impl Into<ActionKind>,
        title: impl Into<String>,
        detail: Option<Value>,
    ) -> TakopiEvent {
        TakopiEvent::ActionUpdated {
            engine: self.engine.clone(),
            action: ActionInfo {
                id: action_id.into(),
                kind: kind.into(),
                title: title.into(),
                detail,
            },
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn action_completed(
        &self,
        action_id: impl Into<String>,
        kind: impl Into<ActionKind>,
        title: impl Into<String>,
        detail: Option<Value>,
        ok: Option<bool>,
        message: Option<String>,
        level: Option<String>,
    ) -> TakopiEvent {
        TakopiEvent::ActionCompleted {
            engine: self.engine.clone(),
            action: ActionInfo {
                id: action_id.into(),
                kind: kind.into(),
                title: title.into(),
                detail,
            },
            ok,
            message,
            level,
        }
    }

    /// Emit `completed`. If `started` was ever called, `resume` is forced
    /// to the stored token regardless of what the translator passes — this
    /// is the crux of I1.
    pub fn completed(
        &self,
        ok: bool,
        answer: impl Into<String>,
        error: Option<String>,
        usage: Option<Value>,
    ) -> TakopiEvent {
        TakopiEvent::Completed {
            engine: self.engine.clone(),
            resume: self.resume.clone(),
            ok,
            answer: answer.into(),
            error,
            usage,
        }
    }

    pub fn completed_ok(&self, answer: impl Into<String>, usage: Option<Value>) -> TakopiEvent {
        self.completed(true, answer, None, usage)
    }

    pub fn completed_error(&self, error: impl Into<String>) -> TakopiEvent {
        self.completed(false, "", Some(error.into()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_has_no_resume() {
        let factory = EventFactory::new("codex");
        assert_eq!(factory.engine().as_str(), "codex");
        assert!(factory.resume().is_none());
    }

    #[test]
    fn started_sets_resume() {
        let mut factory = EventFactory::new("codex");
        let token = ResumeToken::new("codex", "abc123");

        let event = factory
            .started(token.clone(), Some("Test".into()), None)
            .unwrap();

        assert_eq!(factory.resume(), Some(&token));
        match event {
            TakopiEvent::SessionStarted {
                engine,
                resume,
                title,
                ..
            } => {
                assert_eq!(engine.as_str(), "codex");
                assert_eq!(resume, token);
                assert_eq!(title.as_deref(), Some("Test"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn started_engine_mismatch_errors() {
        let mut factory = EventFactory::new("codex");
        let token = ResumeToken::new("claude", "abc123");
        let err = factory.started(token, None, None).unwrap_err();
        assert!(matches!(err, EventFactoryError::EngineMismatch { .. }));
    }

    #[test]
    fn started_resume_mismatch_errors() {
        let mut factory = EventFactory::new("codex");
        factory
            .started(ResumeToken::new("codex", "abc123"), None, None)
            .unwrap();
        let err = factory
            .started(ResumeToken::new("codex", "def456"), None, None)
            .unwrap_err();
        assert_eq!(err, EventFactoryError::ResumeMismatch);
    }

    #[test]
    fn started_with_same_token_twice_is_idempotent() {
        let mut factory = EventFactory::new("codex");
        let token = ResumeToken::new("codex", "abc123");
        factory.started(token.clone(), None, None).unwrap();
        factory.started(token.clone(), None, None).unwrap();
        assert_eq!(factory.resume(), Some(&token));
    }

    #[test]
    fn action_started_carries_fields() {
        let factory = EventFactory::new("codex");
        let event = factory.action_started("a1", "tool", "Running command", None);
        match event {
            TakopiEvent::ActionStarted { action, .. } => {
                assert_eq!(action.id, "a1");
                assert_eq!(action.kind, ActionKind::Tool);
                assert_eq!(action.title, "Running command");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn action_completed_carries_ok_and_message() {
        let factory = EventFactory::new("codex");
        let event =
            factory.action_completed("a1", "tool", "Finished", None, Some(true), Some("Success".into()), Some("info".into()));
        match event {
            TakopiEvent::ActionCompleted { ok, message, level, .. } => {
                assert_eq!(ok, Some(true));
                assert_eq!(message.as_deref(), Some("Success"));
                assert_eq!(level.as_deref(), Some("info"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completed_uses_stored_resume() {
        let mut factory = EventFactory::new("codex");
        let token = ResumeToken::new("codex", "abc123");
        factory.started(token.clone(), None, None).unwrap();

        let event = factory.completed(true, "Done", None, None);
        match event {
            TakopiEvent::Completed { resume, .. } => assert_eq!(resume, Some(token)),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completed_ok_sets_answer_and_usage() {
        let factory = EventFactory::new("codex");
        let usage = serde_json::json!({"tokens": 100});
        let event = factory.completed_ok("All good", Some(usage.clone()));
        match event {
            TakopiEvent::Completed { ok, answer, usage: u, .. } => {
                assert!(ok);
                assert_eq!(answer, "All good");
                assert_eq!(u, Some(usage));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completed_error_sets_empty_answer() {
        let factory = EventFactory::new("codex");
        let event = factory.completed_error("Something went wrong");
        match event {
            TakopiEvent::Completed { ok, answer, error, .. } => {
                assert!(!ok);
                assert_eq!(answer, "");
                assert_eq!(error.as_deref(), Some("Something went wrong"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn completed_without_started_has_no_resume() {
        let factory = EventFactory::new("codex");
        let event = factory.completed_error("crashed before session.started");
        match event {
            TakopiEvent::Completed { resume, .. } => assert!(resume.is_none()),
            other => panic!("unexpected event: {other:?}"),
        }
    }
}
