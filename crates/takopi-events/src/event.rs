// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use takopi_model::{EngineId, ResumeToken};

/// The kind of a sub-step within one engine run.
///
/// This is an open set: engines surface kinds we've never seen (new tool
/// categories, future action types) and those must not crash the renderer.
/// `Other` carries the raw string through; consumers that don't recognize
/// it fall back to rendering it like `Note`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Command,
    Tool,
    WebSearch,
    FileChange,
    Note,
    Thinking,
    Other(String),
}

// Plain-string wire form (`"command"`, `"web_search"`, an unrecognized
// engine-specific string, ...) rather than the derive-generated
// `{"Command": null}` shape — `ActionKind` is a string in every engine's
// wire protocol, so the Rust type should round-trip as one.
impl Serialize for ActionKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ActionKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(ActionKind::from(raw.as_str()))
    }
}

impl ActionKind {
    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Command => "command",
            ActionKind::Tool => "tool",
            ActionKind::WebSearch => "web_search",
            ActionKind::FileChange => "file_change",
            ActionKind::Note => "note",
            ActionKind::Thinking => "thinking",
            ActionKind::Other(raw) => raw,
        }
    }
}

impl From<&str> for ActionKind {
    fn from(value: &str) -> Self {
        match value {
            "command" => ActionKind::Command,
            "tool" => ActionKind::Tool,
            "web_search" => ActionKind::WebSearch,
            "file_change" => ActionKind::FileChange,
            "note" => ActionKind::Note,
            "thinking" => ActionKind::Thinking,
            other => ActionKind::Other(other.to_string()),
        }
    }
}

/// A single sub-step within one engine run: a command execution, tool call,
/// web search, file edit, or free-form note.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionInfo {
    pub id: String,
    pub kind: ActionKind,
    pub title: String,
    pub detail: Option<Value>,
}

/// The canonical, engine-independent event stream (§3).
///
/// Ordering guarantees (I1–I3) are enforced by [`crate::EventFactory`], not
/// by this type — `TakopiEvent` itself is a plain data carrier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TakopiEvent {
    #[serde(rename = "session.started")]
    SessionStarted {
        engine: EngineId,
        resume: ResumeToken,
        title: Option<String>,
        meta: Option<Value>,
    },
    #[serde(rename = "action.started")]
    ActionStarted {
        engine: EngineId,
        action: ActionInfo,
    },
    #[serde(rename = "action.updated")]
    ActionUpdated {
        engine: EngineId,
        action: ActionInfo,
    },
    #[serde(rename = "action.completed")]
    ActionCompleted {
        engine: EngineId,
        action: ActionInfo,
        ok: Option<bool>,
        message: Option<String>,
        level: Option<String>,
    },
    #[serde(rename = "completed")]
    Completed {
        engine: EngineId,
        /// `None` only when the run crashed before any `session.started`
        /// was ever observed — there is no token to preserve. See I1: when
        /// `session.started` was emitted, this always equals its `resume`.
        resume: Option<ResumeToken>,
        ok: bool,
        answer: String,
        error: Option<String>,
        usage: Option<Value>,
    },
    /// An event kind the translator didn't recognize. The renderer reports
    /// these as "not handled" and otherwise ignores them (§4.D rule).
    #[serde(other)]
    Unknown,
}

impl TakopiEvent {
    pub fn engine(&self) -> Option<&EngineId> {
        match self {
            TakopiEvent::SessionStarted { engine, .. }
            | TakopiEvent::ActionStarted { engine, .. }
            | TakopiEvent::ActionUpdated { engine, .. }
            | TakopiEvent::ActionCompleted { engine, .. }
            | TakopiEvent::Completed { engine, .. } => Some(engine),
            TakopiEvent::Unknown => None,
        }
    }
}
