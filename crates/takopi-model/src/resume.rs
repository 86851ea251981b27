// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque short identifier for one engine backend (e.g. `"codex"`).
///
/// Process-wide unique and immutable; interned as a plain `String` rather
/// than an enum so that new engines can be configured without a code change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EngineId(String);

impl EngineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EngineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EngineId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for EngineId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl AsRef<str> for EngineId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Opaque handle identifying one engine-side session.
///
/// Two tokens are equal iff both `engine` and `value` are equal. A token is
/// only ever emitted by the engine runner that produced the session — see
/// [`takopi_events::EventFactory`] for the invariant this enforces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResumeToken {
    pub engine: EngineId,
    pub value: String,
}

impl ResumeToken {
    pub fn new(engine: impl Into<EngineId>, value: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            value: value.into(),
        }
    }

    /// The scheduler's unit of serialization: `engine:value`.
    pub fn thread_key(&self) -> ThreadKey {
        ThreadKey(format!("{}:{}", self.engine, self.value))
    }
}

/// `engine:value` — the chat-side identity of a logical conversation.
///
/// Created when the first run completes in a chat thread; never destroyed
/// (soft-expired by an LRU in whatever persists it, e.g. the per-chat
/// thread map).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ThreadKey(String);

impl ThreadKey {
    pub fn new(engine: &EngineId, value: &str) -> Self {
        Self(format!("{engine}:{value}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ThreadKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
