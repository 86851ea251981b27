// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use chrono::{DateTime, Utc};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

/// What a record documents. An open set, like [`takopi_events::ActionKind`] —
/// new transports and engines introduce kinds this crate has never seen, and
/// the audit log must not refuse to write them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuditKind {
    IncomingMessage,
    OutgoingMessage,
    Action,
    RunStarted,
    RunCompleted,
    Other(String),
}

impl AuditKind {
    pub fn as_str(&self) -> &str {
        match self {
            AuditKind::IncomingMessage => "incoming_message",
            AuditKind::OutgoingMessage => "outgoing_message",
            AuditKind::Action => "action",
            AuditKind::RunStarted => "run_started",
            AuditKind::RunCompleted => "run_completed",
            AuditKind::Other(raw) => raw,
        }
    }
}

impl From<&str> for AuditKind {
    fn from(value: &str) -> Self {
        match value {
            "incoming_message" => AuditKind::IncomingMessage,
            "outgoing_message" => AuditKind::OutgoingMessage,
            "action" => AuditKind::Action,
            "run_started" => AuditKind::RunStarted,
            "run_completed" => AuditKind::RunCompleted,
            other => AuditKind::Other(other.to_string()),
        }
    }
}

impl Serialize for AuditKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for AuditKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer).map_err(D::Error::custom)?;
        Ok(AuditKind::from(raw.as_str()))
    }
}

/// One append-only audit line: `(kind, chat_id, thread_id, message_id,
/// engine, project, text, meta, ts)` per §6.
///
/// `text` carries the raw (untruncated, unredacted) value; [`crate::AuditLog::append`]
/// applies truncation and redaction at write time, so every record that
/// reaches disk has gone through the same gate regardless of call site.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub kind: AuditKind,
    pub chat_id: i64,
    pub thread_id: Option<i64>,
    pub message_id: Option<i64>,
    pub engine: Option<String>,
    pub project: Option<String>,
    pub text: Option<String>,
    pub meta: Option<Value>,
    pub ts: DateTime<Utc>,
}

impl AuditRecord {
    pub fn new(kind: AuditKind, chat_id: i64, ts: DateTime<Utc>) -> Self {
        Self {
            kind,
            chat_id,
            thread_id: None,
            message_id: None,
            engine: None,
            project: None,
            text: None,
            meta: None,
            ts,
        }
    }

    pub fn with_thread_id(mut self, thread_id: i64) -> Self {
        self.thread_id = Some(thread_id);
        self
    }

    pub fn with_message_id(mut self, message_id: i64) -> Self {
        self.message_id = Some(message_id);
        self
    }

    pub fn with_engine(mut self, engine: impl Into<String>) -> Self {
        self.engine = Some(engine.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_meta(mut self, meta: Value) -> Self {
        self.meta = Some(meta);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_json() {
        let record = AuditRecord::new(AuditKind::IncomingMessage, 1, Utc::now()).with_text("hi");
        let json = serde_json::to_string(&record).unwrap();
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, AuditKind::IncomingMessage);
        assert_eq!(back.text.as_deref(), Some("hi"));
    }

    #[test]
    fn unrecognized_kind_round_trips_as_other() {
        let record = AuditRecord::new(AuditKind::from("media_forwarded"), 1, Utc::now());
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"media_forwarded\""));
        let back: AuditRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.kind, AuditKind::Other("media_forwarded".to_string()));
    }
}
