// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The audit log itself: an append-only newline-delimited JSON file, one
//! record per line, opened once and held for the runtime's lifetime.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use thiserror::Error;
use tracing::warn;

use crate::record::AuditRecord;
use crate::redact::truncate_and_redact;

/// Default cap on `text` before an ellipsis is appended, chosen to keep one
/// audit line well under typical log-shipping size limits while still
/// showing enough of a message to be useful in an incident review.
pub const DEFAULT_MAX_TEXT_CHARS: usize = 4000;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("opening audit log {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("writing audit record: {0}")]
    Write(#[source] std::io::Error),
    #[error("serializing audit record: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Append-only, mutex-serialized writer for the audit log file.
///
/// One `AuditLog` is shared (typically behind an `Arc`) across every part of
/// the runtime that needs to record something — the mutex gives line-at-a-time
/// atomicity without requiring callers to coordinate among themselves.
pub struct AuditLog {
    file: Mutex<File>,
    max_text_chars: usize,
}

impl AuditLog {
    /// Open (creating if absent) the audit log at `path` for appending.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        Self::open_with_max_text(path, DEFAULT_MAX_TEXT_CHARS)
    }

    pub fn open_with_max_text(path: impl AsRef<Path>, max_text_chars: usize) -> Result<Self, AuditError> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| AuditError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file: Mutex::new(file),
            max_text_chars,
        })
    }

    /// Append one record, truncating and redacting `text` first. Never
    /// panics on a poisoned mutex — a prior panicking writer must not take
    /// the audit log down with it; the log is best-effort, not a primary
    /// data path.
    pub fn append(&self, mut record: AuditRecord) -> Result<(), AuditError> {
        record.text = record
            .text
            .map(|text| truncate_and_redact(&text, self.max_text_chars));

        let mut line = serde_json::to_string(&record).map_err(AuditError::Serialize)?;
        line.push('\n');

        let mut file = match self.file.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("audit log mutex poisoned, recovering and continuing");
                poisoned.into_inner()
            }
        };
        file.write_all(line.as_bytes()).map_err(AuditError::Write)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::AuditKind;
    use chrono::Utc;

    #[test]
    fn appends_one_jsonl_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open(&path).unwrap();

        log.append(AuditRecord::new(AuditKind::IncomingMessage, 1, Utc::now()).with_text("hello"))
            .unwrap();
        log.append(AuditRecord::new(AuditKind::OutgoingMessage, 1, Utc::now()).with_text("world"))
            .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        for line in &lines {
            let value: serde_json::Value = serde_json::from_str(line).unwrap();
            assert!(value.get("ts").is_some());
        }
    }

    #[test]
    fn redacts_and_truncates_text_at_write_time() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let log = AuditLog::open_with_max_text(&path, 5).unwrap();

        log.append(
            AuditRecord::new(AuditKind::IncomingMessage, 1, Utc::now())
                .with_text("hello bot123456789:ABCdefGHI_jklMNOpqrSTUv world"),
        )
        .unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let value: serde_json::Value = serde_json::from_str(content.trim()).unwrap();
        let text = value["text"].as_str().unwrap();
        assert_eq!(text, "hello…");
        assert!(!text.contains("123456789"));
    }

    #[test]
    fn reopening_the_same_path_appends_rather_than_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");

        {
            let log = AuditLog::open(&path).unwrap();
            log.append(AuditRecord::new(AuditKind::RunStarted, 1, Utc::now())).unwrap();
        }
        {
            let log = AuditLog::open(&path).unwrap();
            log.append(AuditRecord::new(AuditKind::RunCompleted, 1, Utc::now())).unwrap();
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 2);
    }
}
