// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Per-chat thread-key persistence (§4.G step 3 "Identify thread"): maps
//! `(chat_id, project, transport thread_id)` to the [`ResumeToken`] that
//! last completed in that thread, so a reply in an already-known thread
//! resumes the same engine session instead of starting fresh. Backed by a
//! small JSON file, written atomically via a temp-file-then-rename so a
//! crash mid-write never corrupts the map the way a truncate-in-place
//! would.
//!
//! No dedicated source in `original_source/` covers this persistence —
//! `test_workspaces.py` is about git-worktree bookkeeping, not thread
//! identity. The atomic-write shape here follows the `tempfile` crate's
//! own documented `persist` idiom rather than a specific teacher file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use takopi_model::{EngineId, ResumeToken};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThreadMapError {
    #[error("io error on thread map {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed thread map {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredToken {
    engine: String,
    value: String,
}

impl From<&ResumeToken> for StoredToken {
    fn from(token: &ResumeToken) -> Self {
        Self {
            engine: token.engine.as_str().to_string(),
            value: token.value.clone(),
        }
    }
}

impl From<StoredToken> for ResumeToken {
    fn from(stored: StoredToken) -> Self {
        ResumeToken::new(EngineId::new(stored.engine), stored.value)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoredMap {
    entries: HashMap<String, StoredToken>,
}

fn key_for(chat_id: i64, project: Option<&str>, thread_id: Option<i64>) -> String {
    format!("{chat_id}:{}:{}", project.unwrap_or(""), thread_id.unwrap_or(0))
}

/// The persistent `(chat, project, thread) → resume token` mapping.
/// Cheap to clone (it's an `Arc`-free `Mutex` wrapper — share it behind an
/// `Arc<ThreadMap>` across scheduler workers instead).
pub struct ThreadMap {
    path: PathBuf,
    state: Mutex<StoredMap>,
}

impl ThreadMap {
    /// Loads `path` if it exists, or starts empty. The file is created on
    /// first [`ThreadMap::set`].
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, ThreadMapError> {
        let path = path.into();
        let state = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents).map_err(|source| ThreadMapError::Malformed {
                path: path.clone(),
                source,
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoredMap::default(),
            Err(source) => return Err(ThreadMapError::Io { path, source }),
        };
        Ok(Self {
            path,
            state: Mutex::new(state),
        })
    }

    pub fn get(&self, chat_id: i64, project: Option<&str>, thread_id: Option<i64>) -> Option<ResumeToken> {
        let key = key_for(chat_id, project, thread_id);
        self.state
            .lock()
            .expect("thread map poisoned")
            .entries
            .get(&key)
            .cloned()
            .map(ResumeToken::from)
    }

    /// Persists `token` against this thread's key, creating the key on
    /// first success (§4.G step 6).
    pub fn set(
        &self,
        chat_id: i64,
        project: Option<&str>,
        thread_id: Option<i64>,
        token: &ResumeToken,
    ) -> Result<(), ThreadMapError> {
        let key = key_for(chat_id, project, thread_id);
        let snapshot = {
            let mut state = self.state.lock().expect("thread map poisoned");
            state.entries.insert(key, StoredToken::from(token));
            state.clone()
        };
        self.write_atomic(&snapshot)
    }

    fn write_atomic(&self, state: &StoredMap) -> Result<(), ThreadMapError> {
        let json = serde_json::to_string_pretty(state).map_err(|source| ThreadMapError::Malformed {
            path: self.path.clone(),
            source,
        })?;
        let dir = self.path.parent().unwrap_or_else(|| Path::new("."));
        std::fs::create_dir_all(dir).map_err(|source| ThreadMapError::Io {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|source| ThreadMapError::Io {
            path: self.path.clone(),
            source,
        })?;
        use std::io::Write;
        tmp.write_all(json.as_bytes()).map_err(|source| ThreadMapError::Io {
            path: self.path.clone(),
            source,
        })?;
        tmp.persist(&self.path).map_err(|err| ThreadMapError::Io {
            path: self.path.clone(),
            source: err.error,
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_token_through_a_fresh_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("threads.json");
        let map = ThreadMap::load(&path).unwrap();
        assert!(map.get(1, Some("proj"), Some(42)).is_none());

        let token = ResumeToken::new(EngineId::new("codex"), "abc123");
        map.set(1, Some("proj"), Some(42), &token).unwrap();
        assert!(path.exists());

        let reloaded = ThreadMap::load(&path).unwrap();
        let got = reloaded.get(1, Some("proj"), Some(42)).unwrap();
        assert_eq!(got.engine, EngineId::new("codex"));
        assert_eq!(got.value, "abc123");
    }

    #[test]
    fn distinct_threads_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let map = ThreadMap::load(dir.path().join("threads.json")).unwrap();
        let token_a = ResumeToken::new(EngineId::new("codex"), "a");
        let token_b = ResumeToken::new(EngineId::new("claude"), "b");
        map.set(1, None, Some(1), &token_a).unwrap();
        map.set(1, None, Some(2), &token_b).unwrap();
        assert_eq!(map.get(1, None, Some(1)).unwrap().value, "a");
        assert_eq!(map.get(1, None, Some(2)).unwrap().value, "b");
    }
}
