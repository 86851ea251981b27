// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Engine lookup and resume-token resolution (§4.C "Router").
//!
//! [`AutoRouter`] is the single place that knows the full list of
//! configured engines, their availability, and the fixed order a reply's
//! text is scanned in when more than one engine's marker could match.
use std::sync::Arc;

use takopi_engine::EngineRunner;
use takopi_model::{EngineId, ResumeToken};

/// One configured engine: its runner, and whether it's currently usable.
///
/// `available = false` models an engine whose CLI wasn't found on `PATH`
/// at startup — the entry still participates in resume-token recognition
/// (a reply can still name it) but [`AutoRouter::runner_for`] refuses to
/// dispatch to it.
#[derive(Clone)]
pub struct RunnerEntry {
    pub engine: EngineId,
    pub runner: Arc<dyn EngineRunner>,
    pub available: bool,
    pub issue: Option<String>,
}

impl RunnerEntry {
    pub fn new(engine: impl Into<EngineId>, runner: Arc<dyn EngineRunner>) -> Self {
        Self {
            engine: engine.into(),
            runner,
            available: true,
            issue: None,
        }
    }

    pub fn unavailable(mut self, issue: impl Into<String>) -> Self {
        self.available = false;
        self.issue = Some(issue.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerUnavailableError {
    pub engine: String,
    pub issue: Option<String>,
}

impl std::fmt::Display for RunnerUnavailableError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.issue {
            Some(issue) => write!(f, "runner {} is unavailable: {issue}", self.engine),
            None => write!(f, "runner {} is unavailable", self.engine),
        }
    }
}

impl std::error::Error for RunnerUnavailableError {}

impl RunnerUnavailableError {
    pub fn new(engine: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            issue: None,
        }
    }

    pub fn with_issue(engine: impl Into<String>, issue: impl Into<String>) -> Self {
        Self {
            engine: engine.into(),
            issue: Some(issue.into()),
        }
    }

    fn not_configured(engine: impl Into<String>) -> Self {
        let engine = engine.into();
        Self {
            issue: Some(format!("engine {engine:?} is not configured")),
            engine,
        }
    }
}

/// Routes a chat turn to the configured engine for it (§4.C).
pub struct AutoRouter {
    entries: Vec<RunnerEntry>,
    default_engine: EngineId,
}

impl AutoRouter {
    /// # Panics behavior
    /// Returns `Err` (never panics) on an empty entry list, a duplicate
    /// engine id, or a `default_engine` not present among `entries`.
    pub fn new(
        entries: Vec<RunnerEntry>,
        default_engine: impl Into<EngineId>,
    ) -> Result<Self, String> {
        if entries.is_empty() {
            return Err("router needs at least one runner".into());
        }
        let mut seen = std::collections::HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.engine.clone()) {
                return Err(format!("duplicate runner entry for engine {}", entry.engine));
            }
        }
        let default_engine = default_engine.into();
        if !entries.iter().any(|e| e.engine == default_engine) {
            return Err(format!(
                "default engine {default_engine:?} is not among the configured runners"
            ));
        }
        Ok(Self {
            entries,
            default_engine,
        })
    }

    pub fn entries(&self) -> &[RunnerEntry] {
        &self.entries
    }

    pub fn available_entries(&self) -> Vec<&RunnerEntry> {
        self.entries.iter().filter(|e| e.available).collect()
    }

    pub fn engine_ids(&self) -> Vec<&EngineId> {
        self.entries.iter().map(|e| &e.engine).collect()
    }

    pub fn default_entry(&self) -> &RunnerEntry {
        self.entries
            .iter()
            .find(|e| e.engine == self.default_engine)
            .expect("default_engine validated against entries in new()")
    }

    /// Resolve `engine` (or the default, if `None`) to its entry.
    pub fn entry_for_engine(&self, engine: Option<&str>) -> Result<&RunnerEntry, RunnerUnavailableError> {
        let Some(engine) = engine else {
            return Ok(self.default_entry());
        };
        self.entries
            .iter()
            .find(|e| e.engine.as_str() == engine)
            .ok_or_else(|| RunnerUnavailableError::not_configured(engine))
    }

    /// Resolve a [`ResumeToken`] (or `None`, meaning a fresh run) to its
    /// entry (I3: `resume.engine == runner engine`).
    pub fn entry_for(&self, resume: Option<&ResumeToken>) -> Result<&RunnerEntry, RunnerUnavailableError> {
        self.entry_for_engine(resume.map(|r| r.engine.as_str()))
    }

    /// Like [`AutoRouter::entry_for`], but errors if the resolved entry is
    /// marked unavailable.
    pub fn runner_for(
        &self,
        resume: Option<&ResumeToken>,
    ) -> Result<Arc<dyn EngineRunner>, RunnerUnavailableError> {
        let entry = self.entry_for(resume)?;
        if !entry.available {
            return Err(match &entry.issue {
                Some(issue) => RunnerUnavailableError::with_issue(entry.engine.to_string(), issue.clone()),
                None => RunnerUnavailableError::new(entry.engine.to_string()),
            });
        }
        Ok(entry.runner.clone())
    }

    /// Render `token` the way its own engine would (last line of
    /// `render_final`'s output, §4.D).
    pub fn format_resume(&self, token: &ResumeToken) -> Result<String, RunnerUnavailableError> {
        let entry = self.entry_for_engine(Some(token.engine.as_str()))?;
        Ok(entry.runner.format_resume(token))
    }

    /// Try every configured runner's [`EngineRunner::extract_resume`] on
    /// `text`, in entry order — the order is the tie-break when more than
    /// one engine's marker could match the same text.
    pub fn extract_resume(&self, text: Option<&str>) -> Option<ResumeToken> {
        let text = text?;
        if text.is_empty() {
            return None;
        }
        self.entries
            .iter()
            .find_map(|entry| entry.runner.extract_resume(text))
    }

    /// Resolve a resume token for an incoming message: scan its own text
    /// first, then (if nothing matched) the text it's replying to.
    pub fn resolve_resume(&self, text: Option<&str>, reply_text: Option<&str>) -> Option<ResumeToken> {
        self.extract_resume(text).or_else(|| self.extract_resume(reply_text))
    }

    /// Whether `text` contains any configured engine's resume marker.
    pub fn is_resume_line(&self, text: &str) -> bool {
        self.extract_resume(Some(text)).is_some()
    }
}
