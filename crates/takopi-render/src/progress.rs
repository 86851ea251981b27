// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashSet;

use takopi_events::TakopiEvent;
use takopi_model::ResumeToken;

use crate::event_cli::render_action_body;

struct Entry {
    id: String,
    open: bool,
    text: String,
}

/// Accumulates a run's events into the bounded "working..." / "done..."
/// message a chat transport edits in place as the run progresses (§4.D).
///
/// Only the last `max_actions` action lines are kept — a long tool-call
/// chain doesn't grow the message without bound — but the step counter
/// keeps counting every distinct action id ever seen, so "step 12" stays
/// meaningful even once only the last few lines are shown.
pub struct ExecProgressRenderer {
    max_actions: usize,
    command_width: Option<usize>,
    resume_formatter: Option<Box<dyn Fn(&ResumeToken) -> String + Send + Sync>>,
    entries: Vec<Entry>,
    ids_seen: HashSet<String>,
    session_title: Option<String>,
    resume: Option<ResumeToken>,
}

impl ExecProgressRenderer {
    pub fn new(max_actions: usize) -> Self {
        Self {
            max_actions,
            command_width: Some(80),
            resume_formatter: None,
            entries: Vec::new(),
            ids_seen: HashSet::new(),
            session_title: None,
            resume: None,
        }
    }

    pub fn with_command_width(mut self, width: Option<usize>) -> Self {
        self.command_width = width;
        self
    }

    pub fn with_resume_formatter(
        mut self,
        formatter: impl Fn(&ResumeToken) -> String + Send + Sync + 'static,
    ) -> Self {
        self.resume_formatter = Some(Box::new(formatter));
        self
    }

    pub fn recent_actions(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.text.as_str()).collect()
    }

    fn push_open(&mut self, id: &str, text: String) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.open && e.id == id)
        {
            existing.text = text;
        } else {
            self.entries.push(Entry {
                id: id.to_string(),
                open: true,
                text,
            });
            self.bound();
        }
    }

    fn close(&mut self, id: &str, text: String) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .rev()
            .find(|e| e.open && e.id == id)
        {
            existing.open = false;
            existing.text = text;
        } else {
            self.entries.push(Entry {
                id: id.to_string(),
                open: false,
                text,
            });
            self.bound();
        }
    }

    fn bound(&mut self) {
        if self.entries.len() > self.max_actions {
            let excess = self.entries.len() - self.max_actions;
            self.entries.drain(0..excess);
        }
    }

    /// Fold one event into the renderer's state. Returns `false` for an
    /// event kind it doesn't track (e.g. [`TakopiEvent::Unknown`]).
    pub fn note_event(&mut self, event: &TakopiEvent) -> bool {
        match event {
            TakopiEvent::SessionStarted {
                engine,
                resume,
                title,
                ..
            } => {
                self.session_title = Some(title.clone().unwrap_or_else(|| engine.to_string()));
                self.resume = Some(resume.clone());
                true
            }
            TakopiEvent::ActionStarted { action, .. } | TakopiEvent::ActionUpdated { action, .. } => {
                self.ids_seen.insert(action.id.clone());
                let text = format!("▸ {}", render_action_body(action, None, self.command_width));
                self.push_open(&action.id, text);
                true
            }
            TakopiEvent::ActionCompleted { action, ok, .. } => {
                self.ids_seen.insert(action.id.clone());
                let prefix = match ok {
                    Some(true) => "✓",
                    Some(false) => "✗",
                    None => "▸",
                };
                let text = format!("{prefix} {}", render_action_body(action, *ok, self.command_width));
                self.close(&action.id, text);
                true
            }
            TakopiEvent::Completed { .. } => true,
            TakopiEvent::Unknown => false,
        }
    }

    fn step(&self) -> usize {
        self.ids_seen.len()
    }

    fn resume_line(&self) -> Option<String> {
        let resume = self.resume.as_ref()?;
        let formatter = self.resume_formatter.as_ref()?;
        Some(formatter(resume))
    }

    fn body_lines(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.text.clone()).collect()
    }

    /// Render the in-progress message: header, then the bounded action
    /// lines, then the resume marker (if a formatter is configured).
    pub fn render_progress(&self, elapsed_secs: f64) -> String {
        let mut lines = vec![format!(
            "working · {}s · step {}",
            elapsed_secs as i64,
            self.step()
        )];
        lines.extend(self.body_lines());
        if let Some(resume_line) = self.resume_line() {
            lines.push(resume_line);
        }
        lines.join("\n")
    }

    /// Render the terminal message: header with `status` ("done"/"error"),
    /// the final answer, and the resume marker as the last line.
    pub fn render_final(&self, elapsed_secs: f64, answer: &str, status: &str) -> String {
        let mut lines = vec![format!(
            "{status} · {}s · step {}",
            elapsed_secs as i64,
            self.step()
        )];
        lines.push(answer.to_string());
        if let Some(resume_line) = self.resume_line() {
            lines.push(resume_line);
        }
        lines.join("\n")
    }
}
