// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use takopi_model::ResumeToken;

use crate::drive::drive;
use crate::process::isolated_command;
use crate::run_options;
use crate::runner::{EngineRunner, OnEvent, RunResult, RunnerError};
use crate::schemas::claude::translate_claude_line;

pub const ENGINE: &str = "claude";

/// Engine runner for Anthropic's `claude` CLI, streamed via
/// `--output-format stream-json`.
pub struct ClaudeRunner {
    pub claude_cmd: String,
    pub model: Option<String>,
    pub extra_args: Vec<String>,
}

impl ClaudeRunner {
    pub fn new(claude_cmd: impl Into<String>, model: Option<String>) -> Self {
        Self {
            claude_cmd: claude_cmd.into(),
            model,
            extra_args: Vec::new(),
        }
    }

    pub fn build_args(&self, _prompt: &str, resume: Option<&ResumeToken>) -> Vec<String> {
        let opts = run_options::current();
        let mut args = self.extra_args.clone();

        args.push("--output-format".into());
        args.push("stream-json".into());
        args.push("--verbose".into());

        if let Some(model) = opts.model.as_ref().or(self.model.as_ref()) {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(mode) = &opts.mode {
            args.push("--agent".into());
            args.push(mode.clone());
        }
        if let Some(resume) = resume {
            args.push("--resume".into());
            args.push(resume.value.clone());
        }
        args.push("-p".into());
        args
    }
}

#[async_trait]
impl EngineRunner for ClaudeRunner {
    fn engine(&self) -> &str {
        ENGINE
    }

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let args = self.build_args(prompt, resume.as_ref());
        let cmd = isolated_command(&self.claude_cmd, &args);
        drive(ENGINE, cmd, Some(prompt), on_event, translate_claude_line).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_model_and_mode() {
        let runner = ClaudeRunner::new("claude", Some("claude-sonnet".into()));
        let args = run_options::apply_run_options(
            run_options::EngineRunOptions {
                model: Some("claude-opus".into()),
                mode: Some("plan".into()),
                reasoning: None,
            },
            || runner.build_args("hi", None),
        );

        let model_idx = args.iter().position(|a| a == "--model").unwrap() + 1;
        assert_eq!(args[model_idx], "claude-opus");
        let mode_idx = args.iter().position(|a| a == "--agent").unwrap() + 1;
        assert_eq!(args[mode_idx], "plan");
    }

    #[test]
    fn falls_back_to_configured_model_without_override() {
        let runner = ClaudeRunner::new("claude", Some("claude-sonnet".into()));
        let args = runner.build_args("hi", None);
        let model_idx = args.iter().position(|a| a == "--model").unwrap() + 1;
        assert_eq!(args[model_idx], "claude-sonnet");
    }
}
