// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use async_trait::async_trait;

use takopi_model::ResumeToken;

use crate::drive::drive;
use crate::process::isolated_command;
use crate::run_options;
use crate::runner::{EngineRunner, OnEvent, RunResult, RunnerError};
use crate::translate::translate_generic;

pub const ENGINE: &str = "codex";

/// Engine runner for the `codex` CLI's `exec --json` subcommand.
pub struct CodexRunner {
    pub codex_cmd: String,
    pub extra_args: Vec<String>,
}

impl CodexRunner {
    pub fn new(codex_cmd: impl Into<String>, extra_args: Vec<String>) -> Self {
        Self {
            codex_cmd: codex_cmd.into(),
            extra_args,
        }
    }

    /// Build the full `codex` argv for one run, applying the ambient
    /// [`run_options::current`] overrides on top of this runner's
    /// configured defaults.
    ///
    /// `-c key=value` overrides precede the resolved subcommand, matching
    /// how codex itself layers config overrides left to right.
    pub fn build_args(&self, _prompt: &str, resume: Option<&ResumeToken>) -> Vec<String> {
        let opts = run_options::current();
        let mut args = self.extra_args.clone();

        if let Some(model) = &opts.model {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(reasoning) = &opts.reasoning {
            args.push("-c".into());
            args.push(format!("model_reasoning_effort={reasoning}"));
        }
        if let Some(mode) = &opts.mode {
            args.push("--agent".into());
            args.push(mode.clone());
        }

        args.push("exec".into());
        args.push("--json".into());
        args.push("--skip-git-repo-check".into());
        args.push("--color=never".into());
        if let Some(resume) = resume {
            args.push("resume".into());
            args.push(resume.value.clone());
        }
        args.push("-".into());
        args
    }
}

#[async_trait]
impl EngineRunner for CodexRunner {
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
        let cmd = isolated_command(&self.codex_cmd, &args);
        drive(ENGINE, cmd, Some(prompt), on_event, |factory, value| {
            translate_generic(factory, value, "session_id")
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn override_model_and_reasoning_precede_the_subcommand() {
        let runner = CodexRunner::new("codex", vec!["-c".into(), "notify=[]".into()]);
        let args = run_options::apply_run_options(
            run_options::EngineRunOptions {
                model: Some("gpt-4.1-mini".into()),
                reasoning: Some("low".into()),
                mode: None,
            },
            || runner.build_args("hi", None),
        );

        assert_eq!(
            args,
            vec![
                "-c",
                "notify=[]",
                "--model",
                "gpt-4.1-mini",
                "-c",
                "model_reasoning_effort=low",
                "exec",
                "--json",
                "--skip-git-repo-check",
                "--color=never",
                "-",
            ]
        );
    }

    #[test]
    fn override_mode_adds_agent_flag() {
        let runner = CodexRunner::new("codex", vec![]);
        let args = run_options::apply_run_options(
            run_options::EngineRunOptions {
                mode: Some("plan".into()),
                ..Default::default()
            },
            || runner.build_args("hi", None),
        );
        let idx = args.iter().position(|a| a == "--agent").unwrap();
        assert_eq!(args[idx + 1], "plan");
    }

    #[test]
    fn resume_appends_resume_subcommand() {
        let runner = CodexRunner::new("codex", vec![]);
        let token = ResumeToken::new(ENGINE, "sess-1");
        let args = runner.build_args("hi", Some(&token));
        assert!(args.windows(2).any(|w| w == ["resume", "sess-1"]));
    }
}
