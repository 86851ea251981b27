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

pub const ENGINE: &str = "opencode";

/// Per-run state threaded through `build_args`; opencode carries none of
/// its own beyond what `run_options` already supplies, but the type exists
/// so callers mirror the other runners' `new_state`/`build_args` shape.
#[derive(Debug, Default)]
pub struct OpenCodeStreamState;

pub struct OpenCodeRunner {
    pub opencode_cmd: String,
    pub model: Option<String>,
}

impl OpenCodeRunner {
    pub fn new(opencode_cmd: impl Into<String>, model: Option<String>) -> Self {
        Self {
            opencode_cmd: opencode_cmd.into(),
            model,
        }
    }

    pub fn build_args(
        &self,
        _prompt: &str,
        resume: Option<&ResumeToken>,
        _state: &OpenCodeStreamState,
    ) -> Vec<String> {
        let opts = run_options::current();
        let mut args = vec!["run".to_string(), "--print-logs".to_string()];

        if let Some(model) = opts.model.as_ref().or(self.model.as_ref()) {
            args.push("--model".into());
            args.push(model.clone());
        }
        if let Some(mode) = &opts.mode {
            args.push("--agent".into());
            args.push(mode.clone());
        }
        if let Some(resume) = resume {
            args.push("--session".into());
            args.push(resume.value.clone());
        }
        args
    }
}

#[async_trait]
impl EngineRunner for OpenCodeRunner {
    fn engine(&self) -> &str {
        ENGINE
    }

    async fn run(
        &self,
        prompt: &str,
        resume: Option<ResumeToken>,
        on_event: OnEvent<'_>,
    ) -> Result<RunResult, RunnerError> {
        let args = self.build_args(prompt, resume.as_ref(), &OpenCodeStreamState);
        let cmd = isolated_command(&self.opencode_cmd, &args);
        drive(ENGINE, cmd, Some(prompt), on_event, |factory, value| {
            translate_generic(factory, value, "session_id")
        })
        .await
    }
}
