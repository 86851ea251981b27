// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Builds the [`AutoRouter`] from a loaded [`Config`]: one [`RunnerEntry`]
//! per known engine, each wrapped in [`SerializedRunner`] (I5) and
//! constructed from the engine's `[<engine>]` config table.

use std::path::PathBuf;
use std::sync::Arc;

use takopi_config::Config;
use takopi_engine::runners::{claude::ClaudeRunner, codex::CodexRunner, cursor::CursorRunner, opencode::OpenCodeRunner, pi::PiRunner};
use takopi_engine::{EngineRunner, SerializedRunner};
use takopi_model::EngineId;
use takopi_router::{AutoRouter, RunnerEntry};

const KNOWN_ENGINES: &[&str] = &["codex", "claude", "cursor", "opencode", "pi"];

/// The binary each engine actually execs, matching the `Command::new(...)`
/// call sites in `takopi-engine`'s runners — `cursor` and `pi` don't expose
/// a configurable `cmd`, so their wrapped/invoked binary name is fixed.
fn binary_for(engine: &str, opts: Option<&toml::Value>) -> String {
    match engine {
        "codex" => opt_str_or(opts, "cmd", "codex"),
        "claude" => opt_str_or(opts, "cmd", "claude"),
        "opencode" => opt_str_or(opts, "cmd", "opencode"),
        "cursor" => "agent".to_string(),
        "pi" => "pi".to_string(),
        other => unreachable!("binary_for called with unknown engine {other}"),
    }
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}

/// `None` when the engine's binary is on `PATH`; otherwise the install-hint
/// string a [`RunnerEntry`] carries to the router (§4.B "Failure semantics:
/// Engine binary missing").
fn availability_issue(engine: &str, binary: &str) -> Option<String> {
    if find_on_path(binary).is_some() {
        return None;
    }
    Some(format!(
        "`{binary}` was not found on PATH; install the {engine} CLI to use this engine"
    ))
}

fn opt_str(opts: Option<&toml::Value>, key: &str) -> Option<String> {
    opts?.get(key)?.as_str().map(str::to_string)
}

fn opt_str_or(opts: Option<&toml::Value>, key: &str, default: &str) -> String {
    opt_str(opts, key).unwrap_or_else(|| default.to_string())
}

fn opt_str_array(opts: Option<&toml::Value>, key: &str) -> Vec<String> {
    opts.and_then(|v| v.get(key))
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn runner_for(engine: &str, opts: Option<&toml::Value>) -> Arc<dyn EngineRunner> {
    match engine {
        "codex" => Arc::new(SerializedRunner::new(CodexRunner::new(
            opt_str_or(opts, "cmd", "codex"),
            opt_str_array(opts, "extra_args"),
        ))),
        "claude" => Arc::new(SerializedRunner::new(ClaudeRunner::new(
            opt_str_or(opts, "cmd", "claude"),
            opt_str(opts, "model"),
        ))),
        "cursor" => Arc::new(SerializedRunner::new(CursorRunner::new(
            opt_str(opts, "model"),
            opt_str(opts, "workspace"),
        ))),
        "opencode" => Arc::new(SerializedRunner::new(OpenCodeRunner::new(
            opt_str_or(opts, "cmd", "opencode"),
            opt_str(opts, "model"),
        ))),
        "pi" => Arc::new(SerializedRunner::new(PiRunner::new(
            opt_str_array(opts, "extra_args"),
            opt_str(opts, "model"),
            opt_str(opts, "provider"),
        ))),
        other => unreachable!("runner_for called with unknown engine {other}"),
    }
}

/// Builds one [`RunnerEntry`] per entry in [`KNOWN_ENGINES`], regardless of
/// whether the config carries a `[<engine>]` table for it — every engine
/// runs with its defaults unless overridden, matching each runner's own
/// `cmd`/`model` fallback.
pub fn build_router(config: &Config) -> Result<AutoRouter, String> {
    let entries: Vec<RunnerEntry> = KNOWN_ENGINES
        .iter()
        .map(|&engine| {
            let opts = config.engine_options(engine);
            let mut entry = RunnerEntry::new(EngineId::new(engine), runner_for(engine, opts));
            if let Some(issue) = availability_issue(engine, &binary_for(engine, opts)) {
                entry = entry.unavailable(issue);
            }
            entry
        })
        .collect();

    let default_engine = config.default_engine.clone().unwrap_or_else(|| "codex".to_string());
    AutoRouter::new(entries, default_engine)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_one_entry_per_known_engine_with_defaults() {
        let config = Config::default();
        let router = build_router(&config).unwrap();
        assert_eq!(router.entries().len(), KNOWN_ENGINES.len());
        assert!(router.entry_for_engine(Some("codex")).is_ok());
    }

    #[test]
    fn honors_configured_default_engine() {
        let mut config = Config::default();
        config.default_engine = Some("claude".to_string());
        let router = build_router(&config).unwrap();
        assert_eq!(router.default_entry().engine, EngineId::new("claude"));
    }
}
