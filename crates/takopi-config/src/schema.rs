// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Top-level config file shape (§6 "Config file (TOML)").
///
/// Deserialized straight from the TOML document; `<engine>.<option>` tables
/// that don't match one of the named top-level keys land in
/// [`Config::engines`] via `#[serde(flatten)]` so new engines never need a
/// schema change here.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Transport identifier. Only `"telegram"` is implemented; the field
    /// exists so a future transport doesn't require a breaking schema
    /// change.
    #[serde(default)]
    pub transport: Option<String>,
    pub default_engine: Option<String>,
    #[serde(default)]
    pub transports: Transports,
    #[serde(default)]
    pub workspaces: HashMap<String, String>,
    pub default_workspace: Option<String>,
    #[serde(default)]
    pub projects: HashMap<String, ProjectConfig>,
    /// `<engine>.<option> = …` passthrough tables, e.g. `[codex]` /
    /// `[claude]`. Keyed by engine id; values forwarded to that engine's
    /// runner untouched.
    #[serde(flatten)]
    pub engines: HashMap<String, toml::Value>,
}

impl Config {
    /// Strip the top-level keys this schema already models from
    /// [`Config::engines`] — `#[serde(flatten)]` captures everything
    /// unmatched, which includes TOML tables the deserializer already
    /// consumed into named fields when they happen to share a key name with
    /// an engine id (none do in practice, but this keeps the map honest).
    pub fn engine_options(&self, engine: &str) -> Option<&toml::Value> {
        self.engines.get(engine)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transports {
    #[serde(default)]
    pub telegram: Option<TelegramConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    pub bot_token: String,
    pub chat_id: i64,
    #[serde(default)]
    pub mode_discovery_timeout_s: Option<f64>,
}

/// `[projects.<alias>]` block: a named repo the bridge can dispatch into,
/// optionally with its own engine default and chat binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub path: String,
    #[serde(default)]
    pub worktrees_dir: Option<String>,
    #[serde(default)]
    pub default_engine: Option<String>,
    #[serde(default)]
    pub chat_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_document_parses() {
        let toml = r#"
            transport = "telegram"
            default_engine = "codex"

            [transports.telegram]
            bot_token = "abc123"
            chat_id = 42
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.default_engine.as_deref(), Some("codex"));
        let telegram = cfg.transports.telegram.unwrap();
        assert_eq!(telegram.bot_token, "abc123");
        assert_eq!(telegram.chat_id, 42);
    }

    #[test]
    fn workspaces_table_parses() {
        let toml = r#"
            [workspaces]
            myproject = "~/code/myproject"
            other = "/srv/other"
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        assert_eq!(cfg.workspaces.len(), 2);
        assert_eq!(cfg.workspaces.get("myproject").unwrap(), "~/code/myproject");
    }

    #[test]
    fn engine_option_tables_are_captured() {
        let toml = r#"
            [codex]
            model = "gpt-4.1"
            reasoning_effort = "low"
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        let codex = cfg.engine_options("codex").unwrap();
        assert_eq!(codex.get("model").unwrap().as_str(), Some("gpt-4.1"));
    }

    #[test]
    fn projects_block_parses() {
        let toml = r#"
            [projects.myrepo]
            path = "/srv/myrepo"
            worktrees_dir = "/srv/worktrees"
            default_engine = "claude"
            chat_id = 7
        "#;
        let cfg: Config = toml::from_str(toml).unwrap();
        let project = cfg.projects.get("myrepo").unwrap();
        assert_eq!(project.path, "/srv/myrepo");
        assert_eq!(project.default_engine.as_deref(), Some("claude"));
        assert_eq!(project.chat_id, Some(7));
    }

    #[test]
    fn missing_optional_fields_default() {
        let cfg: Config = toml::from_str("").unwrap();
        assert!(cfg.default_engine.is_none());
        assert!(cfg.workspaces.is_empty());
        assert!(cfg.projects.is_empty());
    }
}
