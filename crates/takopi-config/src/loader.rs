// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

use takopi_model::Workspace;

use crate::schema::Config;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing config file: {0}")]
    MissingConfigFile(PathBuf),
    #[error("Failed to read config file {path}: {source}")]
    ReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed TOML in {path}: {source}")]
    MalformedToml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{table} expected a table, got {found}")]
    ExpectedTable { table: String, found: String },
    #[error("{field} expected a non-empty string")]
    ExpectedNonEmptyString { field: String },
    #[error("workspace {name:?} path {path:?} does not exist")]
    WorkspacePathMissing { name: String, path: String },
    #[error("Unknown default workspace {name:?}. Available: {available}")]
    UnknownDefaultWorkspace { name: String, available: String },
}

/// Load and parse a single, explicit TOML config file.
///
/// Unlike a layered XDG search, the transport runtime is always pointed at
/// one file (`--config` on the CLI, or a fixed default); there is no
/// merging across `/etc`, `$HOME`, and cwd layers.
pub fn load_telegram_config(path: &Path) -> Result<(Config, PathBuf), ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::MissingConfigFile(path.to_path_buf()));
    }
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadFailed {
        path: path.to_path_buf(),
        source,
    })?;
    let config: Config = toml::from_str(&text).map_err(|source| ConfigError::MalformedToml {
        path: path.to_path_buf(),
        source,
    })?;
    Ok((config, path.to_path_buf()))
}

/// Resolve `[workspaces]` into a list of [`Workspace`]s, expanding `~` in
/// each path and, if `validate_paths`, checking each directory exists.
///
/// `config_path` is only used to make error messages point at the file the
/// bad value came from.
pub fn parse_workspaces(
    config: &Config,
    config_path: &Path,
    validate_paths: bool,
) -> Result<Vec<Workspace>, ConfigError> {
    let mut workspaces = Vec::with_capacity(config.workspaces.len());
    for (name, raw_path) in &config.workspaces {
        if name.trim().is_empty() {
            return Err(ConfigError::ExpectedNonEmptyString {
                field: "workspaces key".into(),
            });
        }
        if raw_path.trim().is_empty() {
            return Err(ConfigError::ExpectedNonEmptyString {
                field: format!("workspaces.{name}"),
            });
        }
        let expanded = shellexpand::tilde(raw_path).into_owned();
        let path = PathBuf::from(&expanded);
        if validate_paths && !path.exists() {
            return Err(ConfigError::WorkspacePathMissing {
                name: name.clone(),
                path: expanded,
            });
        }
        workspaces.push(Workspace {
            name: name.clone(),
            path,
        });
    }
    let _ = config_path;
    workspaces.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(workspaces)
}

/// Resolve `default_workspace` against the already-parsed workspace list.
///
/// Returns `Ok(None)` when the key is absent (callers may still fall back
/// to "the only workspace" or require an explicit `/workspace` command).
pub fn get_default_workspace(
    config: &Config,
    _config_path: &Path,
    workspaces: &[Workspace],
) -> Result<Option<String>, ConfigError> {
    let Some(name) = &config.default_workspace else {
        return Ok(None);
    };
    if name.trim().is_empty() {
        return Err(ConfigError::ExpectedNonEmptyString {
            field: "default_workspace".into(),
        });
    }
    if workspaces.iter().any(|w| &w.name == name) {
        Ok(Some(name.clone()))
    } else {
        let mut names: Vec<&str> = workspaces.iter().map(|w| w.name.as_str()).collect();
        names.sort_unstable();
        Err(ConfigError::UnknownDefaultWorkspace {
            name: name.clone(),
            available: names.join(", "),
        })
    }
}

/// Resolve `[projects.<alias>]` the same way workspaces are resolved:
/// `~`-expand `path`/`worktrees_dir`, validate `path` exists when asked.
pub fn parse_projects(
    config: &Config,
    validate_paths: bool,
) -> Result<HashMap<String, crate::schema::ProjectConfig>, ConfigError> {
    let mut out = HashMap::with_capacity(config.projects.len());
    for (alias, project) in &config.projects {
        if alias.trim().is_empty() {
            return Err(ConfigError::ExpectedNonEmptyString {
                field: "projects key".into(),
            });
        }
        if project.path.trim().is_empty() {
            return Err(ConfigError::ExpectedNonEmptyString {
                field: format!("projects.{alias}.path"),
            });
        }
        let expanded_path = shellexpand::tilde(&project.path).into_owned();
        if validate_paths && !Path::new(&expanded_path).exists() {
            return Err(ConfigError::WorkspacePathMissing {
                name: alias.clone(),
                path: expanded_path.clone(),
            });
        }
        let mut resolved = project.clone();
        resolved.path = expanded_path;
        resolved.worktrees_dir = resolved
            .worktrees_dir
            .map(|d| shellexpand::tilde(&d).into_owned());
        out.insert(alias.clone(), resolved);
    }
    Ok(out)
}
