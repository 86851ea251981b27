// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod loader;
mod schema;

pub use loader::{
    get_default_workspace, load_telegram_config, parse_projects, parse_workspaces, ConfigError,
};
pub use schema::{Config, ProjectConfig, TelegramConfig, Transports};
