// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Command-line surface. Running `takopi` with no subcommand starts the
//! Telegram bridge (§4.G); the `daemon` subcommands wrap the systemd
//! unit described in §6 (generated, never consumed by takopi itself).

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Debug, Parser)]
#[command(name = "takopi", version, about = "Bridges a chat transport to local coding-agent CLIs")]
pub struct Cli {
    /// Path to the TOML config file (§6). Defaults to
    /// `$XDG_CONFIG_HOME/takopi/config.toml` (or `~/.config/takopi/config.toml`).
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Write logs to stderr at debug level. Without this flag, only
    /// warnings and errors are printed (the bridge normally runs as a
    /// systemd service with `journalctl` as its log sink).
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage the systemd user-mode service (§6 "Systemd unit").
    Daemon {
        #[command(subcommand)]
        command: DaemonCommands,
    },
    /// Print a shell completion script to stdout.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Subcommand)]
pub enum DaemonCommands {
    /// Generate and install the `takopi.service` user unit.
    Install {
        /// Run `systemctl --user enable` after writing the unit.
        #[arg(long)]
        enable: bool,
        /// Run `systemctl --user start` after writing the unit.
        #[arg(long)]
        start: bool,
        /// Overwrite an existing unit file.
        #[arg(long)]
        force: bool,
    },
    /// Remove the `takopi.service` user unit.
    Uninstall {
        /// Stop the service before removing the unit.
        #[arg(long, default_value_t = true)]
        stop: bool,
    },
    /// Show `systemctl --user status takopi.service`.
    Status,
    /// Show `journalctl --user -u takopi.service`.
    Logs {
        /// Follow new log lines (`journalctl -f`).
        #[arg(long, short = 'f')]
        follow: bool,
        /// Number of trailing lines to show.
        #[arg(long, short = 'n', default_value_t = 200)]
        lines: u32,
    },
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    generate(shell, &mut cmd, name, &mut std::io::stdout());
}

/// The default config path when `--config` isn't given:
/// `$XDG_CONFIG_HOME/takopi/config.toml`, falling back to
/// `~/.config/takopi/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg).join("takopi/config.toml"));
    }
    dirs::home_dir().map(|home| home.join(".config/takopi/config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_parses_with_no_arguments() {
        let cli = Cli::parse_from(["takopi"]);
        assert!(cli.command.is_none());
        assert!(!cli.verbose);
    }

    #[test]
    fn cli_parses_daemon_install_flags() {
        let cli = Cli::parse_from(["takopi", "daemon", "install", "--enable", "--start"]);
        match cli.command {
            Some(Commands::Daemon {
                command: DaemonCommands::Install { enable, start, force },
            }) => {
                assert!(enable);
                assert!(start);
                assert!(!force);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_global_config_flag_after_subcommand() {
        let cli = Cli::parse_from(["takopi", "--config", "/tmp/x.toml", "daemon", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/x.toml")));
    }

    #[test]
    fn command_factory_is_well_formed() {
        Cli::command().debug_assert();
    }
}
