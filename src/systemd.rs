// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Generates and manages the systemd user-mode unit described in §6. Takopi
//! never reads this file back; it only writes it and shells out to
//! `systemctl --user`/`journalctl --user` on the operator's behalf.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const SERVICE_NAME: &str = "takopi.service";

/// Where `systemctl --user` expects unit files, honoring `XDG_CONFIG_HOME`.
fn systemd_user_dir() -> Result<PathBuf> {
    if let Some(xdg) = std::env::var_os("XDG_CONFIG_HOME") {
        return Ok(PathBuf::from(xdg).join("systemd/user"));
    }
    let home = dirs::home_dir().context("could not determine home directory")?;
    Ok(home.join(".config/systemd/user"))
}

fn service_unit_path() -> Result<PathBuf> {
    Ok(systemd_user_dir()?.join(SERVICE_NAME))
}

/// The `takopi` executable systemd should launch. A bare name (not an
/// absolute path) so the unit keeps working if the binary moves, as long
/// as `PATH` still resolves it.
fn takopi_executable() -> String {
    "takopi".to_string()
}

fn generate_service_unit(exec_path: &str, working_dir: &std::path::Path) -> Result<String> {
    let home = dirs::home_dir().context("could not determine home directory")?;
    let path_var = std::env::var("PATH").unwrap_or_else(|_| "/usr/bin:/bin".to_string());
    Ok(format!(
        "[Unit]\n\
Description=Takopi Telegram Bridge\n\
After=network-online.target\n\
Wants=network-online.target\n\
\n\
[Service]\n\
Type=simple\n\
WorkingDirectory={working_dir}\n\
Environment=HOME={home}\n\
Environment=PATH={path_var}\n\
Environment=TAKOPI_NO_INTERACTIVE=1\n\
ExecStart=/bin/sh -c 'exec {exec_path}'\n\
Restart=on-failure\n\
RestartSec=10\n\
\n\
[Install]\n\
WantedBy=default.target\n",
        working_dir = working_dir.display(),
        home = home.display(),
    ))
}

fn run_systemctl(args: &[&str], check: bool) -> Result<std::process::ExitStatus> {
    let status = std::process::Command::new("systemctl")
        .arg("--user")
        .args(args)
        .status()
        .context("failed to spawn systemctl")?;
    if check && !status.success() {
        bail!("systemctl --user {} failed: {status}", args.join(" "));
    }
    Ok(status)
}

/// `takopi daemon install`: writes the unit file, reloads the daemon, and
/// optionally enables/starts the service.
pub fn daemon_install(enable: bool, start: bool, force: bool) -> Result<()> {
    let unit_path = service_unit_path()?;
    if unit_path.exists() && !force {
        bail!(
            "{} already exists; pass --force to overwrite",
            unit_path.display()
        );
    }
    std::fs::create_dir_all(unit_path.parent().expect("unit path always has a parent"))
        .context("failed to create systemd user unit directory")?;
    let working_dir = std::env::current_dir().context("failed to determine working directory")?;
    let unit = generate_service_unit(&takopi_executable(), &working_dir)?;
    std::fs::write(&unit_path, unit).context("failed to write systemd unit file")?;

    run_systemctl(&["daemon-reload"], true)?;
    if enable {
        run_systemctl(&["enable", SERVICE_NAME], true)?;
    }
    if start {
        run_systemctl(&["start", SERVICE_NAME], true)?;
    }
    Ok(())
}

/// `takopi daemon uninstall`: stops/disables the service and removes the
/// unit file.
pub fn daemon_uninstall(stop: bool) -> Result<()> {
    if stop {
        let _ = run_systemctl(&["stop", SERVICE_NAME], false);
    }
    let _ = run_systemctl(&["disable", SERVICE_NAME], false);
    let unit_path = service_unit_path()?;
    if unit_path.exists() {
        std::fs::remove_file(&unit_path).context("failed to remove systemd unit file")?;
    }
    run_systemctl(&["daemon-reload"], true)?;
    Ok(())
}

/// `takopi daemon status`: propagates `systemctl --user status`'s exit code.
pub fn daemon_status() -> Result<i32> {
    let status = run_systemctl(&["status", SERVICE_NAME], false)?;
    Ok(status.code().unwrap_or(1))
}

/// `takopi daemon logs`: runs `journalctl --user -u takopi.service`.
pub fn daemon_logs(follow: bool, lines: u32) -> Result<i32> {
    let mut cmd = std::process::Command::new("journalctl");
    cmd.arg("--user").arg("-u").arg(SERVICE_NAME).arg("-n").arg(lines.to_string());
    if follow {
        cmd.arg("-f");
    }
    let status = cmd.status().context("failed to spawn journalctl")?;
    Ok(status.code().unwrap_or(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_unit_carries_required_environment() {
        let unit = generate_service_unit("takopi", std::path::Path::new("/srv/takopi")).unwrap();
        assert!(unit.contains("Environment=TAKOPI_NO_INTERACTIVE=1"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("RestartSec=10"));
        assert!(unit.contains("ExecStart=/bin/sh -c 'exec takopi'"));
        assert!(unit.contains("WantedBy=default.target"));
    }
}
