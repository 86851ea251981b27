// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::process::Stdio;
use std::time::Duration;

use tokio::process::{Child, Command};
use tracing::debug;

/// How long [`terminate`] waits after `SIGTERM` before escalating to
/// `SIGKILL` (I6).
pub const GRACE_WINDOW: Duration = Duration::from_secs(10);

/// Build a [`Command`] for an engine CLI, isolated from takopi's own
/// controlling terminal the same way a tool-call subprocess is.
///
/// `stdin(Stdio::piped())` lets [`crate::drive::drive`] write the prompt
/// (engine CLIs here are invoked with `-`/`-p` to read it off stdin);
/// `kill_on_drop(true)` guarantees a cancelled run's process is reaped
/// rather than left running detached; `setsid()` detaches the child from
/// any controlling terminal so it can't reach for `/dev/tty` directly.
pub fn isolated_command(program: &str, args: &[String]) -> Command {
    let mut cmd = Command::new(program);
    cmd.args(args);
    cmd.stdin(Stdio::piped());
    cmd.stdout(Stdio::piped());
    cmd.stderr(Stdio::piped());
    cmd.kill_on_drop(true);
    #[cfg(unix)]
    unsafe {
        cmd.pre_exec(|| {
            libc::setsid();
            Ok(())
        });
    }
    cmd
}

/// Soft-terminate `child`, escalating to a hard kill if it hasn't exited by
/// the end of [`GRACE_WINDOW`] (I6: termination is `SIGTERM` then wait then
/// `SIGKILL`, never a bare kill).
///
/// `child` was spawned via [`isolated_command`], so it's its own session
/// leader — signaling its pid is enough, there's no process group to chase.
pub async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGTERM);
        }
    }

    let soft = tokio::time::timeout(GRACE_WINDOW, child.wait()).await;
    if soft.is_ok() {
        return;
    }

    debug!("engine process ignored SIGTERM past grace window, sending SIGKILL");
    let _ = child.start_kill();
    let _ = child.wait().await;
}
