// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! One exclusive filesystem lock per config path (§5 "Shared state", §6
//! "Lock file"). Startup refuses to proceed if the lock is held by a live
//! pid; if the holder's pid is no longer running, the error tells the
//! operator to delete the stale file rather than silently stealing it.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use fs4::fs_std::FileExt;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("takopi is already running against this config (lock held at {path}): {message}")]
    Held { path: PathBuf, message: String },
    #[error(
        "lock at {path} is held by a process that is no longer running (pid {pid}); delete the file and retry"
    )]
    Stale { path: PathBuf, pid: u32 },
    #[error("io error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("malformed lock file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Lock file payload (§6): `{version:1, instance_id, pid, hostname}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct LockPayload {
    version: u32,
    instance_id: String,
    pid: u32,
    hostname: String,
}

impl LockPayload {
    fn for_this_process() -> Self {
        Self {
            version: 1,
            instance_id: uuid::Uuid::new_v4().to_string(),
            pid: std::process::id(),
            hostname: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown-host".to_string()),
        }
    }
}

/// The path a lock for `config_path` lives at: the config file's own path
/// with `.lock` appended to the file name.
pub fn lock_path_for_config(config_path: &Path) -> PathBuf {
    let mut name = config_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "takopi.toml".into());
    name.push(".lock");
    config_path.with_file_name(name)
}

/// A held lock. Dropping it without calling [`LockHandle::release`] still
/// releases the OS-level lock (the `File` closes), but leaves the sidecar
/// JSON behind — always prefer an explicit `release()` on a clean shutdown.
pub struct LockHandle {
    path: PathBuf,
    file: File,
}

impl LockHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock and remove the sidecar file.
    pub fn release(self) -> Result<(), LockError> {
        FileExt::unlock(&self.file).map_err(|source| LockError::Io {
            path: self.path.clone(),
            source,
        })?;
        let _ = std::fs::remove_file(&self.path);
        Ok(())
    }
}

#[cfg(unix)]
fn pid_is_running(pid: u32) -> bool {
    // Signal 0 performs no-op error checking: ESRCH means no such process,
    // EPERM means it exists but we don't own it (still running).
    unsafe { libc::kill(pid as i32, 0) == 0 || *libc::__errno_location() == libc::EPERM }
}

#[cfg(not(unix))]
fn pid_is_running(_pid: u32) -> bool {
    // Conservative default off unix: assume it's still running so we never
    // silently steal a lock we can't actually verify.
    true
}

/// Acquire the exclusive lock for `config_path`, writing this process's
/// identity into the sidecar JSON. Returns [`LockError::Held`] if another
/// live process holds it, or [`LockError::Stale`] if the holder's pid is
/// dead (the operator must delete the file themselves — this function
/// never removes another process's lock file on their behalf).
pub fn acquire_lock(config_path: &Path) -> Result<LockHandle, LockError> {
    let path = lock_path_for_config(config_path);
    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .open(&path)
        .map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;

    if FileExt::try_lock_exclusive(&file).is_err() {
        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|source| LockError::Io {
            path: path.clone(),
            source,
        })?;
        let held = serde_json::from_str::<LockPayload>(&contents).map_err(|source| LockError::Malformed {
            path: path.clone(),
            source,
        })?;
        return if pid_is_running(held.pid) {
            Err(LockError::Held {
                path,
                message: format!("held by pid {} on {}", held.pid, held.hostname),
            })
        } else {
            Err(LockError::Stale { path, pid: held.pid })
        };
    }

    let payload = LockPayload::for_this_process();
    let json = serde_json::to_string(&payload).map_err(|source| LockError::Malformed {
        path: path.clone(),
        source,
    })?;
    file.set_len(0).map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;
    file.seek(SeekFrom::Start(0)).map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;
    file.write_all(json.as_bytes()).map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;
    file.flush().map_err(|source| LockError::Io {
        path: path.clone(),
        source,
    })?;

    Ok(LockHandle { path, file })
}
