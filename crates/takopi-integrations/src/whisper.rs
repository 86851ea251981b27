// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Local Whisper CLI backend for [`Transcriber`]. Shells out to the
//! `whisper` binary exactly as `original_source/src/takopi/transcribe.py`
//! does: write the audio to a temp file, run whisper against it with
//! `--output_format txt`, read back whatever `.txt` it produced.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error};

use crate::transcriber::{TranscribeError, Transcriber};

const TRANSCRIBE_TIMEOUT: Duration = Duration::from_secs(120);
const AVAILABILITY_TIMEOUT: Duration = Duration::from_secs(5);

/// Config for the local Whisper backend (§6 `<engine>.<option>` passthrough
/// covers this under a `transcribe.*` table in practice, but the struct
/// itself is transport-agnostic).
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    pub enabled: bool,
    pub model: String,
    pub language: Option<String>,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "base".to_string(),
            language: None,
        }
    }
}

/// Finds the `whisper` executable: `PATH` first, then alongside the
/// current executable (the venv/bin sibling layout the Python original
/// checked), then a bare `"whisper"` and hope the shell resolves it.
fn find_whisper() -> PathBuf {
    if let Some(path) = find_on_path("whisper") {
        return path;
    }
    if let Ok(exe) = std::env::current_exe() {
        if let Some(dir) = exe.parent() {
            let candidate = dir.join("whisper");
            if candidate.exists() {
                return candidate;
            }
        }
    }
    PathBuf::from("whisper")
}

fn find_on_path(name: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(name);
        candidate.is_file().then_some(candidate)
    })
}

/// Transcribes voice messages via a local `whisper` CLI subprocess.
pub struct LocalWhisperTranscriber {
    binary: PathBuf,
    config: WhisperConfig,
}

impl LocalWhisperTranscriber {
    pub fn new(config: WhisperConfig) -> Self {
        Self {
            binary: find_whisper(),
            config,
        }
    }

    fn build_command(&self, input: &Path, out_dir: &Path) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.arg(input)
            .arg("--model")
            .arg(&self.config.model)
            .arg("--output_dir")
            .arg(out_dir)
            .arg("--output_format")
            .arg("txt");
        if let Some(language) = &self.config.language {
            cmd.arg("--language").arg(language);
        }
        cmd.stdin(Stdio::null());
        cmd.kill_on_drop(true);
        #[cfg(unix)]
        unsafe {
            use std::os::unix::process::CommandExt;
            cmd.pre_exec(|| {
                libc::setsid();
                Ok(())
            });
        }
        cmd
    }
}

#[async_trait]
impl Transcriber for LocalWhisperTranscriber {
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscribeError> {
        if !self.config.enabled {
            return Err(TranscribeError::NotAvailable);
        }

        let dir = tempfile::tempdir()?;
        let input = dir.path().join("voice.ogg");
        tokio::fs::write(&input, audio).await?;

        debug!(model = %self.config.model, "running whisper transcription");

        let mut cmd = self.build_command(&input, dir.path());
        let output = tokio::time::timeout(TRANSCRIBE_TIMEOUT, cmd.output())
            .await
            .map_err(|_| TranscribeError::Timeout)??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            error!(stderr = %stderr, "whisper transcription failed");
            return Err(TranscribeError::ProcessFailed(stderr));
        }

        let expected = dir.path().join("voice.txt");
        let result_path = if expected.exists() {
            expected
        } else {
            std::fs::read_dir(dir.path())?
                .filter_map(Result::ok)
                .map(|entry| entry.path())
                .find(|path| path.extension().is_some_and(|ext| ext == "txt"))
                .ok_or(TranscribeError::NoOutput)?
        };

        let text = tokio::fs::read_to_string(&result_path).await?;
        Ok(text.trim().to_string())
    }

    async fn is_available(&self) -> bool {
        let mut cmd = Command::new(&self.binary);
        cmd.arg("--help").stdin(Stdio::null()).kill_on_drop(true);
        matches!(
            tokio::time::timeout(AVAILABILITY_TIMEOUT, cmd.output()).await,
            Ok(Ok(output)) if output.status.success()
        )
    }
}
