// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscribeError {
    #[error("whisper CLI not found on PATH")]
    NotAvailable,
    #[error("transcription timed out")]
    Timeout,
    #[error("whisper exited with an error: {0}")]
    ProcessFailed(String),
    #[error("whisper produced no transcription output")]
    NoOutput,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// External voice-transcription collaborator (§6). The runtime depends only
/// on this trait; the engine that actually turns audio into text is a
/// Non-goal (spec.md scopes the transcription model itself out), but the
/// call boundary the runtime dispatches through is part of the core.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Transcribe raw audio bytes (OGG/OGA, Telegram's voice-message
    /// format) into text.
    async fn transcribe(&self, audio: &[u8]) -> Result<String, TranscribeError>;

    /// Whether this transcriber's backend is actually usable right now
    /// (e.g. the CLI it shells out to is installed). Callers use this to
    /// surface a `RunnerUnavailable`-style hint instead of failing a job
    /// deep inside a subprocess call.
    async fn is_available(&self) -> bool;
}
