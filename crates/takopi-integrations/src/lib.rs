// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The voice-transcription boundary (§6): the runtime depends on
//! [`Transcriber`] to turn a Telegram voice message into text before
//! routing it like any other incoming message. The transcription model
//! itself is a Non-goal; [`whisper::LocalWhisperTranscriber`] is the one
//! concrete backend this workspace ships, shelling out to a local
//! `whisper` CLI.

mod transcriber;
mod whisper;

pub use transcriber::{TranscribeError, Transcriber};
pub use whisper::{LocalWhisperTranscriber, WhisperConfig};
