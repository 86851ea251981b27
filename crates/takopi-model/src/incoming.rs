// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};

use crate::resume::ResumeToken;

/// A voice note attachment, already normalized away from transport-specific
/// shape (Telegram's `voice` object, a Discord attachment, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceAttachment {
    pub file_id: String,
    pub duration: u32,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// A document-like attachment. Photos, videos, and stickers are all folded
/// into this shape by the ingress adapter — see §4.H: "take the largest
/// photo size, take video/sticker as document".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAttachment {
    pub file_id: String,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub file_size: Option<u64>,
}

/// Transport-agnostic incoming chat message, produced by an ingress adapter
/// (§4.H) and consumed by the transport runtime (§4.G).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub transport: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub text: String,
    pub sender_id: Option<i64>,
    pub thread_id: Option<i64>,
    pub reply_to_message_id: Option<i64>,
    pub reply_to_text: Option<String>,
    /// `None` both when there is no reply and when the reply target is a
    /// forum-topic-creation service message — see §8 scenario 4. This is a
    /// deliberate three-state field, not a boolean default.
    pub reply_to_is_bot: Option<bool>,
    pub reply_to_username: Option<String>,
    pub voice: Option<VoiceAttachment>,
    pub document: Option<DocumentAttachment>,
    pub media_group_id: Option<String>,
    pub chat_type: Option<String>,
    pub is_forum: Option<bool>,
    pub is_topic_message: Option<bool>,
    pub date: Option<i64>,
}

/// The unit enqueued to the thread scheduler (§4.F).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreadJob {
    pub chat_id: i64,
    pub user_msg_id: i64,
    pub text: String,
    pub resume_token: Option<ResumeToken>,
    pub project: Option<String>,
    pub mode: Option<String>,
    /// An explicit `/engine` shortcut on a fresh (no resume token) turn —
    /// pins which runner starts the new session instead of falling back to
    /// the router's default.
    #[serde(default)]
    pub engine_override: Option<crate::resume::EngineId>,
}

impl ThreadJob {
    pub fn new(chat_id: i64, user_msg_id: i64, text: impl Into<String>) -> Self {
        Self {
            chat_id,
            user_msg_id,
            text: text.into(),
            resume_token: None,
            project: None,
            mode: None,
            engine_override: None,
        }
    }

    pub fn with_resume(mut self, token: Option<ResumeToken>) -> Self {
        self.resume_token = token;
        self
    }

    pub fn with_engine_override(mut self, engine: Option<crate::resume::EngineId>) -> Self {
        self.engine_override = engine;
        self
    }
}
