// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Telegram Bot API wire shapes — only the fields the ingress adapter
//! reads are modeled; unknown fields are ignored by `serde_json` by
//! default rather than rejected.
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub is_bot: bool,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Chat {
    pub id: i64,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_forum: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Voice {
    pub file_id: String,
    pub duration: u32,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Video {
    pub file_id: String,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Sticker {
    pub file_id: String,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ForumTopicCreated {
    pub name: String,
    #[serde(default)]
    pub icon_color: Option<i64>,
}

/// The reply target: a structural subset of [`Message`] with no further
/// nested `reply_to_message` (Telegram does not nest replies).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MessageReply {
    pub message_id: i64,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default, rename = "from")]
    pub from_: Option<User>,
    #[serde(default)]
    pub forum_topic_created: Option<ForumTopicCreated>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Message {
    pub message_id: i64,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub caption: Option<String>,
    #[serde(default, rename = "from")]
    pub from_: Option<User>,
    #[serde(default)]
    pub reply_to_message: Option<MessageReply>,
    #[serde(default)]
    pub message_thread_id: Option<i64>,
    #[serde(default)]
    pub is_topic_message: Option<bool>,
    #[serde(default)]
    pub voice: Option<Voice>,
    #[serde(default)]
    pub document: Option<Document>,
    #[serde(default)]
    pub photo: Option<Vec<PhotoSize>>,
    #[serde(default)]
    pub video: Option<Video>,
    #[serde(default)]
    pub sticker: Option<Sticker>,
    #[serde(default)]
    pub media_group_id: Option<String>,
    #[serde(default)]
    pub date: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQueryMessage {
    pub message_id: i64,
    pub chat: Chat,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default, rename = "from")]
    pub from_: Option<User>,
    #[serde(default)]
    pub message: Option<CallbackQueryMessage>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Parse a raw JSON payload into an [`Update`], keeping the original
/// [`Value`] around for anything the typed model didn't capture.
pub fn decode_update(payload: &str) -> Result<Update, serde_json::Error> {
    serde_json::from_str(payload)
}

pub fn decode_update_raw(payload: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(payload)
}
