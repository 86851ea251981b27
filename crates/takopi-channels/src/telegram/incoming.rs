// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Normalizes a Telegram [`Update`] into the transport-agnostic
//! [`IncomingMessage`] shape the transport runtime consumes (§4.H).
use serde_json::Value;

use takopi_model::{DocumentAttachment, IncomingMessage, VoiceAttachment};

use super::api_models::{Message, MessageReply, Update};

#[derive(Debug, Clone)]
pub struct TelegramIncomingMessage {
    pub message: IncomingMessage,
    /// The update's raw JSON, for logging and for fields the normalized
    /// shape doesn't carry.
    pub raw: Value,
}

impl TelegramIncomingMessage {
    pub fn transport(&self) -> &str {
        &self.message.transport
    }
}

impl std::ops::Deref for TelegramIncomingMessage {
    type Target = IncomingMessage;

    fn deref(&self) -> &Self::Target {
        &self.message
    }
}

#[derive(Debug, Clone)]
pub struct TelegramCallbackQuery {
    pub transport: String,
    pub chat_id: i64,
    pub message_id: i64,
    pub callback_query_id: String,
    pub data: Option<String>,
    pub sender_id: Option<i64>,
}

#[derive(Debug, Clone)]
pub enum TelegramIncoming {
    Message(TelegramIncomingMessage),
    CallbackQuery(TelegramCallbackQuery),
}

/// `reply_to_message.from.is_bot` is `true` whenever the bot created the
/// forum topic the message lives in, even for a message that never
/// actually replied to the bot — Telegram attaches the topic-creation
/// message as `reply_to_message` by default in that case. Treat a
/// `forum_topic_created` reply target as "no real reply" instead.
fn reply_to_is_bot(reply: &MessageReply) -> Option<bool> {
    if reply.forum_topic_created.is_some() {
        return None;
    }
    reply.from_.as_ref().map(|user| user.is_bot)
}

fn reply_to_username(reply: &MessageReply) -> Option<String> {
    reply.from_.as_ref().and_then(|user| user.username.clone())
}

fn document_from_photo(photo: &[super::api_models::PhotoSize]) -> Option<DocumentAttachment> {
    let largest = photo.iter().max_by_key(|p| p.file_size.unwrap_or(0))?;
    Some(DocumentAttachment {
        file_id: largest.file_id.clone(),
        file_name: None,
        mime_type: None,
        file_size: largest.file_size,
    })
}

fn extract_text(message: &Message) -> String {
    message
        .text
        .clone()
        .or_else(|| message.caption.clone())
        .unwrap_or_default()
}

fn extract_document(message: &Message) -> Option<DocumentAttachment> {
    if let Some(document) = &message.document {
        return Some(DocumentAttachment {
            file_id: document.file_id.clone(),
            file_name: document.file_name.clone(),
            mime_type: document.mime_type.clone(),
            file_size: document.file_size,
        });
    }
    if let Some(photo) = &message.photo {
        return document_from_photo(photo);
    }
    if let Some(video) = &message.video {
        return Some(DocumentAttachment {
            file_id: video.file_id.clone(),
            file_name: video.file_name.clone(),
            mime_type: video.mime_type.clone(),
            file_size: video.file_size,
        });
    }
    if let Some(sticker) = &message.sticker {
        return Some(DocumentAttachment {
            file_id: sticker.file_id.clone(),
            file_name: None,
            mime_type: None,
            file_size: sticker.file_size,
        });
    }
    None
}

/// Parse one Telegram [`Update`] addressed to `chat_id` into a normalized
/// incoming record. Returns `None` for updates from other chats, and for
/// messages with neither text, caption, nor voice (nothing to act on).
pub fn parse_incoming_update(update: &Update, chat_id: i64) -> Option<TelegramIncoming> {
    if let Some(cbq) = &update.callback_query {
        let msg_chat_id = cbq.message.as_ref().map(|m| m.chat.id);
        if msg_chat_id != Some(chat_id) {
            return None;
        }
        return Some(TelegramIncoming::CallbackQuery(TelegramCallbackQuery {
            transport: "telegram".to_string(),
            chat_id,
            message_id: cbq.message.as_ref().map(|m| m.message_id).unwrap_or(0),
            callback_query_id: cbq.id.clone(),
            data: cbq.data.clone(),
            sender_id: cbq.from_.as_ref().map(|u| u.id),
        }));
    }

    let message = update.message.as_ref()?;
    if message.chat.id != chat_id {
        return None;
    }

    let voice = message.voice.as_ref().map(|v| VoiceAttachment {
        file_id: v.file_id.clone(),
        duration: v.duration,
        mime_type: v.mime_type.clone(),
        file_size: v.file_size,
    });
    let document = extract_document(message);
    let text = extract_text(message);

    if text.is_empty() && voice.is_none() {
        return None;
    }

    let (reply_to_message_id, reply_to_text, reply_to_is_bot, reply_to_username) =
        match &message.reply_to_message {
            Some(reply) => (
                Some(reply.message_id),
                reply.text.clone(),
                reply_to_is_bot(reply),
                reply_to_username(reply),
            ),
            None => (None, None, None, None),
        };

    let incoming = IncomingMessage {
        transport: "telegram".to_string(),
        chat_id,
        message_id: message.message_id,
        text,
        sender_id: message.from_.as_ref().map(|u| u.id),
        thread_id: message.message_thread_id,
        reply_to_message_id,
        reply_to_text,
        reply_to_is_bot,
        reply_to_username,
        voice,
        document,
        media_group_id: message.media_group_id.clone(),
        chat_type: Some(message.chat.kind.clone()),
        is_forum: message.chat.is_forum,
        is_topic_message: message.is_topic_message,
        date: message.date,
    };

    let raw = serde_json::to_value(message).unwrap_or(Value::Null);
    Some(TelegramIncoming::Message(TelegramIncomingMessage {
        message: incoming,
        raw,
    }))
}
