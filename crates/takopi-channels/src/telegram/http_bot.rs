// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The real [`TelegramBot`] backend, wrapping [`teloxide::Bot`]. Only the
//! seven methods §6 names are used (`getMe`, `getUpdates`, `sendMessage`,
//! `editMessageText`, `deleteMessage`, `setMyCommands`, `getFile` +
//! downloading the file bytes) — teloxide's much larger API surface is
//! otherwise untouched.
use serde_json::Value;
use teloxide::prelude::*;
use teloxide::types::{BotCommand, ChatId, MessageId};
use teloxide::RequestError;

use super::api_models::{self, Update, User};
use super::queue::{TelegramBot, TelegramError, TelegramFile};

/// Wraps a [`teloxide::Bot`] to implement [`TelegramBot`] against the live
/// Telegram Bot API.
pub struct HttpTelegramBot {
    bot: Bot,
    http: reqwest::Client,
    token: String,
}

impl HttpTelegramBot {
    pub fn new(token: impl Into<String>) -> Self {
        let token = token.into();
        Self {
            bot: Bot::new(&token),
            http: reqwest::Client::new(),
            token,
        }
    }

    fn file_url(&self, file_path: &str) -> String {
        format!("https://api.telegram.org/file/bot{}/{}", self.token, file_path)
    }
}

fn map_err(err: RequestError) -> TelegramError {
    match err {
        RequestError::RetryAfter(secs) => TelegramError::RetryAfter(secs.seconds() as f64),
        other => TelegramError::Api(other.to_string()),
    }
}

/// teloxide's typed responses serialize compatibly with the raw Bot API
/// JSON our own [`api_models`] types expect — round-trip through
/// `serde_json::Value` rather than hand-mapping every field twice.
fn to_value<T: serde::Serialize>(value: &T) -> Value {
    serde_json::to_value(value).unwrap_or(Value::Null)
}

#[async_trait::async_trait]
impl TelegramBot for HttpTelegramBot {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Value, TelegramError> {
        let mut request = self.bot.send_message(ChatId(chat_id), text);
        if let Some(reply_to) = reply_to_message_id {
            request = request.reply_to_message_id(MessageId(reply_to as i32));
        }
        let message = request.send().await.map_err(map_err)?;
        Ok(to_value(&message))
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Value, TelegramError> {
        let message = self
            .bot
            .edit_message_text(ChatId(chat_id), MessageId(message_id as i32), text)
            .send()
            .await
            .map_err(map_err)?;
        Ok(to_value(&message))
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TelegramError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .send()
            .await
            .map_err(map_err)?;
        Ok(true)
    }

    async fn set_my_commands(&self, commands: Vec<Value>) -> Result<bool, TelegramError> {
        let commands: Vec<BotCommand> = commands
            .into_iter()
            .filter_map(|v| serde_json::from_value(v).ok())
            .collect();
        self.bot
            .set_my_commands(commands)
            .send()
            .await
            .map_err(map_err)?;
        Ok(true)
    }

    async fn get_updates(&self, offset: Option<i64>, timeout_s: u32) -> Result<Vec<Update>, TelegramError> {
        let mut request = self.bot.get_updates().timeout(timeout_s);
        if let Some(offset) = offset {
            request = request.offset(offset as i32);
        }
        let updates = request.send().await.map_err(map_err)?;
        updates
            .into_iter()
            .map(|u| {
                let raw = to_value(&u).to_string();
                api_models::decode_update(&raw).map_err(|e| TelegramError::Api(e.to_string()))
            })
            .collect()
    }

    async fn get_me(&self) -> Result<User, TelegramError> {
        let me = self.bot.get_me().send().await.map_err(map_err)?;
        let raw = to_value(&me.user).to_string();
        serde_json::from_str(&raw).map_err(|e| TelegramError::Api(e.to_string()))
    }

    async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError> {
        let file = self.bot.get_file(file_id).send().await.map_err(map_err)?;
        Ok(TelegramFile {
            file_id: file.meta.id.clone(),
            file_path: Some(file.path),
            file_size: Some(file.meta.size as u64),
        })
    }

    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TelegramError> {
        let response = self
            .http
            .get(self.file_url(file_path))
            .send()
            .await
            .map_err(|e| TelegramError::Api(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TelegramError::Api(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}
