// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Long-polls `getUpdates` and normalizes each update into a
//! [`TelegramIncoming`] record (§4.H). Owns the offset cursor and the bot's
//! own identity, re-resolved if it ever changes (e.g. a `/setname` via
//! BotFather mid-run).
use super::api_models::User;
use super::incoming::{parse_incoming_update, TelegramIncoming};
use super::queue::{QueuedTelegramClient, TelegramBot, TelegramError};

/// The bridge's own Telegram identity, as resolved by `getMe` at startup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: i64,
    pub username: Option<String>,
}

impl From<User> for BotIdentity {
    fn from(user: User) -> Self {
        Self {
            user_id: user.id,
            username: user.username,
        }
    }
}

/// Drives the long-poll loop for one chat, accepting only updates whose
/// `chat_id` matches the configured chat — §4.H: "Rejecting updates for
/// unknown chats."
pub struct IngressAdapter<B: TelegramBot> {
    client: std::sync::Arc<QueuedTelegramClient<B>>,
    chat_id: i64,
    offset: Option<i64>,
    identity: Option<BotIdentity>,
    timeout_s: u32,
}

impl<B: TelegramBot> IngressAdapter<B> {
    pub fn new(client: std::sync::Arc<QueuedTelegramClient<B>>, chat_id: i64) -> Self {
        Self {
            client,
            chat_id,
            offset: None,
            identity: None,
            timeout_s: 30,
        }
    }

    pub fn with_timeout(mut self, timeout_s: u32) -> Self {
        self.timeout_s = timeout_s;
        self
    }

    /// Resolve (or re-resolve) the bot's own identity via `getMe`.
    pub async fn resolve_identity(&mut self) -> Result<BotIdentity, TelegramError> {
        let me = self.client.get_me().await?;
        let identity = BotIdentity::from(me);
        self.identity = Some(identity.clone());
        Ok(identity)
    }

    pub fn identity(&self) -> Option<&BotIdentity> {
        self.identity.as_ref()
    }

    /// Long-poll once, returning every parsed update addressed to this
    /// adapter's chat. Advances the offset cursor past the returned batch
    /// regardless of whether every update in it parsed into something
    /// actionable (Telegram's offset semantics: acking means "past", not
    /// "handled").
    pub async fn poll_once(&mut self) -> Result<Vec<TelegramIncoming>, TelegramError> {
        let updates = self.client.get_updates(self.offset, self.timeout_s).await?;
        let mut out = Vec::new();
        for update in &updates {
            self.offset = Some(update.update_id + 1);
            if let Some(incoming) = parse_incoming_update(update, self.chat_id) {
                out.push(incoming);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telegram::api_models::{Chat, Message, Update};
    use crate::telegram::queue::TelegramFile;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeBot {
        batches: StdMutex<Vec<Vec<Update>>>,
        seen_offsets: StdMutex<Vec<Option<i64>>>,
        me_id: AtomicI64,
    }

    #[async_trait]
    impl TelegramBot for FakeBot {
        async fn send_message(&self, _: i64, _: &str, _: Option<i64>) -> Result<Value, TelegramError> {
            unimplemented!()
        }
        async fn edit_message_text(&self, _: i64, _: i64, _: &str) -> Result<Value, TelegramError> {
            unimplemented!()
        }
        async fn delete_message(&self, _: i64, _: i64) -> Result<bool, TelegramError> {
            unimplemented!()
        }
        async fn set_my_commands(&self, _: Vec<Value>) -> Result<bool, TelegramError> {
            unimplemented!()
        }
        async fn get_updates(&self, offset: Option<i64>, _timeout_s: u32) -> Result<Vec<Update>, TelegramError> {
            self.seen_offsets.lock().unwrap().push(offset);
            let mut batches = self.batches.lock().unwrap();
            Ok(if batches.is_empty() {
                Vec::new()
            } else {
                batches.remove(0)
            })
        }
        async fn get_me(&self) -> Result<crate::telegram::api_models::User, TelegramError> {
            Ok(crate::telegram::api_models::User {
                id: self.me_id.load(Ordering::SeqCst),
                is_bot: true,
                first_name: None,
                username: Some("TakopiBot".into()),
            })
        }
        async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError> {
            Ok(TelegramFile {
                file_id: file_id.to_string(),
                file_path: None,
                file_size: None,
            })
        }
        async fn download_file(&self, _file_path: &str) -> Result<Vec<u8>, TelegramError> {
            Ok(Vec::new())
        }
    }

    fn message(update_id: i64, message_id: i64, chat_id: i64, text: &str) -> Update {
        Update {
            update_id,
            message: Some(Message {
                message_id,
                chat: Chat {
                    id: chat_id,
                    kind: "private".into(),
                    title: None,
                    is_forum: None,
                },
                text: Some(text.to_string()),
                caption: None,
                from_: None,
                reply_to_message: None,
                message_thread_id: None,
                is_topic_message: None,
                voice: None,
                document: None,
                photo: None,
                video: None,
                sticker: None,
                media_group_id: None,
                date: None,
            }),
            callback_query: None,
        }
    }

    #[tokio::test]
    async fn resolve_identity_stores_bot_user() {
        let bot = FakeBot {
            batches: StdMutex::new(vec![]),
            seen_offsets: StdMutex::new(vec![]),
            me_id: AtomicI64::new(42),
        };
        let client = std::sync::Arc::new(QueuedTelegramClient::new(bot, 0.0, 0.0));
        let mut adapter = IngressAdapter::new(client, 123);

        let identity = adapter.resolve_identity().await.unwrap();
        assert_eq!(identity.user_id, 42);
        assert_eq!(adapter.identity().unwrap().username.as_deref(), Some("TakopiBot"));
    }

    #[tokio::test]
    async fn poll_once_filters_unknown_chat_and_advances_offset() {
        let bot = FakeBot {
            batches: StdMutex::new(vec![vec![
                message(10, 1, 123, "hello"),
                message(11, 2, 999, "from another chat"),
            ]]),
            seen_offsets: StdMutex::new(vec![]),
            me_id: AtomicI64::new(1),
        };
        let client = std::sync::Arc::new(QueuedTelegramClient::new(bot, 0.0, 0.0));
        let mut adapter = IngressAdapter::new(client, 123);

        let incoming = adapter.poll_once().await.unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(adapter.offset, Some(12));
    }
}
