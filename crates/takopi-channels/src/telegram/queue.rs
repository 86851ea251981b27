// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Single outbound queue per chat: HIGH-before-LOW, LOW coalesces by
//! `(chat_id, message_id)`, per-chat rate limiting, and a retry-after-once
//! contract for Telegram's 429 responses (§4.E).
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::{oneshot, Mutex as AsyncMutex, Notify};
use tokio::time::Instant;

use super::api_models::{Update, User};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelegramPriority {
    High,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelegramRetryAfter(pub f64);

impl fmt::Display for TelegramRetryAfter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "retry after {}s", self.0)
    }
}

impl std::error::Error for TelegramRetryAfter {}

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("rate limited, retry after {0}s")]
    RetryAfter(f64),
    #[error("telegram api error: {0}")]
    Api(String),
    #[error("request dropped before a response was produced")]
    Dropped,
}

impl From<TelegramRetryAfter> for TelegramError {
    fn from(value: TelegramRetryAfter) -> Self {
        TelegramError::RetryAfter(value.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatKind {
    Private,
    Group,
}

/// Metadata returned by `getFile`, ahead of the actual `downloadFile` call —
/// Telegram is explicit about splitting file lookup from file transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramFile {
    pub file_id: String,
    pub file_path: Option<String>,
    pub file_size: Option<u64>,
}

/// The chat-transport operations the queue serializes. A real backend
/// (e.g. `teloxide::Bot`) implements this; tests use an in-memory fake.
#[async_trait]
pub trait TelegramBot: Send + Sync + 'static {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        reply_to_message_id: Option<i64>,
    ) -> Result<Value, TelegramError>;
    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
    ) -> Result<Value, TelegramError>;
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TelegramError>;
    async fn set_my_commands(&self, commands: Vec<Value>) -> Result<bool, TelegramError>;
    async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_s: u32,
    ) -> Result<Vec<Update>, TelegramError>;
    async fn get_me(&self) -> Result<User, TelegramError>;
    /// Not routed through the priority queue — voice/document downloads are
    /// one-off fetches, not streaming edits subject to coalescing or the
    /// per-chat rate limiter.
    async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError>;
    async fn download_file(&self, file_path: &str) -> Result<Vec<u8>, TelegramError>;
    async fn close(&self) {}
}

type Responder = Option<oneshot::Sender<Result<Value, TelegramError>>>;

enum QueuedOp {
    Send {
        chat_id: i64,
        text: String,
        reply_to_message_id: Option<i64>,
        not_before: Option<Instant>,
        respond: Responder,
    },
    Edit {
        chat_id: i64,
        message_id: i64,
        text: String,
        not_before: Option<Instant>,
        respond: Responder,
    },
    Delete {
        chat_id: i64,
        message_id: i64,
        respond: Responder,
    },
    SetMyCommands {
        commands: Vec<Value>,
        respond: Responder,
    },
}

impl QueuedOp {
    fn not_before(&self) -> Option<Instant> {
        match self {
            QueuedOp::Send { not_before, .. } | QueuedOp::Edit { not_before, .. } => *not_before,
            _ => None,
        }
    }

    fn coalesce_key(&self) -> Option<(i64, i64)> {
        match self {
            QueuedOp::Edit {
                chat_id,
                message_id,
                ..
            } => Some((*chat_id, *message_id)),
            _ => None,
        }
    }

    fn take_respond(&mut self) -> Responder {
        match self {
            QueuedOp::Send { respond, .. }
            | QueuedOp::Edit { respond, .. }
            | QueuedOp::Delete { respond, .. }
            | QueuedOp::SetMyCommands { respond, .. } => respond.take(),
        }
    }
}

struct ChatQueue {
    high: AsyncMutex<VecDeque<QueuedOp>>,
    low: AsyncMutex<HashMap<(i64, i64), QueuedOp>>,
    notify: Notify,
    last_sent: AsyncMutex<Option<Instant>>,
}

impl ChatQueue {
    fn new() -> Self {
        Self {
            high: AsyncMutex::new(VecDeque::new()),
            low: AsyncMutex::new(HashMap::new()),
            notify: Notify::new(),
            last_sent: AsyncMutex::new(None),
        }
    }
}

pub type SleepFn = Arc<dyn Fn(Duration) -> BoxFuture<'static, ()> + Send + Sync>;

fn default_sleep() -> SleepFn {
    Arc::new(|d| Box::pin(tokio::time::sleep(d)))
}

/// Serializes all outbound calls for one chat through a priority queue,
/// delegating to a [`TelegramBot`] for the actual HTTP calls.
pub struct QueuedTelegramClient<B: TelegramBot> {
    bot: Arc<B>,
    private_spacing: Duration,
    group_spacing: Duration,
    sleep: SleepFn,
    chats: AsyncMutex<HashMap<i64, Arc<ChatQueue>>>,
    chat_kinds: AsyncMutex<HashMap<i64, ChatKind>>,
}

impl<B: TelegramBot> QueuedTelegramClient<B> {
    pub fn new(bot: B, private_chat_rps: f64, group_chat_rps: f64) -> Self {
        Self::with_sleep(bot, private_chat_rps, group_chat_rps, default_sleep())
    }

    pub fn with_sleep(
        bot: B,
        private_chat_rps: f64,
        group_chat_rps: f64,
        sleep: SleepFn,
    ) -> Self {
        Self {
            bot: Arc::new(bot),
            private_spacing: spacing_for_rps(private_chat_rps),
            group_spacing: spacing_for_rps(group_chat_rps),
            sleep,
            chats: AsyncMutex::new(HashMap::new()),
            chat_kinds: AsyncMutex::new(HashMap::new()),
        }
    }

    pub async fn set_chat_kind(&self, chat_id: i64, kind: ChatKind) {
        self.chat_kinds.lock().await.insert(chat_id, kind);
    }

    async fn queue_for(&self, chat_id: i64) -> Arc<ChatQueue> {
        let mut chats = self.chats.lock().await;
        if let Some(queue) = chats.get(&chat_id) {
            return Arc::clone(queue);
        }
        let queue = Arc::new(ChatQueue::new());
        chats.insert(chat_id, Arc::clone(&queue));
        let spacing = self.spacing_for(chat_id).await;
        spawn_worker(Arc::clone(&queue), Arc::clone(&self.bot), spacing, Arc::clone(&self.sleep));
        queue
    }

    async fn spacing_for(&self, chat_id: i64) -> Duration {
        match self.chat_kinds.lock().await.get(&chat_id) {
            Some(ChatKind::Group) => self.group_spacing,
            _ => self.private_spacing,
        }
    }

    async fn submit(&self, chat_id: i64, priority: TelegramPriority, mut op: QueuedOp) -> Responder {
        let queue = self.queue_for(chat_id).await;
        let respond = op.take_respond();
        match priority {
            TelegramPriority::High => {
                queue.high.lock().await.push_back(op);
            }
            TelegramPriority::Low => {
                if let Some(key) = op.coalesce_key() {
                    queue.low.lock().await.insert(key, op);
                } else {
                    queue.high.lock().await.push_back(op);
                }
            }
        }
        queue.notify.notify_waiters();
        respond
    }

    /// Sends a message. Always HIGH priority: a `send_message` call is a
    /// one-shot dispatch, never a streaming edit subject to coalescing.
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: impl Into<String>,
        reply_to_message_id: Option<i64>,
        _priority: TelegramPriority,
        not_before: Option<Instant>,
    ) -> Result<Value, TelegramError> {
        let (tx, rx) = oneshot::channel();
        let op = QueuedOp::Send {
            chat_id,
            text: text.into(),
            reply_to_message_id,
            not_before,
            respond: Some(tx),
        };
        let queue = self.queue_for(chat_id).await;
        queue.high.lock().await.push_back(op);
        queue.notify.notify_waiters();
        rx.await.unwrap_or(Err(TelegramError::Dropped))
    }

    pub async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: impl Into<String>,
        priority: TelegramPriority,
        not_before: Option<Instant>,
        wait: bool,
    ) -> Option<Result<Value, TelegramError>> {
        let (tx, rx) = if wait {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };
        let op = QueuedOp::Edit {
            chat_id,
            message_id,
            text: text.into(),
            not_before,
            respond: tx,
        };
        let queue = self.queue_for(chat_id).await;
        match priority {
            TelegramPriority::High => {
                queue.high.lock().await.push_back(op);
            }
            TelegramPriority::Low => {
                queue.low.lock().await.insert((chat_id, message_id), op);
            }
        }
        queue.notify.notify_waiters();
        match rx {
            Some(rx) => Some(rx.await.unwrap_or(Err(TelegramError::Dropped))),
            None => None,
        }
    }

    /// Deletes a message, first purging any pending LOW edit for the same
    /// `(chat_id, message_id)` (I7) so a stale progress edit never lands
    /// after the delete.
    pub async fn delete_message(
        &self,
        chat_id: i64,
        message_id: i64,
        priority: TelegramPriority,
    ) -> Result<bool, TelegramError> {
        let queue = self.queue_for(chat_id).await;
        queue.low.lock().await.remove(&(chat_id, message_id));

        let (tx, rx) = oneshot::channel();
        let op = QueuedOp::Delete {
            chat_id,
            message_id,
            respond: Some(tx),
        };
        match priority {
            TelegramPriority::High | TelegramPriority::Low => {
                queue.high.lock().await.push_back(op);
            }
        }
        queue.notify.notify_waiters();
        match rx.await.unwrap_or(Err(TelegramError::Dropped)) {
            Ok(value) => Ok(value.as_bool().unwrap_or(true)),
            Err(err) => Err(err),
        }
    }

    pub async fn set_my_commands(&self, commands: Vec<Value>, chat_id: i64) -> Result<bool, TelegramError> {
        let (tx, rx) = oneshot::channel();
        let op = QueuedOp::SetMyCommands {
            commands,
            respond: Some(tx),
        };
        let queue = self.queue_for(chat_id).await;
        queue.high.lock().await.push_back(op);
        queue.notify.notify_waiters();
        match rx.await.unwrap_or(Err(TelegramError::Dropped)) {
            Ok(value) => Ok(value.as_bool().unwrap_or(true)),
            Err(err) => Err(err),
        }
    }

    /// Long-polls for updates on its own channel: not rate-limited, but
    /// shares the same retry-after-once contract as the chat queue.
    pub async fn get_updates(
        &self,
        offset: Option<i64>,
        timeout_s: u32,
    ) -> Result<Vec<Update>, TelegramError> {
        match self.bot.get_updates(offset, timeout_s).await {
            Ok(updates) => Ok(updates),
            Err(TelegramError::RetryAfter(secs)) => {
                (self.sleep)(Duration::from_secs_f64(secs)).await;
                self.bot.get_updates(offset, timeout_s).await
            }
            Err(err) => Err(err),
        }
    }

    pub async fn get_me(&self) -> Result<User, TelegramError> {
        self.bot.get_me().await
    }

    /// Fetches file metadata then downloads its bytes, outside the priority
    /// queue (see [`TelegramBot::get_file`]).
    pub async fn download_voice(&self, file_id: &str) -> Result<Vec<u8>, TelegramError> {
        let file = self.bot.get_file(file_id).await?;
        let path = file
            .file_path
            .ok_or_else(|| TelegramError::Api("file has no path".into()))?;
        self.bot.download_file(&path).await
    }

    pub async fn close(&self) {
        self.bot.close().await;
    }
}

fn spacing_for_rps(rps: f64) -> Duration {
    if rps <= 0.0 {
        Duration::ZERO
    } else {
        Duration::from_secs_f64(1.0 / rps)
    }
}

fn spawn_worker<B: TelegramBot>(queue: Arc<ChatQueue>, bot: Arc<B>, spacing: Duration, sleep: SleepFn) {
    tokio::spawn(async move {
        'outer: loop {
            loop {
                let has_high = !queue.high.lock().await.is_empty();
                let has_low = !queue.low.lock().await.is_empty();
                if has_high || has_low {
                    break;
                }
                queue.notify.notified().await;
            }

            let high_op = queue.high.lock().await.pop_front();
            let mut op = match high_op {
                Some(op) => op,
                None => {
                    let mut low = queue.low.lock().await;
                    let Some(key) = low.keys().next().copied() else {
                        continue;
                    };
                    low.remove(&key).expect("key just observed")
                }
            };

            if let Some(not_before) = op.not_before() {
                loop {
                    let now = Instant::now();
                    if now >= not_before {
                        break;
                    }
                    if !queue.high.lock().await.is_empty() {
                        if let Some(key) = op.coalesce_key() {
                            queue.low.lock().await.insert(key, op);
                        } else {
                            queue.high.lock().await.push_front(op);
                        }
                        continue 'outer;
                    }
                    tokio::time::sleep((not_before - now).min(Duration::from_millis(20))).await;
                }
            }

            if spacing > Duration::ZERO {
                let mut last_sent = queue.last_sent.lock().await;
                if let Some(last) = *last_sent {
                    let elapsed = Instant::now().saturating_duration_since(last);
                    if elapsed < spacing {
                        (sleep)(spacing - elapsed).await;
                    }
                }
                *last_sent = Some(Instant::now());
            }

            execute(&bot, &mut op, &sleep).await;
        }
    });
}

async fn execute<B: TelegramBot>(bot: &Arc<B>, op: &mut QueuedOp, sleep: &SleepFn) {
    let respond = op.take_respond();
    let result = run_once(bot, op).await;
    let result = match result {
        Err(TelegramError::RetryAfter(secs)) => {
            (sleep)(Duration::from_secs_f64(secs)).await;
            run_once(bot, op).await
        }
        other => other,
    };
    if let Some(respond) = respond {
        let _ = respond.send(result);
    }
}

async fn run_once<B: TelegramBot>(bot: &Arc<B>, op: &QueuedOp) -> Result<Value, TelegramError> {
    match op {
        QueuedOp::Send {
            chat_id,
            text,
            reply_to_message_id,
            ..
        } => bot.send_message(*chat_id, text, *reply_to_message_id).await,
        QueuedOp::Edit {
            chat_id,
            message_id,
            text,
            ..
        } => bot.edit_message_text(*chat_id, *message_id, text).await,
        QueuedOp::Delete {
            chat_id,
            message_id,
            ..
        } => bot.delete_message(*chat_id, *message_id).await.map(Value::Bool),
        QueuedOp::SetMyCommands { commands, .. } => {
            bot.set_my_commands(commands.clone()).await.map(Value::Bool)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex as StdMutex;

    struct FakeBot {
        edit_calls: StdMutex<Vec<String>>,
        calls: StdMutex<Vec<&'static str>>,
        delete_calls: StdMutex<Vec<(i64, i64)>>,
        edit_attempts: AtomicU32,
        updates_attempts: AtomicU32,
        retry_after: Option<f64>,
        updates_retry_after: Option<f64>,
    }

    impl FakeBot {
        fn new() -> Self {
            Self {
                edit_calls: StdMutex::new(Vec::new()),
                calls: StdMutex::new(Vec::new()),
                delete_calls: StdMutex::new(Vec::new()),
                edit_attempts: AtomicU32::new(0),
                updates_attempts: AtomicU32::new(0),
                retry_after: None,
                updates_retry_after: None,
            }
        }
    }

    #[async_trait]
    impl TelegramBot for FakeBot {
        async fn send_message(
            &self,
            _chat_id: i64,
            _text: &str,
            _reply_to_message_id: Option<i64>,
        ) -> Result<Value, TelegramError> {
            self.calls.lock().unwrap().push("send_message");
            Ok(serde_json::json!({"message_id": 1}))
        }

        async fn edit_message_text(
            &self,
            _chat_id: i64,
            message_id: i64,
            text: &str,
        ) -> Result<Value, TelegramError> {
            self.calls.lock().unwrap().push("edit_message_text");
            self.edit_calls.lock().unwrap().push(text.to_string());
            let attempt = self.edit_attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(retry_after) = self.retry_after {
                if attempt == 0 {
                    return Err(TelegramError::RetryAfter(retry_after));
                }
            }
            Ok(serde_json::json!({"message_id": message_id}))
        }

        async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<bool, TelegramError> {
            self.calls.lock().unwrap().push("delete_message");
            self.delete_calls.lock().unwrap().push((chat_id, message_id));
            Ok(true)
        }

        async fn set_my_commands(&self, _commands: Vec<Value>) -> Result<bool, TelegramError> {
            Ok(true)
        }

        async fn get_updates(
            &self,
            _offset: Option<i64>,
            _timeout_s: u32,
        ) -> Result<Vec<Update>, TelegramError> {
            let attempt = self.updates_attempts.fetch_add(1, Ordering::SeqCst);
            if let Some(retry_after) = self.updates_retry_after {
                if attempt == 0 {
                    return Err(TelegramError::RetryAfter(retry_after));
                }
            }
            Ok(Vec::new())
        }

        async fn get_me(&self) -> Result<User, TelegramError> {
            Ok(User {
                id: 1,
                is_bot: true,
                first_name: None,
                username: None,
            })
        }

        async fn get_file(&self, file_id: &str) -> Result<TelegramFile, TelegramError> {
            Ok(TelegramFile {
                file_id: file_id.to_string(),
                file_path: Some(format!("voice/{file_id}.oga")),
                file_size: None,
            })
        }

        async fn download_file(&self, _file_path: &str) -> Result<Vec<u8>, TelegramError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn low_edits_coalesce_to_latest() {
        let bot = FakeBot::new();
        let client = QueuedTelegramClient::new(bot, 0.0, 0.0);
        let not_before = Instant::now() + Duration::from_millis(200);

        client
            .edit_message_text(1, 1, "first", TelegramPriority::Low, Some(not_before), false)
            .await;
        client
            .edit_message_text(1, 1, "second", TelegramPriority::Low, Some(not_before), false)
            .await;
        let result = client
            .edit_message_text(1, 1, "third", TelegramPriority::Low, Some(not_before), true)
            .await
            .unwrap();
        assert!(result.is_ok());

        assert_eq!(client.bot.edit_calls.lock().unwrap().as_slice(), ["third"]);
    }

    #[tokio::test]
    async fn high_priority_preempts_low() {
        let bot = FakeBot::new();
        let client = QueuedTelegramClient::new(bot, 0.0, 0.0);
        let not_before = Instant::now() + Duration::from_millis(200);

        client
            .edit_message_text(1, 1, "progress", TelegramPriority::Low, Some(not_before), false)
            .await;
        let result = client
            .send_message(1, "final", None, TelegramPriority::High, None)
            .await;
        assert!(result.is_ok());

        tokio::time::sleep(Duration::from_millis(250)).await;
        let calls = client.bot.calls.lock().unwrap();
        assert_eq!(calls.first(), Some(&"send_message"));
        assert_eq!(calls.last(), Some(&"edit_message_text"));
    }

    #[tokio::test]
    async fn delete_drops_pending_low_edits() {
        let bot = FakeBot::new();
        let client = QueuedTelegramClient::new(bot, 0.0, 0.0);
        let not_before = Instant::now() + Duration::from_millis(200);

        client
            .edit_message_text(1, 1, "progress", TelegramPriority::Low, Some(not_before), false)
            .await;
        let deleted = client.delete_message(1, 1, TelegramPriority::High).await;
        assert!(deleted.is_ok());

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(client.bot.delete_calls.lock().unwrap().as_slice(), [(1, 1)]);
        assert!(client.bot.edit_calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn retry_after_retries_exactly_once() {
        let mut bot = FakeBot::new();
        bot.retry_after = Some(0.01);
        let sleep_calls = Arc::new(StdMutex::new(Vec::new()));
        let sleep_calls2 = Arc::clone(&sleep_calls);
        let sleep: SleepFn = Arc::new(move |d: Duration| {
            sleep_calls2.lock().unwrap().push(d.as_secs_f64());
            Box::pin(async {})
        });

        let client = QueuedTelegramClient::with_sleep(bot, 0.0, 0.0, sleep);
        let result = client
            .edit_message_text(1, 1, "retry", TelegramPriority::High, None, true)
            .await
            .unwrap();

        assert!(result.is_ok());
        assert_eq!(client.bot.edit_attempts.load(Ordering::SeqCst), 2);
        assert_eq!(sleep_calls.lock().unwrap().as_slice(), [0.01]);
    }

    #[tokio::test]
    async fn get_updates_retries_on_retry_after() {
        let mut bot = FakeBot::new();
        bot.updates_retry_after = Some(0.0);
        let client = QueuedTelegramClient::new(bot, 0.0, 0.0);

        let updates = client.get_updates(None, 0).await.unwrap();
        assert!(updates.is_empty());
        assert_eq!(client.bot.updates_attempts.load(Ordering::SeqCst), 2);
    }
}
