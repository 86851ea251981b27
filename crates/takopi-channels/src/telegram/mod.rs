// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
pub mod api_models;
pub mod http_bot;
pub mod incoming;
pub mod ingress;
pub mod queue;
pub mod render;

pub use http_bot::HttpTelegramBot;
pub use incoming::{parse_incoming_update, TelegramCallbackQuery, TelegramIncoming, TelegramIncomingMessage};
pub use ingress::{BotIdentity, IngressAdapter};
pub use queue::{ChatKind, QueuedTelegramClient, TelegramBot, TelegramError, TelegramFile, TelegramPriority};
pub use render::{render_markdown, EntityKind, MessageEntity, RenderedMessage};
