// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! The Telegram side of the bridge: the ingress adapter that long-polls
//! updates into the transport-agnostic [`takopi_model::IncomingMessage`]
//! shape (§4.H), the priority outgoing queue (§4.E), and markdown-to-entity
//! rendering for the messages the queue sends.

pub mod telegram;
