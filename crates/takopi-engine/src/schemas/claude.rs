// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire shapes for Claude Code's `--output-format stream-json`, and the
//! translator that folds them into [`TakopiEvent`]s.
//!
//! Not every field the CLI emits is modeled — `forbid_unknown_fields` is
//! off on the reference schema for the same reason it's off here: new
//! fields must not break decoding of an otherwise-recognized message.
use serde::{Deserialize, Serialize};
use serde_json::Value;

use takopi_events::{ActionKind, EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum StreamJsonMessage {
    #[serde(rename = "system")]
    System {
        subtype: String,
        session_id: Option<String>,
        model: Option<String>,
        cwd: Option<String>,
    },
    #[serde(rename = "assistant")]
    Assistant { message: AssistantMessageBody },
    #[serde(rename = "user")]
    User { message: Value },
    #[serde(rename = "result")]
    Result {
        subtype: String,
        is_error: bool,
        session_id: String,
        result: Option<String>,
        total_cost_usd: Option<f64>,
        usage: Option<Value>,
    },
    #[serde(rename = "stream_event")]
    StreamEvent {
        session_id: String,
        event: Value,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessageBody {
    pub content: Vec<ContentBlock>,
    pub model: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "thinking")]
    Thinking { thinking: String },
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        tool_use_id: String,
        #[serde(default)]
        is_error: Option<bool>,
    },
    #[serde(other)]
    Other,
}

/// Translate one raw JSON line into [`TakopiEvent`]s, driven by `factory`
/// so the resume-token invariant holds across the whole run.
pub fn translate_claude_line(factory: &mut EventFactory, value: &Value) -> Vec<TakopiEvent> {
    let Ok(message) = serde_json::from_value::<StreamJsonMessage>(value.clone()) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    match message {
        StreamJsonMessage::System { session_id, .. } => {
            if let Some(session_id) = session_id {
                let token = ResumeToken::new(factory.engine().clone(), session_id);
                if let Ok(event) = factory.started(token, Some("Claude".into()), None) {
                    out.push(event);
                }
            }
        }
        StreamJsonMessage::Assistant { message } => {
            for (idx, block) in message.content.into_iter().enumerate() {
                match block {
                    ContentBlock::Text { text } => {
                        out.push(factory.action_started(
                            format!("text-{idx}"),
                            ActionKind::Note,
                            text,
                            None,
                        ));
                    }
                    ContentBlock::Thinking { thinking } => {
                        out.push(factory.action_started(
                            format!("thinking-{idx}"),
                            ActionKind::Thinking,
                            thinking,
                            None,
                        ));
                    }
                    ContentBlock::ToolUse { id, name, input } => {
                        out.push(factory.action_started(
                            id,
                            ActionKind::Tool,
                            name,
                            Some(input),
                        ));
                    }
                    ContentBlock::ToolResult {
                        tool_use_id,
                        is_error,
                    } => {
                        out.push(factory.action_completed(
                            tool_use_id,
                            ActionKind::Tool,
                            "",
                            None,
                            is_error.map(|e| !e),
                            None,
                            None,
                        ));
                    }
                    ContentBlock::Other => {}
                }
            }
        }
        StreamJsonMessage::Result {
            is_error,
            result,
            usage,
            ..
        } => {
            out.push(factory.completed(
                !is_error,
                result.unwrap_or_default(),
                None,
                usage,
            ));
        }
        StreamJsonMessage::User { .. }
        | StreamJsonMessage::StreamEvent { .. }
        | StreamJsonMessage::Other => {}
    }
    out
}
