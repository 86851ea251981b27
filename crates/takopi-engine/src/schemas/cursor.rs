// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Wire shapes for the `cursor-agent` CLI's JSONL stream.
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum CursorEvent {
    #[serde(rename = "session")]
    Session {
        session_id: String,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        model: Option<String>,
    },
    #[serde(rename = "thinking")]
    Thinking {
        subtype: String,
        #[serde(default)]
        text: Option<String>,
        session_id: String,
        #[serde(default)]
        timestamp_ms: Option<u64>,
    },
    #[serde(rename = "tool_call")]
    ToolCall {
        id: String,
        name: String,
        #[serde(default)]
        args: serde_json::Value,
        session_id: String,
    },
    #[serde(rename = "tool_result")]
    ToolResult {
        id: String,
        #[serde(default)]
        ok: Option<bool>,
        #[serde(default)]
        output: Option<String>,
        session_id: String,
    },
    #[serde(rename = "assistant")]
    AssistantResponse {
        message: AssistantMessage,
        session_id: String,
    },
    #[serde(rename = "result")]
    Result {
        subtype: String,
        #[serde(default)]
        result: Option<String>,
        session_id: String,
        #[serde(default)]
        duration_ms: Option<u64>,
        #[serde(default)]
        duration_api_ms: Option<u64>,
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssistantMessage {
    pub role: String,
    pub content: Vec<ContentBlock>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Decode one line of `cursor-agent`'s JSONL stream.
pub fn decode_event(line: &str) -> Result<CursorEvent, serde_json::Error> {
    serde_json::from_str(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_session_line() {
        let event = decode_event(r#"{"type":"session","session_id":"abc","cwd":"/tmp"}"#).unwrap();
        assert!(matches!(event, CursorEvent::Session { session_id, .. } if session_id == "abc"));
    }

    #[test]
    fn decodes_result_line() {
        let event = decode_event(
            r#"{"type":"result","subtype":"success","result":"done","session_id":"abc","is_error":false}"#,
        )
        .unwrap();
        match event {
            CursorEvent::Result { is_error, result, .. } => {
                assert!(!is_error);
                assert_eq!(result.as_deref(), Some("done"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unrecognized_type_falls_back_to_other() {
        let event = decode_event(r#"{"type":"mystery"}"#).unwrap();
        assert!(matches!(event, CursorEvent::Other));
    }
}
