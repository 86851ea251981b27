// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use takopi_events::{ActionKind, EventFactory, TakopiEvent};
use takopi_model::ResumeToken;

/// Best-effort translation of one raw JSONL object from an engine's stdout
/// into zero or more [`TakopiEvent`]s.
///
/// Engines that ship a typed schema (Claude Code's `stream-json`) get a
/// dedicated translator; this one is the fallback used by engines whose
/// wire format is a loosely-typed `{"type": ..., ...}` object close enough
/// to the canonical shape that a field-by-field remap covers the common
/// cases. Anything it doesn't recognize degrades to a `Note` action rather
/// than being dropped, so a run's audit log never silently loses a line.
pub fn translate_generic(
    factory: &mut EventFactory,
    value: &Value,
    session_id_field: &str,
) -> Vec<TakopiEvent> {
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    match kind {
        "session" | "system" | "init" => {
            if let Some(session_id) = value
                .get(session_id_field)
                .or_else(|| value.get("session_id"))
                .and_then(Value::as_str)
            {
                let token = ResumeToken::new(factory.engine().clone(), session_id);
                if let Ok(event) = factory.started(token, None, Some(value.clone())) {
                    out.push(event);
                }
            }
        }
        "tool_call" | "tool_use" | "command" => {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("tool")
                .to_string();
            let title = value
                .get("title")
                .or_else(|| value.get("name"))
                .or_else(|| value.get("command"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            out.push(factory.action_started(id, ActionKind::Tool, title, Some(value.clone())));
        }
        "tool_result" | "tool_output" => {
            let id = value
                .get("id")
                .and_then(Value::as_str)
                .unwrap_or("tool")
                .to_string();
            let ok = value.get("ok").and_then(Value::as_bool);
            out.push(factory.action_completed(
                id,
                ActionKind::Tool,
                "",
                Some(value.clone()),
                ok,
                None,
                None,
            ));
        }
        "message" | "text" | "assistant" => {
            // Free-form text is surfaced as a note so it shows up in progress
            // rendering even for engines that don't separate "final answer"
            // from "narration".
            if let Some(text) = value.get("text").and_then(Value::as_str) {
                out.push(factory.action_started(
                    "note",
                    ActionKind::Note,
                    text.to_string(),
                    None,
                ));
            }
        }
        "result" | "completed" | "done" => {
            let ok = if let Some(ok) = value.get("ok").and_then(Value::as_bool) {
                ok
            } else if let Some(is_error) = value.get("is_error").and_then(Value::as_bool) {
                !is_error
            } else {
                true
            };
            let answer = value
                .get("result")
                .or_else(|| value.get("answer"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let error = value
                .get("error")
                .and_then(Value::as_str)
                .map(str::to_string);
            out.push(factory.completed(ok, answer, error, value.get("usage").cloned()));
        }
        other => {
            out.push(factory.action_started(
                "unrecognized",
                ActionKind::Other(other.to_string()),
                other.to_string(),
                Some(value.clone()),
            ));
        }
    }
    out
}
