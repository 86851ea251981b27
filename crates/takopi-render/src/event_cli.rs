// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde_json::Value;

use takopi_events::{ActionInfo, ActionKind, TakopiEvent};

/// Truncate `text` to `width` characters, appending an ellipsis, if
/// `width` is set and exceeded. `None` means no truncation.
pub(crate) fn truncate(text: &str, width: Option<usize>) -> String {
    match width {
        Some(width) if text.chars().count() > width && width > 0 => {
            let mut out: String = text.chars().take(width.saturating_sub(1)).collect();
            out.push('…');
            out
        }
        _ => text.to_string(),
    }
}

fn exit_code_suffix(detail: Option<&Value>) -> String {
    let Some(code) = detail.and_then(|d| d.get("exit_code")).and_then(Value::as_i64) else {
        return String::new();
    };
    if code == 0 {
        String::new()
    } else {
        format!(" (exit {code})")
    }
}

/// Render one action's body (without the ✓/✗/▸ prefix), per §4.D's
/// per-kind rules.
pub(crate) fn render_action_body(
    action: &ActionInfo,
    ok: Option<bool>,
    command_width: Option<usize>,
) -> String {
    let title = truncate(&action.title, command_width);
    match &action.kind {
        ActionKind::Command => format!("`{title}`{}", exit_code_suffix(action.detail.as_ref())),
        ActionKind::WebSearch => format!("searched: {title}"),
        ActionKind::Tool => format!("tool: {title}"),
        ActionKind::FileChange => format!("updated {title}"),
        ActionKind::Note => title,
        ActionKind::Thinking => format!("thinking: {title}"),
        ActionKind::Other(name) => format!("{name}: {title}"),
    }
}

fn status_prefix(ok: Option<bool>) -> &'static str {
    match ok {
        Some(true) => "✓",
        Some(false) => "✗",
        None => "▸",
    }
}

/// Render one [`TakopiEvent`] to zero or more CLI lines, threading the
/// last-seen session title through so a repeated `session.started` for the
/// same engine (I1 permits it to recur) doesn't reprint its title line.
///
/// Returns `(new_last, lines)`.
pub fn render_event_cli(event: &TakopiEvent, last: Option<&str>) -> (Option<String>, Vec<String>) {
    match event {
        TakopiEvent::SessionStarted { engine, .. } => {
            let title = engine.as_str().to_string();
            if last == Some(title.as_str()) {
                (Some(title), Vec::new())
            } else {
                (Some(title.clone()), vec![title])
            }
        }
        TakopiEvent::ActionStarted { action, .. } => {
            let line = format!("{} {}", status_prefix(None), render_action_body(action, None, None));
            (last.map(str::to_string), vec![line])
        }
        TakopiEvent::ActionUpdated { action, .. } => {
            let line = format!("{} {}", status_prefix(None), render_action_body(action, None, None));
            (last.map(str::to_string), vec![line])
        }
        TakopiEvent::ActionCompleted { action, ok, .. } => {
            let line = format!("{} {}", status_prefix(*ok), render_action_body(action, *ok, None));
            (last.map(str::to_string), vec![line])
        }
        TakopiEvent::Completed { .. } | TakopiEvent::Unknown => (last.map(str::to_string), Vec::new()),
    }
}
