// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Prompt classification (§4.G step 2): daemon commands (`/new`,
//! `/workspace <name>`, `/workspaces`, `/sessions`, `/drop <engine>`) and
//! per-engine/mode shortcuts (`/codex`, `/plan`, ...). Grounded on
//! `original_source/tests/test_daemon_commands.py` for the exact command
//! grammar (case-insensitive, `@botname` mentions tolerated, first
//! whitespace-separated token is the argument).

use std::collections::{HashMap, HashSet};

use takopi_model::EngineId;

const RESERVED: &[&str] = &["new", "workspace", "workspaces", "sessions", "drop"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonCommand {
    New,
    Workspace(String),
    Workspaces,
    Sessions,
    Drop(String),
}

fn split_first_line(text: &str) -> (&str, &str) {
    match text.find(['\n', '\r']) {
        Some(idx) => {
            let bytes = text.as_bytes();
            let rest_start = if bytes.get(idx) == Some(&b'\r') && bytes.get(idx + 1) == Some(&b'\n') {
                idx + 1
            } else {
                idx
            };
            (&text[..idx], &text[rest_start + 1..])
        }
        None => (text, ""),
    }
}

/// Strips a leading `/name` (or `/name@mention`) word from `line`, requiring
/// a word boundary (end-of-string, whitespace, or `@mention`) right after
/// the command name. Returns the remainder of the line past the command
/// word and any mention, with no further trimming.
fn strip_command_word<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let head_len = 1 + name.len();
    if line.len() < head_len || !line.as_bytes()[0].eq_ignore_ascii_case(&b'/') {
        return None;
    }
    let (head, mut rest) = line.split_at(head_len);
    if !head[1..].eq_ignore_ascii_case(name) {
        return None;
    }
    match rest.chars().next() {
        None => {}
        Some('@') => {
            rest = &rest[1..];
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            rest = &rest[end..];
        }
        Some(c) if c.is_whitespace() => {}
        Some(_) => return None,
    }
    Some(rest)
}

/// Parses one daemon command from `line`, returning the command plus
/// whatever in-line text followed its argument (for the one-argument
/// commands; always empty for the zero-argument ones).
fn parse_line(line: &str) -> Option<(DaemonCommand, String)> {
    if let Some(rest) = strip_command_word(line, "new") {
        return rest.trim().is_empty().then_some((DaemonCommand::New, String::new()));
    }
    if let Some(rest) = strip_command_word(line, "workspaces") {
        return rest.trim().is_empty().then_some((DaemonCommand::Workspaces, String::new()));
    }
    if let Some(rest) = strip_command_word(line, "workspace") {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let name = trimmed[..end].to_string();
        let leftover = trimmed[end..].trim_start().to_string();
        return Some((DaemonCommand::Workspace(name), leftover));
    }
    if let Some(rest) = strip_command_word(line, "sessions") {
        return rest.trim().is_empty().then_some((DaemonCommand::Sessions, String::new()));
    }
    if let Some(rest) = strip_command_word(line, "drop") {
        let trimmed = rest.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
        let engine = trimmed[..end].to_string();
        let leftover = trimmed[end..].trim_start().to_string();
        return Some((DaemonCommand::Drop(engine), leftover));
    }
    None
}

pub fn parse_daemon_command(text: &str) -> Option<DaemonCommand> {
    let (first_line, _) = split_first_line(text.trim_start());
    parse_line(first_line.trim()).map(|(cmd, _)| cmd)
}

pub fn is_daemon_command(text: &str) -> bool {
    parse_daemon_command(text).is_some()
}

/// Strips a recognized daemon command from the front of `text`, returning
/// the remaining prompt text (everything after the command's own line and
/// argument) and the parsed command, if any. `text` is returned unchanged
/// when no command is recognized.
pub fn strip_daemon_command(text: &str) -> (String, Option<DaemonCommand>) {
    let leading_trimmed = text.trim_start();
    let (first_line, rest_after_line) = split_first_line(leading_trimmed);
    let Some((cmd, leftover)) = parse_line(first_line.trim()) else {
        return (text.to_string(), None);
    };
    let combined = match (leftover.is_empty(), rest_after_line.is_empty()) {
        (true, _) => rest_after_line.to_string(),
        (false, true) => leftover,
        (false, false) => format!("{leftover}\n{rest_after_line}"),
    };
    (combined, Some(cmd))
}

/// Engine and mode shortcuts (`/codex`, `/plan`, ...) configured for this
/// bridge. Any shortcut name colliding with a reserved daemon command is
/// silently dropped at construction time rather than at parse time — the
/// daemon command always wins that name.
pub struct ShortcutSet {
    engines: HashMap<String, EngineId>,
    modes: HashMap<String, String>,
}

impl ShortcutSet {
    pub fn new(engine_ids: impl IntoIterator<Item = EngineId>, modes: impl IntoIterator<Item = String>) -> Self {
        let reserved: HashSet<&str> = RESERVED.iter().copied().collect();
        let mut engines = HashMap::new();
        for id in engine_ids {
            let key = id.as_str().to_ascii_lowercase();
            if reserved.contains(key.as_str()) {
                continue;
            }
            engines.insert(key, id);
        }
        let mut modes_out = HashMap::new();
        for mode in modes {
            let key = mode.to_ascii_lowercase();
            if reserved.contains(key.as_str()) || engines.contains_key(&key) {
                continue;
            }
            modes_out.insert(key, mode);
        }
        Self {
            engines,
            modes: modes_out,
        }
    }

    /// Looks for a single `/shortcut` at the start of `text`. Returns the
    /// resolved override (engine xor mode — a name can't be both, since
    /// mode shortcuts colliding with engine names are dropped at
    /// construction) and the text with the shortcut stripped.
    pub fn strip(&self, text: &str) -> (Option<EngineId>, Option<String>, String) {
        let (first_line, rest_after_line) = split_first_line(text.trim_start());
        let trimmed = first_line.trim();
        if !trimmed.starts_with('/') {
            return (None, None, text.to_string());
        }
        for (key, engine) in &self.engines {
            if let Some(rest) = strip_command_word(trimmed, key) {
                if rest.trim().is_empty() {
                    return (Some(engine.clone()), None, rest_after_line.to_string());
                }
            }
        }
        for (key, mode) in &self.modes {
            if let Some(rest) = strip_command_word(trimmed, key) {
                if rest.trim().is_empty() {
                    return (None, Some(mode.clone()), rest_after_line.to_string());
                }
            }
        }
        (None, None, text.to_string())
    }
}

/// The result of classifying one incoming message's text (§4.G step 2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub daemon_command: Option<DaemonCommand>,
    pub engine_override: Option<EngineId>,
    pub mode_override: Option<String>,
    pub text: String,
}

/// Runs the full classification pipeline: strip a daemon command (if any),
/// then an engine/mode shortcut (if any) from what's left.
pub fn classify(text: &str, shortcuts: &ShortcutSet) -> Classified {
    let (after_daemon, daemon_command) = strip_daemon_command(text);
    let (engine_override, mode_override, after_shortcut) = shortcuts.strip(&after_daemon);
    Classified {
        daemon_command,
        engine_override,
        mode_override,
        text: after_shortcut,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_new_with_mention_and_trailing_space() {
        assert_eq!(parse_daemon_command("/new"), Some(DaemonCommand::New));
        assert_eq!(parse_daemon_command("/new@mybot"), Some(DaemonCommand::New));
        assert_eq!(parse_daemon_command("/new "), Some(DaemonCommand::New));
        assert_eq!(parse_daemon_command("/NEW"), Some(DaemonCommand::New));
    }

    #[test]
    fn parses_workspace_with_name() {
        let cmd = parse_daemon_command("/workspace myproject").unwrap();
        assert_eq!(cmd, DaemonCommand::Workspace("myproject".to_string()));
        let cmd = parse_daemon_command("/workspace@mybot myproject").unwrap();
        assert_eq!(cmd, DaemonCommand::Workspace("myproject".to_string()));
    }

    #[test]
    fn workspace_without_name_is_not_a_command() {
        assert_eq!(parse_daemon_command("/workspace"), None);
    }

    #[test]
    fn workspaces_and_sessions_and_drop() {
        assert_eq!(parse_daemon_command("/workspaces"), Some(DaemonCommand::Workspaces));
        assert_eq!(parse_daemon_command("/sessions"), Some(DaemonCommand::Sessions));
        assert_eq!(
            parse_daemon_command("/drop codex"),
            Some(DaemonCommand::Drop("codex".to_string()))
        );
        assert_eq!(parse_daemon_command("/drop"), None);
    }

    #[test]
    fn unknown_and_regular_text_are_not_commands() {
        assert_eq!(parse_daemon_command("/unknown"), None);
        assert_eq!(parse_daemon_command(""), None);
        assert_eq!(parse_daemon_command("hello world"), None);
    }

    #[test]
    fn is_daemon_command_matches_parse_daemon_command() {
        assert!(is_daemon_command("/new"));
        assert!(is_daemon_command("/workspace foo"));
        assert!(!is_daemon_command("/cancel"));
        assert!(!is_daemon_command(""));
    }

    #[test]
    fn strip_new_only_and_with_following_text() {
        assert_eq!(strip_daemon_command("/new"), (String::new(), Some(DaemonCommand::New)));
        assert_eq!(
            strip_daemon_command("/new\nhello world"),
            ("hello world".to_string(), Some(DaemonCommand::New))
        );
    }

    #[test]
    fn strip_workspace_with_and_without_following_text() {
        assert_eq!(
            strip_daemon_command("/workspace myproject"),
            (String::new(), Some(DaemonCommand::Workspace("myproject".to_string())))
        );
        assert_eq!(
            strip_daemon_command("/workspace myproject do something"),
            (
                "do something".to_string(),
                Some(DaemonCommand::Workspace("myproject".to_string()))
            )
        );
    }

    #[test]
    fn strip_non_command_and_empty_are_unchanged() {
        assert_eq!(
            strip_daemon_command("hello world"),
            ("hello world".to_string(), None)
        );
        assert_eq!(strip_daemon_command(""), (String::new(), None));
    }

    #[test]
    fn strip_preserves_only_the_post_command_text() {
        let (text, cmd) = strip_daemon_command("\n\n/new\nhello");
        assert_eq!(text, "hello");
        assert_eq!(cmd, Some(DaemonCommand::New));
    }

    #[test]
    fn very_long_workspace_name_and_body_survive() {
        let long_name = "a".repeat(1000);
        let cmd = parse_daemon_command(&format!("/workspace {long_name}")).unwrap();
        assert_eq!(cmd, DaemonCommand::Workspace(long_name));

        let long_body = "x".repeat(100_000);
        let (text, cmd) = strip_daemon_command(&format!("/new\n{long_body}"));
        assert_eq!(cmd, Some(DaemonCommand::New));
        assert_eq!(text.len(), 100_000);
    }

    #[test]
    fn shortcut_set_drops_names_colliding_with_reserved_commands() {
        let shortcuts = ShortcutSet::new(
            [EngineId::new("codex"), EngineId::new("new")],
            ["plan".to_string(), "drop".to_string()],
        );
        let (engine, mode, text) = shortcuts.strip("/new do something");
        // "new" collided with the reserved daemon command and was dropped,
        // so "/new" here is NOT a shortcut override — but classify() above
        // still owns interpreting it as the daemon command itself.
        assert!(engine.is_none());
        assert!(mode.is_none());
        assert_eq!(text, "/new do something");

        let (engine, mode, _) = shortcuts.strip("/codex");
        assert_eq!(engine, Some(EngineId::new("codex")));
        assert!(mode.is_none());

        let (engine, mode, _) = shortcuts.strip("/plan");
        assert!(engine.is_none());
        assert_eq!(mode, Some("plan".to_string()));
    }

    #[test]
    fn classify_strips_daemon_command_before_shortcut() {
        let shortcuts = ShortcutSet::new([EngineId::new("codex")], ["plan".to_string()]);
        let result = classify("/workspace foo do the thing", &shortcuts);
        assert_eq!(result.daemon_command, Some(DaemonCommand::Workspace("foo".to_string())));
        assert_eq!(result.text, "do the thing");

        let result = classify("/codex fix the bug", &shortcuts);
        assert_eq!(result.daemon_command, None);
        assert_eq!(result.engine_override, Some(EngineId::new("codex")));
    }
}
