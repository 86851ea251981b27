// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Bot-token redaction (§6). Two shapes must never reach a log line or a
//! persisted transcript:
//!
//! 1. `bot<digits>:<base64ish>` (the shape Telegram embeds in Bot API URLs)
//! 2. a bare `<digits>:<base64ish>` of the same shape, unprefixed
//!
//! The `bot`-prefixed pattern is redacted first so a token following `bot`
//! never also falls through to the bare-token branch and gets the wrong
//! (but still redacted) replacement.

use std::sync::OnceLock;

use regex::Regex;

fn bot_prefixed() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"bot\d{6,}:[A-Za-z0-9_-]{20,}").expect("valid regex"))
}

fn bare_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b\d{9,}:[A-Za-z0-9_-]{20,}\b").expect("valid regex"))
}

/// Redact every bot-token-shaped substring of `input`, returning the
/// rewritten string. Idempotent: redacting an already-redacted string is a
/// no-op, since neither replacement contains a digit run long enough to
/// re-match.
pub fn redact(input: &str) -> String {
    let after_bot = bot_prefixed().replace_all(input, "bot[REDACTED]");
    bare_token().replace_all(&after_bot, "[REDACTED_TOKEN]").into_owned()
}

/// Truncate `text` to `max_chars` Unicode scalar values, appending an
/// ellipsis when truncated, then redact what remains.
///
/// Redaction runs after truncation so a token split mid-way by the
/// truncation point can't reassemble itself into something that no longer
/// matches — the truncated remnant is just ordinary (if odd-looking) text.
pub fn truncate_and_redact(text: &str, max_chars: usize) -> String {
    let truncated = if text.chars().count() > max_chars {
        let mut out: String = text.chars().take(max_chars).collect();
        out.push('…');
        out
    } else {
        text.to_string()
    };
    redact(&truncated)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_bot_prefixed_token_in_url() {
        let input = "https://api.telegram.org/bot123456789:ABCdefGHI_jklMNOpqrSTUv/sendMessage";
        let out = redact(input);
        assert!(!out.contains("123456789"));
        assert!(out.contains("bot[REDACTED]"));
    }

    #[test]
    fn redacts_bare_token() {
        let input = "Token is 123456789:ABCDEFGHIJ_klmnopqrst";
        let out = redact(input);
        assert!(!out.contains("123456789"));
        assert_eq!(out, "Token is [REDACTED_TOKEN]");
    }

    #[test]
    fn leaves_ordinary_text_unchanged() {
        let input = "This is a normal message";
        assert_eq!(redact(input), input);
    }

    #[test]
    fn short_digit_runs_are_not_mistaken_for_tokens() {
        let input = "chat 12345 message 67";
        assert_eq!(redact(input), input);
    }

    #[test]
    fn redaction_is_idempotent() {
        let input = "bot123456789:ABCdefGHI_jklMNOpqrSTUv and 987654321:ZYXwvuTSRqponMLKjih";
        let once = redact(input);
        let twice = redact(&once);
        assert_eq!(once, twice);
        assert!(once.contains("bot[REDACTED]"));
        assert!(once.contains("[REDACTED_TOKEN]"));
    }

    #[test]
    fn truncation_appends_ellipsis_before_redaction() {
        let input = "x".repeat(10);
        let out = truncate_and_redact(&input, 5);
        assert_eq!(out, "xxxxx…");
    }
}
