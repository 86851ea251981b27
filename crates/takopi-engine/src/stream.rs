// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tracing::debug;

/// One line read off an engine's stdout, with its best-effort JSON parse.
///
/// `data` is `None` when the line isn't valid JSON — engines occasionally
/// interleave plain log lines with their JSONL protocol, and a malformed
/// line must not abort the run.
#[derive(Debug, Clone)]
pub struct JsonLine {
    pub raw: String,
    pub data: Option<serde_json::Value>,
}

/// Read `stream` line by line, decoding each non-blank line as JSON.
///
/// `tag` is included in the debug trace so interleaved runner output in a
/// multi-run log stays attributable.
pub async fn iter_jsonl<R, F>(stream: R, tag: &str, mut on_line: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(JsonLine),
{
    let mut lines = BufReader::new(stream).lines();
    loop {
        let next = match lines.next_line().await {
            Ok(next) => next,
            Err(e) => {
                debug!(tag, error = %e, "jsonl stream read error");
                return;
            }
        };
        let Some(raw_line) = next else { return };
        debug!(tag, line = %raw_line, "jsonl");
        let trimmed = raw_line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let data = match serde_json::from_str(trimmed) {
            Ok(value) => Some(value),
            Err(_) => {
                debug!(tag, line = %trimmed, "invalid json line");
                None
            }
        };
        on_line(JsonLine {
            raw: raw_line,
            data,
        });
    }
}

/// Drain `stream` to the debug log without buffering it; engines' stderr is
/// diagnostic only and never parsed.
pub async fn drain_stderr<R: AsyncRead + Unpin>(stream: R, tag: &str) {
    let mut lines = BufReader::new(stream).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => debug!(tag, stderr = %line, "engine stderr"),
            Ok(None) => return,
            Err(e) => {
                debug!(tag, error = %e, "stderr drain error");
                return;
            }
        }
    }
}
