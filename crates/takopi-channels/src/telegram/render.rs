// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Markdown → Telegram message-entity rendering.
//!
//! The outgoing queue (§4.E) cannot emit a final frame without this: a run's
//! answer text arrives as markdown (engines write `**bold**`, `` `code` ``,
//! fenced code blocks, numbered lists) and Telegram renders plain text plus
//! a side list of `(type, offset, length)` entities rather than inline
//! markup — sending raw `**bold**` shows the literal asterisks. We convert
//! with [`pulldown_cmark`] rather than hand-rolling a markdown scanner, the
//! same tool `sven-tui`'s `render_markdown` uses for its ANSI equivalent.
//!
//! Offsets are counted in UTF-16 code units, per Telegram's entity contract
//! (`MessageEntity.offset`/`.length` — see the Bot API docs), not bytes or
//! `char`s; emoji and other astral-plane text would otherwise shift every
//! entity after it.
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Bold,
    Italic,
    Strikethrough,
    Code,
    Pre,
    TextLink,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEntity {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub offset: usize,
    pub length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Rendered output ready to hand to `sendMessage`/`editMessageText`: plain
/// text plus the entities Telegram overlays on it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RenderedMessage {
    pub text: String,
    pub entities: Vec<MessageEntity>,
}

struct OpenSpan {
    kind: EntityKind,
    utf16_start: usize,
    url: Option<String>,
    language: Option<String>,
}

struct Renderer {
    text: String,
    utf16_len: usize,
    entities: Vec<MessageEntity>,
    open: Vec<OpenSpan>,
    list_stack: Vec<Option<u64>>,
    in_code_block: bool,
    code_lang: String,
    code_buf: String,
    pending_link_url: Option<String>,
}

fn utf16_len(s: &str) -> usize {
    s.chars().map(|c| c.len_utf16()).sum()
}

impl Renderer {
    fn new() -> Self {
        Self {
            text: String::new(),
            utf16_len: 0,
            entities: Vec::new(),
            open: Vec::new(),
            list_stack: Vec::new(),
            in_code_block: false,
            code_lang: String::new(),
            code_buf: String::new(),
            pending_link_url: None,
        }
    }

    fn push_str(&mut self, s: &str) {
        self.utf16_len += utf16_len(s);
        self.text.push_str(s);
    }

    fn newline_if_needed(&mut self) {
        if !self.text.is_empty() && !self.text.ends_with('\n') {
            self.push_str("\n");
        }
    }

    fn open_span(&mut self, kind: EntityKind) {
        self.open.push(OpenSpan {
            kind,
            utf16_start: self.utf16_len,
            url: None,
            language: None,
        });
    }

    fn close_span(&mut self, kind: EntityKind) {
        if let Some(pos) = self.open.iter().rposition(|s| s.kind == kind) {
            let span = self.open.remove(pos);
            let length = self.utf16_len.saturating_sub(span.utf16_start);
            if length > 0 {
                self.entities.push(MessageEntity {
                    kind: span.kind,
                    offset: span.utf16_start,
                    length,
                    url: span.url,
                    language: span.language,
                });
            }
        }
    }

    fn finish_code_block(&mut self) {
        let start = self.utf16_len;
        // Strip one trailing newline pulldown-cmark always includes.
        let body = self.code_buf.trim_end_matches('\n');
        self.push_str(body);
        let length = self.utf16_len.saturating_sub(start);
        if length > 0 {
            self.entities.push(MessageEntity {
                kind: EntityKind::Pre,
                offset: start,
                length,
                url: None,
                language: if self.code_lang.is_empty() {
                    None
                } else {
                    Some(std::mem::take(&mut self.code_lang))
                },
            });
        }
        self.push_str("\n");
        self.in_code_block = false;
        self.code_buf.clear();
    }

    fn render(mut self, md: &str) -> RenderedMessage {
        let mut opts = Options::empty();
        opts.insert(Options::ENABLE_STRIKETHROUGH);
        let parser = Parser::new_ext(md, opts);

        for event in parser {
            if self.in_code_block {
                match event {
                    Event::Text(t) => self.code_buf.push_str(&t),
                    Event::End(TagEnd::CodeBlock) => self.finish_code_block(),
                    _ => {}
                }
                continue;
            }

            match event {
                Event::Start(Tag::Heading {
                    level: HeadingLevel::H1 | HeadingLevel::H2,
                    ..
                }) => {
                    self.newline_if_needed();
                    self.open_span(EntityKind::Bold);
                }
                Event::Start(Tag::Heading { .. }) => {
                    self.newline_if_needed();
                    self.open_span(EntityKind::Bold);
                }
                Event::End(TagEnd::Heading(_)) => {
                    self.close_span(EntityKind::Bold);
                    self.push_str("\n\n");
                }
                Event::Start(Tag::Paragraph) => {}
                Event::End(TagEnd::Paragraph) => self.push_str("\n\n"),
                Event::Start(Tag::Strong) => self.open_span(EntityKind::Bold),
                Event::End(TagEnd::Strong) => self.close_span(EntityKind::Bold),
                Event::Start(Tag::Emphasis) => self.open_span(EntityKind::Italic),
                Event::End(TagEnd::Emphasis) => self.close_span(EntityKind::Italic),
                Event::Start(Tag::Strikethrough) => self.open_span(EntityKind::Strikethrough),
                Event::End(TagEnd::Strikethrough) => self.close_span(EntityKind::Strikethrough),
                Event::Start(Tag::Link { dest_url, .. }) => {
                    self.pending_link_url = Some(dest_url.to_string());
                    self.open_span(EntityKind::TextLink);
                    if let Some(span) = self.open.last_mut() {
                        span.url = self.pending_link_url.clone();
                    }
                }
                Event::End(TagEnd::Link) => self.close_span(EntityKind::TextLink),
                Event::Start(Tag::CodeBlock(kind)) => {
                    self.in_code_block = true;
                    self.code_buf.clear();
                    self.code_lang = match kind {
                        CodeBlockKind::Fenced(lang) => lang.to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                }
                Event::Code(code) => {
                    self.open_span(EntityKind::Code);
                    self.push_str(&code);
                    self.close_span(EntityKind::Code);
                }
                Event::Start(Tag::List(start)) => self.list_stack.push(start),
                Event::End(TagEnd::List(_)) => {
                    self.list_stack.pop();
                }
                Event::Start(Tag::Item) => {
                    // Tighten lists: no blank line between items, matching
                    // the reference renderer's "numbered list tightening".
                    if let Some(Some(n)) = self.list_stack.last_mut() {
                        self.push_str(&format!("{n}. "));
                        *n += 1;
                    } else {
                        self.push_str("• ");
                    }
                }
                Event::End(TagEnd::Item) => self.newline_if_needed(),
                Event::Text(t) => self.push_str(&t),
                Event::SoftBreak => self.push_str(" "),
                Event::HardBreak => self.push_str("\n"),
                Event::Rule => {
                    self.newline_if_needed();
                    self.push_str("---\n\n");
                }
                _ => {}
            }
        }

        // Unbalanced spans (malformed input) are simply dropped rather than
        // emitted with a bogus length.
        let mut text = self.text.trim_end_matches('\n').to_string();
        // Undo the last tag's trailing blank line once, to avoid a
        // dangling newline pair at the very end of the message.
        while text.ends_with('\n') {
            text.pop();
        }
        RenderedMessage {
            text,
            entities: self.entities,
        }
    }
}

/// Render `md` into Telegram-ready plain text plus entities.
pub fn render_markdown(md: &str) -> RenderedMessage {
    Renderer::new().render(md)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bold_text_produces_bold_entity() {
        let rendered = render_markdown("hello **world**");
        assert_eq!(rendered.text, "hello world");
        assert_eq!(rendered.entities.len(), 1);
        let entity = &rendered.entities[0];
        assert_eq!(entity.kind, EntityKind::Bold);
        assert_eq!(entity.offset, 6);
        assert_eq!(entity.length, 5);
    }

    #[test]
    fn inline_code_produces_code_entity() {
        let rendered = render_markdown("run `ls -la` now");
        assert_eq!(rendered.text, "run ls -la now");
        assert_eq!(rendered.entities.len(), 1);
        assert_eq!(rendered.entities[0].kind, EntityKind::Code);
        assert_eq!(rendered.entities[0].length, 5);
    }

    #[test]
    fn fenced_code_block_produces_pre_entity_with_language() {
        let rendered = render_markdown("```rust\nfn main() {}\n```");
        assert!(rendered.text.contains("fn main() {}"));
        let entity = rendered
            .entities
            .iter()
            .find(|e| e.kind == EntityKind::Pre)
            .unwrap();
        assert_eq!(entity.language.as_deref(), Some("rust"));
    }

    #[test]
    fn numbered_list_is_tightened() {
        let rendered = render_markdown("1. first\n2. second\n3. third\n");
        assert_eq!(rendered.text, "1. first\n2. second\n3. third");
    }

    #[test]
    fn offsets_are_utf16_not_byte_based() {
        // "café " is 5 chars / 6 UTF-8 bytes ('é' = 2 bytes) but 5 UTF-16
        // units — confirms we count UTF-16, not bytes, matching Telegram.
        let rendered = render_markdown("café **x**");
        let entity = &rendered.entities[0];
        assert_eq!(entity.offset, utf16_len("café "));
    }

    #[test]
    fn plain_text_has_no_entities() {
        let rendered = render_markdown("just plain text, nothing special");
        assert!(rendered.entities.is_empty());
        assert_eq!(rendered.text, "just plain text, nothing special");
    }
}
