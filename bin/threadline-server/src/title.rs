//! Thread title derivation.
//!
//! A title is cut from a thread's first user message: the first 8 words
//! of the first line, soft-capped at 50 characters with a single `…`.
//! Derivation never fails; anything empty or malformed degrades to
//! [`DEFAULT_TITLE`].

use crate::entities::{Role, ThreadMessage};

/// Fallback title for threads with no usable first user message.
pub const DEFAULT_TITLE: &str = "New chat";

/// Soft maximum title length, counted in Unicode scalars.
const MAX_TITLE_CHARS: usize = 50;

/// Leading words kept from the first line.
const MAX_TITLE_WORDS: usize = 8;

/// Derive a title from a thread's ordered message sequence.
///
/// Only the first `user` message contributes; assistant turns never do.
pub fn derive_title(messages: &[ThreadMessage]) -> String {
    messages
        .iter()
        .find(|m| m.role == Role::User)
        .map(|m| title_from_text(&m.content))
        .unwrap_or_else(|| DEFAULT_TITLE.to_owned())
}

/// Derive a title from raw text, the just-typed first user message.
///
/// Fast path used when a brand-new thread is titled before the store
/// round-trip; deriving from the stored state later yields the same
/// result.
pub fn title_from_text(text: &str) -> String {
    let content = text.trim();
    if content.is_empty() {
        return DEFAULT_TITLE.to_owned();
    }

    let first_line = content.lines().next().unwrap_or(content);
    let mut title = first_line
        .split_whitespace()
        .take(MAX_TITLE_WORDS)
        .collect::<Vec<_>>()
        .join(" ");

    if first_line.chars().count() > MAX_TITLE_CHARS {
        let cut: String = title.chars().take(MAX_TITLE_CHARS).collect();
        title = format!("{}…", cut.trim_end());
    }

    if title.is_empty() {
        DEFAULT_TITLE.to_owned()
    } else {
        title
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
