// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text preprocessing applied to code before it is embedded.
//!
//! The normalizer is a language-agnostic heuristic rather than a parser:
//! it strips `/* ... */` and `//` comments, collapses whitespace and
//! truncates to a fixed character budget. It is pure and deterministic, and
//! normalizing already-normalized text returns it unchanged.

use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

/// Maximum number of characters kept before the truncation marker.
pub const DEFAULT_MAX_CHARS: usize = 8000;

/// Appended when content is cut at the character budget.
pub const TRUNCATION_MARKER: &str = "...";

// Both comment forms in one leftmost-first pass, so removing one comment
// never splices a new one together.
static COMMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)/\*.*?\*/|//[^\n]*").expect("comment regex"));
static WHITESPACE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Deterministic code-to-text normalizer.
#[derive(Debug, Clone)]
pub struct ContentNormalizer {
    max_chars: usize,
}

impl Default for ContentNormalizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CHARS)
    }
}

impl ContentNormalizer {
    pub fn new(max_chars: usize) -> Self {
        Self { max_chars }
    }

    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Normalizes `content`. Never fails; empty input yields an empty string.
    pub fn normalize(&self, content: &str) -> String {
        if content.is_empty() {
            return String::new();
        }

        let without_comments = COMMENT.replace_all(content, "");
        let collapsed = WHITESPACE.replace_all(&without_comments, " ");
        let trimmed = collapsed.trim();

        match truncate_to_chars(trimmed, self.max_chars) {
            Cow::Borrowed(text) => text.to_string(),
            Cow::Owned(mut text) => {
                text.push_str(TRUNCATION_MARKER);
                text
            }
        }
    }
}

/// Returns the first `max_chars` characters, borrowing when nothing is cut.
fn truncate_to_chars(input: &str, max_chars: usize) -> Cow<'_, str> {
    if max_chars == 0 {
        return if input.is_empty() {
            Cow::Borrowed(input)
        } else {
            Cow::Owned(String::new())
        };
    }

    for (count, (idx, _)) in input.char_indices().enumerate() {
        if count == max_chars {
            return Cow::Owned(input[..idx].to_string());
        }
    }

    Cow::Borrowed(input)
}
