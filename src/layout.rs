//! Per-document token layout.
//!
//! Tantivy postings record positions only. The character span and OCR
//! payload of every indexed token are kept in a stored JSON record next to
//! the document, and the highlighter resolves each `(position, text)` it
//! finds in a posting list against it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Bounding box of a word on its page image, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub width: u32,
    pub height: u32,
}

/// Auxiliary OCR data attached to an indexed token.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Page index as reported by the OCR output.
    pub page: u32,
    /// Zero-based line index within the page.
    pub line: u32,
    pub rect: Rect,
    /// OCR confidence of the word, from 0 to 1.
    pub confidence: f32,
}

/// One indexed token: its normalized text, stream position and char span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayoutToken {
    pub text: String,
    pub position: u32,
    pub start: u32,
    pub end: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

/// The text of one field and all of its tokens, sorted by position.
///
/// Token text is normalized; `start..end` is a char range into `text`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldLayout {
    pub text: String,
    /// Field length in chars.
    pub length: u32,
    pub tokens: Vec<LayoutToken>,
}

impl FieldLayout {
    /// Find the token with the given position and text.
    ///
    /// Several tokens share a position when the OCR produced alternative
    /// readings for a word.
    pub fn locate(&self, position: u32, text: &str) -> Option<&LayoutToken> {
        let first = self.tokens.partition_point(|t| t.position < position);
        self.tokens[first..]
            .iter()
            .take_while(|t| t.position == position)
            .find(|t| t.text == text)
    }

    /// The chars of `start..end`, or `None` when the range is out of bounds.
    pub fn excerpt(&self, start: u32, end: u32) -> Option<String> {
        if start > end || end > self.length {
            return None;
        }
        Some(
            self.text
                .chars()
                .skip(start as usize)
                .take((end - start) as usize)
                .collect(),
        )
    }

    /// Number of distinct positions in the field.
    pub fn word_count(&self) -> usize {
        let mut count = 0;
        let mut last = None;
        for token in &self.tokens {
            if last != Some(token.position) {
                count += 1;
                last = Some(token.position);
            }
        }
        count
    }
}

/// The stored layout record of one document, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    pub fields: BTreeMap<String, FieldLayout>,
}

impl DocumentLayout {
    pub fn field(&self, name: &str) -> Option<&FieldLayout> {
        self.fields.get(name)
    }
}
