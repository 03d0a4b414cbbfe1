//! Text analysis for indexing.
//!
//! Turns OCR documents and metadata strings into a [`FieldLayout`]: the
//! field text, one position per indexable word, normalized token text and
//! char spans into the field text. Alternative OCR readings become extra
//! tokens sharing the word's position and span.

use crate::{
    layout::{FieldLayout, LayoutToken, Payload},
    ocr::OcrDocument,
};

/// A normalized word and the char range it was taken from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedWord {
    pub text: String,
    /// First kept char, relative to the raw word.
    pub start: usize,
    /// One past the last kept char, relative to the raw word.
    pub end: usize,
}

/// Lowercase a word and trim non-alphanumeric chars from both ends.
///
/// Returns `None` for words with no alphanumeric char at all (punctuation,
/// stray marks), which occupy text but are not indexed.
pub fn normalize_word(word: &str) -> Option<NormalizedWord> {
    let chars: Vec<char> = word.chars().collect();
    let first = chars.iter().position(|c| c.is_alphanumeric())?;
    let last = chars.iter().rposition(|c| c.is_alphanumeric())?;
    let text = chars[first..=last]
        .iter()
        .flat_map(|c| c.to_lowercase())
        .collect();

    Some(NormalizedWord {
        text,
        start: first,
        end: last + 1,
    })
}

/// Normalize a query term the way indexed tokens are normalized.
pub fn normalize_term(term: &str) -> Option<String> {
    normalize_word(term).map(|w| w.text)
}

#[derive(Default)]
struct FieldBuilder {
    text: String,
    char_len: u32,
    position: u32,
    tokens: Vec<LayoutToken>,
}

impl FieldBuilder {
    fn push_separator(&mut self, separator: &str) {
        if self.text.is_empty() {
            return;
        }
        self.text.push_str(separator);
        self.char_len += separator.chars().count() as u32;
    }

    fn push_word(
        &mut self,
        content: &str,
        alternatives: &[String],
        payload: Option<Payload>,
    ) {
        let word_start = self.char_len;
        let word_len = content.chars().count() as u32;
        self.text.push_str(content);
        self.char_len += word_len;

        let main = normalize_word(content);
        let (start, end) = match &main {
            Some(w) => (word_start + w.start as u32, word_start + w.end as u32),
            None => (word_start, word_start + word_len),
        };

        let mut readings: Vec<String> = Vec::new();
        let candidates = main
            .map(|w| w.text)
            .into_iter()
            .chain(alternatives.iter().filter_map(|a| normalize_term(a)));
        for reading in candidates {
            if !readings.contains(&reading) {
                readings.push(reading);
            }
        }

        if readings.is_empty() || start == end {
            return;
        }

        for text in readings {
            self.tokens.push(LayoutToken {
                text,
                position: self.position,
                start,
                end,
                payload,
            });
        }
        self.position += 1;
    }

    fn finish(self) -> FieldLayout {
        FieldLayout {
            text: self.text,
            length: self.char_len,
            tokens: self.tokens,
        }
    }
}

/// Analyze the OCR text layer of a document.
///
/// Words are joined by spaces, lines by newlines and pages by a blank line.
pub fn analyze_text_layer(doc: &OcrDocument) -> FieldLayout {
    let mut builder = FieldBuilder::default();

    for page in &doc.pages {
        builder.push_separator("\n\n");
        let page_start = builder.text.len();
        for (line_index, line) in page.lines.iter().enumerate() {
            if builder.text.len() > page_start {
                builder.push_separator("\n");
            }
            let line_start = builder.text.len();
            for word in &line.words {
                if builder.text.len() > line_start {
                    builder.push_separator(" ");
                }
                let payload = Payload {
                    page: page.index,
                    line: line_index as u32,
                    rect: word.rect,
                    confidence: word.confidence,
                };
                builder.push_word(
                    &word.content,
                    &word.alternatives,
                    Some(payload),
                );
            }
        }
    }

    builder.finish()
}

/// Analyze a plain metadata string (title, author).
///
/// The field text is the input unchanged; words are whitespace-separated.
pub fn analyze_plain(text: &str) -> FieldLayout {
    let mut tokens = Vec::new();
    let mut position = 0u32;
    let mut word = String::new();
    let mut word_start = 0usize;
    let mut char_len = 0usize;

    let mut flush = |word: &mut String, word_start: usize| {
        if let Some(w) = normalize_word(word) {
            tokens.push(LayoutToken {
                text: w.text,
                position,
                start: (word_start + w.start) as u32,
                end: (word_start + w.end) as u32,
                payload: None,
            });
            position += 1;
        }
        word.clear();
    };

    for (index, ch) in text.chars().enumerate() {
        char_len = index + 1;
        if ch.is_whitespace() {
            if !word.is_empty() {
                flush(&mut word, word_start);
            }
        } else {
            if word.is_empty() {
                word_start = index;
            }
            word.push(ch);
        }
    }
    if !word.is_empty() {
        flush(&mut word, word_start);
    }

    FieldLayout {
        text: text.to_string(),
        length: char_len as u32,
        tokens,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::{OcrLine, OcrPage, OcrWord};

    fn slice(text: &str, start: u32, end: u32) -> String {
        text.chars()
            .skip(start as usize)
            .take((end - start) as usize)
            .collect()
    }

    #[test]
    fn normalize_trims_and_lowercases() {
        let w = normalize_word("\"Fox,").unwrap();
        assert_eq!(w.text, "fox");
        assert_eq!((w.start, w.end), (1, 4));
        assert!(normalize_word("--").is_none());
        assert_eq!(normalize_term("Über").as_deref(), Some("über"));
    }

    #[test]
    fn text_layer_positions_and_spans() {
        let doc = OcrDocument::from_plain_text("d", "The quick\nbrown fox.");
        let field = analyze_text_layer(&doc);
        assert_eq!(field.text, "The quick\nbrown fox.");

        let texts: Vec<_> = field
            .tokens
            .iter()
            .map(|t| (t.text.as_str(), t.position))
            .collect();
        assert_eq!(
            texts,
            vec![("the", 0), ("quick", 1), ("brown", 2), ("fox", 3)]
        );

        for token in &field.tokens {
            let raw = slice(&field.text, token.start, token.end);
            assert_eq!(raw.to_lowercase(), token.text);
        }
        let fox = &field.tokens[3];
        assert_eq!(fox.payload.unwrap().line, 1);
        assert_eq!(field.length, 20);
    }

    #[test]
    fn alternatives_share_position_and_span() {
        let doc = OcrDocument {
            name: "d".into(),
            pages: vec![OcrPage {
                index: 0,
                lines: vec![OcrLine {
                    words: vec![
                        OcrWord::new("old"),
                        OcrWord::new("rnan").with_alternatives(&[
                            "man", "Man", "rnan",
                        ]),
                        OcrWord::new("sea"),
                    ],
                }],
            }],
            ..Default::default()
        };
        let field = analyze_text_layer(&doc);
        let at_one: Vec<_> = field
            .tokens
            .iter()
            .filter(|t| t.position == 1)
            .collect();
        assert_eq!(at_one.len(), 2);
        assert_eq!(at_one[0].text, "rnan");
        assert_eq!(at_one[1].text, "man");
        assert_eq!(
            (at_one[0].start, at_one[0].end),
            (at_one[1].start, at_one[1].end)
        );
        assert_eq!(field.tokens.last().unwrap().position, 2);
    }

    #[test]
    fn punctuation_takes_text_but_no_position() {
        let doc = OcrDocument::from_plain_text("d", "war - peace");
        let field = analyze_text_layer(&doc);
        assert_eq!(field.text, "war - peace");
        let peace = field.tokens.last().unwrap();
        assert_eq!(peace.position, 1);
        assert_eq!((peace.start, peace.end), (6, 11));
    }

    #[test]
    fn pages_separated_by_blank_line() {
        let doc = OcrDocument::from_plain_text("d", "one\u{c}two");
        let field = analyze_text_layer(&doc);
        assert_eq!(field.text, "one\n\ntwo");
        assert_eq!(field.tokens[1].payload.unwrap().page, 1);
    }

    #[test]
    fn plain_metadata() {
        let field = analyze_plain("  War and  Peace ");
        assert_eq!(field.text, "  War and  Peace ");
        let spans: Vec<_> = field
            .tokens
            .iter()
            .map(|t| (t.text.as_str(), t.start, t.end))
            .collect();
        assert_eq!(
            spans,
            vec![("war", 2, 5), ("and", 6, 9), ("peace", 11, 16)]
        );
        assert_eq!(field.length, 17);
    }
}
