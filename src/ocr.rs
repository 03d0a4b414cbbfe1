//! OCR input documents.
//!
//! The OCR pipeline hands over one JSON file per document: pages of lines of
//! words, each word with its recognized content, any alternative readings,
//! a confidence and its rectangle on the page image.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    layout::Rect,
};

fn full_confidence() -> f32 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub content: String,
    #[serde(default)]
    pub alternatives: Vec<String>,
    #[serde(default = "full_confidence")]
    pub confidence: f32,
    #[serde(default)]
    pub rect: Rect,
}

impl OcrWord {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            alternatives: Vec::new(),
            confidence: 1.0,
            rect: Rect::default(),
        }
    }

    pub fn with_alternatives(mut self, alternatives: &[&str]) -> Self {
        self.alternatives =
            alternatives.iter().map(|a| a.to_string()).collect();
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub words: Vec<OcrWord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    pub index: u32,
    pub lines: Vec<OcrLine>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrDocument {
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub pages: Vec<OcrPage>,
}

impl OcrDocument {
    /// Build a document from plain text.
    ///
    /// Form feeds separate pages, newlines separate lines and whitespace
    /// separates words. Every word gets full confidence.
    pub fn from_plain_text(name: &str, text: &str) -> Self {
        let pages = text
            .split('\u{c}')
            .enumerate()
            .map(|(index, page)| OcrPage {
                index: index as u32,
                lines: page
                    .lines()
                    .map(|line| OcrLine {
                        words: line
                            .split_whitespace()
                            .map(OcrWord::new)
                            .collect(),
                    })
                    .filter(|line| !line.words.is_empty())
                    .collect(),
            })
            .collect();

        Self {
            name: name.to_string(),
            title: String::new(),
            author: String::new(),
            pages,
        }
    }

    /// Load a document from a `.json` OCR file or a `.txt` file.
    ///
    /// The document name defaults to the file stem when the JSON does not
    /// carry one.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("untitled")
            .to_string();

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut doc = if is_json {
            serde_json::from_str::<OcrDocument>(&content)?
        } else {
            OcrDocument::from_plain_text(&stem, &content)
        };
        if doc.name.trim().is_empty() {
            doc.name = stem;
        }
        doc.validate()?;
        Ok(doc)
    }

    /// Reject documents the analyzer cannot index faithfully.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidDocument("empty document name".into()));
        }
        for page in &self.pages {
            for word in page.lines.iter().flat_map(|l| &l.words) {
                if !(0.0..=1.0).contains(&word.confidence) {
                    return Err(Error::InvalidDocument(format!(
                        "{}: confidence {} out of range on page {}",
                        self.name, word.confidence, page.index
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn word_count(&self) -> usize {
        self.pages
            .iter()
            .flat_map(|p| &p.lines)
            .map(|l| l.words.len())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_pages_lines_words() {
        let doc = OcrDocument::from_plain_text(
            "doc",
            "the quick\nbrown fox\u{c}jumps over",
        );
        assert_eq!(doc.pages.len(), 2);
        assert_eq!(doc.pages[0].lines.len(), 2);
        assert_eq!(doc.pages[1].index, 1);
        assert_eq!(doc.pages[1].lines[0].words[1].content, "over");
        assert_eq!(doc.word_count(), 6);
    }

    #[test]
    fn json_defaults() {
        let json = r#"{
            "name": "vol1",
            "pages": [{"index": 3, "lines": [{"words": [
                {"content": "hello", "alternatives": ["hallo"]}
            ]}]}]
        }"#;
        let doc: OcrDocument = serde_json::from_str(json).unwrap();
        let word = &doc.pages[0].lines[0].words[0];
        assert_eq!(word.confidence, 1.0);
        assert_eq!(word.alternatives, vec!["hallo".to_string()]);
        assert_eq!(word.rect, Rect::default());
        assert!(doc.title.is_empty());
    }

    #[test]
    fn load_uses_file_stem_for_missing_name() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("letters.json");
        std::fs::write(&path, r#"{"name": "", "pages": []}"#).unwrap();
        let doc = OcrDocument::load(&path).unwrap();
        assert_eq!(doc.name, "letters");

        let txt = tmp.path().join("notes.txt");
        std::fs::write(&txt, "one two").unwrap();
        let doc = OcrDocument::load(&txt).unwrap();
        assert_eq!(doc.name, "notes");
        assert_eq!(doc.word_count(), 2);
    }

    #[test]
    fn validate_rejects_bad_confidence() {
        let mut doc = OcrDocument::from_plain_text("doc", "a b");
        doc.pages[0].lines[0].words[0].confidence = 1.5;
        assert!(matches!(doc.validate(), Err(Error::InvalidDocument(_))));
    }
}
