//! folio - OCR document search with phrase-aware highlighting.
//!
//! folio indexes OCR output (pages of lines of words, each with alternative
//! readings, a confidence and a rectangle) into
//! [Tantivy](https://github.com/quickwit-oss/tantivy), and highlights query
//! matches inside chosen documents. Terms that only make sense as part of a
//! phrase are highlighted only where the phrase actually occurs, within
//! the requested slop.
//!
//! # Quick start
//!
//! ```
//! use folio::{HighlightConfig, Highlighter, OcrDocument, OcrIndex, Query};
//!
//! let index = OcrIndex::open_in_ram().unwrap();
//! let mut writer = index.writer(15_000_000).unwrap();
//! let doc = OcrDocument::from_plain_text("memo", "the quick brown fox");
//! index.add_document(&writer, &doc, 0).unwrap();
//! writer.commit().unwrap();
//!
//! let snapshot = index.snapshot().unwrap();
//! let config = HighlightConfig::default();
//! let query = Query::parse("\"quick fox\"~1", "text");
//! let sets = Highlighter::new(&snapshot, &config)
//!     .highlight(&query, &snapshot.live_doc_ids(), &[])
//!     .unwrap();
//!
//! let texts: Vec<_> =
//!     sets.values().flatten().map(|t| t.text.as_str()).collect();
//! assert_eq!(texts, ["quick", "fox"]);
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod config_db;
pub mod data_dir;
pub mod error;
pub mod highlight;
pub mod incremental;
pub mod index;
pub mod ingestion;
pub mod layout;
pub mod ocr;
pub mod report;
pub mod walker;

pub use config::HighlightConfig;
pub use config_db::ConfigDb;
pub use data_dir::DataDir;
pub use error::{Error, Result};
pub use highlight::{HighlightSets, HighlightTerm, Highlighter, Query};
pub use index::{DocId, IndexSnapshot, OcrIndex};
pub use ocr::OcrDocument;
