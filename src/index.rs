use std::{
    collections::{BTreeSet, HashMap},
    path::Path,
};

use tantivy::{
    DocAddress,
    DocSet,
    Index,
    IndexReader,
    IndexWriter,
    Searcher,
    SegmentReader,
    TERMINATED,
    TantivyDocument,
    schema::*,
    tokenizer::{PreTokenizedString, Token},
};

use crate::{
    analysis,
    error::{Error, Result},
    layout::{DocumentLayout, FieldLayout},
    ocr::OcrDocument,
};

/// Index-wide document id: segment doc base plus segment-local id.
///
/// Stable for the lifetime of one [`IndexSnapshot`].
pub type DocId = u32;

/// Field names used in the schema.
pub mod fields {
    pub const NAME: &str = "name";
    pub const TITLE: &str = "title";
    pub const AUTHOR: &str = "author";
    pub const TEXT: &str = "text";
    pub const LAYOUT: &str = "layout";
    pub const INDEXED_AT: &str = "indexed_at";

    /// Positional text fields the highlighter can read.
    pub const HIGHLIGHTABLE: [&str; 3] = [TITLE, AUTHOR, TEXT];
}

/// Resolved field handles for the schema.
#[derive(Debug, Clone, Copy)]
pub struct SchemaFields {
    pub name: Field,
    pub title: Field,
    pub author: Field,
    pub text: Field,
    pub layout: Field,
    pub indexed_at: Field,
}

impl SchemaFields {
    fn resolve(schema: &Schema) -> Result<Self> {
        let f = |name: &str| {
            schema.get_field(name).map_err(|_| {
                Error::CorruptIndex(format!("schema has no field {name}"))
            })
        };
        Ok(Self {
            name: f(fields::NAME)?,
            title: f(fields::TITLE)?,
            author: f(fields::AUTHOR)?,
            text: f(fields::TEXT)?,
            layout: f(fields::LAYOUT)?,
            indexed_at: f(fields::INDEXED_AT)?,
        })
    }

    /// Handle of a highlightable field, `None` for anything else.
    pub fn highlightable(&self, name: &str) -> Option<Field> {
        match name {
            fields::TITLE => Some(self.title),
            fields::AUTHOR => Some(self.author),
            fields::TEXT => Some(self.text),
            _ => None,
        }
    }
}

/// Manages the tantivy index of OCR documents.
pub struct OcrIndex {
    index: Index,
    reader: IndexReader,
    fields: SchemaFields,
}

fn build_schema() -> Schema {
    let mut builder = Schema::builder();

    builder.add_text_field(fields::NAME, STRING | STORED);

    // Positional fields are indexed from pre-tokenized streams. Their text
    // is kept in the layout record instead of the doc store.
    let positional = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    builder.add_text_field(fields::TITLE, positional.clone());
    builder.add_text_field(fields::AUTHOR, positional.clone());
    builder.add_text_field(fields::TEXT, positional);

    builder.add_text_field(fields::LAYOUT, STORED);
    builder.add_u64_field(fields::INDEXED_AT, STORED);

    builder.build()
}

/// Convert a field layout into the token stream tantivy indexes.
///
/// Tantivy offsets are byte offsets, layout spans are char offsets.
fn pre_tokenize(layout: &FieldLayout) -> Result<PreTokenizedString> {
    let byte_at: Vec<usize> = layout
        .text
        .char_indices()
        .map(|(byte, _)| byte)
        .chain(std::iter::once(layout.text.len()))
        .collect();

    let mut tokens = Vec::with_capacity(layout.tokens.len());
    for token in &layout.tokens {
        let span = byte_at
            .get(token.start as usize)
            .zip(byte_at.get(token.end as usize));
        let Some((&offset_from, &offset_to)) = span else {
            return Err(Error::InvalidDocument(format!(
                "token {:?} spans {}..{} past the end of the field",
                token.text, token.start, token.end
            )));
        };
        tokens.push(Token {
            offset_from,
            offset_to,
            position: token.position as usize,
            text: token.text.clone(),
            position_length: 1,
        });
    }

    Ok(PreTokenizedString {
        text: layout.text.clone(),
        tokens,
    })
}

impl OcrIndex {
    /// Open or create an index at the given directory.
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let schema = build_schema();

        let mmap_dir = tantivy::directory::MmapDirectory::open(dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?;
        let index = if Index::exists(&mmap_dir)
            .map_err(|e| tantivy::TantivyError::SystemError(e.to_string()))?
        {
            Index::open(mmap_dir)?
        } else {
            Index::create(mmap_dir, schema, tantivy::IndexSettings::default())?
        };

        Self::from_index(index)
    }

    /// Create an in-memory index (for testing).
    pub fn open_in_ram() -> Result<Self> {
        Self::from_index(Index::create_in_ram(build_schema()))
    }

    fn from_index(index: Index) -> Result<Self> {
        let fields = SchemaFields::resolve(&index.schema())?;
        let reader = index.reader()?;
        Ok(Self {
            index,
            reader,
            fields,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    /// Create a single-threaded writer with the given memory budget (in
    /// bytes). One thread keeps document ids in insertion order.
    pub fn writer(&self, memory_budget: usize) -> Result<IndexWriter> {
        Ok(self.index.writer_with_num_threads(1, memory_budget)?)
    }

    /// Add an OCR document, replacing any document with the same name.
    pub fn add_document(
        &self,
        writer: &IndexWriter,
        doc: &OcrDocument,
        indexed_at: u64,
    ) -> Result<()> {
        let f = self.fields;

        let mut layout = DocumentLayout::default();
        layout.fields.insert(
            fields::TITLE.to_string(),
            analysis::analyze_plain(&doc.title),
        );
        layout.fields.insert(
            fields::AUTHOR.to_string(),
            analysis::analyze_plain(&doc.author),
        );
        layout.fields.insert(
            fields::TEXT.to_string(),
            analysis::analyze_text_layer(doc),
        );

        let mut tantivy_doc = TantivyDocument::default();
        tantivy_doc.add_text(f.name, &doc.name);
        for (name, field_layout) in &layout.fields {
            if let Some(field) = f.highlightable(name) {
                tantivy_doc
                    .add_pre_tokenized_text(field, pre_tokenize(field_layout)?);
            }
        }
        tantivy_doc.add_text(f.layout, serde_json::to_string(&layout)?);
        tantivy_doc.add_u64(f.indexed_at, indexed_at);

        self.delete_document(writer, &doc.name);
        writer.add_document(tantivy_doc)?;

        tracing::trace!(
            name = %doc.name,
            words = doc.word_count(),
            "queued document"
        );
        Ok(())
    }

    /// Delete a document by name.
    pub fn delete_document(&self, writer: &IndexWriter, name: &str) {
        let term = tantivy::Term::from_field_text(self.fields.name, name);
        writer.delete_term(term);
    }

    /// Reload the reader and take a consistent view of the index.
    pub fn snapshot(&self) -> Result<IndexSnapshot> {
        self.reader.reload()?;
        IndexSnapshot::new(self.reader.searcher(), self.fields)
    }
}

impl std::fmt::Debug for OcrIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OcrIndex").finish_non_exhaustive()
    }
}

/// Stored part of an indexed document.
#[derive(Debug, Clone)]
pub struct StoredDocument {
    pub name: String,
    pub indexed_at: u64,
    pub layout: DocumentLayout,
}

/// A point-in-time, read-only view of the index.
///
/// Cheap to clone and safe to share between threads.
#[derive(Clone)]
pub struct IndexSnapshot {
    searcher: Searcher,
    fields: SchemaFields,
    doc_bases: Vec<DocId>,
    field_doc_counts: HashMap<Field, u64>,
}

impl IndexSnapshot {
    fn new(searcher: Searcher, fields: SchemaFields) -> Result<Self> {
        let readers = searcher.segment_readers();
        let mut doc_bases = Vec::with_capacity(readers.len());
        let mut base = 0;
        for reader in readers {
            doc_bases.push(base);
            base += reader.max_doc();
        }

        let mut field_doc_counts = HashMap::new();
        for field in [fields.title, fields.author, fields.text] {
            let count = count_docs_with_field(readers, field)?;
            field_doc_counts.insert(field, count);
        }

        Ok(Self {
            searcher,
            fields,
            doc_bases,
            field_doc_counts,
        })
    }

    pub fn fields(&self) -> SchemaFields {
        self.fields
    }

    pub fn num_segments(&self) -> usize {
        self.doc_bases.len()
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u64 {
        self.searcher.num_docs()
    }

    pub fn segment_reader(&self, segment: u32) -> &SegmentReader {
        self.searcher.segment_reader(segment)
    }

    pub fn global_id(&self, segment: u32, local: u32) -> DocId {
        self.doc_bases[segment as usize] + local
    }

    /// Map a global id to `(segment ordinal, local id)`.
    pub fn locate(&self, id: DocId) -> Option<(u32, u32)> {
        let segment = self.doc_bases.partition_point(|&base| base <= id);
        let segment = segment.checked_sub(1)?;
        let local = id - self.doc_bases[segment];
        let reader = &self.searcher.segment_readers()[segment];
        (local < reader.max_doc()).then_some((segment as u32, local))
    }

    /// Group live candidate ids by segment, local ids ascending.
    ///
    /// Ids that map to no segment or to a deleted document are dropped.
    pub fn partition(&self, ids: &BTreeSet<DocId>) -> Vec<(u32, Vec<u32>)> {
        let mut out: Vec<(u32, Vec<u32>)> = Vec::new();
        for &id in ids {
            let Some((segment, local)) = self.locate(id) else {
                continue;
            };
            if self.segment_reader(segment).is_deleted(local) {
                continue;
            }
            match out.last_mut() {
                Some((last, locals)) if *last == segment => locals.push(local),
                _ => out.push((segment, vec![local])),
            }
        }
        out
    }

    /// Number of documents containing `text` in `field`.
    ///
    /// Deleted documents count until a merge drops them, the same as in
    /// [`docs_with_field`](Self::docs_with_field).
    pub fn doc_freq(&self, field: Field, text: &str) -> Result<u64> {
        let term = tantivy::Term::from_field_text(field, text);
        Ok(self.searcher.doc_freq(&term)?)
    }

    /// Number of documents with at least one token in `field`, deleted but
    /// unmerged ones included. Zero for fields that are not highlightable.
    pub fn docs_with_field(&self, field: Field) -> u64 {
        self.field_doc_counts.get(&field).copied().unwrap_or(0)
    }

    /// Read the stored name and layout of a document.
    pub fn stored(&self, id: DocId) -> Result<StoredDocument> {
        let (segment, local) = self.locate(id).ok_or(Error::NotFound {
            kind: "document",
            name: id.to_string(),
        })?;
        let doc: TantivyDocument =
            self.searcher.doc(DocAddress::new(segment, local))?;

        let name = doc
            .get_first(self.fields.name)
            .and_then(|v| v.as_str())
            .unwrap_or("")
            .to_string();
        let indexed_at = doc
            .get_first(self.fields.indexed_at)
            .and_then(|v| v.as_u64())
            .unwrap_or(0);
        let raw = doc
            .get_first(self.fields.layout)
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                Error::CorruptIndex(format!("document {id} has no layout"))
            })?;
        let layout = serde_json::from_str(raw).map_err(|e| {
            Error::CorruptIndex(format!("document {id} layout: {e}"))
        })?;

        Ok(StoredDocument {
            name,
            indexed_at,
            layout,
        })
    }

    /// Find the live document with the given name.
    pub fn resolve_name(&self, name: &str) -> Result<Option<DocId>> {
        let term = tantivy::Term::from_field_text(self.fields.name, name);
        let readers = self.searcher.segment_readers();
        for (segment, reader) in readers.iter().enumerate() {
            let index = reader.inverted_index(self.fields.name)?;
            let Some(mut postings) =
                index.read_postings(&term, IndexRecordOption::Basic)?
            else {
                continue;
            };
            let mut doc = postings.doc();
            while doc != TERMINATED {
                if !reader.is_deleted(doc) {
                    return Ok(Some(self.global_id(segment as u32, doc)));
                }
                doc = postings.advance();
            }
        }
        Ok(None)
    }

    /// Global ids of every live document.
    pub fn live_doc_ids(&self) -> BTreeSet<DocId> {
        self.searcher
            .segment_readers()
            .iter()
            .enumerate()
            .flat_map(|(segment, reader)| {
                let base = self.doc_bases[segment];
                reader.doc_ids_alive().map(move |doc| base + doc)
            })
            .collect()
    }
}

/// Count every document slot, live or deleted, that has a token in `field`.
fn count_docs_with_field(
    readers: &[SegmentReader],
    field: Field,
) -> Result<u64> {
    let mut count = 0;
    for reader in readers {
        let norms = reader.get_fieldnorms_reader(field)?;
        count += (0..reader.max_doc())
            .filter(|&doc| norms.fieldnorm(doc) > 0)
            .count() as u64;
    }
    Ok(count)
}

impl std::fmt::Debug for IndexSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexSnapshot")
            .field("doc_bases", &self.doc_bases)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use tantivy::indexer::NoMergePolicy;

    use super::*;

    fn doc(name: &str, text: &str) -> OcrDocument {
        let mut doc = OcrDocument::from_plain_text(name, text);
        doc.title = format!("Title of {name}");
        doc
    }

    #[test]
    fn add_and_resolve() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.add_document(&writer, &doc("a", "hello world"), 1).unwrap();
        idx.add_document(&writer, &doc("b", "hello there"), 2).unwrap();
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        assert_eq!(snap.num_docs(), 2);
        let a = snap.resolve_name("a").unwrap().unwrap();
        let b = snap.resolve_name("b").unwrap().unwrap();
        assert_ne!(a, b);
        assert!(snap.resolve_name("missing").unwrap().is_none());

        let stored = snap.stored(b).unwrap();
        assert_eq!(stored.name, "b");
        assert_eq!(stored.indexed_at, 2);
        let text = stored.layout.field(fields::TEXT).unwrap();
        assert_eq!(text.text, "hello there");
    }

    #[test]
    fn doc_freq_and_field_counts() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.add_document(&writer, &doc("a", "hello world"), 1).unwrap();
        idx.add_document(&writer, &doc("b", "hello there"), 1).unwrap();
        idx.add_document(&writer, &OcrDocument::from_plain_text("c", ""), 1)
            .unwrap();
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        let f = snap.fields();
        assert_eq!(snap.doc_freq(f.text, "hello").unwrap(), 2);
        assert_eq!(snap.doc_freq(f.text, "world").unwrap(), 1);
        assert_eq!(snap.doc_freq(f.text, "absent").unwrap(), 0);
        assert_eq!(snap.docs_with_field(f.text), 2);
        assert_eq!(snap.docs_with_field(f.title), 2);
        assert_eq!(snap.docs_with_field(f.author), 0);
        assert_eq!(snap.docs_with_field(f.name), 0);
    }

    #[test]
    fn field_counts_agree_with_doc_freq_after_deletes() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        writer.set_merge_policy(Box::new(NoMergePolicy));
        for name in ["a", "b", "c"] {
            idx.add_document(&writer, &doc(name, "fox"), 1).unwrap();
        }
        writer.commit().unwrap();
        idx.delete_document(&writer, "a");
        idx.delete_document(&writer, "b");
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        let f = snap.fields();
        assert_eq!(snap.num_docs(), 1);
        assert_eq!(snap.doc_freq(f.text, "fox").unwrap(), 3);
        assert_eq!(snap.docs_with_field(f.text), 3);
    }

    #[test]
    fn update_replaces_by_name() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.add_document(&writer, &doc("a", "old content"), 1).unwrap();
        writer.commit().unwrap();
        idx.add_document(&writer, &doc("a", "new content"), 2).unwrap();
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        assert_eq!(snap.live_doc_ids().len(), 1);
        let id = snap.resolve_name("a").unwrap().unwrap();
        assert_eq!(snap.stored(id).unwrap().indexed_at, 2);
    }

    #[test]
    fn delete_document() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        idx.add_document(&writer, &doc("a", "hello"), 1).unwrap();
        writer.commit().unwrap();
        let before = idx.snapshot().unwrap();
        let id = before.resolve_name("a").unwrap().unwrap();

        idx.delete_document(&writer, "a");
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        assert!(snap.resolve_name("a").unwrap().is_none());
        assert!(snap.live_doc_ids().is_empty());
        assert!(snap.partition(&BTreeSet::from([id])).is_empty());
    }

    #[test]
    fn global_ids_span_segments() {
        let idx = OcrIndex::open_in_ram().unwrap();
        let mut writer = idx.writer(15_000_000).unwrap();
        writer.set_merge_policy(Box::new(NoMergePolicy));
        idx.add_document(&writer, &doc("a", "one"), 1).unwrap();
        idx.add_document(&writer, &doc("b", "two"), 1).unwrap();
        writer.commit().unwrap();
        idx.add_document(&writer, &doc("c", "three"), 1).unwrap();
        writer.commit().unwrap();

        let snap = idx.snapshot().unwrap();
        assert_eq!(snap.num_segments(), 2);
        let ids = snap.live_doc_ids();
        assert_eq!(ids.len(), 3);

        let parts = snap.partition(&ids);
        assert_eq!(parts.len(), 2);
        for (segment, locals) in &parts {
            for &local in locals {
                let id = snap.global_id(*segment, local);
                assert_eq!(snap.locate(id), Some((*segment, local)));
            }
        }
        assert!(snap.locate(3).is_none());

        let c = snap.resolve_name("c").unwrap().unwrap();
        assert_eq!(snap.stored(c).unwrap().name, "c");
    }

    #[test]
    fn multibyte_spans_are_char_based() {
        let layout = analysis::analyze_plain("Ærø øst");
        let pre = pre_tokenize(&layout).unwrap();
        assert_eq!(pre.tokens[1].text, "øst");
        assert_eq!(&pre.text[pre.tokens[1].offset_from..], "øst");
        assert_eq!(layout.tokens[1].start, 4);
    }

    #[test]
    fn disk_persistence() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = tmp.path().join("index");

        {
            let idx = OcrIndex::open(&dir).unwrap();
            let mut writer = idx.writer(15_000_000).unwrap();
            idx.add_document(&writer, &doc("a", "persistent"), 1).unwrap();
            writer.commit().unwrap();
        }

        let idx = OcrIndex::open(&dir).unwrap();
        let snap = idx.snapshot().unwrap();
        let id = snap.resolve_name("a").unwrap().unwrap();
        let f = snap.fields();
        assert_eq!(snap.doc_freq(f.text, "persistent").unwrap(), 1);
        assert_eq!(snap.stored(id).unwrap().name, "a");
    }
}
