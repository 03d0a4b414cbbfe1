use std::{
    collections::HashSet,
    path::Path,
    time::{SystemTime, UNIX_EPOCH},
};

use globset::GlobSet;
use rayon::prelude::*;
use tantivy::IndexWriter;

use crate::{
    config_db::ConfigDb,
    error::Result,
    incremental::{self, DocumentMetadata},
    index::OcrIndex,
    ocr::OcrDocument,
    walker::{self, DiscoveredFile},
};

/// Memory budget for the index writer, in bytes.
pub const WRITER_MEMORY_BUDGET: usize = 50_000_000;

/// What one ingestion run did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IngestReport {
    pub indexed: usize,
    pub unchanged: usize,
    pub failed: usize,
    pub removed: usize,
}

/// A document written to the index, with the metadata to remember it by.
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub name: String,
    pub metadata: DocumentMetadata,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Load and analyze a batch of files into the index, then commit.
///
/// Files are parsed in parallel and written sequentially. A file that
/// fails to load is logged and skipped. When two files carry the same
/// document name, the later one wins.
pub fn ingest_files(
    index: &OcrIndex,
    writer: &mut IndexWriter,
    files: &[DiscoveredFile],
) -> Result<Vec<IngestedDocument>> {
    let loaded: Vec<_> = files
        .par_iter()
        .filter_map(|file| match OcrDocument::load(&file.absolute_path) {
            Ok(doc) => Some((file, doc)),
            Err(e) => {
                tracing::warn!(
                    path = %file.relative_path.display(),
                    error = %e,
                    "skipping unreadable document"
                );
                None
            }
        })
        .collect();

    let indexed_at = now_secs();
    let mut ingested: Vec<IngestedDocument> = Vec::new();
    for (file, doc) in &loaded {
        index.add_document(writer, doc, indexed_at)?;
        if let Some(pos) = ingested.iter().position(|d| d.name == doc.name) {
            tracing::warn!(
                name = %doc.name,
                path = %file.relative_path.display(),
                "duplicate document name, replacing earlier file"
            );
            ingested.remove(pos);
        }
        ingested.push(IngestedDocument {
            name: doc.name.clone(),
            metadata: DocumentMetadata {
                source_path: file.absolute_path.clone(),
                mtime: file.mtime,
                pages: doc.pages.len(),
                words: doc.word_count(),
            },
        });
    }

    writer.commit()?;
    tracing::debug!(documents = ingested.len(), "committed batch");
    Ok(ingested)
}

/// Bring the index up to date with the OCR files under `root`.
pub fn update_directory(
    index: &OcrIndex,
    config_db: &ConfigDb,
    root: &Path,
    include: Option<&GlobSet>,
    force: bool,
) -> Result<IngestReport> {
    let root = root.canonicalize()?;
    let discovered = walker::discover_files(&root, include)?;
    let diff =
        incremental::diff_directory(config_db, &root, &discovered, force)?;
    let to_index = diff.to_index();

    let mut report = IngestReport {
        unchanged: discovered.len() - to_index.len(),
        ..IngestReport::default()
    };
    if to_index.is_empty() && diff.deleted_names.is_empty() {
        return Ok(report);
    }

    let mut writer = index.writer(WRITER_MEMORY_BUDGET)?;
    for name in &diff.deleted_names {
        index.delete_document(&writer, name);
    }

    let ingested = ingest_files(index, &mut writer, &to_index)?;
    let written: HashSet<&str> =
        ingested.iter().map(|d| d.name.as_str()).collect();

    // A changed file may now carry a different document name, or no longer
    // load at all; its old document must not linger.
    let mut stale = diff.deleted_names.clone();
    for name in diff.previous_names.values() {
        if !written.contains(name.as_str()) {
            index.delete_document(&writer, name);
            stale.push(name.clone());
        }
    }
    if stale.len() > diff.deleted_names.len() {
        writer.commit()?;
    }

    config_db.batch_remove_documents(&stale)?;
    let entries: Vec<_> = ingested
        .iter()
        .map(|d| (d.name.clone(), d.metadata.clone()))
        .collect();
    incremental::batch_store_metadata(config_db, &entries)?;

    report.indexed = ingested.len();
    report.failed = to_index.len().saturating_sub(ingested.len());
    report.removed = stale.len();
    tracing::info!(
        indexed = report.indexed,
        unchanged = report.unchanged,
        failed = report.failed,
        removed = report.removed,
        "index updated"
    );
    Ok(report)
}

/// Remove one document from the index and the metadata table.
pub fn remove_document(
    index: &OcrIndex,
    config_db: &ConfigDb,
    name: &str,
) -> Result<bool> {
    let known = config_db.get_document(name)?.is_some()
        || index.snapshot()?.resolve_name(name)?.is_some();
    if !known {
        return Ok(false);
    }
    let mut writer = index.writer(WRITER_MEMORY_BUDGET)?;
    index.delete_document(&writer, name);
    writer.commit()?;
    config_db.remove_document(name)?;
    tracing::info!(%name, "removed document");
    Ok(true)
}
