use std::{
    collections::{HashMap, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::{config_db::ConfigDb, error::Result, walker::DiscoveredFile};

/// Metadata stored per indexed document, keyed by document name.
///
/// # Examples
///
/// ```
/// use folio::incremental::DocumentMetadata;
///
/// let meta = DocumentMetadata {
///     source_path: "/scans/ledger.json".into(),
///     mtime: 1700000000,
///     pages: 3,
///     words: 1200,
/// };
/// let json = meta.to_json().unwrap();
/// assert_eq!(DocumentMetadata::from_json(&json), Some(meta));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub source_path: PathBuf,
    pub mtime: u64,
    pub pages: usize,
    pub words: usize,
}

impl DocumentMetadata {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Returns `None` for records this version cannot read.
    pub fn from_json(json: &str) -> Option<Self> {
        serde_json::from_str(json).ok()
    }
}

/// Result of comparing discovered files against stored metadata.
#[derive(Debug, Default)]
pub struct DiffResult {
    /// Files with no indexed document.
    pub new_files: Vec<DiscoveredFile>,
    /// Files whose mtime differs, or every known file when forced.
    pub changed_files: Vec<DiscoveredFile>,
    /// Names of documents whose source file is gone.
    pub deleted_names: Vec<String>,
    /// Document name previously indexed from each changed file.
    pub previous_names: HashMap<PathBuf, String>,
}

impl DiffResult {
    pub fn to_index(&self) -> Vec<DiscoveredFile> {
        self.new_files
            .iter()
            .chain(&self.changed_files)
            .cloned()
            .collect()
    }
}

/// All stored metadata, skipping unreadable records.
pub fn list_metadata(
    config_db: &ConfigDb,
) -> Result<Vec<(String, DocumentMetadata)>> {
    let mut result = Vec::new();
    for (name, json) in config_db.list_documents()? {
        match DocumentMetadata::from_json(&json) {
            Some(meta) => result.push((name, meta)),
            None => {
                tracing::warn!(%name, "skipping unreadable document metadata")
            }
        }
    }
    Ok(result)
}

/// Compare the files discovered under `root` against stored metadata.
///
/// Only documents whose source lies under `root` can be reported as
/// deleted, so indexing one directory never drops another's documents.
pub fn diff_directory(
    config_db: &ConfigDb,
    root: &Path,
    discovered: &[DiscoveredFile],
    force: bool,
) -> Result<DiffResult> {
    // source path -> (name, mtime)
    let mut known: HashMap<PathBuf, (String, u64)> = HashMap::new();
    for (name, meta) in list_metadata(config_db)? {
        known.insert(meta.source_path, (name, meta.mtime));
    }

    let mut result = DiffResult::default();
    let mut seen: HashSet<&Path> = HashSet::new();

    for file in discovered {
        seen.insert(&file.absolute_path);
        match known.get(&file.absolute_path) {
            None => result.new_files.push(file.clone()),
            Some((name, stored_mtime)) => {
                if force || file.mtime != *stored_mtime {
                    result.changed_files.push(file.clone());
                    result
                        .previous_names
                        .insert(file.absolute_path.clone(), name.clone());
                }
            }
        }
    }

    for (path, (name, _)) in &known {
        if path.starts_with(root) && !seen.contains(path.as_path()) {
            result.deleted_names.push(name.clone());
        }
    }
    result.deleted_names.sort();

    tracing::debug!(
        new = result.new_files.len(),
        changed = result.changed_files.len(),
        deleted = result.deleted_names.len(),
        "diffed directory"
    );
    Ok(result)
}

/// Store metadata for several documents in a single transaction.
pub fn batch_store_metadata(
    config_db: &ConfigDb,
    entries: &[(String, DocumentMetadata)],
) -> Result<()> {
    let rows = entries
        .iter()
        .map(|(name, meta)| Ok((name.clone(), meta.to_json()?)))
        .collect::<Result<Vec<_>>>()?;
    config_db.batch_set_documents(&rows)
}
