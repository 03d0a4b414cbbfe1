use std::{
    path::{Path, PathBuf},
    time::SystemTime,
};

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::{Error, Result};

/// An OCR file found under the ingestion root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    /// Path relative to the ingestion root.
    pub relative_path: PathBuf,
    pub absolute_path: PathBuf,
    /// Last modification time as seconds since the Unix epoch.
    pub mtime: u64,
}

/// OCR JSON exports and plain text transcriptions.
const SUPPORTED_EXTENSIONS: &[&str] = &["json", "txt"];

/// Compile `--include` patterns into one matcher. No patterns means no
/// filtering.
pub fn build_glob_set(patterns: &[String]) -> Result<Option<GlobSet>> {
    if patterns.is_empty() {
        return Ok(None);
    }
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            Error::Config(format!("invalid glob pattern: {e}"))
        })?;
        builder.add(glob);
    }
    let set = builder
        .build()
        .map_err(|e| Error::Config(format!("invalid glob pattern: {e}")))?;
    Ok(Some(set))
}

/// Recursively walk a directory and discover OCR files.
///
/// Hidden files and directories are skipped. When `include` is given, only
/// files whose path relative to `root` matches it are returned. Output is
/// sorted by relative path.
pub fn discover_files(
    root: &Path,
    include: Option<&GlobSet>,
) -> Result<Vec<DiscoveredFile>> {
    let canonical_root = root.canonicalize()?;
    let mut results = Vec::new();
    walk_dir(&canonical_root, &canonical_root, &mut results)?;
    if let Some(set) = include {
        results.retain(|f| set.is_match(&f.relative_path));
    }
    results.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    tracing::debug!(
        root = %canonical_root.display(),
        files = results.len(),
        "discovered files"
    );
    Ok(results)
}

fn walk_dir(
    root: &Path,
    current: &Path,
    results: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    for entry in std::fs::read_dir(current)? {
        let entry = entry?;
        let file_name = entry.file_name();
        if file_name.to_string_lossy().starts_with('.') {
            continue;
        }

        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            walk_dir(root, &path, results)?;
        } else if file_type.is_symlink() {
            let Ok(resolved) = path.canonicalize() else {
                tracing::trace!(path = %path.display(), "broken symlink");
                continue;
            };
            // Directory links back into the root would loop forever.
            if resolved.is_dir() && resolved.starts_with(root) {
                continue;
            }
            if resolved.is_file() && is_supported(&resolved) {
                results.push(make_discovered(root, &path, &resolved)?);
            }
        } else if file_type.is_file() && is_supported(&path) {
            let abs = path.canonicalize()?;
            results.push(make_discovered(root, &path, &abs)?);
        }
    }

    Ok(())
}

fn is_supported(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            SUPPORTED_EXTENSIONS
                .iter()
                .any(|s| s.eq_ignore_ascii_case(ext))
        })
}

fn make_discovered(
    root: &Path,
    original_path: &Path,
    absolute_path: &Path,
) -> Result<DiscoveredFile> {
    let relative_path = original_path
        .strip_prefix(root)
        .unwrap_or(original_path)
        .to_path_buf();

    let mtime = std::fs::metadata(absolute_path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();

    Ok(DiscoveredFile {
        relative_path,
        absolute_path: absolute_path.to_path_buf(),
        mtime,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(files: &[DiscoveredFile]) -> Vec<String> {
        files
            .iter()
            .map(|f| f.relative_path.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn discovers_json_and_txt() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("scan.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("notes.TXT"), "hello").unwrap();
        std::fs::write(tmp.path().join("page.png"), "binary").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(names(&files), vec!["notes.TXT", "scan.json"]);
        assert!(files.iter().all(|f| f.mtime > 0));
    }

    #[test]
    fn skips_hidden_entries_and_recurses() {
        let tmp = tempfile::tempdir().unwrap();
        let hidden = tmp.path().join(".cache");
        let sub = tmp.path().join("volume-2");
        std::fs::create_dir(&hidden).unwrap();
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(hidden.join("old.json"), "{}").unwrap();
        std::fs::write(tmp.path().join(".draft.txt"), "x").unwrap();
        std::fs::write(sub.join("b.json"), "{}").unwrap();
        std::fs::write(tmp.path().join("a.json"), "{}").unwrap();

        let files = discover_files(tmp.path(), None).unwrap();
        assert_eq!(names(&files), vec!["a.json", "volume-2/b.json"]);
    }

    #[test]
    fn include_filter_matches_relative_paths() {
        let tmp = tempfile::tempdir().unwrap();
        let sub = tmp.path().join("letters");
        std::fs::create_dir(&sub).unwrap();
        std::fs::write(sub.join("1901.json"), "{}").unwrap();
        std::fs::write(sub.join("1902.txt"), "x").unwrap();
        std::fs::write(tmp.path().join("index.json"), "{}").unwrap();

        let set = build_glob_set(&["letters/*.json".to_string()])
            .unwrap()
            .unwrap();
        let files = discover_files(tmp.path(), Some(&set)).unwrap();
        assert_eq!(names(&files), vec!["letters/1901.json"]);
    }

    #[test]
    fn glob_set_edge_cases() {
        assert!(build_glob_set(&[]).unwrap().is_none());
        assert!(matches!(
            build_glob_set(&["a[".to_string()]),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn empty_directory() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(discover_files(tmp.path(), None).unwrap().is_empty());
    }
}
