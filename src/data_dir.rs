use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

pub const DATA_DIR_ENV: &str = "FOLIO_DATA_DIR";

/// Where folio keeps its settings database and its index.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The FOLIO_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/folio/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var_os(DATA_DIR_ENV) {
                Some(val) if !val.is_empty() => PathBuf::from(val),
                _ => xdg::BaseDirectories::with_prefix("folio")
                    .get_data_home()
                    .ok_or_else(|| {
                        Error::Config(
                            "could not determine XDG data home directory"
                                .into(),
                        )
                    })?,
            },
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;
        tracing::debug!(root = %root.display(), "using data directory");

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_db(&self) -> PathBuf {
        self.root.join("config.redb")
    }

    /// The tantivy index directory, created on first use.
    pub fn index_dir(&self) -> Result<PathBuf> {
        let path = self.root.join("index");
        std::fs::create_dir_all(&path)
            .map_err(|_| Error::DataDir(path.clone()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_path_wins() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("nested").join("folio");
        let dir = DataDir::resolve(Some(&root)).unwrap();

        assert!(root.is_dir());
        assert_eq!(dir.root(), root);
        assert_eq!(dir.config_db(), root.join("config.redb"));
    }

    #[test]
    fn index_dir_is_created() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();
        let index = dir.index_dir().unwrap();

        assert!(index.is_dir());
        assert_eq!(index, tmp.path().join("index"));
    }
}
