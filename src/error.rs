use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(#[from] tantivy::TantivyError),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database open error: {0}")]
    RedbDatabase(#[from] redb::DatabaseError),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    #[error("invalid OCR document: {0}")]
    InvalidDocument(String),

    #[error("corrupt index: {0}")]
    CorruptIndex(String),

    /// A phrase claims a term it does not contain.
    #[error("inconsistent phrase data: {0}")]
    Inconsistency(String),

    #[error("highlighting failed while {operation}: {source}")]
    Highlight {
        operation: &'static str,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// Wrap an error raised during one stage of a highlight request.
    pub fn highlight(operation: &'static str, source: Error) -> Self {
        match source {
            // Keep the innermost operation when stages nest.
            already @ Error::Highlight { .. } => already,
            other => Error::Highlight {
                operation,
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn highlight_wraps_once() {
        let inner = Error::CorruptIndex("missing layout".into());
        let wrapped = Error::highlight("scanning segment", inner);
        let rewrapped = Error::highlight("running request", wrapped);

        match rewrapped {
            Error::Highlight { operation, source } => {
                assert_eq!(operation, "scanning segment");
                assert!(matches!(*source, Error::CorruptIndex(_)));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn highlight_message_names_operation() {
        let err = Error::highlight(
            "computing term weights",
            Error::Config("boom".into()),
        );
        let msg = err.to_string();
        assert!(msg.contains("computing term weights"));
        assert!(msg.contains("boom"));
    }
}
