use std::path::PathBuf;

/// All errors that can be returned by a `RecordStore` implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be opened or written (disk full, permission
    /// denied, ...). Nothing is committed when this is returned.
    #[error("failed to write record store {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The store exists but could not be read.
    #[error("failed to read record store {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A row (or the header) is not parseable under any known schema.
    ///
    /// `line` is 1-based and counts the header row.
    #[error("record store {path} is corrupt at line {line}: {message}")]
    Corrupt {
        path: PathBuf,
        line: u64,
        message: String,
    },
}

impl StoreError {
    /// True for failures that happened while writing (StoreWriteError).
    pub fn is_write(&self) -> bool {
        matches!(self, StoreError::Write { .. })
    }
}
