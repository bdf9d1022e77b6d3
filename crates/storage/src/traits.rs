use serde::Serialize;

use crate::error::StoreError;
use crate::record::Record;

/// Lazy sequence of records in insertion order.
pub type Records<'a> = Box<dyn Iterator<Item = Result<Record, StoreError>> + Send + 'a>;

/// Summary counts derived from a full read of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    pub exists: bool,
    pub record_count: u64,
    pub success_count: u64,
    pub failure_count: u64,
    pub size_bytes: u64,
}

/// The storage trait for measurement records.
///
/// A `RecordStore` is append-only: records are added with [`append`] and read
/// back in insertion order with [`read_all`]; nothing is updated or deleted.
///
/// ## Atomicity
///
/// `append` must commit either the whole row or nothing. A reader running
/// concurrently with a writer must never observe a partial row or a store
/// without its header.
///
/// ## Restartability
///
/// Every call to `read_all` starts again from the first record.
///
/// [`append`]: RecordStore::append
/// [`read_all`]: RecordStore::read_all
pub trait RecordStore: Send + Sync {
    /// Append one record, creating the store if needed.
    fn append(&self, record: &Record) -> Result<(), StoreError>;

    /// Iterate over every record from the beginning.
    ///
    /// A store that does not exist yet reads as empty.
    fn read_all(&self) -> Result<Records<'_>, StoreError>;

    /// Size of the underlying storage in bytes (0 when absent).
    fn size_bytes(&self) -> Result<u64, StoreError>;

    /// Whether the backing storage exists yet.
    fn exists(&self) -> bool {
        true
    }

    /// Counts derived from [`read_all`](RecordStore::read_all).
    fn stats(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats {
            exists: self.exists(),
            size_bytes: self.size_bytes()?,
            ..StoreStats::default()
        };
        for record in self.read_all()? {
            let record = record?;
            stats.record_count += 1;
            if record.is_failure() {
                stats.failure_count += 1;
            } else {
                stats.success_count += 1;
            }
        }
        Ok(stats)
    }
}
