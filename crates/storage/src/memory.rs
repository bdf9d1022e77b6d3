//! In-memory record store, used by tests and by the conformance suite as a
//! reference backend.

use std::sync::{Mutex, MutexGuard};

use crate::error::StoreError;
use crate::record::Record;
use crate::traits::{RecordStore, Records};

/// Approximate per-row footprint reported by `size_bytes`.
const ROW_SIZE_ESTIMATE: u64 = 128;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<Vec<Record>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `records`, in order.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        MemoryRecordStore {
            records: Mutex::new(records.into_iter().collect()),
        }
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Copy of every record appended so far.
    pub fn snapshot(&self) -> Vec<Record> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Record>> {
        // A panicking writer cannot leave a half-pushed Vec behind.
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordStore for MemoryRecordStore {
    fn append(&self, record: &Record) -> Result<(), StoreError> {
        self.lock().push(record.clone());
        Ok(())
    }

    fn read_all(&self) -> Result<Records<'_>, StoreError> {
        Ok(Box::new(self.snapshot().into_iter().map(Ok)))
    }

    fn size_bytes(&self) -> Result<u64, StoreError> {
        Ok(self.lock().len() as u64 * ROW_SIZE_ESTIMATE)
    }
}
