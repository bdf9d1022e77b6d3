use std::sync::atomic::{AtomicUsize, Ordering};

use speedwatch_storage::conformance::run_conformance_suite;
use speedwatch_storage::{CsvRecordStore, MemoryRecordStore};
use tempfile::TempDir;

#[test]
fn memory_store_conformance() {
    let report = run_conformance_suite(MemoryRecordStore::new);
    assert!(report.total > 0);
    assert!(report.failed == 0, "{report}");
}

#[test]
fn csv_store_conformance() {
    let root = TempDir::new().unwrap();
    let next = AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = next.fetch_add(1, Ordering::Relaxed);
        CsvRecordStore::new(root.path().join(format!("store-{n}")).join("history.csv"))
    });
    assert!(report.total > 0);
    assert!(report.failed == 0, "{report}");
}
