//! Conformance test suite for `RecordStore` implementations.
//!
//! A backend-agnostic suite that any `RecordStore` can run to check the
//! behavior the rest of the workspace relies on:
//!
//! - **Append**: records come back exactly as written, in insertion order
//! - **Read**: empty stores read as empty, reads are restartable
//! - **Stats**: outcome counts and size follow the records
//! - **Concurrency**: a reader running next to a writer only sees whole rows
//!
//! # Usage
//!
//! Call [`run_conformance_suite`] with a factory that returns a fresh, empty
//! store for each test:
//!
//! ```ignore
//! use speedwatch_storage::conformance::run_conformance_suite;
//! use speedwatch_storage::MemoryRecordStore;
//!
//! let report = run_conformance_suite(MemoryRecordStore::new);
//! assert!(report.failed == 0, "{report}");
//! ```

mod append;
mod concurrent;
mod read;
mod stats;

use std::fmt;

use time::{Duration, OffsetDateTime};

use crate::record::{Record, ServerInfo};
use crate::RecordStore;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "append", "read").
    pub category: String,
    /// Test name (e.g. "insertion_order_preserved").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        let (passed, message) = match result {
            Ok(()) => (true, None),
            Err(msg) => (false, Some(msg)),
        };
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed,
            message,
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in self.results.iter().filter(|r| !r.passed) {
            writeln!(
                f,
                "  FAIL [{}/{}]: {}",
                r.category,
                r.name,
                r.message.as_deref().unwrap_or("(no message)")
            )?;
        }
        Ok(())
    }
}

/// Run the full conformance suite against a store backend.
///
/// `factory` is called once per test and must return a fresh, empty store.
pub fn run_conformance_suite<S, F>(factory: F) -> ConformanceReport
where
    S: RecordStore,
    F: Fn() -> S,
{
    let mut results = Vec::new();

    results.extend(append::run_append_tests(&factory));
    results.extend(read::run_read_tests(&factory));
    results.extend(stats::run_stats_tests(&factory));
    results.extend(concurrent::run_concurrent_tests(&factory));

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn at(minute: i64) -> OffsetDateTime {
    time::macros::datetime!(2025-01-01 00:00 UTC) + Duration::minutes(minute)
}

fn make_success(minute: i64, download_mbps: f64) -> Record {
    Record::success(
        at(minute),
        download_mbps,
        download_mbps / 5.0,
        14.25,
        ServerInfo {
            name: "Frankfurt".to_string(),
            country: "Germany".to_string(),
            sponsor: "Example Networks".to_string(),
        },
    )
}

fn make_failure(minute: i64, details: &str) -> Record {
    Record::failure(at(minute), "UploadTestError", "upload_test", details, 500)
}

fn read_vec<S: RecordStore>(store: &S) -> Result<Vec<Record>, String> {
    store
        .read_all()
        .map_err(|e| format!("read_all failed: {e}"))?
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| format!("read_all yielded an error: {e}"))
}

fn append_all<S: RecordStore>(store: &S, records: &[Record]) -> Result<(), String> {
    for record in records {
        store
            .append(record)
            .map_err(|e| format!("append failed: {e}"))?;
    }
    Ok(())
}
