use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use super::{make_failure, make_success, read_vec, TestResult};
use crate::RecordStore;

const WRITES: i64 = 60;

pub(super) fn run_concurrent_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> S,
{
    vec![TestResult::from_result(
        "concurrent",
        "reader_never_sees_partial_rows",
        reader_never_sees_partial_rows(factory()),
    )]
}

fn reader_never_sees_partial_rows<S: RecordStore>(store: S) -> Result<(), String> {
    let finished = AtomicBool::new(false);

    thread::scope(|scope| {
        let writer = scope.spawn(|| {
            let mut outcome = Ok(());
            for i in 0..WRITES {
                let record = if i % 4 == 0 {
                    make_failure(i, "interrupted, retrying")
                } else {
                    make_success(i, i as f64 + 0.5)
                };
                if let Err(e) = store.append(&record) {
                    outcome = Err(format!("append {i} failed: {e}"));
                    break;
                }
            }
            finished.store(true, Ordering::SeqCst);
            outcome
        });

        let mut last = 0usize;
        while !finished.load(Ordering::SeqCst) {
            let records = read_vec(&store)?;
            if records.len() < last {
                return Err(format!("record count went back from {last} to {}", records.len()));
            }
            if let Some(bad) = records.iter().find(|r| !r.is_consistent()) {
                return Err(format!("reader saw an inconsistent record: {bad:?}"));
            }
            last = records.len();
        }

        writer
            .join()
            .map_err(|_| "writer thread panicked".to_string())??;

        let total = read_vec(&store)?.len();
        if total != WRITES as usize {
            return Err(format!("expected {WRITES} records, found {total}"));
        }
        Ok(())
    })
}
