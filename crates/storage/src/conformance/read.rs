use super::{append_all, make_failure, make_success, read_vec, TestResult};
use crate::RecordStore;

pub(super) fn run_read_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> S,
{
    vec![
        TestResult::from_result(
            "read",
            "empty_store_reads_empty",
            empty_store_reads_empty(factory()),
        ),
        TestResult::from_result(
            "read",
            "read_all_is_restartable",
            read_all_is_restartable(factory()),
        ),
        TestResult::from_result(
            "read",
            "read_sees_appends_after_earlier_read",
            read_sees_appends_after_earlier_read(factory()),
        ),
    ]
}

fn empty_store_reads_empty<S: RecordStore>(store: S) -> Result<(), String> {
    let records = read_vec(&store)?;
    if !records.is_empty() {
        return Err(format!("fresh store returned {} records", records.len()));
    }
    Ok(())
}

fn read_all_is_restartable<S: RecordStore>(store: S) -> Result<(), String> {
    append_all(&store, &[make_success(0, 1.0), make_success(1, 2.0)])?;

    // Abandon the first read halfway through.
    let mut partial = store.read_all().map_err(|e| e.to_string())?;
    let first = partial
        .next()
        .ok_or("first read returned nothing")?
        .map_err(|e| e.to_string())?;
    drop(partial);

    let full = read_vec(&store)?;
    if full.len() != 2 || full[0] != first {
        return Err(format!("second read did not start over: {full:?}"));
    }
    Ok(())
}

fn read_sees_appends_after_earlier_read<S: RecordStore>(store: S) -> Result<(), String> {
    append_all(&store, &[make_success(0, 1.0)])?;
    let before = read_vec(&store)?.len();
    append_all(&store, &[make_failure(1, "refused")])?;
    let after = read_vec(&store)?.len();
    if (before, after) != (1, 2) {
        return Err(format!("expected 1 then 2 records, got {before} then {after}"));
    }
    Ok(())
}
