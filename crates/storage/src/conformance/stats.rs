use super::{append_all, make_failure, make_success, TestResult};
use crate::RecordStore;

pub(super) fn run_stats_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> S,
{
    vec![
        TestResult::from_result(
            "stats",
            "empty_store_has_zero_counts",
            empty_store_has_zero_counts(factory()),
        ),
        TestResult::from_result(
            "stats",
            "counts_follow_outcomes",
            counts_follow_outcomes(factory()),
        ),
        TestResult::from_result(
            "stats",
            "size_grows_with_appends",
            size_grows_with_appends(factory()),
        ),
    ]
}

fn empty_store_has_zero_counts<S: RecordStore>(store: S) -> Result<(), String> {
    let stats = store.stats().map_err(|e| e.to_string())?;
    if stats.record_count != 0 || stats.success_count != 0 || stats.failure_count != 0 {
        return Err(format!("fresh store has non-zero counts: {stats:?}"));
    }
    Ok(())
}

fn counts_follow_outcomes<S: RecordStore>(store: S) -> Result<(), String> {
    append_all(
        &store,
        &[
            make_success(0, 50.0),
            make_failure(1, "refused"),
            make_success(2, 60.0),
            make_failure(3, "refused"),
            make_failure(4, "refused"),
        ],
    )?;
    let stats = store.stats().map_err(|e| e.to_string())?;
    if (stats.record_count, stats.success_count, stats.failure_count) != (5, 2, 3) {
        return Err(format!("expected 5 records (2 ok, 3 failed), got {stats:?}"));
    }
    Ok(())
}

fn size_grows_with_appends<S: RecordStore>(store: S) -> Result<(), String> {
    let empty = store.size_bytes().map_err(|e| e.to_string())?;
    append_all(&store, &[make_success(0, 50.0)])?;
    let one = store.size_bytes().map_err(|e| e.to_string())?;
    append_all(&store, &[make_success(1, 50.0)])?;
    let two = store.size_bytes().map_err(|e| e.to_string())?;
    if !(empty < one && one < two) {
        return Err(format!("size did not grow: {empty} -> {one} -> {two}"));
    }
    Ok(())
}
