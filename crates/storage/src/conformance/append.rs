use super::{append_all, make_failure, make_success, read_vec, TestResult};
use crate::record::Status;
use crate::RecordStore;

pub(super) fn run_append_tests<S, F>(factory: &F) -> Vec<TestResult>
where
    S: RecordStore,
    F: Fn() -> S,
{
    vec![
        TestResult::from_result(
            "append",
            "append_then_read_returns_record",
            append_then_read_returns_record(factory()),
        ),
        TestResult::from_result(
            "append",
            "insertion_order_preserved",
            insertion_order_preserved(factory()),
        ),
        TestResult::from_result(
            "append",
            "success_fields_preserved",
            success_fields_preserved(factory()),
        ),
        TestResult::from_result(
            "append",
            "failure_fields_preserved",
            failure_fields_preserved(factory()),
        ),
        TestResult::from_result(
            "append",
            "awkward_text_preserved",
            awkward_text_preserved(factory()),
        ),
    ]
}

fn append_then_read_returns_record<S: RecordStore>(store: S) -> Result<(), String> {
    let record = make_success(0, 88.0);
    append_all(&store, std::slice::from_ref(&record))?;
    let records = read_vec(&store)?;
    if records != vec![record] {
        return Err(format!("expected the appended record, got {records:?}"));
    }
    Ok(())
}

fn insertion_order_preserved<S: RecordStore>(store: S) -> Result<(), String> {
    let written: Vec<_> = (0..20)
        .map(|i| {
            if i % 3 == 0 {
                make_failure(i, "connection reset")
            } else {
                make_success(i, 10.0 * i as f64)
            }
        })
        .collect();
    append_all(&store, &written)?;
    let read = read_vec(&store)?;
    if read != written {
        return Err(format!(
            "records out of order or altered: wrote {}, read {}",
            written.len(),
            read.len()
        ));
    }
    Ok(())
}

fn success_fields_preserved<S: RecordStore>(store: S) -> Result<(), String> {
    append_all(&store, &[make_success(5, 123.45)])?;
    let record = read_vec(&store)?
        .pop()
        .ok_or("no record read back")?;
    if record.status != Status::Success {
        return Err(format!("status changed to {}", record.status));
    }
    if record.download_mbps != 123.45 || record.upload_mbps != 123.45 / 5.0 {
        return Err(format!(
            "speeds changed: {} / {}",
            record.download_mbps, record.upload_mbps
        ));
    }
    if record.server_sponsor.as_deref() != Some("Example Networks") {
        return Err(format!("server sponsor changed: {:?}", record.server_sponsor));
    }
    if record.error_type.is_some() || record.error_details.is_some() {
        return Err("success record gained error fields".to_string());
    }
    Ok(())
}

fn failure_fields_preserved<S: RecordStore>(store: S) -> Result<(), String> {
    append_all(&store, &[make_failure(1, "timed out")])?;
    let record = read_vec(&store)?
        .pop()
        .ok_or("no record read back")?;
    if !record.is_consistent() || record.status != Status::Failed {
        return Err(format!("failure record not preserved: {record:?}"));
    }
    if record.error_type.as_deref() != Some("UploadTestError") {
        return Err(format!("error type changed: {:?}", record.error_type));
    }
    if record.error_details.as_deref() != Some("upload_test: timed out") {
        return Err(format!("error details changed: {:?}", record.error_details));
    }
    Ok(())
}

fn awkward_text_preserved<S: RecordStore>(store: S) -> Result<(), String> {
    let record = make_failure(2, "server said \"no\", then closed\nthe socket; ålreit");
    append_all(&store, std::slice::from_ref(&record))?;
    let read = read_vec(&store)?;
    if read != vec![record] {
        return Err(format!("quoted text altered: {read:?}"));
    }
    Ok(())
}
