//! Time-window and limit selection.

use serde::Deserialize;
use speedwatch_storage::Record;
use time::{Duration, OffsetDateTime};

/// Record selection as accepted by the query endpoints.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Query {
    /// Keep only the last `limit` records (after the window is applied).
    pub limit: Option<usize>,
    /// Keep only records from the last `hours` hours.
    pub hours: Option<u32>,
}

/// Whether `record` falls inside a window of `hours` ending at `now`.
///
/// A window reaching back past the earliest representable date keeps
/// everything.
pub fn within_window(record: &Record, hours: Option<u32>, now: OffsetDateTime) -> bool {
    match hours.and_then(|hours| now.checked_sub(Duration::hours(i64::from(hours)))) {
        Some(start) => record.timestamp >= start,
        None => true,
    }
}

/// Apply a [`Query`] to records in insertion order.
pub fn select<I>(records: I, query: Query, now: OffsetDateTime) -> Vec<Record>
where
    I: IntoIterator<Item = Record>,
{
    let mut selected: Vec<Record> = records
        .into_iter()
        .filter(|r| within_window(r, query.hours, now))
        .collect();
    if let Some(limit) = query.limit {
        let skip = selected.len().saturating_sub(limit);
        selected.drain(..skip);
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use speedwatch_storage::{Record, ServerInfo};
    use time::macros::datetime;

    fn at(ts: OffsetDateTime, down: f64) -> Record {
        Record::success(
            ts,
            down,
            1.0,
            1.0,
            ServerInfo {
                name: "n".to_string(),
                country: "c".to_string(),
                sponsor: "s".to_string(),
            },
        )
    }

    fn history() -> Vec<Record> {
        vec![
            at(datetime!(2024-03-01 00:00 UTC), 1.0),
            at(datetime!(2024-03-02 06:00 UTC), 2.0),
            at(datetime!(2024-03-02 11:00 UTC), 3.0),
            at(datetime!(2024-03-02 11:59 UTC), 4.0),
        ]
    }

    const NOW: OffsetDateTime = datetime!(2024-03-02 12:00 UTC);

    #[test]
    fn window_keeps_recent_records() {
        let picked = select(history(), Query { limit: None, hours: Some(6) }, NOW);
        let downs: Vec<f64> = picked.iter().map(|r| r.download_mbps).collect();
        assert_eq!(downs, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn limit_keeps_the_newest() {
        let picked = select(history(), Query { limit: Some(2), hours: None }, NOW);
        let downs: Vec<f64> = picked.iter().map(|r| r.download_mbps).collect();
        assert_eq!(downs, vec![3.0, 4.0]);
    }

    #[test]
    fn limit_applies_after_window() {
        let picked = select(history(), Query { limit: Some(10), hours: Some(1) }, NOW);
        assert_eq!(picked.len(), 2);
        assert!(select(history(), Query { limit: Some(0), hours: None }, NOW).is_empty());
    }

    #[test]
    fn oversized_window_keeps_everything() {
        let picked = select(history(), Query { limit: None, hours: Some(u32::MAX) }, NOW);
        assert_eq!(picked.len(), 4);
    }
}
