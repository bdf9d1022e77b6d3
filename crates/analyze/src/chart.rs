//! Time series for charting.

use serde::Serialize;
use speedwatch_storage::Record;
use time::OffsetDateTime;

use crate::window::within_window;

/// One point of the time series. Failed attempts are zero-filled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub download_speed: f64,
    pub upload_speed: f64,
    pub ping_time: f64,
    pub is_failed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
}

/// A failed attempt, listed separately for annotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedPoint {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub error_type: String,
    pub error_details: String,
}

/// Chart series. `successful_tests` holds every point, failed ones included
/// (tagged `is_failed`), so the series has no gaps; the field name is kept
/// for dashboard compatibility.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ChartData {
    pub successful_tests: Vec<ChartPoint>,
    pub failed_tests: Vec<FailedPoint>,
}

/// Build the chart series for records in the window, in chronological order.
pub fn chart_data<'a, I>(records: I, window_hours: Option<u32>, now: OffsetDateTime) -> ChartData
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut selected: Vec<&Record> = records
        .into_iter()
        .filter(|r| within_window(r, window_hours, now))
        .collect();
    // Stable, so equal timestamps keep insertion order.
    selected.sort_by_key(|r| r.timestamp);

    let mut chart = ChartData::default();
    for record in selected {
        if record.is_failure() {
            let error_type = non_empty(&record.error_type).unwrap_or("Unknown").to_string();
            let error_details = non_empty(&record.error_details)
                .unwrap_or("No details")
                .to_string();
            chart.successful_tests.push(ChartPoint {
                timestamp: record.timestamp,
                download_speed: 0.0,
                upload_speed: 0.0,
                ping_time: 0.0,
                is_failed: true,
                error_type: Some(error_type.clone()),
                error_details: Some(error_details.clone()),
            });
            chart.failed_tests.push(FailedPoint {
                timestamp: record.timestamp,
                error_type,
                error_details,
            });
        } else {
            chart.successful_tests.push(ChartPoint {
                timestamp: record.timestamp,
                download_speed: record.download_mbps,
                upload_speed: record.upload_mbps,
                ping_time: record.ping_ms,
                is_failed: false,
                error_type: None,
                error_details: None,
            });
        }
    }
    chart
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
