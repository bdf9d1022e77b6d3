//! Windowed summary statistics.

use serde::Serialize;
use speedwatch_storage::{round_to, Record};
use time::OffsetDateTime;

use crate::window::within_window;

/// Count, average, minimum and maximum of one metric, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricSummary {
    pub count: u64,
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

/// Statistics over a set of records.
///
/// Metric summaries are computed over successful records only and are absent
/// when there are none.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_tests: u64,
    pub successful_tests: u64,
    pub failed_tests: u64,
    /// Percentage of successful records, 1 decimal; 0 when there are none.
    pub success_rate: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<MetricSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ping: Option<MetricSummary>,
}

#[derive(Default)]
struct Accumulator {
    count: u64,
    sum: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);
        }
        self.count += 1;
        self.sum += value;
    }

    fn finish(self) -> Option<MetricSummary> {
        (self.count > 0).then(|| MetricSummary {
            count: self.count,
            avg: round_to(self.sum / self.count as f64, 2),
            min: round_to(self.min, 2),
            max: round_to(self.max, 2),
        })
    }
}

/// Summarize `records`, optionally restricted to the last `window_hours`.
pub fn summarize<'a, I>(records: I, window_hours: Option<u32>) -> Summary
where
    I: IntoIterator<Item = &'a Record>,
{
    summarize_at(records, window_hours, OffsetDateTime::now_utc())
}

/// [`summarize`] with an explicit "now".
pub fn summarize_at<'a, I>(records: I, window_hours: Option<u32>, now: OffsetDateTime) -> Summary
where
    I: IntoIterator<Item = &'a Record>,
{
    let mut total = 0u64;
    let mut failed = 0u64;
    let (mut download, mut upload, mut ping) = (
        Accumulator::default(),
        Accumulator::default(),
        Accumulator::default(),
    );

    for record in records
        .into_iter()
        .filter(|r| within_window(r, window_hours, now))
    {
        total += 1;
        if record.is_failure() {
            failed += 1;
            continue;
        }
        download.push(record.download_mbps);
        upload.push(record.upload_mbps);
        ping.push(record.ping_ms);
    }

    let successful = total - failed;
    let success_rate = if total == 0 {
        0.0
    } else {
        round_to(successful as f64 / total as f64 * 100.0, 1)
    };

    Summary {
        total_tests: total,
        successful_tests: successful,
        failed_tests: failed,
        success_rate,
        download: download.finish(),
        upload: upload.finish(),
        ping: ping.finish(),
    }
}
