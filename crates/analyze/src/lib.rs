//! Aggregation over stored records.
//!
//! Every function here works on records that have already been normalized by
//! the store, so the failure rule is [`Record::is_failure`]: a `FAILED`
//! status, a non-empty error type, or (for rows that predate the status
//! column) both speeds missing, which normalization turns into `FAILED`.
//!
//! [`Record::is_failure`]: speedwatch_storage::Record::is_failure

pub mod chart;
pub mod summary;
pub mod window;

pub use chart::{chart_data, ChartData, ChartPoint, FailedPoint};
pub use summary::{summarize, summarize_at, MetricSummary, Summary};
pub use window::{select, within_window, Query};
