use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// Outcome of one measurement attempt as stored in the `status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Success,
    Failed,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Success => "SUCCESS",
            Status::Failed => "FAILED",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The server a successful measurement ran against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    pub country: String,
    pub sponsor: String,
}

/// One measurement attempt, success or failure.
///
/// Records are built once through [`Record::success`] or [`Record::failure`]
/// and never mutated afterwards. Field order matches the column order of the
/// on-disk store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server_name: Option<String>,
    pub server_country: Option<String>,
    pub server_sponsor: Option<String>,
    pub status: Status,
    pub error_type: Option<String>,
    pub error_details: Option<String>,
}

impl Record {
    /// A successful measurement. Values are stored as given; callers round.
    pub fn success(
        timestamp: OffsetDateTime,
        download_mbps: f64,
        upload_mbps: f64,
        ping_ms: f64,
        server: ServerInfo,
    ) -> Self {
        Record {
            timestamp,
            download_mbps,
            upload_mbps,
            ping_ms,
            server_name: Some(server.name),
            server_country: Some(server.country),
            server_sponsor: Some(server.sponsor),
            status: Status::Success,
            error_type: None,
            error_details: None,
        }
    }

    /// A failed attempt. Numeric fields are zeroed, server fields cleared and
    /// `error_details` becomes `"{stage}: {details}"` cut to `max_details`
    /// characters.
    pub fn failure(
        timestamp: OffsetDateTime,
        error_type: impl Into<String>,
        stage: &str,
        details: &str,
        max_details: usize,
    ) -> Self {
        Record {
            timestamp,
            download_mbps: 0.0,
            upload_mbps: 0.0,
            ping_ms: 0.0,
            server_name: None,
            server_country: None,
            server_sponsor: None,
            status: Status::Failed,
            error_type: Some(error_type.into()),
            error_details: Some(truncate_details(stage, details, max_details)),
        }
    }

    /// Failure classification used by every reader of the store: an explicit
    /// `FAILED` status or any non-empty error type.
    pub fn is_failure(&self) -> bool {
        self.status == Status::Failed
            || self
                .error_type
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty())
    }

    /// Checks the success/failure field invariant.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            Status::Success => {
                self.error_type.is_none()
                    && self.error_details.is_none()
                    && self.server_name.is_some()
                    && self.server_country.is_some()
                    && self.server_sponsor.is_some()
            }
            Status::Failed => {
                self.download_mbps == 0.0
                    && self.upload_mbps == 0.0
                    && self.ping_ms == 0.0
                    && self.server_name.is_none()
                    && self.server_country.is_none()
                    && self.server_sponsor.is_none()
            }
        }
    }
}

/// Builds `"{stage}: {details}"` and cuts it to at most `max_chars` characters.
pub fn truncate_details(stage: &str, details: &str, max_chars: usize) -> String {
    format!("{stage}: {details}").chars().take(max_chars).collect()
}

/// Rounds half away from zero to `decimals` places.
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn server() -> ServerInfo {
        ServerInfo {
            name: "Oslo".to_string(),
            country: "Norway".to_string(),
            sponsor: "Telenor".to_string(),
        }
    }

    #[test]
    fn success_record_is_consistent() {
        let r = Record::success(datetime!(2024-03-01 10:00 UTC), 93.2, 11.4, 14.9, server());
        assert!(r.is_consistent());
        assert!(!r.is_failure());
        assert_eq!(r.server_sponsor.as_deref(), Some("Telenor"));
    }

    #[test]
    fn failure_record_zeroes_numeric_fields() {
        let r = Record::failure(
            datetime!(2024-03-01 10:00 UTC),
            "ConfigRetrievalError",
            "get_config",
            "timed out",
            500,
        );
        assert!(r.is_consistent());
        assert!(r.is_failure());
        assert_eq!(r.download_mbps, 0.0);
        assert_eq!(r.error_details.as_deref(), Some("get_config: timed out"));
    }

    #[test]
    fn details_longer_than_max_are_cut_to_exactly_max() {
        let details = "x".repeat(1000);
        let r = Record::failure(
            datetime!(2024-03-01 10:00 UTC),
            "DownloadTestError",
            "download_test",
            &details,
            500,
        );
        let stored = r.error_details.unwrap();
        assert_eq!(stored.chars().count(), 500);
        assert!(stored.starts_with("download_test: xxx"));
    }

    #[test]
    fn truncation_counts_characters_not_bytes() {
        let out = truncate_details("upload_test", "ééééé", 15);
        assert_eq!(out.chars().count(), 15);
        assert_eq!(out, "upload_test: éé");
    }

    #[test]
    fn error_type_alone_marks_a_failure() {
        let mut r = Record::success(datetime!(2024-03-01 10:00 UTC), 1.0, 1.0, 1.0, server());
        r.error_type = Some("HttpError".to_string());
        assert!(r.is_failure());
        assert!(!r.is_consistent());
    }

    #[test]
    fn round_to_two_places() {
        assert_eq!(round_to(93.456, 2), 93.46);
        assert_eq!(round_to(66.666_666, 1), 66.7);
        assert_eq!(round_to(0.0, 2), 0.0);
    }
}
