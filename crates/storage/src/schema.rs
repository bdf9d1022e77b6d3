//! Versioned column layout of the record store and the read-time
//! normalization of old rows.
//!
//! Two layouts exist on disk:
//!
//! - **v1** (legacy): `timestamp` through `server_sponsor`, no outcome columns.
//!   Failed attempts were written with empty speed fields.
//! - **v2** (current): v1 plus `status`, `error_type`, `error_details`.
//!
//! Rows are decoded into a [`StoredRow`] according to the header of the file
//! they came from and then normalized into one canonical [`Record`].

use std::borrow::Cow;

use csv::StringRecord;
use serde::{Deserialize, Serialize};
use time::format_description::well_known::{Iso8601, Rfc3339};
use time::{OffsetDateTime, PrimitiveDateTime};

use crate::record::{Record, Status};

/// Columns of the current layout, in file order.
pub const CURRENT_COLUMNS: [&str; 10] = [
    "timestamp",
    "download_mbps",
    "upload_mbps",
    "ping_ms",
    "server_name",
    "server_country",
    "server_sponsor",
    "status",
    "error_type",
    "error_details",
];

/// Columns of the legacy layout, in file order.
pub const LEGACY_COLUMNS: [&str; 7] = [
    "timestamp",
    "download_mbps",
    "upload_mbps",
    "ping_ms",
    "server_name",
    "server_country",
    "server_sponsor",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    Legacy,
    Current,
}

impl SchemaVersion {
    /// Detect the layout from a header row.
    ///
    /// Any header carrying a `status` column is read as current; missing
    /// `error_type`/`error_details` columns are then defaulted per row.
    pub fn detect(headers: &StringRecord) -> Result<Self, String> {
        let has = |name: &str| headers.iter().any(|h| h == name);
        if !has("timestamp") {
            return Err(format!(
                "header has no 'timestamp' column: {:?}",
                headers.iter().collect::<Vec<_>>()
            ));
        }
        if has("status") {
            Ok(SchemaVersion::Current)
        } else {
            Ok(SchemaVersion::Legacy)
        }
    }
}

/// A v1 row.
#[derive(Debug, Clone, Deserialize)]
pub struct LegacyRow {
    pub timestamp: String,
    #[serde(default)]
    pub download_mbps: Option<f64>,
    #[serde(default)]
    pub upload_mbps: Option<f64>,
    #[serde(default)]
    pub ping_ms: Option<f64>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub server_country: Option<String>,
    #[serde(default)]
    pub server_sponsor: Option<String>,
}

/// A v2 row. Every field past `timestamp` may be empty in rows written by
/// older releases.
#[derive(Debug, Clone, Deserialize)]
pub struct CurrentRow {
    pub timestamp: String,
    #[serde(default)]
    pub download_mbps: Option<f64>,
    #[serde(default)]
    pub upload_mbps: Option<f64>,
    #[serde(default)]
    pub ping_ms: Option<f64>,
    #[serde(default)]
    pub server_name: Option<String>,
    #[serde(default)]
    pub server_country: Option<String>,
    #[serde(default)]
    pub server_sponsor: Option<String>,
    #[serde(default)]
    pub status: Option<Status>,
    #[serde(default)]
    pub error_type: Option<String>,
    #[serde(default)]
    pub error_details: Option<String>,
}

/// A decoded row, tagged by the layout it was read under.
#[derive(Debug, Clone)]
pub enum StoredRow {
    Legacy(LegacyRow),
    Current(CurrentRow),
}

impl StoredRow {
    pub fn decode(
        raw: &StringRecord,
        headers: &StringRecord,
        version: SchemaVersion,
    ) -> Result<Self, String> {
        match version {
            SchemaVersion::Legacy => raw
                .deserialize::<LegacyRow>(Some(headers))
                .map(StoredRow::Legacy),
            SchemaVersion::Current => raw
                .deserialize::<CurrentRow>(Some(headers))
                .map(StoredRow::Current),
        }
        .map_err(|e| e.to_string())
    }

    /// The timestamp exactly as it appears in the file.
    pub fn raw_timestamp(&self) -> &str {
        match self {
            StoredRow::Legacy(row) => &row.timestamp,
            StoredRow::Current(row) => &row.timestamp,
        }
    }

    /// Normalize into a canonical record.
    ///
    /// A row is classified as failed when its status says so, when it has a
    /// non-empty error type, or when both speed fields are empty (rows that
    /// predate the status column). Failed rows come out with zeroed numeric
    /// fields and no server; missing numbers on successful rows default to 0.
    pub fn normalize(self) -> Result<Record, String> {
        let row = match self {
            StoredRow::Legacy(row) => CurrentRow {
                timestamp: row.timestamp,
                download_mbps: row.download_mbps,
                upload_mbps: row.upload_mbps,
                ping_ms: row.ping_ms,
                server_name: row.server_name,
                server_country: row.server_country,
                server_sponsor: row.server_sponsor,
                status: None,
                error_type: None,
                error_details: None,
            },
            StoredRow::Current(row) => row,
        };

        let timestamp = parse_timestamp(&row.timestamp)?;
        let error_type = row.error_type.filter(|t| !t.trim().is_empty());
        let speeds_missing = row.download_mbps.is_none() && row.upload_mbps.is_none();
        let failed =
            row.status == Some(Status::Failed) || error_type.is_some() || speeds_missing;

        if failed {
            Ok(Record {
                timestamp,
                download_mbps: 0.0,
                upload_mbps: 0.0,
                ping_ms: 0.0,
                server_name: None,
                server_country: None,
                server_sponsor: None,
                status: Status::Failed,
                error_type,
                error_details: row.error_details,
            })
        } else {
            for (name, value) in [
                ("download_mbps", row.download_mbps),
                ("upload_mbps", row.upload_mbps),
                ("ping_ms", row.ping_ms),
            ] {
                if value.is_some_and(|v| v < 0.0 || !v.is_finite()) {
                    return Err(format!("{name} must be a non-negative number"));
                }
            }
            Ok(Record {
                timestamp,
                download_mbps: row.download_mbps.unwrap_or(0.0),
                upload_mbps: row.upload_mbps.unwrap_or(0.0),
                ping_ms: row.ping_ms.unwrap_or(0.0),
                server_name: row.server_name,
                server_country: row.server_country,
                server_sponsor: row.server_sponsor,
                status: Status::Success,
                error_type: None,
                error_details: None,
            })
        }
    }
}

/// One output row in the current layout.
///
/// The timestamp is carried as text so that rewrites keep the original
/// spelling of old rows.
#[derive(Debug, Serialize)]
pub(crate) struct RowOut<'a> {
    pub timestamp: Cow<'a, str>,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub ping_ms: f64,
    pub server_name: Option<&'a str>,
    pub server_country: Option<&'a str>,
    pub server_sponsor: Option<&'a str>,
    pub status: Status,
    pub error_type: Option<&'a str>,
    pub error_details: Option<&'a str>,
}

impl<'a> RowOut<'a> {
    pub(crate) fn new(record: &'a Record, timestamp: Cow<'a, str>) -> Self {
        RowOut {
            timestamp,
            download_mbps: record.download_mbps,
            upload_mbps: record.upload_mbps,
            ping_ms: record.ping_ms,
            server_name: record.server_name.as_deref(),
            server_country: record.server_country.as_deref(),
            server_sponsor: record.server_sponsor.as_deref(),
            status: record.status,
            error_type: record.error_type.as_deref(),
            error_details: record.error_details.as_deref(),
        }
    }
}

/// Parse an ISO-8601 timestamp.
///
/// RFC 3339 and offset-carrying ISO-8601 values keep their offset. Naive
/// values (as written by older releases) are taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<OffsetDateTime, String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err("empty timestamp".to_string());
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(ts);
    }
    if let Ok(ts) = OffsetDateTime::parse(raw, &Iso8601::DEFAULT) {
        return Ok(ts);
    }
    PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT)
        .map(PrimitiveDateTime::assume_utc)
        .map_err(|e| format!("invalid timestamp '{raw}': {e}"))
}

/// Format a timestamp the way new rows are written (RFC 3339).
pub fn format_timestamp(ts: OffsetDateTime) -> Result<String, String> {
    ts.format(&Rfc3339).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    fn headers(cols: &[&str]) -> StringRecord {
        StringRecord::from(cols.to_vec())
    }

    fn decode(cols: &[&str], fields: &[&str]) -> Result<Record, String> {
        let h = headers(cols);
        let version = SchemaVersion::detect(&h)?;
        StoredRow::decode(&StringRecord::from(fields.to_vec()), &h, version)?.normalize()
    }

    #[test]
    fn detects_layouts() {
        assert_eq!(
            SchemaVersion::detect(&headers(&LEGACY_COLUMNS)),
            Ok(SchemaVersion::Legacy)
        );
        assert_eq!(
            SchemaVersion::detect(&headers(&CURRENT_COLUMNS)),
            Ok(SchemaVersion::Current)
        );
        assert!(SchemaVersion::detect(&headers(&["when", "speed"])).is_err());
    }

    #[test]
    fn legacy_row_with_speeds_is_success() {
        let r = decode(
            &LEGACY_COLUMNS,
            &["2024-01-15T10:30:00.123456", "50.5", "10.1", "12.3", "Oslo", "Norway", "Telenor"],
        )
        .unwrap();
        assert_eq!(r.status, Status::Success);
        assert_eq!(r.download_mbps, 50.5);
        assert_eq!(r.server_name.as_deref(), Some("Oslo"));
        assert_eq!(r.timestamp, datetime!(2024-01-15 10:30:00.123456 UTC));
    }

    #[test]
    fn legacy_row_without_speeds_is_failed_and_zeroed() {
        let r = decode(
            &LEGACY_COLUMNS,
            &["2024-01-15T11:30:00", "", "", "", "", "", ""],
        )
        .unwrap();
        assert_eq!(r.status, Status::Failed);
        assert!(r.is_consistent());
        assert_eq!(r.error_type, None);
    }

    #[test]
    fn current_failed_row_with_empty_speeds_becomes_zeroed() {
        let r = decode(
            &CURRENT_COLUMNS,
            &[
                "2024-01-15T11:30:00+00:00",
                "",
                "",
                "",
                "",
                "",
                "",
                "FAILED",
                "ConfigRetrievalError",
                "get_config: timed out",
            ],
        )
        .unwrap();
        assert_eq!(r.status, Status::Failed);
        assert_eq!(r.ping_ms, 0.0);
        assert_eq!(r.error_type.as_deref(), Some("ConfigRetrievalError"));
    }

    #[test]
    fn current_row_missing_status_is_classified_from_data() {
        let r = decode(
            &CURRENT_COLUMNS,
            &["2024-01-15T11:30:00Z", "80", "20", "9", "A", "B", "C", "", "", ""],
        )
        .unwrap();
        assert_eq!(r.status, Status::Success);
        assert!(r.is_consistent());
    }

    #[test]
    fn success_status_with_error_type_is_reclassified() {
        let r = decode(
            &CURRENT_COLUMNS,
            &["2024-01-15T11:30:00Z", "80", "20", "9", "A", "B", "C", "SUCCESS", "Boom", "x"],
        )
        .unwrap();
        assert_eq!(r.status, Status::Failed);
        assert!(r.is_consistent());
    }

    #[test]
    fn unparseable_speed_is_rejected() {
        let err = decode(
            &CURRENT_COLUMNS,
            &["2024-01-15T11:30:00Z", "fast", "20", "9", "A", "B", "C", "SUCCESS", "", ""],
        );
        assert!(err.is_err());
    }

    #[test]
    fn unknown_status_is_rejected() {
        let err = decode(
            &CURRENT_COLUMNS,
            &["2024-01-15T11:30:00Z", "1", "2", "3", "A", "B", "C", "MAYBE", "", ""],
        );
        assert!(err.is_err());
    }

    #[test]
    fn timestamp_forms() {
        assert_eq!(
            parse_timestamp("2024-01-15T10:30:00Z").unwrap(),
            datetime!(2024-01-15 10:30 UTC)
        );
        assert_eq!(
            parse_timestamp("2024-01-15T12:30:00+02:00").unwrap(),
            datetime!(2024-01-15 10:30 UTC)
        );
        assert_eq!(
            parse_timestamp("2024-01-15T10:30:00").unwrap(),
            datetime!(2024-01-15 10:30 UTC)
        );
        assert!(parse_timestamp("").is_err());
        assert!(parse_timestamp("yesterday").is_err());
    }
}
