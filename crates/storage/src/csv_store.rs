//! Append-only CSV record store.
//!
//! One header row followed by one row per record, in the current column
//! layout. Rows are written with a single `write_all` on an append-mode handle
//! and synced before `append` returns, so a concurrent reader sees either the
//! whole row or none of it.
//!
//! Read policy for damaged files: a row that cannot be parsed is skipped with
//! a warning when it is the last row of the file (the signature of an
//! interrupted write); anywhere else it aborts the read with
//! [`StoreError::Corrupt`]. [`CsvRecordStore::upgrade`] rewrites the file and
//! drops unreadable rows, which is the repair path for the latter case.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use csv::StringRecord;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::StoreError;
use crate::record::{Record, Status};
use crate::schema::{
    format_timestamp, RowOut, SchemaVersion, StoredRow, CURRENT_COLUMNS,
};
use crate::traits::{RecordStore, Records};

/// Record store backed by a single CSV file.
#[derive(Debug, Clone)]
pub struct CsvRecordStore {
    path: PathBuf,
}

/// Outcome of [`CsvRecordStore::upgrade`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UpgradeReport {
    /// Rows written to the upgraded file.
    pub rows: u64,
    /// Rows that gained columns, had empty values filled or were reclassified.
    pub updated: u64,
    /// Unreadable rows left out of the upgraded file.
    pub dropped: u64,
    /// Whether the file was in the legacy layout before the upgrade.
    pub was_legacy: bool,
    /// Copy of the original file, when one was requested.
    pub backup: Option<PathBuf>,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        CsvRecordStore { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<store>.backup`, the copy kept by [`upgrade`](Self::upgrade).
    pub fn backup_path(&self) -> PathBuf {
        self.sibling(".backup")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(suffix);
        PathBuf::from(name)
    }

    fn write_error(&self, source: io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }

    fn read_error(&self, source: io::Error) -> StoreError {
        StoreError::Read {
            path: self.path.clone(),
            source,
        }
    }

    fn corrupt(&self, line: u64, message: impl Into<String>) -> StoreError {
        StoreError::Corrupt {
            path: self.path.clone(),
            line,
            message: message.into(),
        }
    }

    fn csv_error(&self, err: csv::Error) -> StoreError {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => self.read_error(source),
            _ => self.corrupt(line, message),
        }
    }

    /// Opens a CSV reader positioned before the header, or `None` when the
    /// file is absent or empty.
    fn open_reader(&self) -> Result<Option<csv::Reader<File>>, StoreError> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.read_error(e)),
        };
        let len = file.metadata().map_err(|e| self.read_error(e))?.len();
        if len == 0 {
            return Ok(None);
        }
        Ok(Some(
            csv::ReaderBuilder::new()
                .has_headers(true)
                .trim(csv::Trim::Headers)
                .from_reader(file),
        ))
    }

    fn read_header(
        &self,
        reader: &mut csv::Reader<File>,
    ) -> Result<(StringRecord, SchemaVersion), StoreError> {
        let headers = reader.headers().map_err(|e| self.csv_error(e))?.clone();
        let version = SchemaVersion::detect(&headers).map_err(|m| self.corrupt(1, m))?;
        Ok((headers, version))
    }

    /// Layout of the file on disk, `None` when it does not exist or is empty.
    pub fn schema_version(&self) -> Result<Option<SchemaVersion>, StoreError> {
        Ok(self.on_disk_header()?.map(|(_, version)| version))
    }

    fn on_disk_header(&self) -> Result<Option<(StringRecord, SchemaVersion)>, StoreError> {
        match self.open_reader()? {
            Some(mut reader) => self.read_header(&mut reader).map(Some),
            None => Ok(None),
        }
    }

    fn ends_with_newline(&self) -> Result<bool, StoreError> {
        let mut file = File::open(&self.path).map_err(|e| self.write_error(e))?;
        if file.metadata().map_err(|e| self.write_error(e))?.len() == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1))
            .map_err(|e| self.write_error(e))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)
            .map_err(|e| self.write_error(e))?;
        Ok(last[0] == b'\n')
    }

    /// Rewrite the store in the current layout.
    ///
    /// Every readable row is normalized (legacy rows gain the outcome columns,
    /// failed rows get zeroed speeds) and keeps its original timestamp text.
    /// Unreadable rows are dropped with a warning. The new file replaces the
    /// old one through a rename so readers never see a partial file.
    pub fn upgrade(&self, backup: bool) -> Result<UpgradeReport, StoreError> {
        let Some(mut reader) = self.open_reader()? else {
            return Ok(UpgradeReport::default());
        };
        let (headers, version) = self.read_header(&mut reader)?;
        let mut report = UpgradeReport {
            was_legacy: version == SchemaVersion::Legacy,
            ..UpgradeReport::default()
        };

        let mut rows: Vec<(String, Record)> = Vec::new();
        let mut raw = StringRecord::new();
        loop {
            match reader.read_record(&mut raw) {
                Ok(false) => break,
                Ok(true) => {
                    let line = raw.position().map(|p| p.line()).unwrap_or(0);
                    let decoded = StoredRow::decode(&raw, &headers, version).and_then(|row| {
                        let timestamp = row.raw_timestamp().to_string();
                        let filled = needs_fill(&row);
                        row.normalize().map(|record| (timestamp, filled, record))
                    });
                    match decoded {
                        Ok((timestamp, filled, record)) => {
                            if filled {
                                report.updated += 1;
                            }
                            rows.push((timestamp, record));
                        }
                        Err(message) => {
                            warn!(line, %message, "dropping unreadable row during upgrade");
                            report.dropped += 1;
                        }
                    }
                }
                Err(e) if e.is_io_error() => return Err(self.csv_error(e)),
                Err(e) => {
                    let line = e.position().map(|p| p.line()).unwrap_or(0);
                    warn!(line, error = %e, "dropping unreadable row during upgrade");
                    report.dropped += 1;
                }
            }
        }
        drop(reader);

        let bytes = encode(
            rows.iter()
                .map(|(ts, record)| RowOut::new(record, Cow::Borrowed(ts.as_str()))),
            true,
        )
        .map_err(|m| self.write_error(io::Error::new(io::ErrorKind::InvalidData, m)))?;

        if backup {
            let backup_path = self.backup_path();
            fs::copy(&self.path, &backup_path).map_err(|e| self.write_error(e))?;
            report.backup = Some(backup_path);
        }

        let tmp = self.sibling(".tmp");
        {
            let mut file = File::create(&tmp).map_err(|e| self.write_error(e))?;
            file.write_all(&bytes).map_err(|e| self.write_error(e))?;
            file.sync_all().map_err(|e| self.write_error(e))?;
        }
        fs::rename(&tmp, &self.path).map_err(|e| self.write_error(e))?;

        report.rows = rows.len() as u64;
        info!(
            path = %self.path.display(),
            rows = report.rows,
            updated = report.updated,
            dropped = report.dropped,
            "record store upgraded to current layout"
        );
        Ok(report)
    }
}

/// Whether upgrading this row changes more than its spelling.
fn needs_fill(row: &StoredRow) -> bool {
    match row {
        StoredRow::Legacy(_) => true,
        StoredRow::Current(row) => {
            let has_error_type = row
                .error_type
                .as_deref()
                .is_some_and(|t| !t.trim().is_empty());
            row.status.is_none()
                || (row.status == Some(Status::Success) && has_error_type)
                || row.download_mbps.is_none()
                || row.upload_mbps.is_none()
                || row.ping_ms.is_none()
        }
    }
}

fn encode<'a>(
    rows: impl IntoIterator<Item = RowOut<'a>>,
    header: bool,
) -> Result<Vec<u8>, String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    if header {
        writer
            .write_record(CURRENT_COLUMNS)
            .map_err(|e| e.to_string())?;
    }
    for row in rows {
        writer.serialize(row).map_err(|e| e.to_string())?;
    }
    writer.into_inner().map_err(|e| e.to_string())
}

impl RecordStore for CsvRecordStore {
    fn append(&self, record: &Record) -> Result<(), StoreError> {
        // Any failure on the write path is reported as a write failure.
        let header = self.on_disk_header().map_err(|e| match e {
            StoreError::Read { source, .. } => self.write_error(source),
            other => other,
        })?;
        // Rows are always encoded in the current layout, so any other header
        // has to be rewritten first.
        let write_header = match header {
            None => true,
            Some((headers, _)) if headers.iter().eq(CURRENT_COLUMNS.iter().copied()) => false,
            Some((_, version)) => {
                warn!(
                    path = %self.path.display(),
                    legacy = version == SchemaVersion::Legacy,
                    "record store header differs from the current layout, upgrading before append"
                );
                self.upgrade(true)?;
                false
            }
        };

        let timestamp = format_timestamp(record.timestamp)
            .map_err(|m| self.write_error(io::Error::new(io::ErrorKind::InvalidData, m)))?;
        let mut bytes = encode([RowOut::new(record, Cow::Owned(timestamp))], write_header)
            .map_err(|m| self.write_error(io::Error::new(io::ErrorKind::InvalidData, m)))?;

        if !write_header && !self.ends_with_newline()? {
            warn!(
                path = %self.path.display(),
                "record store does not end with a newline, previous row may be incomplete"
            );
            bytes.insert(0, b'\n');
        }

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.write_error(e))?;
        file.write_all(&bytes).map_err(|e| self.write_error(e))?;
        file.flush().map_err(|e| self.write_error(e))?;
        file.sync_data().map_err(|e| self.write_error(e))?;

        debug!(
            path = %self.path.display(),
            status = %record.status,
            header = write_header,
            "record appended"
        );
        Ok(())
    }

    fn read_all(&self) -> Result<Records<'_>, StoreError> {
        let Some(mut reader) = self.open_reader()? else {
            return Ok(Box::new(std::iter::empty()));
        };
        let (headers, version) = self.read_header(&mut reader)?;
        Ok(Box::new(CsvRecords {
            store: self,
            reader,
            headers,
            version,
            lookahead: None,
            done: false,
        }))
    }

    fn size_bytes(&self) -> Result<u64, StoreError> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(self.read_error(e)),
        }
    }

    fn exists(&self) -> bool {
        self.path.exists()
    }
}

/// Lazy iterator over the rows of a CSV store.
///
/// Keeps one row of lookahead so that a parse failure can be told apart as
/// trailing (skipped) or interior (fatal).
struct CsvRecords<'a> {
    store: &'a CsvRecordStore,
    reader: csv::Reader<File>,
    headers: StringRecord,
    version: SchemaVersion,
    lookahead: Option<Result<StringRecord, csv::Error>>,
    done: bool,
}

impl CsvRecords<'_> {
    fn next_raw(&mut self) -> Option<Result<StringRecord, csv::Error>> {
        if let Some(raw) = self.lookahead.take() {
            return Some(raw);
        }
        let mut raw = StringRecord::new();
        match self.reader.read_record(&mut raw) {
            Ok(true) => Some(Ok(raw)),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl Iterator for CsvRecords<'_> {
    type Item = Result<Record, StoreError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let raw = match self.next_raw() {
            Some(raw) => raw,
            None => {
                self.done = true;
                return None;
            }
        };

        let (line, message) = match raw {
            Ok(raw) => {
                let line = raw.position().map(|p| p.line()).unwrap_or(0);
                match StoredRow::decode(&raw, &self.headers, self.version)
                    .and_then(StoredRow::normalize)
                {
                    Ok(record) => return Some(Ok(record)),
                    Err(message) => (line, message),
                }
            }
            Err(e) if e.is_io_error() => {
                self.done = true;
                return Some(Err(self.store.csv_error(e)));
            }
            Err(e) => (e.position().map(|p| p.line()).unwrap_or(0), e.to_string()),
        };

        self.done = true;
        match self.next_raw() {
            None => {
                warn!(
                    path = %self.store.path.display(),
                    line,
                    %message,
                    "skipping unreadable trailing row"
                );
                None
            }
            Some(_) => Some(Err(self.store.corrupt(line, message))),
        }
    }
}
