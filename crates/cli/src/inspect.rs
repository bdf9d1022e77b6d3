//! Where history is read from, and what the local and mirrored copies look
//! like right now. Shared by `speedwatch status` and `GET /api/status`.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use serde::Serialize;
use speedwatch_replicate::{ReplicationTarget, TargetStatus};
use speedwatch_storage::{CsvRecordStore, Record, RecordStore, StoreError, StoreStats};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::commands::replication_manager;
use crate::config::Config;

/// Which copy of the history is being served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DataSource {
    Mirror,
    Local,
    None,
}

/// Presence, size and modification time of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub(crate) struct FileInfo {
    pub path: PathBuf,
    pub exists: bool,
    pub size_bytes: u64,
    /// RFC 3339, UTC.
    pub modified: Option<String>,
}

impl FileInfo {
    pub(crate) fn probe(path: &Path) -> Self {
        match std::fs::metadata(path) {
            Ok(meta) if meta.is_file() => FileInfo {
                path: path.to_path_buf(),
                exists: true,
                size_bytes: meta.len(),
                modified: meta.modified().ok().and_then(format_mtime),
            },
            _ => FileInfo {
                path: path.to_path_buf(),
                exists: false,
                size_bytes: 0,
                modified: None,
            },
        }
    }
}

fn format_mtime(mtime: SystemTime) -> Option<String> {
    OffsetDateTime::from(mtime).format(&Rfc3339).ok()
}

/// Snapshot reported by the status command and endpoint.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct SystemStatus {
    pub data_source: DataSource,
    pub local: FileInfo,
    /// Absent when replication is disabled.
    pub mirror: Option<FileInfo>,
    /// Counts over the copy named by `data_source`.
    pub store: StoreStats,
    pub target: Option<TargetStatus>,
}

/// The local store and, when replication is on, its mirror.
#[derive(Debug, Clone)]
pub(crate) struct Sources {
    pub local: PathBuf,
    pub mirror: Option<PathBuf>,
    pub target: Option<ReplicationTarget>,
}

impl Sources {
    pub(crate) fn from_config(config: &Config) -> Self {
        if !config.replication.enabled {
            return Sources {
                local: config.store.path.clone(),
                mirror: None,
                target: None,
            };
        }
        let manager = replication_manager(config);
        Sources {
            local: config.store.path.clone(),
            mirror: Some(manager.mirror_path()),
            target: Some(manager.target().clone()),
        }
    }

    /// The mirror when it has a copy, otherwise the local store.
    pub(crate) fn active(&self) -> (DataSource, Option<&Path>) {
        if let Some(mirror) = self.mirror.as_deref().filter(|p| p.is_file()) {
            return (DataSource::Mirror, Some(mirror));
        }
        if self.local.is_file() {
            return (DataSource::Local, Some(self.local.as_path()));
        }
        (DataSource::None, None)
    }

    /// All records of the active copy; empty when neither exists.
    pub(crate) fn read_records(&self) -> Result<Vec<Record>, StoreError> {
        match self.active() {
            (_, Some(path)) => read_records(&CsvRecordStore::new(path)),
            (_, None) => Ok(Vec::new()),
        }
    }

    pub(crate) fn status(&self) -> Result<SystemStatus, StoreError> {
        let (data_source, active) = self.active();
        let store = match active {
            Some(path) => CsvRecordStore::new(path).stats()?,
            None => StoreStats::default(),
        };
        Ok(SystemStatus {
            data_source,
            local: FileInfo::probe(&self.local),
            mirror: self.mirror.as_deref().map(FileInfo::probe),
            store,
            target: self.target.as_ref().map(ReplicationTarget::status),
        })
    }
}

pub(crate) fn read_records<S: RecordStore>(store: &S) -> Result<Vec<Record>, StoreError> {
    store.read_all()?.collect()
}
