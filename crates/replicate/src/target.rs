use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use nix::sys::statvfs::statvfs;
use nix::unistd::{access, AccessFlags};
use serde::Serialize;

/// Name of the file written and removed by the sync write probe.
pub const MARKER_FILE: &str = ".speedtest_write_test";

/// A mirror location: `root` is the mount point, `subdir` the directory
/// under it that receives the copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReplicationTarget {
    pub root: PathBuf,
    pub subdir: String,
}

/// Observed state of a replication target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TargetStatus {
    pub root: PathBuf,
    pub dir: PathBuf,
    pub root_exists: bool,
    pub is_mounted: bool,
    pub dir_exists: bool,
    pub is_writable: bool,
    pub free_bytes: Option<u64>,
    pub file_count: Option<u64>,
}

impl ReplicationTarget {
    pub fn new(root: impl Into<PathBuf>, subdir: impl Into<String>) -> Self {
        ReplicationTarget {
            root: root.into(),
            subdir: subdir.into(),
        }
    }

    /// Directory that receives the mirrored files.
    pub fn dir(&self) -> PathBuf {
        self.root.join(&self.subdir)
    }

    pub fn marker(&self) -> PathBuf {
        self.dir().join(MARKER_FILE)
    }

    pub fn is_reachable(&self) -> bool {
        self.root.is_dir()
    }

    /// Inspect the target without changing it.
    ///
    /// Writability is judged with `access(2)` against the mirror directory,
    /// or against the root when the directory does not exist yet.
    pub fn status(&self) -> TargetStatus {
        let dir = self.dir();
        let root_exists = self.is_reachable();
        let dir_exists = root_exists && dir.is_dir();

        let mut status = TargetStatus {
            root: self.root.clone(),
            dir: dir.clone(),
            root_exists,
            is_mounted: false,
            dir_exists,
            is_writable: false,
            free_bytes: None,
            file_count: None,
        };
        if !root_exists {
            return status;
        }

        status.is_mounted = is_mount_point(&self.root);
        let probe = if dir_exists { dir.as_path() } else { self.root.as_path() };
        status.is_writable = access(probe, AccessFlags::W_OK).is_ok();
        status.free_bytes = statvfs(&self.root)
            .ok()
            .map(|s| s.blocks_available() as u64 * s.fragment_size() as u64);
        status.file_count = if dir_exists {
            fs::read_dir(&dir).ok().map(|entries| entries.count() as u64)
        } else {
            Some(0)
        };
        status
    }
}

/// A directory is a mount point when it sits on a different device than its
/// parent, or is its own parent (`/`).
fn is_mount_point(path: &Path) -> bool {
    let Ok(meta) = fs::metadata(path) else {
        return false;
    };
    let parent = path.join("..");
    match fs::metadata(&parent) {
        Ok(parent_meta) => meta.dev() != parent_meta.dev() || meta.ino() == parent_meta.ino(),
        Err(_) => false,
    }
}
