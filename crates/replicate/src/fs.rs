//! Direct filesystem operations used by the manager.
//!
//! Kept behind a trait so tests can make the target refuse writes the way an
//! unprivileged mount does.

use std::fs;
use std::io;
use std::path::Path;

pub(crate) trait DirectFs: Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Write `path` and remove it again.
    fn probe_write(&self, path: &Path) -> io::Result<()>;

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64>;
}

pub(crate) struct RealFs;

impl DirectFs for RealFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path)
    }

    fn probe_write(&self, path: &Path) -> io::Result<()> {
        fs::write(path, b"test")?;
        fs::remove_file(path)
    }

    fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
        fs::copy(from, to)
    }
}
