use std::io;
use std::path::PathBuf;

/// Why a sync did not complete. Every variant leaves the local files
/// untouched.
#[derive(Debug, thiserror::Error)]
pub enum ReplicationError {
    /// The target root does not exist (share not mounted, path missing).
    #[error("replication target {root} is not reachable")]
    TargetUnreachable { root: PathBuf },

    /// The mirror directory could not be created.
    #[error("cannot create mirror directory {path}: {source}")]
    TargetDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The write probe failed for a reason other than missing permission.
    #[error("write probe in {path} failed: {source}")]
    TargetProbe {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The record store could not be mirrored by any means.
    #[error("failed to mirror {from} to {to}: {reason}")]
    PrimaryCopyFailed {
        from: PathBuf,
        to: PathBuf,
        reason: String,
    },
}

/// Failure of an elevated copy or ownership change.
#[derive(Debug, thiserror::Error)]
pub enum CopyError {
    #[error("privilege escalation is disabled")]
    Disabled,

    #[error("failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}
