//! Replication of local artifacts to a mirror location.
//!
//! The [`ReplicationManager`] copies the record store (required) and the
//! operational log (best effort) into a directory under a replication target,
//! typically a network mount. When the process lacks write permission on the
//! target, copies go through a [`PrivilegedCopier`].

mod copier;
mod error;
mod fs;
mod manager;
mod target;

pub use copier::{NoEscalation, PrivilegedCopier, SudoCopier};
pub use error::{CopyError, ReplicationError};
pub use manager::{
    file_digest, Access, ArtifactCopy, CopyMethod, ReplicationManager, SecondaryOutcome,
    SyncReport,
};
pub use target::{ReplicationTarget, TargetStatus, MARKER_FILE};
