use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use nix::unistd::{getgid, getuid};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::copier::PrivilegedCopier;
use crate::error::ReplicationError;
use crate::fs::{DirectFs, RealFs};
use crate::target::{ReplicationTarget, TargetStatus};

/// How the process can write to the mirror directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Direct,
    /// Direct writes are refused; copies need the privileged path.
    ElevatedRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CopyMethod {
    Direct,
    Elevated,
}

/// One mirrored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactCopy {
    pub from: PathBuf,
    pub to: PathBuf,
    pub method: CopyMethod,
    pub bytes: u64,
}

/// What happened to the operational log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SecondaryOutcome {
    Copied(ArtifactCopy),
    /// No log configured, or it does not exist yet.
    Skipped,
    Failed { reason: String },
}

/// Result of a successful sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub access: Access,
    pub primary: ArtifactCopy,
    pub secondary: SecondaryOutcome,
}

/// Mirrors the record store (required) and the operational log (optional)
/// into a replication target.
pub struct ReplicationManager {
    target: ReplicationTarget,
    primary: PathBuf,
    secondary: Option<PathBuf>,
    copier: Box<dyn PrivilegedCopier>,
    fs: Box<dyn DirectFs>,
}

impl ReplicationManager {
    pub fn new(
        target: ReplicationTarget,
        primary: impl Into<PathBuf>,
        copier: Box<dyn PrivilegedCopier>,
    ) -> Self {
        ReplicationManager {
            target,
            primary: primary.into(),
            secondary: None,
            copier,
            fs: Box::new(RealFs),
        }
    }

    /// Also mirror `path` on a best-effort basis.
    pub fn with_secondary(mut self, path: impl Into<PathBuf>) -> Self {
        self.secondary = Some(path.into());
        self
    }

    #[cfg(test)]
    fn with_fs(mut self, fs: Box<dyn DirectFs>) -> Self {
        self.fs = fs;
        self
    }

    pub fn target(&self) -> &ReplicationTarget {
        &self.target
    }

    /// Where the record store lands in the target.
    pub fn mirror_path(&self) -> PathBuf {
        mirror_of(&self.target.dir(), &self.primary)
    }

    /// Where the operational log lands in the target, when one is configured.
    pub fn secondary_mirror_path(&self) -> Option<PathBuf> {
        self.secondary
            .as_ref()
            .map(|p| mirror_of(&self.target.dir(), p))
    }

    pub fn status(&self) -> TargetStatus {
        self.target.status()
    }

    /// Mirror the artifacts into the target.
    ///
    /// Fails when the target is unreachable, its directory cannot be created
    /// or probed, or the record store cannot be mirrored. A log that fails to
    /// copy only produces a warning.
    pub fn sync(&self) -> Result<SyncReport, ReplicationError> {
        let root = &self.target.root;
        if !self.target.is_reachable() {
            warn!(root = %root.display(), "replication target not reachable, skipping sync");
            return Err(ReplicationError::TargetUnreachable { root: root.clone() });
        }

        let dir = self.target.dir();
        self.fs
            .create_dir_all(&dir)
            .map_err(|source| ReplicationError::TargetDir {
                path: dir.clone(),
                source,
            })?;

        let access = match self.fs.probe_write(&self.target.marker()) {
            Ok(()) => Access::Direct,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                info!(dir = %dir.display(), "direct writes refused, elevated copies required");
                Access::ElevatedRequired
            }
            Err(source) => return Err(ReplicationError::TargetProbe { path: dir, source }),
        };
        debug!(?access, "replication target access");

        let primary = self.mirror_primary()?;
        info!(
            to = %primary.to.display(),
            method = ?primary.method,
            bytes = primary.bytes,
            "record store mirrored"
        );

        let secondary = self.mirror_secondary();
        Ok(SyncReport {
            access,
            primary,
            secondary,
        })
    }

    fn mirror_primary(&self) -> Result<ArtifactCopy, ReplicationError> {
        let to = self.mirror_path();
        let failed = |reason: String| ReplicationError::PrimaryCopyFailed {
            from: self.primary.clone(),
            to: to.clone(),
            reason,
        };

        if !self.primary.is_file() {
            return Err(failed("record store does not exist".to_string()));
        }
        let method = self.copy_artifact(&self.primary, &to).map_err(failed)?;

        let source = file_digest(&self.primary)
            .map_err(|e| failed(format!("cannot read record store: {e}")))?;
        let mirror =
            file_digest(&to).map_err(|e| failed(format!("cannot read mirror: {e}")))?;
        if source != mirror {
            return Err(failed(format!(
                "mirror does not match record store ({} bytes vs {} bytes)",
                mirror.0, source.0
            )));
        }

        Ok(ArtifactCopy {
            from: self.primary.clone(),
            to,
            method,
            bytes: source.0,
        })
    }

    fn mirror_secondary(&self) -> SecondaryOutcome {
        let (Some(from), Some(to)) = (self.secondary.as_ref(), self.secondary_mirror_path()) else {
            return SecondaryOutcome::Skipped;
        };
        if !from.is_file() {
            debug!(path = %from.display(), "operational log missing, not mirrored");
            return SecondaryOutcome::Skipped;
        }
        match self.copy_artifact(from, &to) {
            Ok(method) => {
                let bytes = std::fs::metadata(&to).map(|m| m.len()).unwrap_or(0);
                info!(to = %to.display(), "operational log mirrored");
                SecondaryOutcome::Copied(ArtifactCopy {
                    from: from.clone(),
                    to,
                    method,
                    bytes,
                })
            }
            Err(reason) => {
                warn!(%reason, "failed to mirror operational log, continuing");
                SecondaryOutcome::Failed { reason }
            }
        }
    }

    /// Direct copy, then the privileged path when the direct copy is refused.
    fn copy_artifact(&self, from: &Path, to: &Path) -> Result<CopyMethod, String> {
        match self.fs.copy(from, to) {
            Ok(_) => return Ok(CopyMethod::Direct),
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                info!(
                    to = %to.display(),
                    copier = self.copier.name(),
                    "direct copy refused, trying elevated copy"
                );
            }
            Err(e) => return Err(format!("copy failed: {e}")),
        }

        self.copier
            .copy(from, to)
            .map_err(|e| format!("elevated copy failed: {e}"))?;

        let (uid, gid) = (getuid().as_raw(), getgid().as_raw());
        if let Err(e) = self.copier.reclaim(to, uid, gid) {
            warn!(path = %to.display(), error = %e, "could not reclaim ownership of mirror");
        }
        Ok(CopyMethod::Elevated)
    }
}

fn mirror_of(dir: &Path, file: &Path) -> PathBuf {
    match file.file_name() {
        Some(name) => dir.join(name),
        None => dir.join("speed_history.csv"),
    }
}

/// Length and SHA-256 of a file.
pub fn file_digest(path: &Path) -> io::Result<(u64, [u8; 32])> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let len = io::copy(&mut file, &mut hasher)?;
    Ok((len, hasher.finalize().into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::NoEscalation;
    use crate::error::CopyError;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Filesystem that behaves like an unprivileged view of the target.
    #[derive(Default)]
    struct RestrictedFs {
        deny_probe: bool,
        deny_copy: bool,
        probe_error: Option<io::ErrorKind>,
        truncate_copy: bool,
    }

    impl DirectFs for RestrictedFs {
        fn create_dir_all(&self, path: &Path) -> io::Result<()> {
            fs::create_dir_all(path)
        }

        fn probe_write(&self, path: &Path) -> io::Result<()> {
            if let Some(kind) = self.probe_error {
                return Err(io::Error::new(kind, "probe failed"));
            }
            if self.deny_probe {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            RealFs.probe_write(path)
        }

        fn copy(&self, from: &Path, to: &Path) -> io::Result<u64> {
            if self.deny_copy {
                return Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"));
            }
            if self.truncate_copy {
                let data = fs::read(from)?;
                fs::write(to, &data[..data.len() / 2])?;
                return Ok((data.len() / 2) as u64);
            }
            fs::copy(from, to)
        }
    }

    #[derive(Default, Clone)]
    struct RecordingCopier {
        calls: Arc<Mutex<Vec<String>>>,
        fail_on: Option<&'static str>,
    }

    impl PrivilegedCopier for RecordingCopier {
        fn copy(&self, from: &Path, to: &Path) -> Result<(), CopyError> {
            let name = from.file_name().unwrap().to_string_lossy().to_string();
            self.calls.lock().unwrap().push(format!("cp {name}"));
            if self.fail_on == Some(name.as_str()) {
                return Err(CopyError::Failed {
                    command: format!("cp {name}"),
                    status: "exit status: 1".to_string(),
                    stderr: "Permission denied".to_string(),
                });
            }
            fs::copy(from, to).map(|_| ()).map_err(|source| CopyError::Spawn {
                program: "cp".to_string(),
                source,
            })
        }

        fn reclaim(&self, path: &Path, _uid: u32, _gid: u32) -> Result<(), CopyError> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            self.calls.lock().unwrap().push(format!("chown {name}"));
            Ok(())
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    struct Fixture {
        _dir: TempDir,
        local: PathBuf,
        root: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let local = dir.path().join("speedtest_data");
            let root = dir.path().join("mnt");
            fs::create_dir_all(&local).unwrap();
            fs::create_dir_all(&root).unwrap();
            fs::write(
                local.join("speed_history.csv"),
                "timestamp,download_mbps\n2024-01-01T00:00:00Z,50.0\n",
            )
            .unwrap();
            fs::write(local.join("speedtest.log"), "INFO started\n").unwrap();
            Fixture {
                _dir: dir,
                local,
                root,
            }
        }

        fn store(&self) -> PathBuf {
            self.local.join("speed_history.csv")
        }

        fn log(&self) -> PathBuf {
            self.local.join("speedtest.log")
        }

        fn manager(&self, copier: Box<dyn PrivilegedCopier>) -> ReplicationManager {
            ReplicationManager::new(ReplicationTarget::new(&self.root, "speedtest"), self.store(), copier)
                .with_secondary(self.log())
        }
    }

    #[test]
    fn direct_sync_mirrors_both_artifacts() {
        let fx = Fixture::new();
        let manager = fx.manager(Box::new(NoEscalation));
        let report = manager.sync().unwrap();

        assert_eq!(report.access, Access::Direct);
        assert_eq!(report.primary.method, CopyMethod::Direct);
        assert_eq!(report.primary.to, fx.root.join("speedtest/speed_history.csv"));
        assert_eq!(
            fs::read(&report.primary.to).unwrap(),
            fs::read(fx.store()).unwrap()
        );
        assert!(matches!(report.secondary, SecondaryOutcome::Copied(_)));
        assert!(fx.root.join("speedtest/speedtest.log").exists());
        assert!(!manager.target().marker().exists());
    }

    #[test]
    fn unreachable_target_fails_and_leaves_store_untouched() {
        let fx = Fixture::new();
        let before = file_digest(&fx.store()).unwrap();
        let manager = ReplicationManager::new(
            ReplicationTarget::new(fx.root.join("not-mounted"), "speedtest"),
            fx.store(),
            Box::new(NoEscalation),
        );
        let err = manager.sync().unwrap_err();
        assert!(matches!(err, ReplicationError::TargetUnreachable { .. }));
        assert_eq!(file_digest(&fx.store()).unwrap(), before);
        assert!(!fx.root.join("not-mounted").exists());
    }

    #[test]
    fn elevated_path_mirrors_byte_for_byte() {
        let fx = Fixture::new();
        let copier = RecordingCopier::default();
        let calls = copier.calls.clone();
        let manager = fx.manager(Box::new(copier)).with_fs(Box::new(RestrictedFs {
            deny_probe: true,
            deny_copy: true,
            ..RestrictedFs::default()
        }));

        let report = manager.sync().unwrap();
        assert_eq!(report.access, Access::ElevatedRequired);
        assert_eq!(report.primary.method, CopyMethod::Elevated);
        assert_eq!(
            file_digest(&manager.mirror_path()).unwrap(),
            file_digest(&fx.store()).unwrap()
        );
        assert_eq!(
            *calls.lock().unwrap(),
            vec![
                "cp speed_history.csv",
                "chown speed_history.csv",
                "cp speedtest.log",
                "chown speedtest.log",
            ]
        );
    }

    #[test]
    fn failed_elevated_copy_of_store_fails_sync() {
        let fx = Fixture::new();
        let copier = RecordingCopier {
            fail_on: Some("speed_history.csv"),
            ..RecordingCopier::default()
        };
        let manager = fx.manager(Box::new(copier)).with_fs(Box::new(RestrictedFs {
            deny_probe: true,
            deny_copy: true,
            ..RestrictedFs::default()
        }));
        match manager.sync() {
            Err(ReplicationError::PrimaryCopyFailed { reason, .. }) => {
                assert!(reason.starts_with("elevated copy failed"), "{reason}");
            }
            other => panic!("expected PrimaryCopyFailed, got {other:?}"),
        }
    }

    #[test]
    fn escalation_disabled_fails_when_copy_is_refused() {
        let fx = Fixture::new();
        let manager = fx.manager(Box::new(NoEscalation)).with_fs(Box::new(RestrictedFs {
            deny_copy: true,
            ..RestrictedFs::default()
        }));
        let err = manager.sync().unwrap_err();
        assert!(matches!(err, ReplicationError::PrimaryCopyFailed { .. }));
    }

    #[test]
    fn log_failure_is_not_fatal() {
        let fx = Fixture::new();
        let copier = RecordingCopier {
            fail_on: Some("speedtest.log"),
            ..RecordingCopier::default()
        };
        let manager = fx.manager(Box::new(copier)).with_fs(Box::new(RestrictedFs {
            deny_copy: true,
            ..RestrictedFs::default()
        }));
        let report = manager.sync().unwrap();
        assert_eq!(report.access, Access::Direct);
        assert_eq!(report.primary.method, CopyMethod::Elevated);
        assert!(matches!(report.secondary, SecondaryOutcome::Failed { .. }));
    }

    #[test]
    fn missing_log_is_skipped() {
        let fx = Fixture::new();
        fs::remove_file(fx.log()).unwrap();
        let report = fx.manager(Box::new(NoEscalation)).sync().unwrap();
        assert_eq!(report.secondary, SecondaryOutcome::Skipped);
    }

    #[test]
    fn missing_store_is_a_primary_failure() {
        let fx = Fixture::new();
        fs::remove_file(fx.store()).unwrap();
        let err = fx.manager(Box::new(NoEscalation)).sync().unwrap_err();
        assert!(matches!(err, ReplicationError::PrimaryCopyFailed { .. }));
    }

    #[test]
    fn probe_error_other_than_permission_aborts() {
        let fx = Fixture::new();
        let manager = fx.manager(Box::new(NoEscalation)).with_fs(Box::new(RestrictedFs {
            probe_error: Some(io::ErrorKind::Other),
            ..RestrictedFs::default()
        }));
        let err = manager.sync().unwrap_err();
        assert!(matches!(err, ReplicationError::TargetProbe { .. }));
        assert!(!manager.mirror_path().exists());
    }

    #[test]
    fn blocked_mirror_directory_is_a_dir_error() {
        let fx = Fixture::new();
        fs::write(fx.root.join("speedtest"), "a file, not a directory").unwrap();
        let err = fx.manager(Box::new(NoEscalation)).sync().unwrap_err();
        assert!(matches!(err, ReplicationError::TargetDir { .. }));
    }

    #[test]
    fn truncated_mirror_is_detected() {
        let fx = Fixture::new();
        let manager = fx.manager(Box::new(NoEscalation)).with_fs(Box::new(RestrictedFs {
            truncate_copy: true,
            ..RestrictedFs::default()
        }));
        match manager.sync() {
            Err(ReplicationError::PrimaryCopyFailed { reason, .. }) => {
                assert!(reason.contains("does not match"), "{reason}");
            }
            other => panic!("expected PrimaryCopyFailed, got {other:?}"),
        }
    }

    #[test]
    fn sync_report_serializes_with_outcome_tags() {
        let fx = Fixture::new();
        let report = fx.manager(Box::new(NoEscalation)).sync().unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["access"], "direct");
        assert_eq!(json["primary"]["method"], "direct");
        assert_eq!(json["secondary"]["outcome"], "copied");
    }
}
