//! Elevated copy paths.

use std::path::Path;
use std::process::Command;

use tracing::debug;

use crate::error::CopyError;

/// Copies files when the process identity cannot write to the target.
pub trait PrivilegedCopier: Send + Sync {
    /// Copy `from` to `to`, overwriting `to`.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), CopyError>;

    /// Hand `path` to `uid:gid` so later direct copies can overwrite it.
    fn reclaim(&self, path: &Path, uid: u32, gid: u32) -> Result<(), CopyError>;

    /// Short name for logs.
    fn name(&self) -> &str;
}

/// Runs `cp` and `chown` through `sudo` without prompting.
///
/// Requires a sudoers rule that allows both commands without a password;
/// otherwise `sudo -n` fails immediately instead of blocking on a prompt.
#[derive(Debug, Clone)]
pub struct SudoCopier {
    program: String,
}

impl SudoCopier {
    pub fn new() -> Self {
        Self::with_program("sudo")
    }

    /// Use a different escalation program with sudo-compatible arguments.
    pub fn with_program(program: impl Into<String>) -> Self {
        SudoCopier {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&str]) -> Result<(), CopyError> {
        let command = format!("{} {}", self.program, args.join(" "));
        debug!(%command, "running elevated command");
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .map_err(|source| CopyError::Spawn {
                program: self.program.clone(),
                source,
            })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(CopyError::Failed {
                command,
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

impl Default for SudoCopier {
    fn default() -> Self {
        Self::new()
    }
}

impl PrivilegedCopier for SudoCopier {
    fn copy(&self, from: &Path, to: &Path) -> Result<(), CopyError> {
        let from = from.to_string_lossy();
        let to = to.to_string_lossy();
        self.run(&["-n", "cp", &from, &to])
    }

    fn reclaim(&self, path: &Path, uid: u32, gid: u32) -> Result<(), CopyError> {
        let owner = format!("{uid}:{gid}");
        let path = path.to_string_lossy();
        self.run(&["-n", "chown", &owner, &path])
    }

    fn name(&self) -> &str {
        &self.program
    }
}

/// Refuses every elevated operation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoEscalation;

impl PrivilegedCopier for NoEscalation {
    fn copy(&self, _from: &Path, _to: &Path) -> Result<(), CopyError> {
        Err(CopyError::Disabled)
    }

    fn reclaim(&self, _path: &Path, _uid: u32, _gid: u32) -> Result<(), CopyError> {
        Err(CopyError::Disabled)
    }

    fn name(&self) -> &str {
        "none"
    }
}
