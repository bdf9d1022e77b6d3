//! Subcommand implementations.
//!
//! Each command reports failures through [`report_error`] and exits the
//! process itself; returning normally means exit status 0.

pub(crate) mod history;
pub(crate) mod migrate;
pub(crate) mod run;
pub(crate) mod status;
pub(crate) mod sync;

use std::process;

use speedwatch_replicate::{
    NoEscalation, PrivilegedCopier, ReplicationManager, ReplicationTarget, SudoCopier,
};

use crate::config::{Config, Escalation};
use crate::{report_error, OutputFormat, EXIT_FAILURE};

/// Build the replication manager described by `config`.
pub(crate) fn replication_manager(config: &Config) -> ReplicationManager {
    let target = ReplicationTarget::new(&config.replication.root, &config.replication.subdir);
    let copier: Box<dyn PrivilegedCopier> = match config.replication.escalation {
        Escalation::Sudo => Box::new(SudoCopier::new()),
        Escalation::None => Box::new(NoEscalation),
    };
    ReplicationManager::new(target, &config.store.path, copier).with_secondary(&config.log.path)
}

pub(crate) fn runtime(output: OutputFormat, quiet: bool) -> tokio::runtime::Runtime {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            report_error(
                &format!("failed to create tokio runtime: {}", e),
                output,
                quiet,
            );
            process::exit(EXIT_FAILURE);
        }
    }
}
