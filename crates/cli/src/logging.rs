//! Process-wide `tracing` subscriber.

use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Install the subscriber: human-readable lines on stderr and, when
/// `log_file` is given, the same events without ANSI colours appended to it.
///
/// `RUST_LOG` takes precedence over the configured level; `quiet` lowers
/// the default to `warn`. Failing to open the log file only drops that layer.
pub(crate) fn init(config: &LogConfig, quiet: bool, log_file: Option<&Path>) -> Result<(), String> {
    let default = if quiet { "warn" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .map_err(|e| format!("invalid log level '{}': {}", default, e))?;

    let stderr = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let mut open_error = None;
    let file = log_file.and_then(|path| match open_log(path) {
        Ok(file) => Some(
            fmt::layer()
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        ),
        Err(e) => {
            open_error = Some(format!("cannot open log file '{}': {}", path.display(), e));
            None
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .try_init()
        .map_err(|e| format!("failed to install logger: {}", e))?;

    if let Some(message) = open_error {
        tracing::warn!("{}", message);
    }
    Ok(())
}

fn open_log(path: &Path) -> std::io::Result<fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
