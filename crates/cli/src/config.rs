//! Configuration file format for `speedwatch`.
//!
//! Every setting has a built-in default, so the file is optional. A file is
//! read from `--config`, or from `SPEEDWATCH_CONFIG` when the flag is absent,
//! and a few environment variables override individual keys afterwards.
//!
//! # Example
//!
//! ```toml
//! [store]
//! path = "/var/lib/speedwatch/speed_history.csv"
//! max_error_details = 500
//!
//! [log]
//! path = "/var/lib/speedwatch/speedtest.log"
//! level = "info"
//!
//! [replication]
//! enabled = true
//! root = "/media/test"
//! subdir = "speedtest"
//! escalation = "sudo"
//! record_failures = true
//!
//! [provider]
//! timeout_secs = 10
//! download_sizes = [350, 750, 1500, 2000]
//!
//! [serve]
//! port = 5000
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use speedwatch_measure::HttpProviderConfig;

pub(crate) const CONFIG_ENV: &str = "SPEEDWATCH_CONFIG";
const STORE_PATH_ENV: &str = "SPEEDWATCH_STORE_PATH";
const LOG_PATH_ENV: &str = "SPEEDWATCH_LOG_PATH";
const TARGET_ROOT_ENV: &str = "SPEEDWATCH_TARGET_ROOT";
const MAX_ERROR_DETAILS_ENV: &str = "SPEEDWATCH_MAX_ERROR_DETAILS";
const DEBUG_ENV: &str = "DEBUG";

// ── Types ─────────────────────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreConfig,
    pub log: LogConfig,
    pub replication: ReplicationConfig,
    pub provider: HttpProviderConfig,
    pub serve: ServeConfig,
}

/// `[store]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// CSV file holding the measurement history.
    pub path: PathBuf,
    /// Upper bound on the length of `error_details`, stage prefix included.
    pub max_error_details: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            path: PathBuf::from("speedtest_data/speed_history.csv"),
            max_error_details: 500,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Operational log, appended to by mutating commands and mirrored with
    /// the store.
    pub path: PathBuf,
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        LogConfig {
            path: PathBuf::from("speedtest_data/speedtest.log"),
            level: "info".to_string(),
        }
    }
}

/// How copies are made when the target refuses direct writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Escalation {
    Sudo,
    None,
}

/// `[replication]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationConfig {
    /// Sync after every successful measurement.
    pub enabled: bool,
    /// Mount point of the mirror.
    pub root: PathBuf,
    /// Directory under `root` receiving the copies.
    pub subdir: String,
    pub escalation: Escalation,
    /// Append a `ReplicationFailed` record when the post-run sync fails.
    pub record_failures: bool,
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        ReplicationConfig {
            enabled: true,
            root: PathBuf::from("/media/test"),
            subdir: "speedtest".to_string(),
            escalation: Escalation::Sudo,
            record_failures: true,
        }
    }
}

/// `[serve]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServeConfig {
    pub port: u16,
}

impl Default for ServeConfig {
    fn default() -> Self {
        ServeConfig { port: 5000 }
    }
}

// ── Functions ─────────────────────────────────────────────────────────────────

/// Resolve, read, override and validate the configuration.
///
/// `explicit` wins over `SPEEDWATCH_CONFIG`; with neither, the defaults are
/// used. A named file that cannot be read is an error.
pub fn load(explicit: Option<&Path>) -> Result<Config, String> {
    let path = explicit
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));

    let mut config = match path {
        Some(path) => read_config(&path)?,
        None => Config::default(),
    };
    config.apply_overrides(|key| std::env::var(key).ok())?;
    config.validate().map_err(|errors| errors.join("; "))?;
    Ok(config)
}

/// Read and parse a configuration file.
pub fn read_config(path: &Path) -> Result<Config, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("could not read '{}': {}", path.display(), e))?;

    toml::from_str(&content).map_err(|e| format!("could not parse '{}': {}", path.display(), e))
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

impl Config {
    /// Apply environment overrides, reading variables through `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), String>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(STORE_PATH_ENV) {
            self.store.path = PathBuf::from(path);
        }
        if let Some(path) = lookup(LOG_PATH_ENV) {
            self.log.path = PathBuf::from(path);
        }
        if let Some(root) = lookup(TARGET_ROOT_ENV) {
            self.replication.root = PathBuf::from(root);
        }
        if let Some(max) = lookup(MAX_ERROR_DETAILS_ENV) {
            self.store.max_error_details = max.trim().parse().map_err(|_| {
                format!(
                    "{} must be a positive integer, got '{}'",
                    MAX_ERROR_DETAILS_ENV, max
                )
            })?;
        }
        if lookup(DEBUG_ENV).is_some_and(|v| is_truthy(&v)) {
            self.log.level = "debug".to_string();
        }
        Ok(())
    }

    /// Check the settings that would otherwise fail late.
    ///
    /// Returns every problem found, not just the first.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.store.path.as_os_str().is_empty() {
            errors.push("store.path must not be empty".to_string());
        }
        if self.store.max_error_details == 0 {
            errors.push("store.max_error_details must be greater than 0".to_string());
        }
        if self.log.path.as_os_str().is_empty() {
            errors.push("log.path must not be empty".to_string());
        }
        if self.log.level.trim().is_empty() {
            errors.push("log.level must not be empty".to_string());
        }
        if self.replication.enabled {
            if self.replication.root.as_os_str().is_empty() {
                errors.push("replication.root must not be empty".to_string());
            }
            if self.replication.subdir.trim().is_empty() {
                errors.push("replication.subdir must not be empty".to_string());
            }
        }
        if self.provider.download_sizes.is_empty() {
            errors.push("provider.download_sizes must list at least one size".to_string());
        }
        if self.provider.max_candidates == 0 {
            errors.push("provider.max_candidates must be greater than 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
