use serde::Serialize;
use std::fmt;

use crate::provider::ProviderError;

/// A provider-facing step of a measurement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    GetConfig,
    GetServers,
    GetBestServer,
    DownloadTest,
    UploadTest,
    Results,
}

impl Stage {
    pub const ALL: [Stage; 6] = [
        Stage::GetConfig,
        Stage::GetServers,
        Stage::GetBestServer,
        Stage::DownloadTest,
        Stage::UploadTest,
        Stage::Results,
    ];

    /// Label used as the prefix of `error_details`.
    pub fn label(self) -> &'static str {
        match self {
            Stage::GetConfig => "get_config",
            Stage::GetServers => "get_servers",
            Stage::GetBestServer => "get_best_server",
            Stage::DownloadTest => "download_test",
            Stage::UploadTest => "upload_test",
            Stage::Results => "results",
        }
    }

    /// `error_type` recorded when the provider error carries no tag.
    pub fn default_error_type(self) -> &'static str {
        match self {
            Stage::GetConfig => "ConfigError",
            Stage::GetServers => "ServerListError",
            Stage::GetBestServer => "BestServerError",
            Stage::DownloadTest => "DownloadTestError",
            Stage::UploadTest => "UploadTestError",
            Stage::Results => "ResultsError",
        }
    }

    /// State reached when this stage succeeds.
    pub fn completes_into(self) -> RunState {
        match self {
            Stage::GetConfig => RunState::ConfigFetched,
            Stage::GetServers => RunState::ServersListed,
            Stage::GetBestServer => RunState::ServerSelected,
            Stage::DownloadTest => RunState::DownloadDone,
            Stage::UploadTest => RunState::UploadDone,
            Stage::Results => RunState::Complete,
        }
    }

    pub(crate) fn index(self) -> u8 {
        self as u8
    }

    pub(crate) fn from_index(index: u8) -> Stage {
        Stage::ALL
            .get(index as usize)
            .copied()
            .unwrap_or(Stage::GetConfig)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// States of the measurement state machine.
///
/// The machine is linear: each stage either advances to the next state or
/// ends in `Failed`. There are no retries inside one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    Init,
    ConfigFetched,
    ServersListed,
    ServerSelected,
    DownloadDone,
    UploadDone,
    Complete,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Complete | RunState::Failed)
    }
}

/// Terminal failure of a run: where it happened and what went wrong.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub error_type: String,
    pub details: String,
}

impl StageFailure {
    pub fn new(stage: Stage, err: ProviderError) -> Self {
        let error_type = if err.kind.trim().is_empty() {
            stage.default_error_type().to_string()
        } else {
            err.kind
        };
        StageFailure {
            stage,
            error_type,
            details: err.message,
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FAILED at {}: {}: {}",
            self.stage, self.error_type, self.details
        )
    }
}
