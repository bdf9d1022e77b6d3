//! The measurement provider abstraction.
//!
//! A provider performs the network operations of one measurement attempt.
//! Each operation takes the data produced by the previous stage explicitly,
//! so the orchestrator owns the sequencing and a provider stays stateless
//! between calls.

use async_trait::async_trait;
use serde::Serialize;
use speedwatch_storage::ServerInfo;
use std::fmt;

// ──────────────────────────────────────────────
// ProviderError
// ──────────────────────────────────────────────

/// A failed provider operation.
///
/// `kind` is a short type tag (`ConfigRetrievalError`, `Timeout`, ...) that is
/// preserved as the record's `error_type`. An empty kind makes the
/// orchestrator fall back to the tag of the stage that failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub kind: String,
    pub message: String,
}

impl ProviderError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderError {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// An error without a type tag of its own.
    pub fn untyped(message: impl Into<String>) -> Self {
        Self::new("", message)
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.kind.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}: {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for ProviderError {}

// ──────────────────────────────────────────────
// Stage data
// ──────────────────────────────────────────────

/// Client information returned by the configuration endpoint.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ClientConfig {
    pub ip: Option<String>,
    pub isp: Option<String>,
}

/// A measurement server candidate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub country: String,
    pub sponsor: String,
    /// Upload endpoint; other resources live next to it.
    pub url: String,
    pub distance_km: Option<f64>,
}

impl Server {
    /// Base URL for the server's resources (`.../speedtest/upload.php` →
    /// `.../speedtest`).
    pub fn base_url(&self) -> &str {
        match self.url.rfind('/') {
            Some(idx) if idx > self.url.find("://").map_or(0, |i| i + 2) => &self.url[..idx],
            _ => self.url.trim_end_matches('/'),
        }
    }

    pub fn info(&self) -> ServerInfo {
        ServerInfo {
            name: self.name.clone(),
            country: self.country.clone(),
            sponsor: self.sponsor.clone(),
        }
    }
}

/// The server chosen for the attempt, with the latency measured while
/// choosing it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedServer {
    pub server: Server,
    pub latency_ms: f64,
}

// ──────────────────────────────────────────────
// MeasurementProvider trait
// ──────────────────────────────────────────────

/// Performs the network operations of a measurement attempt.
///
/// Throughput results are in bits per second, latency in milliseconds.
#[async_trait]
pub trait MeasurementProvider: Send + Sync {
    async fn fetch_config(&self) -> Result<ClientConfig, ProviderError>;

    async fn list_servers(&self, config: &ClientConfig) -> Result<Vec<Server>, ProviderError>;

    async fn select_best_server(&self, servers: &[Server])
        -> Result<SelectedServer, ProviderError>;

    async fn measure_download(&self, server: &SelectedServer) -> Result<f64, ProviderError>;

    async fn measure_upload(&self, server: &SelectedServer) -> Result<f64, ProviderError>;

    /// Latency to the selected server as of the last measurement.
    async fn last_ping(&self, server: &SelectedServer) -> Result<f64, ProviderError>;
}
