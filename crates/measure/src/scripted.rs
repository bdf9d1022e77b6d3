//! Deterministic provider for tests and dry runs.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use crate::provider::{ClientConfig, MeasurementProvider, ProviderError, SelectedServer, Server};
use crate::state::Stage;

/// A provider that returns fixed results, optionally failing or stalling at a
/// chosen stage. Every call is recorded.
#[derive(Debug)]
pub struct ScriptedProvider {
    servers: Vec<Server>,
    download_bps: f64,
    upload_bps: f64,
    ping_ms: f64,
    failure: Option<(Stage, ProviderError)>,
    stall: Option<Stage>,
    calls: Mutex<Vec<Stage>>,
}

impl ScriptedProvider {
    /// Succeeds at every stage with the given throughput (bits/s) and ping.
    pub fn new(download_bps: f64, upload_bps: f64, ping_ms: f64) -> Self {
        ScriptedProvider {
            servers: vec![Server {
                id: "4242".to_string(),
                name: "Testville".to_string(),
                country: "Testland".to_string(),
                sponsor: "Loopback Networks".to_string(),
                url: "http://speedtest.invalid:8080/speedtest/upload.php".to_string(),
                distance_km: Some(3.2),
            }],
            download_bps,
            upload_bps,
            ping_ms,
            failure: None,
            stall: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_at(mut self, stage: Stage, err: ProviderError) -> Self {
        self.failure = Some((stage, err));
        self
    }

    /// Never completes once `stage` is reached.
    pub fn stalling_at(mut self, stage: Stage) -> Self {
        self.stall = Some(stage);
        self
    }

    pub fn with_servers(mut self, servers: Vec<Server>) -> Self {
        self.servers = servers;
        self
    }

    /// Stages called so far, in order.
    pub fn calls(&self) -> Vec<Stage> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> MutexGuard<'_, Vec<Stage>> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, stage: Stage) -> Result<(), ProviderError> {
        self.lock_calls().push(stage);
        if self.stall == Some(stage) {
            std::future::pending::<()>().await;
        }
        match &self.failure {
            Some((at, err)) if *at == stage => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl MeasurementProvider for ScriptedProvider {
    async fn fetch_config(&self) -> Result<ClientConfig, ProviderError> {
        self.enter(Stage::GetConfig).await?;
        Ok(ClientConfig {
            ip: Some("192.0.2.10".to_string()),
            isp: Some("Scripted ISP".to_string()),
        })
    }

    async fn list_servers(&self, _config: &ClientConfig) -> Result<Vec<Server>, ProviderError> {
        self.enter(Stage::GetServers).await?;
        Ok(self.servers.clone())
    }

    async fn select_best_server(
        &self,
        servers: &[Server],
    ) -> Result<SelectedServer, ProviderError> {
        self.enter(Stage::GetBestServer).await?;
        let server = servers
            .first()
            .cloned()
            .ok_or_else(|| ProviderError::new("NoMatchedServers", "no servers to choose from"))?;
        Ok(SelectedServer {
            server,
            latency_ms: self.ping_ms,
        })
    }

    async fn measure_download(&self, _server: &SelectedServer) -> Result<f64, ProviderError> {
        self.enter(Stage::DownloadTest).await?;
        Ok(self.download_bps)
    }

    async fn measure_upload(&self, _server: &SelectedServer) -> Result<f64, ProviderError> {
        self.enter(Stage::UploadTest).await?;
        Ok(self.upload_bps)
    }

    async fn last_ping(&self, server: &SelectedServer) -> Result<f64, ProviderError> {
        self.enter(Stage::Results).await?;
        Ok(server.latency_ms)
    }
}
