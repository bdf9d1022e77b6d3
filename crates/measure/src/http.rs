//! HTTP measurement provider for speedtest.net-style servers.
//!
//! Uses `ureq` (sync) wrapped in `tokio::task::spawn_blocking` to avoid
//! blocking the async runtime. The flow is:
//!
//! - client configuration from `config_url` (JSON, or the legacy XML document
//!   with a `<client ip=".." isp=".."/>` element)
//! - server list from `servers_url` (JSON array)
//! - latency probes of the closest candidates (`latency.txt`)
//! - timed downloads of `random{N}x{N}.jpg` payloads
//! - a timed upload of a random payload to the server's upload URL

use std::io;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::provider::{ClientConfig, MeasurementProvider, ProviderError, SelectedServer, Server};

/// Settings for [`HttpProvider`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpProviderConfig {
    pub config_url: String,
    pub servers_url: String,
    /// Edge lengths of the download images, fetched in order.
    pub download_sizes: Vec<u32>,
    pub upload_bytes: usize,
    /// Latency probes per candidate server.
    pub latency_samples: u32,
    /// Per-request timeout; 0 disables it.
    pub timeout_secs: u64,
    /// How many of the closest servers are probed for latency.
    pub max_candidates: usize,
}

impl Default for HttpProviderConfig {
    fn default() -> Self {
        HttpProviderConfig {
            config_url: "https://www.speedtest.net/speedtest-config.php".to_string(),
            servers_url:
                "https://www.speedtest.net/api/js/servers?engine=js&limit=10&https_functional=true"
                    .to_string(),
            download_sizes: vec![350, 750, 1500, 2000],
            upload_bytes: 2_000_000,
            latency_samples: 3,
            timeout_secs: 10,
            max_candidates: 5,
        }
    }
}

/// Provider that talks to real measurement servers over HTTP.
pub struct HttpProvider {
    config: HttpProviderConfig,
    agent: ureq::Agent,
}

impl HttpProvider {
    pub fn new(config: HttpProviderConfig) -> Self {
        let timeout = (config.timeout_secs > 0).then(|| Duration::from_secs(config.timeout_secs));
        let agent_config = ureq::Agent::config_builder()
            .timeout_global(timeout)
            .build();
        HttpProvider {
            agent: ureq::Agent::new_with_config(agent_config),
            config,
        }
    }

    pub fn config(&self) -> &HttpProviderConfig {
        &self.config
    }

    /// Run `f` on the blocking pool with a clone of the agent.
    async fn blocking<T, F>(&self, kind: &'static str, f: F) -> Result<T, ProviderError>
    where
        F: FnOnce(ureq::Agent) -> Result<T, ProviderError> + Send + 'static,
        T: Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || f(agent))
            .await
            .map_err(|e| ProviderError::new(kind, format!("task join error: {e}")))?
    }
}

/// Map a transport error to a provider error, using `fallback` for anything
/// that is neither an HTTP status nor a timeout.
fn classify(err: ureq::Error, fallback: &str) -> ProviderError {
    match err {
        ureq::Error::StatusCode(code) => {
            ProviderError::new("SpeedtestHTTPError", format!("HTTP status {code}"))
        }
        ureq::Error::Timeout(_) => ProviderError::new("Timeout", err.to_string()),
        ureq::Error::Io(ref e) if e.kind() == io::ErrorKind::TimedOut => {
            ProviderError::new("Timeout", err.to_string())
        }
        other => ProviderError::new(fallback, other.to_string()),
    }
}

fn elapsed_secs(start: Instant) -> f64 {
    start.elapsed().as_secs_f64().max(1e-6)
}

fn cache_buster() -> u32 {
    rand::random()
}

// ──────────────────────────────────────────────
// Response parsing
// ──────────────────────────────────────────────

/// Client details from either a JSON or the legacy XML configuration.
fn parse_client_config(body: &str) -> Result<ClientConfig, String> {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let client = value.get("client").unwrap_or(&value);
        let field = |name: &str| client.get(name).and_then(|v| v.as_str()).map(str::to_string);
        return Ok(ClientConfig {
            ip: field("ip"),
            isp: field("isp"),
        });
    }
    let start = body
        .find("<client ")
        .ok_or_else(|| "configuration has no client section".to_string())?;
    let rest = &body[start..];
    let element = &rest[..rest.find('>').unwrap_or(rest.len())];
    Ok(ClientConfig {
        ip: xml_attr(element, "ip"),
        isp: xml_attr(element, "isp"),
    })
}

fn xml_attr(element: &str, name: &str) -> Option<String> {
    let needle = format!(" {name}=\"");
    let start = element.find(&needle)? + needle.len();
    let len = element[start..].find('"')?;
    Some(element[start..start + len].to_string())
}

/// One entry of the server list as served.
#[derive(Debug, Deserialize)]
struct ServerEntry {
    #[serde(default)]
    id: serde_json::Value,
    url: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    country: String,
    #[serde(default)]
    sponsor: String,
    #[serde(default)]
    distance: Option<serde_json::Value>,
}

impl From<ServerEntry> for Server {
    fn from(entry: ServerEntry) -> Self {
        let id = match entry.id {
            serde_json::Value::String(s) => s,
            serde_json::Value::Null => String::new(),
            other => other.to_string(),
        };
        let distance_km = entry.distance.and_then(|d| match d {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.parse().ok(),
            _ => None,
        });
        Server {
            id,
            name: entry.name,
            country: entry.country,
            sponsor: entry.sponsor,
            url: entry.url,
            distance_km,
        }
    }
}

/// The closest `max` servers, nearest first; unknown distances go last.
fn closest(servers: &[Server], max: usize) -> Vec<Server> {
    let mut sorted = servers.to_vec();
    sorted.sort_by(|a, b| {
        let da = a.distance_km.unwrap_or(f64::INFINITY);
        let db = b.distance_km.unwrap_or(f64::INFINITY);
        da.total_cmp(&db)
    });
    sorted.truncate(max.max(1));
    sorted
}

/// Average latency of `samples` probes in milliseconds.
fn probe_latency(agent: &ureq::Agent, server: &Server, samples: u32) -> Result<f64, ureq::Error> {
    let samples = samples.max(1);
    let mut total = 0.0;
    for _ in 0..samples {
        let url = format!("{}/latency.txt?x={}", server.base_url(), cache_buster());
        let start = Instant::now();
        agent.get(&url).call()?.into_body().read_to_string()?;
        total += start.elapsed().as_secs_f64() * 1000.0;
    }
    Ok(total / samples as f64)
}

// ──────────────────────────────────────────────
// MeasurementProvider impl
// ──────────────────────────────────────────────

#[async_trait]
impl MeasurementProvider for HttpProvider {
    async fn fetch_config(&self) -> Result<ClientConfig, ProviderError> {
        const KIND: &str = "ConfigRetrievalError";
        let url = self.config.config_url.clone();
        self.blocking(KIND, move |agent| {
            let body = agent
                .get(&url)
                .call()
                .and_then(|r| r.into_body().read_to_string())
                .map_err(|e| classify(e, KIND))?;
            parse_client_config(&body).map_err(|m| ProviderError::new(KIND, m))
        })
        .await
    }

    async fn list_servers(&self, _config: &ClientConfig) -> Result<Vec<Server>, ProviderError> {
        const KIND: &str = "ServersRetrievalError";
        let url = self.config.servers_url.clone();
        self.blocking(KIND, move |agent| {
            let entries: Vec<ServerEntry> = agent
                .get(&url)
                .call()
                .and_then(|r| r.into_body().read_json())
                .map_err(|e| classify(e, KIND))?;
            Ok(entries.into_iter().map(Server::from).collect())
        })
        .await
    }

    async fn select_best_server(
        &self,
        servers: &[Server],
    ) -> Result<SelectedServer, ProviderError> {
        const KIND: &str = "SpeedtestBestServerFailure";
        let candidates = closest(servers, self.config.max_candidates);
        let samples = self.config.latency_samples;
        self.blocking(KIND, move |agent| {
            let mut best: Option<SelectedServer> = None;
            for server in candidates {
                match probe_latency(&agent, &server, samples) {
                    Ok(latency_ms) => {
                        debug!(server = %server.sponsor, latency_ms, "latency probe");
                        if best.as_ref().map_or(true, |b| latency_ms < b.latency_ms) {
                            best = Some(SelectedServer { server, latency_ms });
                        }
                    }
                    Err(e) => warn!(server = %server.sponsor, error = %e, "latency probe failed"),
                }
            }
            best.ok_or_else(|| ProviderError::new(KIND, "no candidate server answered latency probes"))
        })
        .await
    }

    async fn measure_download(&self, server: &SelectedServer) -> Result<f64, ProviderError> {
        const KIND: &str = "ConnectionError";
        let base = server.server.base_url().to_string();
        let sizes = self.config.download_sizes.clone();
        self.blocking(KIND, move |agent| {
            let start = Instant::now();
            let mut bytes = 0u64;
            for size in sizes {
                let url = format!("{base}/random{size}x{size}.jpg?x={}", cache_buster());
                let response = agent.get(&url).call().map_err(|e| classify(e, KIND))?;
                let mut reader = response.into_body().into_reader();
                bytes += io::copy(&mut reader, &mut io::sink())
                    .map_err(|e| ProviderError::new(KIND, format!("download interrupted: {e}")))?;
            }
            if bytes == 0 {
                return Err(ProviderError::new(KIND, "server returned no download data"));
            }
            Ok(bytes as f64 * 8.0 / elapsed_secs(start))
        })
        .await
    }

    async fn measure_upload(&self, server: &SelectedServer) -> Result<f64, ProviderError> {
        const KIND: &str = "ConnectionError";
        let url = server.server.url.clone();
        let mut payload = vec![0u8; self.config.upload_bytes.max(1)];
        rand::thread_rng().fill_bytes(&mut payload);
        self.blocking(KIND, move |agent| {
            let start = Instant::now();
            agent
                .post(&url)
                .header("Content-Type", "application/octet-stream")
                .send(payload.as_slice())
                .and_then(|r| r.into_body().read_to_string())
                .map_err(|e| classify(e, KIND))?;
            Ok(payload.len() as f64 * 8.0 / elapsed_secs(start))
        })
        .await
    }

    async fn last_ping(&self, server: &SelectedServer) -> Result<f64, ProviderError> {
        Ok(server.latency_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(id: &str, distance: Option<f64>) -> Server {
        Server {
            id: id.to_string(),
            name: format!("city-{id}"),
            country: "Norway".to_string(),
            sponsor: format!("isp-{id}"),
            url: format!("http://{id}.example.net/speedtest/upload.php"),
            distance_km: distance,
        }
    }

    #[test]
    fn parses_json_client_config() {
        let config =
            parse_client_config(r#"{"client":{"ip":"198.51.100.7","isp":"Fiber AS"}}"#).unwrap();
        assert_eq!(config.ip.as_deref(), Some("198.51.100.7"));
        assert_eq!(config.isp.as_deref(), Some("Fiber AS"));
    }

    #[test]
    fn parses_xml_client_config() {
        let body = r#"<?xml version="1.0" encoding="UTF-8"?>
<settings>
<client ip="203.0.113.9" lat="59.91" lon="10.75" isp="Telenor Norge" ispdlavg="0" />
<server-config threadcount="4" />
</settings>"#;
        let config = parse_client_config(body).unwrap();
        assert_eq!(config.ip.as_deref(), Some("203.0.113.9"));
        assert_eq!(config.isp.as_deref(), Some("Telenor Norge"));
    }

    #[test]
    fn config_without_client_is_an_error() {
        assert!(parse_client_config("<html>blocked</html>").is_err());
    }

    #[test]
    fn server_entries_accept_string_and_number_fields() {
        let entries: Vec<ServerEntry> = serde_json::from_str(
            r#"[
                {"id":"1234","url":"http://a.example/speedtest/upload.php","name":"Oslo",
                 "country":"Norway","sponsor":"Telia","distance":12},
                {"id":99,"url":"http://b.example/upload.php","name":"Bergen",
                 "country":"Norway","sponsor":"Altibox","distance":"301.5","extra":true}
            ]"#,
        )
        .unwrap();
        let servers: Vec<Server> = entries.into_iter().map(Server::from).collect();
        assert_eq!(servers[0].id, "1234");
        assert_eq!(servers[0].distance_km, Some(12.0));
        assert_eq!(servers[1].id, "99");
        assert_eq!(servers[1].distance_km, Some(301.5));
    }

    #[test]
    fn closest_orders_by_distance_and_truncates() {
        let servers = vec![
            server("far", Some(900.0)),
            server("unknown", None),
            server("near", Some(4.0)),
            server("mid", Some(120.0)),
        ];
        let ids: Vec<String> = closest(&servers, 3).into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["near", "mid", "far"]);
    }

    #[test]
    fn status_codes_map_to_http_error() {
        let err = classify(ureq::Error::StatusCode(503), "ConfigRetrievalError");
        assert_eq!(err.kind, "SpeedtestHTTPError");
        assert_eq!(err.message, "HTTP status 503");
    }

    #[test]
    fn default_config_is_usable() {
        let config = HttpProviderConfig::default();
        assert!(config.timeout_secs > 0);
        assert!(!config.download_sizes.is_empty());
        let provider = HttpProvider::new(config.clone());
        assert_eq!(provider.config(), &config);
    }

    #[tokio::test]
    async fn unreachable_config_endpoint_is_a_config_error() {
        let provider = HttpProvider::new(HttpProviderConfig {
            config_url: "http://127.0.0.1:1/speedtest-config.php".to_string(),
            timeout_secs: 5,
            ..HttpProviderConfig::default()
        });
        let err = provider.fetch_config().await.unwrap_err();
        assert_eq!(err.kind, "ConfigRetrievalError");
    }
}
