use std::future::Future;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use speedwatch_storage::{round_to, Record, RecordStore, StoreError};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

use crate::provider::{MeasurementProvider, ProviderError, SelectedServer};
use crate::state::{RunState, Stage, StageFailure};

/// `error_type` of the record written when a run is interrupted.
pub const INTERRUPT_ERROR_TYPE: &str = "UserInterrupt";

const BITS_PER_MEGABIT: f64 = 1_000_000.0;

/// Errors that end a run without a committed record.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    #[error("could not store the run record: {0}")]
    Store(#[from] StoreError),
}

/// Outcome of one run: the record that was stored and how it came about.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub record: Record,
    pub failure: Option<StageFailure>,
    /// Every state the run passed through, starting with `Init`.
    pub states: Vec<RunState>,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.failure.is_none()
    }
}

struct Measurement {
    server: SelectedServer,
    download_bps: f64,
    upload_bps: f64,
    ping_ms: f64,
}

/// Drives one measurement attempt and persists its outcome.
///
/// Whatever happens inside the provider, a completed `run` appends exactly
/// one record. The record is built only after the last stage has finished, so
/// an attempt that is cancelled mid-way leaves the store untouched.
pub struct Orchestrator<P, S> {
    provider: P,
    store: S,
    max_error_details: usize,
    clock: fn() -> OffsetDateTime,
    current: AtomicU8,
}

impl<P, S> Orchestrator<P, S>
where
    P: MeasurementProvider,
    S: RecordStore,
{
    pub fn new(provider: P, store: S, max_error_details: usize) -> Self {
        Orchestrator {
            provider,
            store,
            max_error_details,
            clock: OffsetDateTime::now_utc,
            current: AtomicU8::new(Stage::GetConfig.index()),
        }
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: fn() -> OffsetDateTime) -> Self {
        self.clock = clock;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// The stage most recently entered by `run`.
    pub fn current_stage(&self) -> Stage {
        Stage::from_index(self.current.load(Ordering::SeqCst))
    }

    /// Run one attempt and append its record.
    ///
    /// Provider failures are not errors here: they produce a failure record
    /// and a report with `failure` set. Only a failed append is an error.
    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        info!("starting measurement");
        let mut states = vec![RunState::Init];
        let outcome = self.measure(&mut states).await;
        let timestamp = (self.clock)();

        let (record, failure) = match outcome {
            Ok(m) => {
                let download_mbps = round_to(m.download_bps / BITS_PER_MEGABIT, 2);
                let upload_mbps = round_to(m.upload_bps / BITS_PER_MEGABIT, 2);
                let ping_ms = round_to(m.ping_ms, 2);
                info!(
                    download_mbps,
                    upload_mbps,
                    ping_ms,
                    server = %m.server.server.sponsor,
                    "measurement complete"
                );
                let record = Record::success(
                    timestamp,
                    download_mbps,
                    upload_mbps,
                    ping_ms,
                    m.server.server.info(),
                );
                (record, None)
            }
            Err(failure) => {
                states.push(RunState::Failed);
                warn!(
                    stage = %failure.stage,
                    error_type = %failure.error_type,
                    details = %failure.details,
                    "measurement failed"
                );
                let record = Record::failure(
                    timestamp,
                    failure.error_type.clone(),
                    failure.stage.label(),
                    &failure.details,
                    self.max_error_details,
                );
                (record, Some(failure))
            }
        };

        self.store.append(&record)?;
        Ok(RunReport {
            record,
            failure,
            states,
        })
    }

    /// Append the failure record for a run cancelled by the user.
    pub fn record_interrupt(&self) -> Result<Record, OrchestratorError> {
        let stage = self.current_stage();
        let record = Record::failure(
            (self.clock)(),
            INTERRUPT_ERROR_TYPE,
            stage.label(),
            "measurement interrupted by user",
            self.max_error_details,
        );
        self.store.append(&record)?;
        warn!(stage = %stage, "measurement interrupted");
        Ok(record)
    }

    async fn measure(&self, states: &mut Vec<RunState>) -> Result<Measurement, StageFailure> {
        let config = self
            .stage(Stage::GetConfig, states, self.provider.fetch_config())
            .await?;
        debug!(ip = ?config.ip, isp = ?config.isp, "client configuration retrieved");

        let servers = self
            .stage(Stage::GetServers, states, async {
                let servers = self.provider.list_servers(&config).await?;
                if servers.is_empty() {
                    Err(ProviderError::new("NoMatchedServers", "server list is empty"))
                } else {
                    Ok(servers)
                }
            })
            .await?;
        info!(count = servers.len(), "server list retrieved");

        let server = self
            .stage(
                Stage::GetBestServer,
                states,
                self.provider.select_best_server(&servers),
            )
            .await?;
        info!(
            sponsor = %server.server.sponsor,
            name = %server.server.name,
            country = %server.server.country,
            latency_ms = server.latency_ms,
            "best server selected"
        );

        let download_bps = self
            .stage(Stage::DownloadTest, states, async {
                non_negative("download throughput", self.provider.measure_download(&server).await?)
            })
            .await?;

        let upload_bps = self
            .stage(Stage::UploadTest, states, async {
                non_negative("upload throughput", self.provider.measure_upload(&server).await?)
            })
            .await?;

        let ping_ms = self
            .stage(Stage::Results, states, async {
                non_negative("ping", self.provider.last_ping(&server).await?)
            })
            .await?;

        Ok(Measurement {
            server,
            download_bps,
            upload_bps,
            ping_ms,
        })
    }

    async fn stage<T, F>(
        &self,
        stage: Stage,
        states: &mut Vec<RunState>,
        op: F,
    ) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, ProviderError>>,
    {
        self.current.store(stage.index(), Ordering::SeqCst);
        debug!(stage = %stage, "stage started");
        let value = op.await.map_err(|e| StageFailure::new(stage, e))?;
        states.push(stage.completes_into());
        Ok(value)
    }
}

fn non_negative(what: &str, value: f64) -> Result<f64, ProviderError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(ProviderError::new(
            "InvalidMeasurement",
            format!("{what} is not a non-negative number: {value}"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Server;
    use crate::scripted::ScriptedProvider;
    use speedwatch_storage::{MemoryRecordStore, Records, Status};
    use std::path::PathBuf;
    use std::time::Duration;
    use time::macros::datetime;

    fn fixed_clock() -> OffsetDateTime {
        datetime!(2024-06-01 12:00 UTC)
    }

    fn orchestrator(provider: ScriptedProvider) -> Orchestrator<ScriptedProvider, MemoryRecordStore> {
        Orchestrator::new(provider, MemoryRecordStore::new(), 500).with_clock(fixed_clock)
    }

    #[tokio::test]
    async fn successful_run_records_rounded_values() {
        let orch = orchestrator(ScriptedProvider::new(93_456_789.0, 12_345_678.0, 14.567));
        let report = orch.run().await.unwrap();

        assert!(report.succeeded());
        let record = &report.record;
        assert_eq!(record.status, Status::Success);
        assert_eq!(record.download_mbps, 93.46);
        assert_eq!(record.upload_mbps, 12.35);
        assert_eq!(record.ping_ms, 14.57);
        assert_eq!(record.server_sponsor.as_deref(), Some("Loopback Networks"));
        assert_eq!(record.timestamp, fixed_clock());
        assert!(record.is_consistent());

        assert_eq!(
            report.states,
            vec![
                RunState::Init,
                RunState::ConfigFetched,
                RunState::ServersListed,
                RunState::ServerSelected,
                RunState::DownloadDone,
                RunState::UploadDone,
                RunState::Complete,
            ]
        );
        assert_eq!(orch.store().snapshot(), vec![report.record.clone()]);
        assert_eq!(orch.provider().calls(), Stage::ALL.to_vec());
    }

    #[tokio::test]
    async fn failure_at_each_stage_writes_one_failure_record() {
        for (i, stage) in Stage::ALL.into_iter().enumerate() {
            let provider = ScriptedProvider::new(50e6, 10e6, 9.0)
                .failing_at(stage, ProviderError::new("SpeedtestHTTPError", "HTTP 503"));
            let orch = orchestrator(provider);
            let report = orch.run().await.unwrap();

            let failure = report.failure.as_ref().unwrap();
            assert_eq!(failure.stage, stage);
            assert_eq!(report.states.len(), i + 2, "stage {stage}");
            assert_eq!(report.states.last(), Some(&RunState::Failed));

            let stored = orch.store().snapshot();
            assert_eq!(stored.len(), 1);
            let record = &stored[0];
            assert_eq!(record.status, Status::Failed);
            assert!(record.is_consistent());
            assert_eq!(record.error_type.as_deref(), Some("SpeedtestHTTPError"));
            assert_eq!(
                record.error_details.as_deref(),
                Some(format!("{}: HTTP 503", stage.label()).as_str())
            );
            // No stage after the failing one is attempted.
            assert_eq!(orch.provider().calls().last(), Some(&stage));
            assert_eq!(orch.provider().calls().len(), i + 1);
        }
    }

    #[tokio::test]
    async fn untyped_provider_error_uses_stage_error_type() {
        let provider = ScriptedProvider::new(1e6, 1e6, 1.0)
            .failing_at(Stage::UploadTest, ProviderError::untyped("broken pipe"));
        let report = orchestrator(provider).run().await.unwrap();
        assert_eq!(report.record.error_type.as_deref(), Some("UploadTestError"));
        assert_eq!(
            report.record.error_details.as_deref(),
            Some("upload_test: broken pipe")
        );
    }

    #[tokio::test]
    async fn long_details_are_truncated_with_stage_prefix() {
        let long = "x".repeat(1000);
        let provider = ScriptedProvider::new(1e6, 1e6, 1.0)
            .failing_at(Stage::DownloadTest, ProviderError::new("Timeout", long));
        let report = orchestrator(provider).run().await.unwrap();
        let details = report.record.error_details.unwrap();
        assert_eq!(details.chars().count(), 500);
        assert!(details.starts_with("download_test: xxx"));
    }

    #[tokio::test]
    async fn empty_server_list_fails_at_get_servers() {
        let provider = ScriptedProvider::new(1e6, 1e6, 1.0).with_servers(Vec::<Server>::new());
        let orch = orchestrator(provider);
        let report = orch.run().await.unwrap();
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, Stage::GetServers);
        assert_eq!(failure.error_type, "NoMatchedServers");
        assert_eq!(orch.provider().calls(), vec![Stage::GetConfig, Stage::GetServers]);
    }

    #[tokio::test]
    async fn negative_throughput_is_rejected() {
        let provider = ScriptedProvider::new(-5.0, 1e6, 1.0);
        let report = orchestrator(provider).run().await.unwrap();
        let failure = report.failure.unwrap();
        assert_eq!(failure.stage, Stage::DownloadTest);
        assert_eq!(failure.error_type, "InvalidMeasurement");
        assert_eq!(report.record.download_mbps, 0.0);
    }

    struct BrokenStore;

    impl RecordStore for BrokenStore {
        fn append(&self, _record: &Record) -> Result<(), StoreError> {
            Err(StoreError::Write {
                path: PathBuf::from("/nonexistent/speed_history.csv"),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
            })
        }

        fn read_all(&self) -> Result<Records<'_>, StoreError> {
            Ok(Box::new(std::iter::empty()))
        }

        fn size_bytes(&self) -> Result<u64, StoreError> {
            Ok(0)
        }
    }

    #[tokio::test]
    async fn store_failure_is_fatal() {
        let orch = Orchestrator::new(ScriptedProvider::new(1e6, 1e6, 1.0), BrokenStore, 500);
        let err = orch.run().await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Store(ref e) if e.is_write()));
    }

    #[tokio::test]
    async fn interrupted_run_commits_only_the_interrupt_record() {
        let provider = ScriptedProvider::new(1e6, 1e6, 1.0).stalling_at(Stage::DownloadTest);
        let orch = orchestrator(provider);

        let timed_out = tokio::time::timeout(Duration::from_millis(50), orch.run()).await;
        assert!(timed_out.is_err());
        assert!(orch.store().is_empty());
        assert_eq!(orch.current_stage(), Stage::DownloadTest);

        let record = orch.record_interrupt().unwrap();
        assert_eq!(record.error_type.as_deref(), Some(INTERRUPT_ERROR_TYPE));
        assert!(record
            .error_details
            .as_deref()
            .unwrap()
            .starts_with("download_test: "));
        assert_eq!(orch.store().len(), 1);
    }
}
