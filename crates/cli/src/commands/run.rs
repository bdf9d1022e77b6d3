//! `speedwatch run`: one measurement, stored and mirrored.

use std::process;

use speedwatch_measure::{HttpProvider, Orchestrator, RunReport};
use speedwatch_storage::{CsvRecordStore, Record, RecordStore};
use time::OffsetDateTime;
use tracing::{info, warn};

use super::{replication_manager, runtime};
use crate::config::Config;
use crate::{print_json, report_error, OutputFormat, EXIT_FAILURE, EXIT_INTERRUPTED};

/// `error_type` of the record written when the post-run sync fails.
const REPLICATION_ERROR_TYPE: &str = "ReplicationFailed";
const REPLICATION_STAGE: &str = "replication";

pub(crate) fn cmd_run(config: &Config, output: OutputFormat, quiet: bool) {
    let rt = runtime(output, quiet);
    let store = CsvRecordStore::new(&config.store.path);
    let provider = HttpProvider::new(config.provider.clone());
    let orchestrator = Orchestrator::new(provider, store, config.store.max_error_details);

    let outcome = rt.block_on(async {
        tokio::select! {
            result = orchestrator.run() => Some(result),
            _ = interrupted() => None,
        }
    });

    let report = match outcome {
        Some(Ok(report)) => report,
        Some(Err(e)) => {
            report_error(&format!("speedwatch: {}", e), output, quiet);
            process::exit(EXIT_FAILURE);
        }
        None => {
            let stage = orchestrator.current_stage();
            if let Err(e) = orchestrator.record_interrupt() {
                report_error(&format!("speedwatch: {}", e), output, quiet);
            }
            report_error(
                &format!("speedwatch: interrupted during {}", stage),
                output,
                quiet,
            );
            // Blocking provider calls may still be in flight.
            rt.shutdown_background();
            process::exit(EXIT_INTERRUPTED);
        }
    };

    print_report(&report, output, quiet);

    if let Some(failure) = &report.failure {
        report_error(&format!("speedwatch: {}", failure), output, quiet);
        process::exit(EXIT_FAILURE);
    }

    if config.replication.enabled {
        replicate_after_run(config, orchestrator.store());
    }
}

/// Resolves on Ctrl-C. If the handler cannot be installed it never resolves,
/// so the run is not mistaken for an interrupted one.
async fn interrupted() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Mirror the store after a successful run. Failure never changes the exit
/// status; it is logged and, if configured, stored as its own record.
fn replicate_after_run<S: RecordStore>(config: &Config, store: &S) {
    let manager = replication_manager(config);
    match manager.sync() {
        Ok(report) => info!(
            to = %report.primary.to.display(),
            method = ?report.primary.method,
            bytes = report.primary.bytes,
            "history mirrored"
        ),
        Err(e) => {
            warn!(error = %e, "replication failed");
            if !config.replication.record_failures {
                return;
            }
            let record = Record::failure(
                OffsetDateTime::now_utc(),
                REPLICATION_ERROR_TYPE,
                REPLICATION_STAGE,
                &e.to_string(),
                config.store.max_error_details,
            );
            if let Err(e) = store.append(&record) {
                warn!(error = %e, "could not record the replication failure");
            }
        }
    }
}

fn print_report(report: &RunReport, output: OutputFormat, quiet: bool) {
    match output {
        OutputFormat::Json => print_json(&report.record),
        OutputFormat::Text => {
            if !quiet && report.succeeded() {
                print_record(&report.record);
            }
        }
    }
}

fn print_record(record: &Record) {
    println!("Download: {:.2} Mbps", record.download_mbps);
    println!("Upload:   {:.2} Mbps", record.upload_mbps);
    println!("Ping:     {:.2} ms", record.ping_ms);
    if let Some(sponsor) = &record.server_sponsor {
        let location = [record.server_name.as_deref(), record.server_country.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(", ");
        if location.is_empty() {
            println!("Server:   {}", sponsor);
        } else {
            println!("Server:   {} ({})", sponsor, location);
        }
    }
}
