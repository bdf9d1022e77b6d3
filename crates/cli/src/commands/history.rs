//! `speedwatch stats` and `speedwatch records`: views over the local history.

use std::process;

use speedwatch_analyze::{select, summarize_at, MetricSummary, Query, Summary};
use speedwatch_storage::{format_timestamp, CsvRecordStore, Record};
use time::OffsetDateTime;

use crate::config::Config;
use crate::inspect::read_records;
use crate::{print_json, report_error, OutputFormat, EXIT_FAILURE};

fn load(config: &Config, output: OutputFormat, quiet: bool) -> Vec<Record> {
    let store = CsvRecordStore::new(&config.store.path);
    match read_records(&store) {
        Ok(records) => records,
        Err(e) => {
            report_error(&format!("cannot read history: {}", e), output, quiet);
            process::exit(EXIT_FAILURE);
        }
    }
}

pub(crate) fn cmd_stats(config: &Config, hours: Option<u32>, output: OutputFormat, quiet: bool) {
    let records = load(config, output, quiet);
    let summary = summarize_at(&records, hours, OffsetDateTime::now_utc());

    match output {
        OutputFormat::Json => print_json(&summary),
        OutputFormat::Text => {
            if !quiet {
                print_summary(&summary, hours);
            }
        }
    }
}

pub(crate) fn cmd_records(
    config: &Config,
    limit: Option<usize>,
    hours: Option<u32>,
    output: OutputFormat,
    quiet: bool,
) {
    let records = load(config, output, quiet);
    let selected = select(records, Query { limit, hours }, OffsetDateTime::now_utc());

    match output {
        OutputFormat::Json => print_json(&selected),
        OutputFormat::Text => {
            if !quiet {
                print_records(&selected);
            }
        }
    }
}

fn print_metric(label: &str, unit: &str, metric: Option<&MetricSummary>) {
    if let Some(m) = metric {
        println!(
            "{:<9} avg {:.2} {}  min {:.2}  max {:.2}",
            label, m.avg, unit, m.min, m.max
        );
    }
}

fn print_summary(summary: &Summary, hours: Option<u32>) {
    match hours {
        Some(h) => println!("Window:   last {} hours", h),
        None => println!("Window:   all history"),
    }
    println!(
        "Tests:    {} ({} successful, {} failed, {:.1}% success)",
        summary.total_tests, summary.successful_tests, summary.failed_tests, summary.success_rate
    );
    print_metric("Download:", "Mbps", summary.download.as_ref());
    print_metric("Upload:", "Mbps", summary.upload.as_ref());
    print_metric("Ping:", "ms", summary.ping.as_ref());
}

fn print_records(records: &[Record]) {
    if records.is_empty() {
        println!("No records.");
        return;
    }
    println!(
        "{:<25} {:<7} {:>9} {:>9} {:>8}  {}",
        "TIMESTAMP", "STATUS", "DOWN", "UP", "PING", "SERVER / ERROR"
    );
    for record in records {
        let timestamp =
            format_timestamp(record.timestamp).unwrap_or_else(|_| record.timestamp.to_string());
        if record.is_failure() {
            println!(
                "{:<25} {:<7} {:>9} {:>9} {:>8}  {}: {}",
                timestamp,
                "FAILED",
                "-",
                "-",
                "-",
                record.error_type.as_deref().unwrap_or("Unknown"),
                record.error_details.as_deref().unwrap_or("No details")
            );
        } else {
            println!(
                "{:<25} {:<7} {:>9.2} {:>9.2} {:>8.2}  {}",
                timestamp,
                "OK",
                record.download_mbps,
                record.upload_mbps,
                record.ping_ms,
                record.server_sponsor.as_deref().unwrap_or("")
            );
        }
    }
}
