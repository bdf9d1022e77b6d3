//! `speedwatch sync`: mirror without measuring.

use std::process;

use speedwatch_replicate::{Access, CopyMethod, SecondaryOutcome, SyncReport};

use super::replication_manager;
use crate::config::Config;
use crate::{print_json, report_error, OutputFormat, EXIT_FAILURE};

pub(crate) fn cmd_sync(config: &Config, output: OutputFormat, quiet: bool) {
    let manager = replication_manager(config);
    match manager.sync() {
        Ok(report) => match output {
            OutputFormat::Json => print_json(&report),
            OutputFormat::Text => {
                if !quiet {
                    print_sync_report(&report);
                }
            }
        },
        Err(e) => {
            report_error(&format!("sync failed: {}", e), output, quiet);
            process::exit(EXIT_FAILURE);
        }
    }
}

fn method_label(method: CopyMethod) -> &'static str {
    match method {
        CopyMethod::Direct => "direct",
        CopyMethod::Elevated => "elevated",
    }
}

fn print_sync_report(report: &SyncReport) {
    if report.access == Access::ElevatedRequired {
        println!("Target refuses direct writes; used the elevated copy path.");
    }
    println!(
        "History: {} -> {} ({} bytes, {})",
        report.primary.from.display(),
        report.primary.to.display(),
        report.primary.bytes,
        method_label(report.primary.method)
    );
    match &report.secondary {
        SecondaryOutcome::Copied(copy) => println!(
            "Log:     {} -> {} ({} bytes, {})",
            copy.from.display(),
            copy.to.display(),
            copy.bytes,
            method_label(copy.method)
        ),
        SecondaryOutcome::Skipped => println!("Log:     skipped"),
        SecondaryOutcome::Failed { reason } => println!("Log:     not copied ({})", reason),
    }
}
