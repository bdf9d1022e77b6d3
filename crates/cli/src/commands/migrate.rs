//! `speedwatch migrate`: rewrite the history in the current column layout.

use std::process;

use speedwatch_storage::{CsvRecordStore, UpgradeReport};

use crate::config::Config;
use crate::{print_json, report_error, OutputFormat, EXIT_FAILURE};

pub(crate) fn cmd_migrate(config: &Config, backup: bool, output: OutputFormat, quiet: bool) {
    let store = CsvRecordStore::new(&config.store.path);
    if !store.path().is_file() {
        report_error(
            &format!("no history at '{}'", store.path().display()),
            output,
            quiet,
        );
        process::exit(EXIT_FAILURE);
    }

    let report = match store.upgrade(backup) {
        Ok(report) => report,
        Err(e) => {
            report_error(&format!("migration failed: {}", e), output, quiet);
            process::exit(EXIT_FAILURE);
        }
    };

    match output {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Text => {
            if !quiet {
                print_upgrade(&store, &report);
            }
        }
    }
}

fn print_upgrade(store: &CsvRecordStore, report: &UpgradeReport) {
    println!("Migrated {}", store.path().display());
    if report.was_legacy {
        println!("  layout:    legacy -> current");
    }
    println!("  processed: {}", report.rows + report.dropped);
    println!("  updated:   {}", report.updated);
    if report.dropped > 0 {
        println!("  dropped:   {} unreadable", report.dropped);
    }
    if let Some(backup) = &report.backup {
        println!("  backup:    {}", backup.display());
    }
}
