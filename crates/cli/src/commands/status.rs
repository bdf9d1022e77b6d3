//! `speedwatch status`.

use std::process;

use crate::config::Config;
use crate::inspect::{DataSource, FileInfo, Sources, SystemStatus};
use crate::{print_json, report_error, OutputFormat, EXIT_FAILURE};

pub(crate) fn cmd_status(config: &Config, output: OutputFormat, quiet: bool) {
    let status = match Sources::from_config(config).status() {
        Ok(status) => status,
        Err(e) => {
            report_error(&format!("cannot read history: {}", e), output, quiet);
            process::exit(EXIT_FAILURE);
        }
    };

    match output {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Text => {
            if !quiet {
                print_status(&status);
            }
        }
    }
}

fn yes_no(value: bool) -> &'static str {
    if value {
        "yes"
    } else {
        "no"
    }
}

fn print_file(label: &str, file: &FileInfo) {
    if file.exists {
        println!(
            "{:<8} {} ({} bytes, modified {})",
            label,
            file.path.display(),
            file.size_bytes,
            file.modified.as_deref().unwrap_or("unknown")
        );
    } else {
        println!("{:<8} {} (missing)", label, file.path.display());
    }
}

fn print_status(status: &SystemStatus) {
    print_file("Local:", &status.local);
    match &status.mirror {
        Some(mirror) => print_file("Mirror:", mirror),
        None => println!("{:<8} replication disabled", "Mirror:"),
    }

    let source = match status.data_source {
        DataSource::Mirror => "mirror",
        DataSource::Local => "local",
        DataSource::None => "none",
    };
    println!("Source:  {}", source);
    println!(
        "Records: {} ({} successful, {} failed)",
        status.store.record_count, status.store.success_count, status.store.failure_count
    );

    if let Some(target) = &status.target {
        println!();
        println!("Target:  {}", target.dir.display());
        println!("  reachable: {}", yes_no(target.root_exists));
        println!("  mounted:   {}", yes_no(target.is_mounted));
        println!("  directory: {}", yes_no(target.dir_exists));
        println!("  writable:  {}", yes_no(target.is_writable));
        if let Some(free) = target.free_bytes {
            println!("  free:      {:.1} GiB", free as f64 / (1u64 << 30) as f64);
        }
        if let Some(count) = target.file_count {
            println!("  files:     {}", count);
        }
    }
}
