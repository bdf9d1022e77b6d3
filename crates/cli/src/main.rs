mod commands;
mod config;
mod inspect;
mod logging;
mod serve;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand, ValueEnum};

/// Exit status for any failed invocation.
pub(crate) const EXIT_FAILURE: i32 = 1;
/// Exit status when the user interrupts a measurement.
pub(crate) const EXIT_INTERRUPTED: i32 = 130;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Internet speed monitor with a mirrored CSV history.
#[derive(Parser)]
#[command(
    name = "speedwatch",
    version,
    about = "Internet speed monitor with a mirrored CSV history"
)]
struct Cli {
    /// Configuration file (TOML); defaults to $SPEEDWATCH_CONFIG
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one measurement, append it to the history and mirror the result
    Run,
    /// Mirror the history and operational log without measuring
    Sync,
    /// Show the state of the local history and the replication target
    Status,
    /// Summary statistics over the history
    Stats {
        /// Only include the last N hours
        #[arg(long)]
        hours: Option<u32>,
    },
    /// List stored records, oldest first
    Records {
        /// Only show the last N records
        #[arg(long)]
        limit: Option<usize>,
        /// Only include the last N hours
        #[arg(long)]
        hours: Option<u32>,
    },
    /// Rewrite the history in the current column layout
    Migrate {
        /// Do not keep a backup copy of the original file
        #[arg(long)]
        no_backup: bool,
    },
    /// Start the HTTP query API
    Serve {
        /// Port to listen on (defaults to the configured port)
        #[arg(long)]
        port: Option<u16>,
        /// Path to TLS certificate PEM file (requires the `tls` feature)
        #[arg(long)]
        tls_cert: Option<PathBuf>,
        /// Path to TLS private key PEM file (requires the `tls` feature)
        #[arg(long)]
        tls_key: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    let config = match config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            report_error(
                &format!("configuration error: {}", e),
                cli.output,
                cli.quiet,
            );
            process::exit(EXIT_FAILURE);
        }
    };

    // Only commands that change state write to the operational log.
    let log_file = match cli.command {
        Commands::Run | Commands::Sync | Commands::Migrate { .. } => Some(config.log.path.as_path()),
        _ => None,
    };
    if let Err(e) = logging::init(&config.log, cli.quiet, log_file) {
        report_error(&e, cli.output, cli.quiet);
        process::exit(EXIT_FAILURE);
    }

    match cli.command {
        Commands::Run => commands::run::cmd_run(&config, cli.output, cli.quiet),
        Commands::Sync => commands::sync::cmd_sync(&config, cli.output, cli.quiet),
        Commands::Status => commands::status::cmd_status(&config, cli.output, cli.quiet),
        Commands::Stats { hours } => {
            commands::history::cmd_stats(&config, hours, cli.output, cli.quiet)
        }
        Commands::Records { limit, hours } => {
            commands::history::cmd_records(&config, limit, hours, cli.output, cli.quiet)
        }
        Commands::Migrate { no_backup } => {
            commands::migrate::cmd_migrate(&config, !no_backup, cli.output, cli.quiet)
        }
        Commands::Serve {
            port,
            tls_cert,
            tls_key,
        } => {
            // Validate TLS flags: both must be provided or neither
            if tls_cert.is_some() != tls_key.is_some() {
                report_error(
                    "--tls-cert and --tls-key must both be provided",
                    cli.output,
                    cli.quiet,
                );
                process::exit(EXIT_FAILURE);
            }
            let port = port.unwrap_or(config.serve.port);
            let rt = commands::runtime(cli.output, cli.quiet);
            let sources = inspect::Sources::from_config(&config);
            if let Err(e) = rt.block_on(serve::start_server(port, sources, tls_cert, tls_key)) {
                report_error(&format!("server error: {}", e), cli.output, cli.quiet);
                process::exit(EXIT_FAILURE);
            }
        }
    }
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("{}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) {
    let json = serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization: {}\"}}", e));
    println!("{}", json);
}
