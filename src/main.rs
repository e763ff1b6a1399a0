//! WP Relay Audit CLI - Audit WordPress sites through public relay services

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

use wp_relay_audit::{
    AuditConfig, AuditProgress, Auditor, HistoryStore, RelayEndpoint, RelayTransport,
    export::write_export,
    history::HISTORY_FILE,
    output::{OutputConfig, OutputFormat, OutputSort, output_result},
    relay::{DEFAULT_PROBE_CONCURRENCY, DEFAULT_TIMEOUT_MS},
};

/// WordPress security audit - headers, exposed files, user enumeration and risk score
#[derive(Parser, Debug)]
#[command(name = "wp-relay-audit")]
#[command(version, about, long_about = None)]
struct Args {
    /// URL of the WordPress site to audit (https:// is added when missing)
    url: String,

    /// Output format
    #[arg(short = 'o', long = "output", default_value = "human", value_enum)]
    output_format: OutputFormatArg,

    /// Sort order for the header and endpoint tables
    #[arg(long = "sort", default_value = "risk", value_enum)]
    sort: OutputSortArg,

    /// Relay to use as NAME=PREFIX, repeatable; replaces the built-in relays
    #[arg(long = "relay", value_name = "NAME=PREFIX")]
    relays: Vec<String>,

    /// Per-attempt relay timeout in milliseconds
    #[arg(long = "timeout-ms", default_value_t = DEFAULT_TIMEOUT_MS)]
    timeout_ms: u64,

    /// Endpoint probes in flight at once
    #[arg(long = "concurrency", default_value_t = DEFAULT_PROBE_CONCURRENCY)]
    concurrency: usize,

    /// Also write the JSON export into this directory
    #[arg(long = "export", value_name = "DIR")]
    export: Option<PathBuf>,

    /// History file
    #[arg(long = "history", value_name = "FILE", default_value = HISTORY_FILE)]
    history: PathBuf,

    /// Do not record the audit in the history file
    #[arg(long = "no-history")]
    no_history: bool,

    /// Log relay and probe activity to stderr
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Do not print progress
    #[arg(short = 'q', long = "quiet")]
    quiet: bool,
}

/// Output format argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormatArg {
    Human,
    Json,
    None,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(arg: OutputFormatArg) -> Self {
        match arg {
            OutputFormatArg::Human => OutputFormat::Human,
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::None => OutputFormat::None,
        }
    }
}

/// Output sort argument
#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputSortArg {
    /// Worst findings first (default)
    Risk,
    /// Alphabetically by name
    Name,
    /// Accessible endpoints and failing headers first
    Status,
}

impl From<OutputSortArg> for OutputSort {
    fn from(arg: OutputSortArg) -> Self {
        match arg {
            OutputSortArg::Risk => OutputSort::Risk,
            OutputSortArg::Name => OutputSort::Name,
            OutputSortArg::Status => OutputSort::Status,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    // Print banner for human output
    if matches!(args.output_format, OutputFormatArg::Human) {
        print_banner();
    }

    match run_audit(&args).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run_audit(args: &Args) -> wp_relay_audit::Result<()> {
    let mut builder =
        RelayTransport::builder().timeout(Duration::from_millis(args.timeout_ms));
    if !args.relays.is_empty() {
        let endpoints = args
            .relays
            .iter()
            .map(|pair| RelayEndpoint::parse(pair))
            .collect::<wp_relay_audit::Result<Vec<_>>>()?;
        builder = builder.endpoints(endpoints);
    }

    let config = AuditConfig {
        probe_concurrency: args.concurrency,
        ..AuditConfig::default()
    };
    let auditor = Auditor::new(builder.build()?).with_config(config);

    let quiet = args.quiet;
    let result = auditor
        .audit_with_progress(&args.url, |progress| {
            if !quiet {
                print_progress(&progress);
            }
        })
        .await?;

    if !args.no_history {
        HistoryStore::new(args.history.clone()).record(&result);
    }

    let output_config = OutputConfig::new(args.output_format.into(), args.sort.into());
    let stdout = std::io::stdout();
    let mut writer = stdout.lock();
    output_result(&result, &output_config, &mut writer)?;

    if let Some(dir) = &args.export {
        let path = write_export(&result, dir)?;
        eprintln!("Exported to {}", path.display());
    }

    Ok(())
}

fn print_progress(progress: &AuditProgress) {
    eprintln!("[{:>3}%] {}", progress.percentage, progress.step);
}

fn print_banner() {
    const VERSION: &str = env!("CARGO_PKG_VERSION");
    println!("WP Relay Audit v{}", VERSION);
    println!("by Robert F. Ecker <robert@robdotec.com>");
    println!();
}
