//! mssql-reconcile CLI - tablediff-driven data reconciliation for SQL Server.

use clap::Parser;
use mssql_reconcile::{Config, ReconcileError, ReconcileResult, Reconciler};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::{info, Level};
use tracing_subscriber::fmt::format::FmtSpan;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

#[derive(Parser)]
#[command(name = "mssql-reconcile")]
#[command(about = "Reconcile data between two SQL Server databases using tablediff")]
#[command(version)]
#[command(after_help = "Parameters: -server <HOST> -sourcedatabase <DB> -destinationdatabase <DB>\n\
Names are case-insensitive and accept -, -- or / prefixes. Put `--` before them \
if a name could be mistaken for one of the options above.")]
struct Cli {
    /// Path to YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error
    #[arg(long, default_value = "info")]
    verbosity: String,

    /// Where to write the aggregate change script
    #[arg(long)]
    script: Option<PathBuf>,

    /// Root directory for exported values of columns tablediff skips
    #[arg(long)]
    export_dir: Option<PathBuf>,

    /// Number of concurrent tablediff processes
    #[arg(long)]
    workers: Option<usize>,

    /// Per-table tablediff timeout in seconds
    #[arg(long)]
    diff_timeout: Option<u64>,

    /// Path to tablediff.exe (discovered under the SQL Server install roots otherwise)
    #[arg(long)]
    tablediff: Option<PathBuf>,

    /// Additional table to skip, in any schema (repeatable)
    #[arg(long, value_name = "TABLE")]
    exclude: Vec<String>,

    /// Key/value run parameters, merged over the configuration file
    #[arg(trailing_var_arg = true, allow_hyphen_values = true, value_name = "PARAMS")]
    params: Vec<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<(), ReconcileError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(ReconcileError::Config)?;

    let config = build_config(&cli)?;
    info!(
        "Reconciling [{}] -> [{}] on {}",
        config.params.source_database, config.params.destination_database, config.params.server
    );

    // Setup signal handling for graceful shutdown (SIGINT and SIGTERM)
    let cancel_token = setup_signal_handler()?;

    let script_path = config.export.script_path.clone();
    let reconciler = Reconciler::new(config).await?;
    let result = reconciler.run(cancel_token).await?;

    // Written only after every phase succeeded.
    tokio::fs::write(&script_path, result.script.as_bytes()).await?;
    info!("Wrote change script to {}", script_path.display());

    if cli.output_json {
        println!("{}", result.to_json()?);
    } else {
        print_summary(&result, &script_path);
    }

    Ok(())
}

/// Load the YAML file if given, then apply flag overrides and key/value parameters.
fn build_config(cli: &Cli) -> Result<Config, ReconcileError> {
    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => Config::default(),
    };

    // Parameters are mandatory unless a configuration file supplies them.
    if cli.config.is_none() || !cli.params.is_empty() {
        config.params.apply_args(&cli.params)?;
    }

    if let Some(path) = &cli.script {
        config.export.script_path = path.clone();
    }
    if let Some(dir) = &cli.export_dir {
        config.export.export_dir = dir.clone();
    }
    if let Some(w) = cli.workers {
        config.diff.workers = Some(w);
    }
    if let Some(seconds) = cli.diff_timeout {
        config.diff.timeout_seconds = seconds;
    }
    if let Some(path) = &cli.tablediff {
        config.diff.tablediff_path = Some(path.clone());
    }
    for table in &cli.exclude {
        if !config
            .diff
            .excluded_tables
            .iter()
            .any(|t| t.eq_ignore_ascii_case(table))
        {
            config.diff.excluded_tables.push(table.clone());
        }
    }

    config.validate()?;
    Ok(config.with_auto_tuning())
}

fn print_summary(result: &ReconcileResult, script_path: &std::path::Path) {
    println!("\nReconciliation completed!");
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!(
        "  Tables: {} ({} with changes)",
        result.tables_total, result.tables_with_changes
    );
    println!(
        "  Change script: {} ({} bytes)",
        script_path.display(),
        result.script_bytes
    );
    if result.unsupported_tables > 0 {
        println!(
            "  Skipped-column tables: {} ({} value file(s) exported)",
            result.unsupported_tables, result.exported_files
        );
    }
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let level = match verbosity.to_lowercase().as_str() {
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{}' (expected text or json)", other)),
    }

    Ok(())
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM.
/// Returns a CancellationToken that will be cancelled when a signal is received.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, ReconcileError> {
    let cancel_token = CancellationToken::new();

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!("\nReceived {}. Stopping tablediff processes...", name);
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, ReconcileError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nReceived Ctrl-C. Stopping tablediff processes...");
            token.cancel();
        }
    });

    Ok(cancel_token)
}
