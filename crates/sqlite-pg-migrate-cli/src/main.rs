//! sqlite-pg-migrate CLI - movie catalogue migration from SQLite to PostgreSQL.

use clap::{Parser, Subcommand};
use sqlite_pg_migrate::{CheckResult, Config, MigrateError, Orchestrator, RunResult};
use std::path::PathBuf;
use std::process::ExitCode;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Exit code of a run with dropped batches or failed tables, or of a failed check.
const EXIT_PARTIAL: u8 = 3;

#[derive(Parser)]
#[command(name = "sqlite-pg-migrate")]
#[command(about = "Movie catalogue migration from SQLite to PostgreSQL")]
#[command(version)]
struct Cli {
    /// Path to YAML configuration file (environment variables are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Output JSON result to stdout
    #[arg(long)]
    output_json: bool,

    /// Log format: text or json
    #[arg(long, default_value = "text")]
    log_format: String,

    /// Log verbosity: debug, info, warn, error (RUST_LOG directives take precedence)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    verbosity: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Copy every table from SQLite into PostgreSQL
    Migrate {
        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Override the SQLite database path
        #[arg(long)]
        sqlite: Option<PathBuf>,
    },

    /// Fill PostgreSQL with synthetic catalogue content
    Generate {
        /// Override number of persons
        #[arg(long)]
        persons: Option<usize>,

        /// Override number of genres
        #[arg(long)]
        genres: Option<usize>,

        /// Override number of film works
        #[arg(long)]
        film_works: Option<usize>,

        /// Override rows per batch
        #[arg(long)]
        batch_size: Option<usize>,

        /// Seed for reproducible output
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Compare SQLite and PostgreSQL contents
    Check {
        /// Only compare row counts
        #[arg(long)]
        counts_only: bool,
    },

    /// Test database connections
    HealthCheck,
}

enum Outcome {
    Done,
    Partial,
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(Outcome::Done) => ExitCode::SUCCESS,
        Ok(Outcome::Partial) => ExitCode::from(EXIT_PARTIAL),
        Err(e) => {
            eprintln!("{}", e.format_detailed());
            ExitCode::from(e.exit_code())
        }
    }
}

async fn run() -> Result<Outcome, MigrateError> {
    let cli = Cli::parse();

    setup_logging(&cli.verbosity, &cli.log_format).map_err(MigrateError::Config)?;

    let mut config = match &cli.config {
        Some(path) => {
            let config = Config::load(path)?;
            info!("Loaded configuration from {:?}", path);
            config
        }
        None => {
            let config = Config::from_env()?;
            info!("Loaded configuration from environment");
            config
        }
    };

    match cli.command {
        Commands::Migrate { batch_size, sqlite } => {
            if let Some(size) = batch_size {
                config.migration.batch_size = size;
            }
            if let Some(path) = sqlite {
                config.source = Some(sqlite_pg_migrate::SourceConfig { path });
            }
            config.validate()?;

            let cancel = setup_signal_handler()?;
            let result = Orchestrator::new(config).migrate(cancel).await?;
            print_run(&result, cli.output_json, "Migration")?;
            Ok(run_outcome(&result))
        }

        Commands::Generate {
            persons,
            genres,
            film_works,
            batch_size,
            seed,
        } => {
            let generation = &mut config.generation;
            if let Some(n) = persons {
                generation.persons = n;
            }
            if let Some(n) = genres {
                generation.genres = n;
            }
            if let Some(n) = film_works {
                generation.film_works = n;
            }
            if let Some(n) = batch_size {
                generation.batch_size = n;
            }
            if seed.is_some() {
                generation.seed = seed;
            }
            config.validate()?;

            let cancel = setup_signal_handler()?;
            let result = Orchestrator::new(config).generate(cancel).await?;
            print_run(&result, cli.output_json, "Generation")?;
            Ok(run_outcome(&result))
        }

        Commands::Check { counts_only } => {
            let result = Orchestrator::new(config).check(!counts_only).await?;
            print_check(&result, cli.output_json)?;
            if result.consistent {
                Ok(Outcome::Done)
            } else {
                Ok(Outcome::Partial)
            }
        }

        Commands::HealthCheck => {
            let result = Orchestrator::new(config).health_check().await?;

            if cli.output_json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Health Check Results:");
                if result.source_configured {
                    println!(
                        "  Source (SQLite): {} ({}ms)",
                        if result.source_connected { "OK" } else { "FAILED" },
                        result.source_latency_ms
                    );
                } else {
                    println!("  Source (SQLite): not configured");
                }
                if let Some(ref err) = result.source_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "  Target (PostgreSQL): {} ({}ms)",
                    if result.target_connected { "OK" } else { "FAILED" },
                    result.target_latency_ms
                );
                if let Some(ref version) = result.target_version {
                    println!("    Version: {}", version);
                }
                if let Some(ref err) = result.target_error {
                    println!("    Error: {}", err);
                }
                println!(
                    "\n  Overall: {}",
                    if result.healthy { "HEALTHY" } else { "UNHEALTHY" }
                );
            }

            if !result.healthy {
                return Err(MigrateError::Config("Health check failed".to_string()));
            }
            Ok(Outcome::Done)
        }
    }
}

fn run_outcome(result: &RunResult) -> Outcome {
    if result.is_partial() {
        Outcome::Partial
    } else {
        Outcome::Done
    }
}

fn print_run(result: &RunResult, json: bool, label: &str) -> Result<(), MigrateError> {
    if json {
        println!("{}", result.to_json()?);
        return Ok(());
    }

    let status_msg = if result.is_partial() {
        "finished with losses"
    } else {
        "completed"
    };
    println!("\n{} {}!", label, status_msg);
    println!("  Run ID: {}", result.run_id);
    println!("  Duration: {:.2}s", result.duration_seconds);
    println!("  Tables: {}/{}", result.tables_success, result.tables_total);
    println!(
        "  Rows: {} read, {} inserted, {} skipped, {} rejected, {} dropped",
        result.rows_read,
        result.rows_inserted,
        result.rows_skipped,
        result.rows_rejected,
        result.rows_dropped
    );
    println!("  Throughput: {} rows/sec", result.rows_per_second);
    for table in &result.tables {
        match &table.error {
            Some(err) => println!("  ✗ {}: {}", table.table, err),
            None if table.batches_dropped > 0 => println!(
                "  ✗ {}: {} batches dropped ({} rows)",
                table.table, table.batches_dropped, table.rows_dropped
            ),
            None => println!("  ✓ {}: {} rows", table.table, table.rows_inserted),
        }
    }
    Ok(())
}

fn print_check(result: &CheckResult, json: bool) -> Result<(), MigrateError> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("Row counts:");
    for count in &result.counts.tables {
        if let Some(err) = &count.error {
            println!("  ✗ {}: {}", count.table, err);
            continue;
        }
        let status = if count.matches() { "✓" } else { "✗" };
        println!(
            "  {} {} (source: {}, target: {})",
            status, count.table, count.source, count.target
        );
    }

    if let Some(detail) = &result.detail {
        println!("\nRows checked: {}", detail.rows_checked);
        for mismatch in &detail.mismatches {
            println!("  ✗ {} {}: {:?}", mismatch.table, mismatch.id, mismatch.kind);
        }
    }

    println!(
        "\n  Overall: {}",
        if result.consistent { "CONSISTENT" } else { "INCONSISTENT" }
    );
    Ok(())
}

fn setup_logging(verbosity: &str, format: &str) -> Result<(), String> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(verbosity_directive(verbosity)));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format: {}", other)),
    }

    Ok(())
}

/// Filter directive for `--verbosity`, used when `RUST_LOG` is unset or invalid.
fn verbosity_directive(verbosity: &str) -> &'static str {
    match verbosity.to_lowercase().as_str() {
        "debug" => "debug",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

/// Setup signal handlers for graceful shutdown.
/// Handles both SIGINT (Ctrl-C) and SIGTERM (container/orchestrator shutdown).
/// The returned token is cancelled on the first signal; the run then stops at
/// the next batch boundary and commits what it already flushed.
#[cfg(unix)]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    let token = cancel_token.clone();
    tokio::spawn(async move {
        let name = tokio::select! {
            _ = sigint.recv() => "SIGINT",
            _ = sigterm.recv() => "SIGTERM",
        };
        eprintln!(
            "\nReceived {}. Stopping after the current batch and committing flushed work...",
            name
        );
        token.cancel();
    });

    Ok(cancel_token)
}

/// Setup signal handler for Windows (only Ctrl-C)
#[cfg(not(unix))]
fn setup_signal_handler() -> Result<CancellationToken, MigrateError> {
    let cancel_token = CancellationToken::new();
    let token = cancel_token.clone();

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                eprintln!("\nReceived Ctrl-C. Stopping after the current batch...");
                token.cancel();
            }
            Err(e) => tracing::warn!("Ctrl-C handler unavailable: {}", e),
        }
    });

    Ok(cancel_token)
}
