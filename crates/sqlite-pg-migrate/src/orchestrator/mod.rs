//! Run coordinator: connection lifetimes, table ordering and run results.

use std::time::Instant;

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{Config, GenerationConfig};
use crate::error::{MigrateError, Result};
use crate::generator::{fill_junction_table, Generator, JunctionSettings, TextSource};
use crate::model::EntityKind;
use crate::source::{SourceReader, SqliteReader};
use crate::target::{DestinationWriter, PgConnection, PgWriter};
use crate::transfer::{TableStats, TransferEngine};
use crate::verify::{ConsistencyChecker, CountReport, DetailReport};

/// Entry point for every command.
pub struct Orchestrator {
    config: Config,
}

/// Result of a `migrate` or `generate` run.
#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    /// Unique run identifier.
    pub run_id: String,

    /// `migrate` or `generate`.
    pub mode: String,

    /// `completed`, or `partial` when a table failed or a batch was dropped.
    pub status: String,

    /// When the run started.
    pub started_at: DateTime<Utc>,

    /// When the run completed.
    pub completed_at: DateTime<Utc>,

    /// Total duration in seconds.
    pub duration_seconds: f64,

    pub tables_total: usize,
    pub tables_success: usize,
    pub tables_failed: usize,

    pub rows_read: u64,
    pub rows_inserted: u64,
    pub rows_skipped: u64,
    pub rows_rejected: u64,
    pub rows_dropped: u64,

    /// Average insert throughput (rows/second).
    pub rows_per_second: u64,

    /// Tables that failed or lost batches.
    pub failed_tables: Vec<String>,

    /// Per-table counters in processing order.
    pub tables: Vec<TableStats>,
}

impl RunResult {
    fn new(mode: &str, run_id: String, started_at: DateTime<Utc>, tables: Vec<TableStats>) -> Self {
        let completed_at = Utc::now();
        let duration_seconds =
            (completed_at - started_at).num_milliseconds().max(0) as f64 / 1000.0;
        let sum = |f: fn(&TableStats) -> u64| tables.iter().map(f).sum::<u64>();

        let rows_inserted = sum(|t| t.rows_inserted);
        let failed_tables: Vec<String> = tables
            .iter()
            .filter(|t| t.is_partial())
            .map(|t| t.table.clone())
            .collect();
        let tables_failed = tables.iter().filter(|t| t.error.is_some()).count();

        Self {
            run_id,
            mode: mode.to_string(),
            status: if failed_tables.is_empty() {
                "completed"
            } else {
                "partial"
            }
            .to_string(),
            started_at,
            completed_at,
            duration_seconds,
            tables_total: tables.len(),
            tables_success: tables.len() - tables_failed,
            tables_failed,
            rows_read: sum(|t| t.rows_read),
            rows_inserted,
            rows_skipped: sum(|t| t.rows_skipped),
            rows_rejected: sum(|t| t.rows_rejected),
            rows_dropped: sum(|t| t.rows_dropped),
            rows_per_second: if duration_seconds > 0.0 {
                (rows_inserted as f64 / duration_seconds) as u64
            } else {
                rows_inserted
            },
            failed_tables,
            tables,
        }
    }

    /// A table failed or a batch was dropped.
    pub fn is_partial(&self) -> bool {
        self.status == "partial"
    }

    /// Convert to JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    fn log_summary(&self) {
        info!(
            "Run {} {}: {} tables, {} rows read, {} inserted, {} skipped, {} rejected, {} dropped in {:.1}s",
            self.run_id,
            self.status,
            self.tables_total,
            self.rows_read,
            self.rows_inserted,
            self.rows_skipped,
            self.rows_rejected,
            self.rows_dropped,
            self.duration_seconds
        );
        if !self.failed_tables.is_empty() {
            warn!("Incomplete tables: {}", self.failed_tables.join(", "));
        }
    }
}

/// Result of a consistency check.
#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub counts: CountReport,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<DetailReport>,
    pub consistent: bool,
}

/// Result of a connectivity check.
#[derive(Debug, Clone, Serialize)]
pub struct HealthCheckResult {
    pub source_configured: bool,
    pub source_connected: bool,
    pub source_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_error: Option<String>,
    pub target_connected: bool,
    pub target_latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_error: Option<String>,
    pub healthy: bool,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Copy every table from SQLite into PostgreSQL in dependency order.
    ///
    /// When `cancel` fires the run stops at the next row or batch boundary and
    /// everything already flushed is committed before `Cancelled` is returned.
    pub async fn migrate(&self, cancel: CancellationToken) -> Result<RunResult> {
        let source_config = self.config.require_source()?;
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Starting migration run {}: {} -> {}",
            run_id,
            source_config.path.display(),
            self.config.target.display_target()
        );

        let source = SqliteReader::connect(source_config).await?;
        let writer = match PgWriter::open(&self.config.target).await {
            Ok(writer) => writer,
            Err(e) => {
                if let Err(close_err) = source.close().await {
                    warn!("Closing source failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let tables =
            migrate_tables(source, writer, self.config.migration.batch_size, cancel).await?;
        let result = RunResult::new("migrate", run_id, started_at, tables);
        result.log_summary();
        Ok(result)
    }

    /// Fill the destination with synthetic content; cancellation behaves as in [`migrate`](Self::migrate).
    pub async fn generate(&self, cancel: CancellationToken) -> Result<RunResult> {
        let generation = &self.config.generation;
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(
            "Starting generation run {}: {} persons, {} genres, {} film works -> {}",
            run_id,
            generation.persons,
            generation.genres,
            generation.film_works,
            self.config.target.display_target()
        );
        if let Some(seed) = generation.seed {
            info!("Using seed {}", seed);
        }

        let mut generator = Generator::from_seed(generation.seed)
            .with_date_range(generation.earliest_date, Utc::now().date_naive());
        let writer = PgWriter::open(&self.config.target).await?;

        let tables = generate_tables(writer, &mut generator, generation, cancel).await?;
        let result = RunResult::new("generate", run_id, started_at, tables);
        result.log_summary();
        Ok(result)
    }

    /// Compare source and destination, counts only unless `detail` is set.
    pub async fn check(&self, detail: bool) -> Result<CheckResult> {
        let source_config = self.config.require_source()?;
        let mut source = SqliteReader::connect(source_config).await?;
        let mut target = match PgConnection::connect_read_only(&self.config.target).await {
            Ok(target) => target,
            Err(e) => {
                if let Err(close_err) = source.close().await {
                    warn!("Closing source failed: {}", close_err);
                }
                return Err(e);
            }
        };

        let outcome = run_checks(&mut source, &mut target, detail).await;

        if let Err(e) = source.close().await {
            warn!("Closing source failed: {}", e);
        }
        if let Err(e) = target.close().await {
            warn!("Closing target failed: {}", e);
        }
        outcome
    }

    /// Connect to both stores and report latency.
    pub async fn health_check(&self) -> Result<HealthCheckResult> {
        let mut result = HealthCheckResult {
            source_configured: self.config.source.is_some(),
            source_connected: false,
            source_latency_ms: 0,
            source_error: None,
            target_connected: false,
            target_latency_ms: 0,
            target_version: None,
            target_error: None,
            healthy: false,
        };

        if let Some(source_config) = &self.config.source {
            let start = Instant::now();
            match SqliteReader::connect(source_config).await {
                Ok(mut source) => {
                    match source.ping().await {
                        Ok(()) => result.source_connected = true,
                        Err(e) => result.source_error = Some(e.to_string()),
                    }
                    result.source_latency_ms = start.elapsed().as_millis() as u64;
                    if let Err(e) = source.close().await {
                        warn!("Closing source failed: {}", e);
                    }
                }
                Err(e) => result.source_error = Some(e.to_string()),
            }
        }

        let start = Instant::now();
        match PgConnection::connect(&self.config.target).await {
            Ok(target) => {
                match target.server_version().await {
                    Ok(version) => {
                        result.target_connected = true;
                        result.target_version = Some(version);
                    }
                    Err(e) => result.target_error = Some(e.to_string()),
                }
                result.target_latency_ms = start.elapsed().as_millis() as u64;
                if let Err(e) = target.close().await {
                    warn!("Closing target failed: {}", e);
                }
            }
            Err(e) => result.target_error = Some(e.to_string()),
        }

        result.healthy =
            result.target_connected && (result.source_connected || !result.source_configured);
        Ok(result)
    }
}

async fn run_checks(
    source: &mut SqliteReader,
    target: &mut PgConnection,
    detail: bool,
) -> Result<CheckResult> {
    let mut checker = ConsistencyChecker::new(source, target);
    let counts = checker.check_counts().await?;
    let detail = if detail {
        Some(checker.check_detail().await?)
    } else {
        None
    };
    let consistent = counts.is_consistent() && detail.as_ref().map_or(true, |d| d.is_consistent());
    Ok(CheckResult {
        counts,
        detail,
        consistent,
    })
}

/// Migrate all tables, then commit and release both connections whatever happened.
pub async fn migrate_tables<S, W>(
    mut source: S,
    mut writer: W,
    batch_size: usize,
    cancel: CancellationToken,
) -> Result<Vec<TableStats>>
where
    S: SourceReader,
    W: DestinationWriter,
{
    let outcome = migrate_each(&mut source, &mut writer, batch_size, cancel).await;

    let committed = writer.close().await;
    if let Err(e) = source.close().await {
        warn!("Closing source failed: {}", e);
    }
    let tables = outcome?;
    committed?;
    Ok(tables)
}

async fn migrate_each<S, W>(
    source: &mut S,
    writer: &mut W,
    batch_size: usize,
    cancel: CancellationToken,
) -> Result<Vec<TableStats>>
where
    S: SourceReader,
    W: DestinationWriter,
{
    let mut engine = TransferEngine::new(writer, batch_size).with_cancellation(cancel);
    let mut tables = Vec::with_capacity(EntityKind::DEPENDENCY_ORDER.len());

    for kind in EntityKind::DEPENDENCY_ORDER {
        engine.check_cancelled()?;
        info!("{}: migrating", kind);
        let start = Instant::now();
        let mut stats = TableStats::new(kind);

        let outcome = match source.open_table(kind).await {
            Ok(rows) => engine.transfer_table(kind, rows, &mut stats).await,
            Err(e) => Err(e),
        };
        stats.duration_ms = start.elapsed().as_millis() as u64;
        finish_table(kind, &mut stats, outcome)?;
        tables.push(stats);
    }
    Ok(tables)
}

/// Generate base tables then junction tables, then commit.
pub async fn generate_tables<W, R, T>(
    mut writer: W,
    generator: &mut Generator<R, T>,
    config: &GenerationConfig,
    cancel: CancellationToken,
) -> Result<Vec<TableStats>>
where
    W: DestinationWriter,
    R: Rng,
    T: TextSource,
{
    let outcome = generate_each(&mut writer, generator, config, cancel).await;
    let committed = writer.close().await;
    let tables = outcome?;
    committed?;
    Ok(tables)
}

async fn generate_each<W, R, T>(
    writer: &mut W,
    generator: &mut Generator<R, T>,
    config: &GenerationConfig,
    cancel: CancellationToken,
) -> Result<Vec<TableStats>>
where
    W: DestinationWriter,
    R: Rng,
    T: TextSource,
{
    let mut engine = TransferEngine::new(writer, config.batch_size).with_cancellation(cancel);
    let mut tables = Vec::with_capacity(EntityKind::DEPENDENCY_ORDER.len());

    for kind in EntityKind::DEPENDENCY_ORDER {
        engine.check_cancelled()?;
        info!("{}: generating", kind);
        let start = Instant::now();
        let mut stats = TableStats::new(kind);

        let outcome = match kind {
            EntityKind::Person => {
                let records = generator.base_records(kind, config.persons);
                engine.load_records(kind, records, &mut stats).await
            }
            EntityKind::Genre => {
                let records = generator.base_records(kind, config.genres);
                engine.load_records(kind, records, &mut stats).await
            }
            EntityKind::FilmWork => {
                let records = generator.base_records(kind, config.film_works);
                engine.load_records(kind, records, &mut stats).await
            }
            EntityKind::PersonFilmWork | EntityKind::GenreFilmWork => {
                let max_per_film_work = if kind == EntityKind::PersonFilmWork {
                    config.max_persons_per_film_work
                } else {
                    config.max_genres_per_film_work
                };
                let settings = JunctionSettings {
                    max_per_film_work,
                    sample_size: config.related_sample_size,
                };
                fill_junction_table(&mut engine, generator, kind, settings, &mut stats).await
            }
        };
        stats.duration_ms = start.elapsed().as_millis() as u64;
        finish_table(kind, &mut stats, outcome)?;
        tables.push(stats);
    }
    Ok(tables)
}

/// Log a finished table. Table-scoped errors are recorded; anything else aborts the run.
fn finish_table(kind: EntityKind, stats: &mut TableStats, outcome: Result<()>) -> Result<()> {
    match outcome {
        Ok(()) => {
            info!(
                "{}: {} rows read, {} inserted, {} skipped, {} rejected, {} dropped ({}ms)",
                kind,
                stats.rows_read,
                stats.rows_inserted,
                stats.rows_skipped,
                stats.rows_rejected,
                stats.rows_dropped,
                stats.duration_ms
            );
            Ok(())
        }
        Err(e) if e.is_table_scoped() => {
            error!("{}: table failed: {}", kind, e);
            stats.error = Some(e.to_string());
            Ok(())
        }
        Err(MigrateError::Cancelled) => {
            warn!(
                "{}: cancelled after {} batches, committing flushed work",
                kind, stats.batches_flushed
            );
            Err(MigrateError::Cancelled)
        }
        Err(e) => {
            error!("{}: aborting run: {}", kind, e);
            Err(e)
        }
    }
}
