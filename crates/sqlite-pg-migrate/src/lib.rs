//! # sqlite-pg-migrate
//!
//! Batch migration of a movie catalogue from SQLite to PostgreSQL.
//!
//! The library covers three jobs over the same five tables (`person`,
//! `genre`, `film_work`, `person_film_work`, `genre_film_work`):
//!
//! - **Migration** of every table in dependency order with bounded batches
//! - **Generation** of synthetic catalogue content directly into PostgreSQL
//! - **Consistency checks** comparing counts and rows on both sides
//!
//! Rows are validated into typed records on the way in, batches are inserted
//! with `ON CONFLICT (id) DO NOTHING` so re-runs are safe, and a batch that
//! violates a constraint is dropped without stopping the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sqlite_pg_migrate::{Config, Orchestrator};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> sqlite_pg_migrate::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let result = Orchestrator::new(config).migrate(CancellationToken::new()).await?;
//!     println!("Inserted {} rows ({})", result.rows_inserted, result.status);
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod generator;
pub mod model;
pub mod orchestrator;
pub mod source;
pub mod target;
pub mod transfer;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

// Re-exports for convenient access
pub use config::{Config, GenerationConfig, MigrationConfig, SourceConfig, TargetConfig};
pub use error::{MigrateError, Result, ValidationError};
pub use generator::Generator;
pub use model::{EntityKind, Record, SqlValue};
pub use orchestrator::{CheckResult, HealthCheckResult, Orchestrator, RunResult};
pub use source::{SourceReader, SqliteReader};
pub use target::{DestinationReader, DestinationWriter, PgConnection, PgWriter};
pub use transfer::{Batcher, TableStats, TransferEngine};
pub use verify::{ConsistencyChecker, CountReport, DetailReport};
