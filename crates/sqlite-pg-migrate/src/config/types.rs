//! Configuration type definitions.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Source database configuration (SQLite). Only needed by `migrate` and `check`.
    #[serde(default)]
    pub source: Option<SourceConfig>,

    /// Target database configuration (PostgreSQL).
    pub target: TargetConfig,

    /// Migration behavior configuration.
    #[serde(default)]
    pub migration: MigrationConfig,

    /// Synthetic content generation configuration.
    #[serde(default)]
    pub generation: GenerationConfig,
}

/// Source database (SQLite) configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Path to the SQLite database file.
    pub path: PathBuf,
}

/// Target database (PostgreSQL) configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Full connection URL. Overrides the individual fields when set.
    #[serde(default)]
    pub url: Option<String>,

    /// Database host.
    #[serde(default)]
    pub host: String,

    /// Database port (default: 5432).
    #[serde(default = "default_pg_port")]
    pub port: u16,

    /// Database name.
    #[serde(default)]
    pub database: String,

    /// Username.
    #[serde(default)]
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Target schema (default: "content").
    #[serde(default = "default_content_schema")]
    pub schema: String,

    /// SSL mode (default: "disable").
    #[serde(default = "default_disable")]
    pub ssl_mode: String,
}

impl fmt::Debug for TargetConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TargetConfig")
            .field("url", &self.url.as_ref().map(|_| "[REDACTED]"))
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("ssl_mode", &self.ssl_mode)
            .finish()
    }
}

/// Migration behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Rows per flushed batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// Synthetic content generation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of persons to generate (default: 100000).
    #[serde(default = "default_persons")]
    pub persons: usize,

    /// Number of genres to generate (default: 15).
    #[serde(default = "default_genres")]
    pub genres: usize,

    /// Number of film works to generate (default: 1100000).
    #[serde(default = "default_film_works")]
    pub film_works: usize,

    /// Rows per flushed batch (default: 1000).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Upper bound of persons linked to one film work (default: 5).
    #[serde(default = "default_max_persons")]
    pub max_persons_per_film_work: usize,

    /// Upper bound of genres linked to one film work (default: 3).
    #[serde(default = "default_max_genres")]
    pub max_genres_per_film_work: usize,

    /// Related ids sampled from the destination per flush (default: 16).
    #[serde(default = "default_related_sample_size")]
    pub related_sample_size: usize,

    /// RNG seed for reproducible output. Random when unset.
    #[serde(default)]
    pub seed: Option<u64>,

    /// Earliest generated creation date (default: 1900-01-01).
    #[serde(default = "default_earliest_date")]
    pub earliest_date: NaiveDate,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            persons: default_persons(),
            genres: default_genres(),
            film_works: default_film_works(),
            batch_size: default_batch_size(),
            max_persons_per_film_work: default_max_persons(),
            max_genres_per_film_work: default_max_genres(),
            related_sample_size: default_related_sample_size(),
            seed: None,
            earliest_date: default_earliest_date(),
        }
    }
}

fn default_pg_port() -> u16 {
    5432
}

fn default_content_schema() -> String {
    "content".to_string()
}

fn default_disable() -> String {
    "disable".to_string()
}

pub(crate) fn default_batch_size() -> usize {
    1000
}

fn default_persons() -> usize {
    100_000
}

fn default_genres() -> usize {
    15
}

fn default_film_works() -> usize {
    1_100_000
}

fn default_max_persons() -> usize {
    5
}

fn default_max_genres() -> usize {
    3
}

fn default_related_sample_size() -> usize {
    16
}

fn default_earliest_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(1900, 1, 1).unwrap_or(NaiveDate::MIN)
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: String::new(),
            port: default_pg_port(),
            database: String::new(),
            user: String::new(),
            password: String::new(),
            schema: default_content_schema(),
            ssl_mode: default_disable(),
        }
    }
}
