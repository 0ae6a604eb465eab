//! Environment-variable configuration.

use super::{Config, GenerationConfig, MigrationConfig, SourceConfig, TargetConfig};
use crate::error::{MigrateError, Result};
use std::str::FromStr;

/// Build a [`Config`] from a variable lookup. Unset variables keep their defaults.
pub(crate) fn from_lookup<F>(lookup: F) -> Result<Config>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    let mut target = TargetConfig {
        url: get("DATABASE_URL"),
        host: get("DB_HOST").unwrap_or_default(),
        database: get("DB_NAME").unwrap_or_default(),
        user: get("DB_USER").unwrap_or_default(),
        password: lookup("DB_PASSWORD").unwrap_or_default(),
        ..TargetConfig::default()
    };
    if let Some(port) = parsed(&get, "DB_PORT")? {
        target.port = port;
    }
    if let Some(schema) = get("DB_SCHEMA") {
        target.schema = schema;
    }
    if let Some(mode) = get("DB_SSL_MODE") {
        target.ssl_mode = mode;
    }

    let source = get("SQLITE_FILENAME").map(|path| SourceConfig { path: path.into() });

    let mut migration = MigrationConfig::default();
    if let Some(size) = parsed(&get, "MIGRATE_DATA_SIZE")? {
        migration.batch_size = size;
    }

    let mut generation = GenerationConfig::default();
    if let Some(v) = parsed(&get, "CONTENT_PERSONS_COUNT")? {
        generation.persons = v;
    }
    if let Some(v) = parsed(&get, "CONTENT_GENRES_COUNT")? {
        generation.genres = v;
    }
    if let Some(v) = parsed(&get, "CONTENT_FILM_WORK_COUNT")? {
        generation.film_works = v;
    }
    if let Some(v) = parsed(&get, "CONTENT_PAGE_SIZE_COUNT")? {
        generation.batch_size = v;
    }
    if let Some(v) = parsed(&get, "CONTENT_MAX_PERSONS_PER_FILM_WORK")? {
        generation.max_persons_per_film_work = v;
    }
    if let Some(v) = parsed(&get, "CONTENT_MAX_GENRES_PER_FILM_WORK")? {
        generation.max_genres_per_film_work = v;
    }
    generation.seed = parsed(&get, "CONTENT_SEED")?;

    Ok(Config {
        source,
        target,
        migration,
        generation,
    })
}

fn parsed<T, G>(get: &G, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    get(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| MigrateError::Config(format!("{}={:?}: {}", key, raw, e)))
        })
        .transpose()
}
