//! Configuration validation.

use super::Config;
use crate::error::{MigrateError, Result};
use crate::target::MAX_BATCH_SIZE;

/// PostgreSQL's NAMEDATALEN - 1.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    // Target validation
    if config.target.url.is_none() {
        if config.target.host.is_empty() {
            return Err(MigrateError::Config("target.host is required".into()));
        }
        if config.target.database.is_empty() {
            return Err(MigrateError::Config("target.database is required".into()));
        }
        if config.target.user.is_empty() {
            return Err(MigrateError::Config("target.user is required".into()));
        }
    }
    if config.target.schema.is_empty() {
        return Err(MigrateError::Config("target.schema is required".into()));
    }
    check_schema_name(&config.target.schema)?;
    crate::target::tls::SslMode::parse(&config.target.ssl_mode)?;

    if let Some(source) = &config.source {
        if source.path.as_os_str().is_empty() {
            return Err(MigrateError::Config("source.path must not be empty".into()));
        }
    }

    check_batch_size("migration.batch_size", config.migration.batch_size)?;

    let generation = &config.generation;
    check_batch_size("generation.batch_size", generation.batch_size)?;
    if generation.max_persons_per_film_work == 0 {
        return Err(MigrateError::Config(
            "generation.max_persons_per_film_work must be at least 1".into(),
        ));
    }
    if generation.max_genres_per_film_work == 0 {
        return Err(MigrateError::Config(
            "generation.max_genres_per_film_work must be at least 1".into(),
        ));
    }
    if generation.related_sample_size == 0 {
        return Err(MigrateError::Config(
            "generation.related_sample_size must be at least 1".into(),
        ));
    }

    Ok(())
}

/// Schema names are plain PostgreSQL identifiers: they go into the
/// connection's `search_path` startup option.
fn check_schema_name(schema: &str) -> Result<()> {
    let mut chars = schema.chars();
    let starts_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    let rest_ok = chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$');
    if !starts_ok || !rest_ok || schema.len() > MAX_IDENTIFIER_LEN {
        return Err(MigrateError::Config(format!(
            "target.schema must be a plain identifier (letters, digits, _ or $, at most {} bytes), got {:?}",
            MAX_IDENTIFIER_LEN, schema
        )));
    }
    Ok(())
}

fn check_batch_size(name: &str, value: usize) -> Result<()> {
    if value == 0 {
        return Err(MigrateError::Config(format!("{} must be at least 1", name)));
    }
    if value > MAX_BATCH_SIZE {
        return Err(MigrateError::Config(format!(
            "{} must be at most {} (PostgreSQL bind parameter limit), got {}",
            name, MAX_BATCH_SIZE, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GenerationConfig, MigrationConfig, SourceConfig, TargetConfig};

    fn valid_config() -> Config {
        Config {
            source: Some(SourceConfig {
                path: "db.sqlite".into(),
            }),
            target: TargetConfig {
                url: None,
                host: "localhost".to_string(),
                port: 5432,
                database: "movies_database".to_string(),
                user: "app".to_string(),
                password: "password".to_string(),
                schema: "content".to_string(),
                ssl_mode: "disable".to_string(),
            },
            migration: MigrationConfig::default(),
            generation: GenerationConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        let config = valid_config();
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_missing_target_host() {
        let mut config = valid_config();
        config.target.host = "".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_url_replaces_connection_fields() {
        let mut config = valid_config();
        config.target.host.clear();
        config.target.user.clear();
        config.target.url = Some("postgres://app@localhost/movies".into());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_unknown_ssl_mode() {
        let mut config = valid_config();
        config.target.ssl_mode = "sometimes".to_string();
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_schema_must_be_plain_identifier() {
        let mut config = valid_config();
        for bad in [
            "content,public",
            "content -c statement_timeout=1",
            "9lives",
            "my\"schema",
            "контент",
        ] {
            config.target.schema = bad.to_string();
            let err = validate(&config).unwrap_err();
            assert!(matches!(err, MigrateError::Config(_)), "{}", bad);
            assert!(err.to_string().contains("target.schema"), "{}", bad);
        }

        for good in ["content", "_staging", "Movies_2024", "a$b"] {
            config.target.schema = good.to_string();
            assert!(validate(&config).is_ok(), "{}", good);
        }

        config.target.schema = "s".repeat(MAX_IDENTIFIER_LEN + 1);
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_zero_batch_size() {
        let mut config = valid_config();
        config.migration.batch_size = 0;
        let err = validate(&config).unwrap_err();
        assert!(err.to_string().contains("migration.batch_size"));
    }

    #[test]
    fn test_batch_size_over_bind_limit() {
        let mut config = valid_config();
        config.generation.batch_size = MAX_BATCH_SIZE + 1;
        assert!(validate(&config).is_err());
        config.generation.batch_size = MAX_BATCH_SIZE;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_zero_arity() {
        let mut config = valid_config();
        config.generation.max_genres_per_film_work = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_target_config_debug_redacts_password() {
        let mut config = valid_config();
        config.target.password = "super_secret_password_456".to_string();
        let debug_output = format!("{:?}", config.target);
        assert!(
            debug_output.contains("[REDACTED]"),
            "Debug output should contain [REDACTED]"
        );
        assert!(
            !debug_output.contains("super_secret_password_456"),
            "Debug output should not contain actual password value"
        );
    }

    #[test]
    fn test_target_config_debug_redacts_url() {
        let mut config = valid_config();
        config.target.url = Some("postgres://app:hunter2@db/movies".into());
        let debug_output = format!("{:?}", config);
        assert!(!debug_output.contains("hunter2"));
    }
}
