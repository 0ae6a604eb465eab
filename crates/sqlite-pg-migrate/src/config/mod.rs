//! Configuration loading and validation.

mod env;
mod types;
mod validation;

pub use types::*;

use crate::error::{MigrateError, Result};
use std::path::Path;

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Build configuration from process environment variables.
    ///
    /// A `.env` file in the working directory is loaded first when present.
    pub fn from_env() -> Result<Self> {
        // Missing .env is the normal case in deployed environments.
        let _ = dotenvy::dotenv();
        let config = env::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        validation::validate(self)
    }

    /// Source configuration, required by commands that read SQLite.
    pub fn require_source(&self) -> Result<&SourceConfig> {
        self.source.as_ref().ok_or_else(|| {
            MigrateError::Config("source.path (SQLITE_FILENAME) is required".into())
        })
    }
}

impl TargetConfig {
    /// Build a connection string for tokio-postgres.
    ///
    /// TLS is negotiated separately from `ssl_mode`, so it is not part of the string.
    pub fn connection_string(&self) -> String {
        if let Some(url) = &self.url {
            return url.clone();
        }
        format!(
            "host={} port={} dbname={} user={} password={}",
            quote_value(&self.host),
            self.port,
            quote_value(&self.database),
            quote_value(&self.user),
            quote_value(&self.password)
        )
    }

    /// Display form of the target without credentials.
    pub fn display_target(&self) -> String {
        if self.url.is_some() {
            return "postgres (url)".to_string();
        }
        format!("{}:{}/{}", self.host, self.port, self.database)
    }
}

/// Quote a libpq key=value parameter.
fn quote_value(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('\'', "\\'");
    format!("'{}'", escaped)
}
