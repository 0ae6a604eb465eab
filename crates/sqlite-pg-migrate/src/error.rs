//! Error types for the migration library.

use thiserror::Error;

/// Reason a raw row could not be turned into a typed record.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationErrorKind {
    /// The row does not have one value per column.
    #[error("expected {expected} columns, got {found}")]
    Arity { expected: usize, found: usize },

    /// A required field is NULL or absent.
    #[error("required value is missing")]
    Missing,

    /// The value cannot be converted to the field's type.
    #[error("expected {expected}, got {found}")]
    TypeMismatch { expected: &'static str, found: String },

    /// The value converts but is outside the field's domain.
    #[error("{0}")]
    Constraint(String),
}

/// A row failed validation for a specific entity field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid {entity}.{field}: {kind}")]
pub struct ValidationError {
    /// Entity (table) being constructed.
    pub entity: &'static str,
    /// Offending field, or `row` for shape errors.
    pub field: &'static str,
    /// What went wrong.
    pub kind: ValidationErrorKind,
}

/// Main error type for migration operations.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The SQLite source could not be opened.
    #[error("Source database unavailable ({path}): {source}")]
    SourceUnavailable {
        path: String,
        #[source]
        source: sqlx::Error,
    },

    /// The PostgreSQL target could not be reached.
    #[error("Target database unavailable ({target}): {source}")]
    TargetUnavailable {
        target: String,
        #[source]
        source: tokio_postgres::Error,
    },

    /// Source database error while streaming rows
    #[error("Source database error: {0}")]
    Source(#[from] sqlx::Error),

    /// Target database error outside of a batch write
    #[error("Target database error: {0}")]
    Target(#[from] tokio_postgres::Error),

    /// A query was rejected by the database (malformed, unknown table, ...)
    #[error("Query failed for table {table}: {message}\n  Query: {query}")]
    Query {
        table: String,
        query: String,
        message: String,
    },

    /// A raw row failed validation
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// A batch violated a destination constraint and was dropped
    #[error("Write conflict on {table}: {rows} rows dropped (SQLSTATE {code}): {message}")]
    WriteConflict {
        table: String,
        rows: usize,
        code: String,
        message: String,
    },

    /// The run was stopped by SIGINT/SIGTERM; flushed batches are committed
    #[error("Migration cancelled")]
    Cancelled,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Create a Query error.
    pub fn query(
        table: impl Into<String>,
        query: impl Into<String>,
        message: impl ToString,
    ) -> Self {
        MigrateError::Query {
            table: table.into(),
            query: query.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error only invalidates the table being processed.
    ///
    /// Everything else (connection loss, configuration) aborts the run.
    pub fn is_table_scoped(&self) -> bool {
        matches!(
            self,
            MigrateError::Query { .. }
                | MigrateError::Source(_)
                | MigrateError::Validation(_)
                | MigrateError::WriteConflict { .. }
        )
    }

    /// Process exit code for this error category.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::SourceUnavailable { .. } | MigrateError::TargetUnavailable { .. } => 4,
            MigrateError::Cancelled => 130,
            _ => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
