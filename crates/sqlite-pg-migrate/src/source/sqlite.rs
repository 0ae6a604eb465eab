//! SQLite source reader.
//!
//! Implements the `SourceReader` trait over a single read-only SQLx
//! connection. Cells are decoded by their storage class, so declared column
//! types in the source file do not matter.

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

use super::{RowStream, SourceReader};
use crate::config::SourceConfig;
use crate::error::{MigrateError, Result};
use crate::model::{EntityKind, SqlValue};

/// SQLite source reader implementation.
pub struct SqliteReader {
    conn: SqliteConnection,
    path: String,
}

impl SqliteReader {
    /// Open the source file read-only.
    pub async fn connect(config: &SourceConfig) -> Result<Self> {
        let path = config.path.display().to_string();
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .read_only(true)
            .create_if_missing(false);

        let mut conn = options
            .connect()
            .await
            .map_err(|e| MigrateError::SourceUnavailable {
                path: path.clone(),
                source: e,
            })?;

        // Opening is lazy about file contents; touch the schema to fail early on non-databases.
        sqlx::query("SELECT COUNT(*) FROM sqlite_master")
            .fetch_one(&mut conn)
            .await
            .map_err(|e| MigrateError::SourceUnavailable {
                path: path.clone(),
                source: e,
            })?;

        info!("Connected to SQLite source: {}", path);
        Ok(Self { conn, path })
    }

    /// Wrap an already open connection.
    pub fn from_connection(conn: SqliteConnection, path: impl Into<String>) -> Self {
        Self {
            conn,
            path: path.into(),
        }
    }

    /// Path of the source file.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Check the connection is alive.
    pub async fn ping(&mut self) -> Result<()> {
        self.conn.ping().await?;
        Ok(())
    }
}

fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &SqliteRow, idx: usize) -> Result<SqlValue> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(SqlValue::Null);
    }
    let storage = raw.type_info().name().to_ascii_uppercase();

    let value = match storage.as_str() {
        "INTEGER" | "BIGINT" | "INT4" | "INT8" | "BOOLEAN" => {
            SqlValue::I64(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "REAL" | "FLOAT" | "DOUBLE" => SqlValue::F64(row.try_get_unchecked::<f64, _>(idx)?),
        "BLOB" => SqlValue::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        _ => SqlValue::Text(row.try_get_unchecked::<String, _>(idx)?),
    };
    Ok(value)
}

#[async_trait]
impl SourceReader for SqliteReader {
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64> {
        let sql = kind.count_sql();
        sqlx::query_scalar::<_, i64>(sql)
            .fetch_one(&mut self.conn)
            .await
            .map_err(|e| MigrateError::query(kind.table(), sql, e))
    }

    async fn open_table<'a>(&'a mut self, kind: EntityKind) -> Result<RowStream<'a>> {
        let sql = kind.select_sql();
        self.conn
            .prepare(sql)
            .await
            .map_err(|e| MigrateError::query(kind.table(), sql, e))?;
        debug!("{}: streaming from {}", kind, self.path);

        let stream = sqlx::query(sql)
            .fetch(&mut self.conn)
            .map(|row| decode_row(&row?))
            .boxed();
        Ok(stream)
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await?;
        debug!("Closed SQLite source: {}", self.path);
        Ok(())
    }
}
