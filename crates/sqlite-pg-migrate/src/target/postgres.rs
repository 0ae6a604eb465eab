//! tokio-postgres connection and the transactional batch writer.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use tokio::task::JoinHandle;
use tokio_postgres::types::{ToSql, Type};
use tokio_postgres::{Client, Config as PgConfig, NoTls, Row};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::tls::SslMode;
use super::{
    build_insert_sql, qualify_table, search_path_option, BatchOutcome, DestinationReader,
    DestinationWriter, RowQuery,
};
use crate::config::TargetConfig;
use crate::error::{MigrateError, Result, ValidationError, ValidationErrorKind};
use crate::model::{ColumnType, EntityKind, Record, SqlValue};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

const SAVEPOINT: &str = "sqlite_pg_migrate_batch";

/// Longest SQL text kept in error messages.
const SQL_PREVIEW_CHARS: usize = 300;

type PgResult<T> = std::result::Result<T, tokio_postgres::Error>;

type Param = Box<dyn ToSql + Sync + Send>;

/// One PostgreSQL connection with `search_path` set to the target schema.
///
/// In autocommit mode every statement stands alone. After [`begin`](Self::begin)
/// each statement runs inside a savepoint, so a failing statement is undone
/// without aborting the surrounding transaction.
pub struct PgConnection {
    client: Client,
    schema: String,
    in_transaction: bool,
    connection_task: JoinHandle<()>,
}

impl PgConnection {
    /// Connect in autocommit mode.
    pub async fn connect(config: &TargetConfig) -> Result<Self> {
        let mut pg_config: PgConfig = config.connection_string().parse().map_err(|e| {
            MigrateError::Config(format!("invalid target connection settings: {}", e))
        })?;
        pg_config.options(&search_path_option(&config.schema));
        pg_config.application_name("sqlite-pg-migrate");
        pg_config.connect_timeout(CONNECT_TIMEOUT);

        let target = config.display_target();
        let unavailable = |source| MigrateError::TargetUnavailable {
            target: target.clone(),
            source,
        };

        let (client, connection_task) = match SslMode::parse(&config.ssl_mode)?.connector()? {
            Some(tls) => {
                let (client, connection) = pg_config.connect(tls).await.map_err(unavailable)?;
                (client, spawn_connection(connection))
            }
            None => {
                let (client, connection) = pg_config.connect(NoTls).await.map_err(unavailable)?;
                (client, spawn_connection(connection))
            }
        };

        client
            .simple_query("SELECT 1")
            .await
            .map_err(unavailable)?;

        info!(
            "Connected to PostgreSQL: {} (schema {})",
            target, config.schema
        );

        Ok(Self {
            client,
            schema: config.schema.clone(),
            in_transaction: false,
            connection_task,
        })
    }

    /// Connect with every transaction of the session forced read-only.
    pub async fn connect_read_only(config: &TargetConfig) -> Result<Self> {
        let conn = Self::connect(config).await?;
        conn.client
            .batch_execute("SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY")
            .await?;
        Ok(conn)
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Check the connection is alive.
    pub async fn ping(&self) -> Result<()> {
        self.client.simple_query("SELECT 1").await?;
        Ok(())
    }

    /// `SHOW server_version`.
    pub async fn server_version(&self) -> Result<String> {
        let row = self.client.query_one("SHOW server_version", &[]).await?;
        Ok(row.try_get(0)?)
    }

    /// Open the run's transaction.
    pub async fn begin(&mut self) -> Result<()> {
        self.client.batch_execute("BEGIN").await?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commit the run's transaction.
    pub async fn commit(&mut self) -> Result<()> {
        if self.in_transaction {
            self.client.batch_execute("COMMIT").await?;
            self.in_transaction = false;
        }
        Ok(())
    }

    /// Close the connection and wait for the background task to finish.
    ///
    /// An open transaction is rolled back by the server.
    pub async fn close(self) -> Result<()> {
        drop(self.client);
        if let Err(e) = self.connection_task.await {
            warn!("PostgreSQL connection task ended abnormally: {}", e);
        }
        debug!("Closed PostgreSQL connection");
        Ok(())
    }

    /// Run `op` inside a savepoint while a transaction is open.
    async fn guarded<T>(&self, op: impl Future<Output = PgResult<T>>) -> PgResult<T> {
        if !self.in_transaction {
            return op.await;
        }
        self.client
            .batch_execute(&format!("SAVEPOINT {}", SAVEPOINT))
            .await?;
        match op.await {
            Ok(value) => {
                self.client
                    .batch_execute(&format!("RELEASE SAVEPOINT {}", SAVEPOINT))
                    .await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self
                    .client
                    .batch_execute(&format!("ROLLBACK TO SAVEPOINT {}", SAVEPOINT))
                    .await
                {
                    warn!("Rollback to savepoint failed: {}", rollback);
                }
                Err(e)
            }
        }
    }

    async fn insert(&self, kind: EntityKind, records: &[Record]) -> Result<BatchOutcome> {
        if records.is_empty() {
            return Ok(BatchOutcome::Written {
                rows: 0,
                inserted: 0,
            });
        }

        let sql = build_insert_sql(&self.schema, kind, records.len());
        let params = batch_params(kind, records)?;
        let refs: Vec<&(dyn ToSql + Sync)> = params
            .iter()
            .map(|p| p.as_ref() as &(dyn ToSql + Sync))
            .collect();

        match self.guarded(self.client.execute(sql.as_str(), &refs)).await {
            Ok(inserted) => Ok(BatchOutcome::Written {
                rows: records.len(),
                inserted: inserted as usize,
            }),
            Err(e) => {
                let Some(db) = e.as_db_error() else {
                    return Err(MigrateError::Target(e));
                };
                let code = db.code().code();
                if code.starts_with("23") || code.starts_with("22") {
                    let conflict = MigrateError::WriteConflict {
                        table: kind.table().to_string(),
                        rows: records.len(),
                        code: code.to_string(),
                        message: db.message().to_string(),
                    };
                    let first_ids: Vec<String> =
                        records.iter().take(3).map(|r| r.id().to_string()).collect();
                    warn!(
                        "{} (detail: {}, first ids: {})",
                        conflict,
                        db.detail().unwrap_or("-"),
                        first_ids.join(", ")
                    );
                    Ok(BatchOutcome::Dropped {
                        rows: records.len(),
                    })
                } else {
                    Err(MigrateError::query(
                        kind.table(),
                        preview(&sql),
                        format!("{} (SQLSTATE {})", db.message(), code),
                    ))
                }
            }
        }
    }
}

/// Drive the connection future until the client is dropped.
fn spawn_connection<F>(connection: F) -> JoinHandle<()>
where
    F: Future<Output = PgResult<()>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(e) = connection.await {
            warn!("PostgreSQL connection error: {}", e);
        }
    })
}

fn preview(sql: &str) -> String {
    match sql.char_indices().nth(SQL_PREVIEW_CHARS) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Map a failed read to a table error, or a run-level error when the connection is gone.
fn read_error(kind: EntityKind, sql: &str, e: tokio_postgres::Error) -> MigrateError {
    match e.as_db_error() {
        Some(db) => MigrateError::query(kind.table(), sql, db.message()),
        None => MigrateError::Target(e),
    }
}

/// Typed parameters for every cell of the batch, in placeholder order.
fn batch_params(kind: EntityKind, records: &[Record]) -> Result<Vec<Param>> {
    let columns = kind.columns();
    let types = kind.column_types();
    let mut params: Vec<Param> = Vec::with_capacity(records.len() * columns.len());

    for record in records {
        for ((value, ty), column) in record.to_row().iter().zip(types).zip(columns) {
            let param = to_param(value, *ty).map_err(|kind_err| ValidationError {
                entity: kind.table(),
                field: *column,
                kind: kind_err,
            })?;
            params.push(param);
        }
    }
    Ok(params)
}

fn to_param(value: &SqlValue, ty: ColumnType) -> std::result::Result<Param, ValidationErrorKind> {
    fn nullable<T>(
        value: &SqlValue,
        convert: impl FnOnce(&SqlValue) -> std::result::Result<T, ValidationErrorKind>,
    ) -> std::result::Result<Option<T>, ValidationErrorKind> {
        if value.is_null() {
            Ok(None)
        } else {
            convert(value).map(Some)
        }
    }

    Ok(match ty {
        ColumnType::Uuid => Box::new(nullable(value, SqlValue::as_uuid)?),
        ColumnType::Text => Box::new(nullable(value, SqlValue::as_text)?),
        ColumnType::Date => Box::new(nullable(value, SqlValue::as_date)?),
        ColumnType::Decimal => Box::new(nullable(value, SqlValue::as_decimal)?),
    })
}

fn decode_row(row: &Row) -> std::result::Result<Vec<SqlValue>, tokio_postgres::Error> {
    (0..row.len()).map(|idx| decode_cell(row, idx)).collect()
}

fn decode_cell(row: &Row, idx: usize) -> std::result::Result<SqlValue, tokio_postgres::Error> {
    let value = match *row.columns()[idx].type_() {
        Type::UUID => row.try_get::<_, Option<Uuid>>(idx)?.into(),
        Type::DATE => row.try_get::<_, Option<NaiveDate>>(idx)?.into(),
        Type::TIMESTAMP => row
            .try_get::<_, Option<NaiveDateTime>>(idx)?
            .map_or(SqlValue::Null, SqlValue::DateTime),
        Type::TIMESTAMPTZ => row
            .try_get::<_, Option<DateTime<Utc>>>(idx)?
            .map_or(SqlValue::Null, |dt| SqlValue::DateTime(dt.naive_utc())),
        Type::NUMERIC => row.try_get::<_, Option<Decimal>>(idx)?.into(),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.into(),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::F64(v as f64)),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.into(),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::I64(v as i64)),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map_or(SqlValue::Null, |v| SqlValue::I64(v as i64)),
        Type::BYTEA => row
            .try_get::<_, Option<Vec<u8>>>(idx)?
            .map_or(SqlValue::Null, SqlValue::Bytes),
        _ => row.try_get::<_, Option<String>>(idx)?.into(),
    };
    Ok(value)
}

#[async_trait]
impl DestinationReader for PgConnection {
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM {}",
            qualify_table(&self.schema, kind.table())
        );
        let row = self
            .guarded(self.client.query_one(sql.as_str(), &[]))
            .await
            .map_err(|e| read_error(kind, &sql, e))?;
        row.try_get(0)
            .map_err(|e| MigrateError::query(kind.table(), &sql, e))
    }

    async fn read_one(&mut self, query: &RowQuery) -> Result<Option<Vec<SqlValue>>> {
        let kind = query.kind();
        let sql = query.sql(&self.schema);
        let row = match query {
            RowQuery::RandomId { .. } => self.guarded(self.client.query_opt(sql.as_str(), &[])).await,
            RowQuery::ById { id, .. } => {
                self.guarded(self.client.query_opt(sql.as_str(), &[id]))
                    .await
            }
        }
        .map_err(|e| read_error(kind, &sql, e))?;

        row.map(|r| decode_row(&r))
            .transpose()
            .map_err(|e| MigrateError::query(kind.table(), &sql, e))
    }

    async fn fetch_ids(
        &mut self,
        kind: EntityKind,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        let table = qualify_table(&self.schema, kind.table());
        let limit = limit as i64;
        let (sql, rows) = match after {
            Some(after) => {
                let sql = format!("SELECT id FROM {} WHERE id > $1 ORDER BY id LIMIT $2", table);
                let rows = self
                    .guarded(self.client.query(sql.as_str(), &[&after, &limit]))
                    .await;
                (sql, rows)
            }
            None => {
                let sql = format!("SELECT id FROM {} ORDER BY id LIMIT $1", table);
                let rows = self.guarded(self.client.query(sql.as_str(), &[&limit])).await;
                (sql, rows)
            }
        };
        let rows = rows.map_err(|e| read_error(kind, &sql, e))?;
        rows.iter()
            .map(|r| r.try_get::<_, Uuid>(0))
            .collect::<PgResult<Vec<_>>>()
            .map_err(|e| MigrateError::query(kind.table(), &sql, e))
    }
}

/// Writer holding one transaction for a whole run.
///
/// Nothing is visible to other sessions until [`close`](DestinationWriter::close)
/// commits. Dropping the writer without closing loses every batch.
pub struct PgWriter {
    conn: PgConnection,
}

impl PgWriter {
    /// Connect and open the run's transaction.
    pub async fn open(config: &TargetConfig) -> Result<Self> {
        Self::from_connection(PgConnection::connect(config).await?).await
    }

    pub async fn from_connection(mut conn: PgConnection) -> Result<Self> {
        conn.begin().await?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &PgConnection {
        &self.conn
    }
}

#[async_trait]
impl DestinationReader for PgWriter {
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64> {
        self.conn.row_count(kind).await
    }

    async fn read_one(&mut self, query: &RowQuery) -> Result<Option<Vec<SqlValue>>> {
        self.conn.read_one(query).await
    }

    async fn fetch_ids(
        &mut self,
        kind: EntityKind,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>> {
        self.conn.fetch_ids(kind, after, limit).await
    }
}

#[async_trait]
impl DestinationWriter for PgWriter {
    async fn write_batch(&mut self, kind: EntityKind, records: &[Record]) -> Result<BatchOutcome> {
        self.conn.insert(kind, records).await
    }

    async fn close(mut self) -> Result<()> {
        let committed = self.conn.commit().await;
        if committed.is_ok() {
            info!("Committed target transaction");
        }
        self.conn.close().await?;
        committed
    }
}
