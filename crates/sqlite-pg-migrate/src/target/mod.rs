//! PostgreSQL target database operations.

mod postgres;
pub mod tls;

pub use postgres::{PgConnection, PgWriter};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::model::{EntityKind, Record, SqlValue};

/// PostgreSQL's limit on bind parameters in one statement.
pub const MAX_BIND_PARAMS: usize = 65_535;

/// Largest batch whose insert stays under [`MAX_BIND_PARAMS`] for every table.
pub const MAX_BATCH_SIZE: usize = MAX_BIND_PARAMS / WIDEST_TABLE;

const WIDEST_TABLE: usize = 6;

/// Result of flushing one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// Statement succeeded; `rows - inserted` rows already existed and were skipped.
    Written { rows: usize, inserted: usize },
    /// The batch violated a constraint and none of it was kept.
    Dropped { rows: usize },
}

/// Single-row lookups against the destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowQuery {
    /// `SELECT id FROM <table> ORDER BY RANDOM() LIMIT 1`
    RandomId { kind: EntityKind },
    /// `SELECT <columns> FROM <table> WHERE id = $1`
    ById { kind: EntityKind, id: Uuid },
}

impl RowQuery {
    pub fn kind(&self) -> EntityKind {
        match self {
            RowQuery::RandomId { kind } | RowQuery::ById { kind, .. } => *kind,
        }
    }

    /// SQL text for this lookup in `schema`.
    pub fn sql(&self, schema: &str) -> String {
        match self {
            RowQuery::RandomId { kind } => format!(
                "SELECT id FROM {} ORDER BY RANDOM() LIMIT 1",
                qualify_table(schema, kind.table())
            ),
            RowQuery::ById { kind, .. } => format!(
                "SELECT {} FROM {} WHERE id = $1",
                column_list(kind.columns()),
                qualify_table(schema, kind.table())
            ),
        }
    }
}

/// Read access to the destination store.
#[async_trait]
pub trait DestinationReader: Send {
    /// `SELECT COUNT(*)` of the table.
    async fn row_count(&mut self, kind: EntityKind) -> Result<i64>;

    /// First row of the lookup, or `None` when nothing matches.
    async fn read_one(&mut self, query: &RowQuery) -> Result<Option<Vec<SqlValue>>>;

    /// Up to `limit` ids greater than `after`, ascending.
    async fn fetch_ids(
        &mut self,
        kind: EntityKind,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>>;
}

/// Write access to the destination store.
///
/// All batches of a run share one transaction that is committed by
/// [`close`](DestinationWriter::close).
#[async_trait]
pub trait DestinationWriter: DestinationReader {
    /// Insert the records with a single statement, skipping ids that already exist.
    async fn write_batch(&mut self, kind: EntityKind, records: &[Record]) -> Result<BatchOutcome>;

    /// Commit and release the connection.
    async fn close(self) -> Result<()>;
}

/// Quote a PostgreSQL identifier.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Startup option pinning `search_path` to one schema, quoted as an identifier.
/// Whitespace is backslash-escaped since the server splits options on it.
pub(crate) fn search_path_option(schema: &str) -> String {
    let quoted = quote_ident(schema)
        .replace('\\', "\\\\")
        .replace(' ', "\\ ");
    format!("-c search_path={}", quoted)
}

/// Fully qualify a table name.
pub(crate) fn qualify_table(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

fn column_list(columns: &[&str]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build a multi-row `INSERT ... ON CONFLICT (id) DO NOTHING` with typed placeholders.
pub fn build_insert_sql(schema: &str, kind: EntityKind, rows: usize) -> String {
    let types = kind.column_types();
    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ",
        qualify_table(schema, kind.table()),
        column_list(kind.columns())
    );

    let mut param = 1;
    for row in 0..rows {
        if row > 0 {
            sql.push_str(", ");
        }
        sql.push('(');
        for (col, ty) in types.iter().enumerate() {
            if col > 0 {
                sql.push_str(", ");
            }
            sql.push_str(&format!("${}::{}", param, ty.pg_cast()));
            param += 1;
        }
        sql.push(')');
    }

    sql.push_str(" ON CONFLICT (\"id\") DO NOTHING");
    sql
}
